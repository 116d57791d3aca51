use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// Kind of the referent, e.g. "Deployment", "ReplicaSet", "Pod".
    pub kind: String,
    /// apiVersion of the referent. Empty matches any version.
    #[serde(default)]
    pub api_version: String,
    /// Name of the referent.
    pub name: String,
}

impl ObjectReference {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            api_version: String::new(),
            name: name.into(),
        }
    }

    /// True when this reference matches a given owner kind/apiVersion, as
    /// used by the policy matcher's `targetRef.kind`+`apiVersion` filter.
    /// An empty `api_version` on either side matches anything.
    pub fn matches_owner(&self, kind: &str, api_version: &str) -> bool {
        self.kind.eq_ignore_ascii_case(kind)
            && (self.api_version.is_empty()
                || api_version.is_empty()
                || self.api_version == api_version)
    }
}
