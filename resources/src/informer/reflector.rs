use anyhow::{anyhow, Result};
use futures_util::stream::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::{ListerWatcher, Store};
use crate::{models::watch::WatchEvent, objects::Object};

pub(super) struct Reflector<T> {
    pub(super) lw: ListerWatcher<T>,
    pub(super) store: Store<T>,
}

#[derive(Debug)]
pub(super) enum ReflectorNotification<T> {
    Add(T),
    /// old value, new value
    Update(T, T),
    Delete(T),
}

impl<T: Object + Clone + serde::de::DeserializeOwned> Reflector<T> {
    pub(super) async fn run(&self, tx: mpsc::Sender<ReflectorNotification<T>>) -> Result<()> {
        let initial = (self.lw.lister)(()).await?;
        {
            let mut store = self.store.write().await;
            for object in initial {
                store.insert(object.resource_key(), object);
            }
        }

        let (_, mut receiver) = (self.lw.watcher)(()).await?.split();

        loop {
            let msg: Message = receiver
                .next()
                .await
                .ok_or_else(|| anyhow!("watch stream ended"))??;

            if msg.is_close() {
                return Err(anyhow!("cluster API watch disconnected"));
            }

            let Message::Text(payload) = msg else {
                tracing::warn!("received non-text watch message, ignoring");
                continue;
            };

            let event: WatchEvent = serde_json::from_str(&payload)?;
            match event {
                WatchEvent::Put(e) => {
                    let new: T = serde_json::from_str(&e.object)?;
                    let key = new.resource_key();
                    let mut store = self.store.write().await;
                    match store.insert(key, new.clone()) {
                        Some(old) => {
                            drop(store);
                            tx.send(ReflectorNotification::Update(old, new)).await?;
                        },
                        None => {
                            drop(store);
                            tx.send(ReflectorNotification::Add(new)).await?;
                        },
                    }
                },
                WatchEvent::Delete(e) => {
                    let removed = self.store.write().await.remove(&e.key);
                    match removed {
                        Some(old) => tx.send(ReflectorNotification::Delete(old)).await?,
                        None => tracing::warn!("watch inconsistent, key {} already deleted", e.key),
                    }
                },
            }
        }
    }
}
