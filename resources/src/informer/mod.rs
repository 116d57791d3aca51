use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use futures_util::future::BoxFuture;
use tokio::{
    net::TcpStream,
    sync::{mpsc, RwLock},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::objects::Object;

mod reflector;

use reflector::{Reflector, ReflectorNotification};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Informer-local view of a resource kind, keyed by `Object::resource_key`.
/// Readers never block writers for longer than a single insert/remove, so
/// the reconciler can hold a snapshot reference across an `.await` boundary
/// without starving the reflector.
pub type Store<T> = Arc<RwLock<HashMap<String, T>>>;

type Cls<Arg, Res> = Box<dyn Fn(Arg) -> BoxFuture<'static, Result<Res>> + Send + Sync>;

/// How to list the current state and how to open a watch connection for
/// one resource kind. Built by the cluster client, one per resource kind.
pub struct ListerWatcher<T> {
    pub lister: Cls<(), Vec<T>>,
    pub watcher: Cls<(), WsStream>,
}

/// Closures invoked as the reflector observes adds/updates/deletes. Kept as
/// plain boxed closures rather than a trait so call sites can close over
/// whatever channel or state they need without a bespoke type per handler.
pub struct EventHandler<T> {
    pub add_cls: Cls<T, ()>,
    pub update_cls: Cls<(T, T), ()>,
    pub delete_cls: Cls<T, ()>,
}

/// Invoked on every resync tick (spec.md §4.1 resync semantics), independent
/// of whether anything actually changed.
pub struct ResyncHandler(pub Cls<(), ()>);

pub struct Informer<T> {
    reflector: Reflector<T>,
    eh: EventHandler<T>,
    rh: ResyncHandler,
    store: Store<T>,
    resync_period: std::time::Duration,
}

impl<T: Object + Clone + Send + Sync + serde::de::DeserializeOwned + 'static> Informer<T> {
    pub fn new(lw: ListerWatcher<T>, eh: EventHandler<T>, rh: ResyncHandler) -> Self {
        Self::with_resync_period(lw, eh, rh, std::time::Duration::from_secs(300))
    }

    pub fn with_resync_period(
        lw: ListerWatcher<T>,
        eh: EventHandler<T>,
        rh: ResyncHandler,
        resync_period: std::time::Duration,
    ) -> Self {
        let store: Store<T> = Arc::new(RwLock::new(HashMap::new()));
        Self {
            reflector: Reflector {
                lw,
                store: store.clone(),
            },
            eh,
            rh,
            store,
            resync_period,
        }
    }

    pub fn get_store(&self) -> Store<T> {
        self.store.clone()
    }

    pub async fn run(self) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<ReflectorNotification<T>>(64);
        let reflector_handle = tokio::spawn(async move { self.reflector.run(tx).await });

        let mut resync = tokio::time::interval(self.resync_period);
        resync.tick().await; // first tick fires immediately, skip it

        tracing::info!("informer started");
        loop {
            tokio::select! {
                notification = rx.recv() => {
                    match notification {
                        Some(ReflectorNotification::Add(new)) => (self.eh.add_cls)(new).await?,
                        Some(ReflectorNotification::Update(old, new)) => (self.eh.update_cls)((old, new)).await?,
                        Some(ReflectorNotification::Delete(old)) => (self.eh.delete_cls)(old).await?,
                        None => break,
                    }
                }
                _ = resync.tick() => {
                    (self.rh.0)(()).await?;
                }
            }
        }

        reflector_handle.await?
    }
}
