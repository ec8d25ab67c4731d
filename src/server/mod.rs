//! Router lifecycle: start, accept loop, stop.
//!
//! # Responsibilities
//! - Open the routing store and attach the file watcher
//! - Bind the loopback listener and spawn one task per client
//! - Tear down listener and watcher on `stop()`, leaving tunnels alone

mod handler;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{ConfigWatcher, ReloadObserver, RoutingConfig, RoutingStore, Settings, WatchHandle};
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::resilience::timeouts::PhaseTimeouts;
use crate::routing::Resolver;
use crate::upstream::Connector;

use handler::{handle_connection, ConnectionContext};

pub use handler::ESTABLISHED;

/// Back-off after a failed accept (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Errors that prevent the router from starting.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The local forwarding proxy.
pub struct EgressRouter {
    settings: Settings,
    store: Option<Arc<RoutingStore>>,
    observer: Option<ReloadObserver>,
}

impl EgressRouter {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            store: None,
            observer: None,
        }
    }

    /// Use an existing store instead of opening `settings.routing.path`.
    pub fn with_store(mut self, store: Arc<RoutingStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Called with each successfully reloaded table, off the data path.
    pub fn with_reload_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&RoutingConfig) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Returns once the socket is listening and the watcher, if enabled and
    /// possible, is attached.
    pub async fn start(self) -> Result<RouterHandle, StartError> {
        let settings = self.settings;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(RoutingStore::open(&settings.routing.path)));

        let watch = if settings.routing.watch {
            attach_watcher(&store, self.observer)
        } else {
            None
        };

        let listener = Listener::bind(&settings.listener).await?;
        let local_addr = listener.local_addr()?;

        let timeouts = PhaseTimeouts::from_config(&settings.timeouts);
        let tracker = ConnectionTracker::new();
        let ctx = Arc::new(ConnectionContext {
            resolver: Resolver::new(Arc::clone(&store)),
            connector: Connector::new(timeouts),
            timeouts,
            max_header_bytes: settings.listener.max_header_bytes,
            tracker: tracker.clone(),
        });

        let shutdown = Shutdown::new();
        let accept_task = tokio::spawn(accept_loop(listener, ctx, shutdown.subscribe()));

        tracing::info!(address = %local_addr, "Egress router started");
        Ok(RouterHandle {
            local_addr,
            store,
            tracker,
            shutdown,
            accept_task,
            watch,
        })
    }
}

/// A routing file that cannot be watched is not fatal: the router serves the
/// table it loaded (or routes everything direct) until restarted.
fn attach_watcher(store: &Arc<RoutingStore>, observer: Option<ReloadObserver>) -> Option<WatchHandle> {
    match ConfigWatcher::new(Arc::clone(store)).with_observer(observer).run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(
                path = %store.path().display(),
                error = %e,
                "Cannot watch routing file, hot reload disabled"
            );
            None
        }
    }
}

/// A running router.
pub struct RouterHandle {
    local_addr: SocketAddr,
    store: Arc<RoutingStore>,
    tracker: ConnectionTracker,
    shutdown: Shutdown,
    accept_task: JoinHandle<()>,
    watch: Option<WatchHandle>,
}

impl RouterHandle {
    /// The loopback address clients should CONNECT through.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> &Arc<RoutingStore> {
        &self.store
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Close the listener and the watcher. Established tunnels keep running
    /// until one of their endpoints closes.
    pub async fn stop(self) {
        let RouterHandle {
            shutdown,
            accept_task,
            watch,
            tracker,
            ..
        } = self;

        shutdown.trigger();
        if let Err(e) = accept_task.await {
            tracing::error!("Accept loop ended abnormally: {}", e);
        }
        if let Some(watch) = watch {
            watch.stop();
        }
        tracing::info!(
            open_tunnels = tracker.tunnel_count(),
            "Egress router stopped"
        );
    }
}

async fn accept_loop(listener: Listener, ctx: Arc<ConnectionContext>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer, permit)) => {
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        let _permit = permit;
                        handle_connection(stream, peer, &ctx).await;
                    });
                }
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!("Accept error: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            _ = shutdown.recv() => {
                tracing::info!("Listener shutting down");
                break;
            }
        }
    }
}
