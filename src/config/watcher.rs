//! Routing file watcher for hot reload.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::schema::RoutingConfig;
use crate::config::store::RoutingStore;

/// How long the routing file must stay quiet before it is re-read.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Callback invoked with each successfully reloaded snapshot.
///
/// Runs on the reload task, never on the notify thread or a connection task.
pub type ReloadObserver = Arc<dyn Fn(&RoutingConfig) + Send + Sync>;

/// A watcher that republishes the routing table whenever its file changes.
pub struct ConfigWatcher {
    store: Arc<RoutingStore>,
    observer: Option<ReloadObserver>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher for the store's file.
    pub fn new(store: Arc<RoutingStore>) -> Self {
        Self {
            store,
            observer: None,
        }
    }

    /// Attach a reload observer.
    pub fn with_observer(mut self, observer: Option<ReloadObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Start watching. Must be called from within a Tokio runtime.
    ///
    /// The parent directory is watched rather than the file itself so that
    /// rename-into-place writes and a file created after startup are seen.
    /// Bursts of events are coalesced, and the reload runs once the file has
    /// been quiet for [`SETTLE_DELAY`].
    pub fn run(self) -> Result<WatchHandle, notify::Error> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let file_name = self.store.path().file_name().map(OsString::from);
        let dir = watch_dir(self.store.path());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    if touches(&event, file_name.as_deref()) {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let store = Arc::clone(&self.store);
        let observer = self.observer;
        let reloader = tokio::spawn(async move {
            while settle(&mut rx, SETTLE_DELAY).await {
                tracing::info!("Routing file change detected, reloading...");
                match store.reload() {
                    Ok(Some(snapshot)) => {
                        tracing::info!(
                            ts = ?snapshot.ts,
                            domains = snapshot.domain_to_provider.len(),
                            system_proxy = snapshot.system_proxy.is_some(),
                            "Routing table reloaded"
                        );
                        if let Some(observer) = &observer {
                            observer(snapshot.as_ref());
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("Routing file vanished during reload, keeping current table");
                    }
                    // Usually a write still in progress; the next event retries.
                    Err(e) => {
                        tracing::warn!("Rejected routing table: {}. Keeping current table.", e);
                    }
                }
            }
        });

        tracing::info!(path = %self.store.path().display(), "Routing watcher started");
        Ok(WatchHandle {
            watcher: Some(watcher),
            reloader: Some(reloader),
        })
    }
}

/// Wait for a change, then until no further change arrives for `quiet`.
///
/// Returns false once the sending side is gone.
async fn settle(rx: &mut mpsc::UnboundedReceiver<()>, quiet: Duration) -> bool {
    if rx.recv().await.is_none() {
        return false;
    }
    loop {
        match tokio::time::timeout(quiet, rx.recv()).await {
            Ok(Some(())) => continue,
            Ok(None) | Err(_) => return true,
        }
    }
}

/// Keeps the watcher alive; stopping it detaches from the filesystem.
pub struct WatchHandle {
    watcher: Option<RecommendedWatcher>,
    reloader: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Detach from the filesystem and stop the reload task.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.watcher.take().is_some() {
            tracing::info!("Routing watcher stopped");
        }
        if let Some(reloader) = self.reloader.take() {
            reloader.abort();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn touches(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    let Some(file_name) = file_name else {
        return false;
    };
    event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name))
}
