//! Routing snapshot store.
//!
//! Holds the current [`RoutingConfig`] behind an [`ArcSwap`]. Readers take one
//! `Arc` per resolution and keep using it; reloads publish a new `Arc`
//! wholesale, so no reader ever sees a half-updated table.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::loader::{load_routing, ConfigError};
use crate::config::schema::RoutingConfig;

/// Shared, hot-swappable routing table.
#[derive(Debug)]
pub struct RoutingStore {
    path: PathBuf,
    current: ArcSwap<RoutingConfig>,
}

impl RoutingStore {
    /// Open the store, performing the initial load.
    ///
    /// A missing file yields an empty table. A malformed file is logged and
    /// also yields an empty table, since there is no previous snapshot to keep.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initial = match load_routing(&path) {
            Ok(Some(config)) => {
                tracing::info!(
                    path = %path.display(),
                    ts = ?config.ts,
                    domains = config.domain_to_provider.len(),
                    system_proxy = config.system_proxy.is_some(),
                    "Routing table loaded"
                );
                config
            }
            Ok(None) => {
                tracing::info!(path = %path.display(), "Routing table not found, all targets go direct");
                RoutingConfig::default()
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to load routing table, all targets go direct");
                RoutingConfig::default()
            }
        };

        Self {
            path,
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Build a store around an in-memory table. Reloads read from `path`.
    pub fn from_config(path: impl Into<PathBuf>, config: RoutingConfig) -> Self {
        Self {
            path: path.into(),
            current: ArcSwap::from_pointee(config.normalize()),
        }
    }

    /// The file this store reloads from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current snapshot. Hold on to it for the whole resolution.
    pub fn snapshot(&self) -> Arc<RoutingConfig> {
        self.current.load_full()
    }

    /// Publish a new snapshot.
    pub fn replace(&self, config: RoutingConfig) -> Arc<RoutingConfig> {
        let config = Arc::new(config.normalize());
        self.current.store(Arc::clone(&config));
        config
    }

    /// Re-read the file and publish it.
    ///
    /// - `Ok(Some(snapshot))`: a new table was published.
    /// - `Ok(None)`: the file is gone; the current table is kept.
    /// - `Err(_)`: the file is malformed; the current table is kept.
    pub fn reload(&self) -> Result<Option<Arc<RoutingConfig>>, ConfigError> {
        let result = match load_routing(&self.path) {
            Ok(Some(config)) => {
                let config = Arc::new(config);
                self.current.store(Arc::clone(&config));
                Ok(Some(config))
            }
            other => other.map(|_| None),
        };

        let outcome = match &result {
            Ok(Some(_)) => "applied",
            Ok(None) => "missing",
            Err(_) => "rejected",
        };
        crate::observability::metrics::record_reload(outcome);
        result
    }
}
