//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Settings (immutable for the process lifetime)
//!
//! routing file (JSON, written by the key manager)
//!     → loader.rs (parse, proxy URLs validated while deserializing)
//!     → store.rs (Arc<RoutingConfig> behind ArcSwap)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new table
//!     → atomic swap of Arc<RoutingConfig>
//!     → reload observer notified off the data path
//! ```
//!
//! # Design Decisions
//! - Routing snapshots are immutable; changes replace the whole table
//! - A missing routing file means "everything direct", never an error
//! - A malformed routing file never replaces a good snapshot

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::{load_routing, load_settings, ConfigError};
pub use schema::{
    ListenerConfig, ObservabilityConfig, RoutingConfig, RoutingSourceConfig, Settings,
    TimeoutConfig,
};
pub use store::RoutingStore;
pub use watcher::{ConfigWatcher, ReloadObserver, WatchHandle};
