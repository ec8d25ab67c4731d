//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load settings → Validate → Open routing store → Attach watcher → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     stop() → Stop accepting → Detach watcher → Tunnels drain on their own
//!
//! Signals (signals.rs, binary only):
//!     SIGTERM/SIGINT → stop()
//! ```
//!
//! # Design Decisions
//! - Ordered startup: settings first, then routing, then the listener
//! - Stopping never cuts established tunnels

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
