//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers (outside this crate):
//!     → Log aggregation (stdout, file, remote)
//!     → Whatever metrics recorder the host application installs
//! ```
//!
//! # Design Decisions
//! - Connection ID flows through every log line of a connection
//! - Proxy URLs are logged redacted only
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
