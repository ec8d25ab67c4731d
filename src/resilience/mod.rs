//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Client header read  → timeouts.rs (Phase::Header)
//! Dial first hop      → timeouts.rs (Phase::Connect)
//! Each hop handshake  → timeouts.rs (Phase::Handshake)
//! ```
//!
//! # Design Decisions
//! - No retries and no circuit breaker: a failed hop ends only its own
//!   connection, and the client opens a new CONNECT to try again
//! - Deadlines are per phase so a slow dial cannot eat the handshake budget

pub mod timeouts;
