//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection on 127.0.0.1
//!     → listener.rs (accept loop, connection limits)
//!     → request.rs (accumulate header block, parse CONNECT host:port)
//!     → connection.rs (lifecycle tracking, state machine)
//!     → tunnel.rs (splice client and final upstream socket)
//!
//! Connection States:
//!     Accepted → ParsingHeaders → RouteResolved → ConnectingUpstream(hop)*
//!              → TunnelEstablished → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Header buffering is bounded; overflow is a malformed request
//! - TLS is never terminated; tunneled bytes are opaque

pub mod connection;
pub mod listener;
pub mod request;
pub mod tunnel;

pub use connection::{Connection, ConnectionId, ConnectionState, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use request::{read_connect_request, ConnectRequest};
pub use tunnel::{splice, TunnelStats};
