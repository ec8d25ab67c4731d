//! Upstream connector subsystem.
//!
//! # Data Flow
//! ```text
//! HopPlan (ordered hops) + target Endpoint
//!     → chain.rs (dial first hop, or the target when there are no hops)
//!     → for each hop: handshake for the NEXT address over the same socket
//!         http_connect.rs (CONNECT host:port, strict status parse)
//!         socks5.rs       (greeting, CONNECT by domain, bound-address drain)
//!     → TcpStream positioned at the first byte of tunnel payload
//! ```
//!
//! # Design Decisions
//! - Hop clients are generic over AsyncRead + AsyncWrite, so each one runs on
//!   the socket produced by the previous hop's handshake
//! - Handshake reads never consume bytes past the end of the handshake

pub mod chain;
pub mod http_connect;
pub mod proxy_url;
pub mod socks5;

use std::fmt;

pub use chain::Connector;
pub use proxy_url::{Credentials, HopProtocol, ProxyScheme, ProxyUrl, ProxyUrlError};

/// A `host:port` pair to dial or to ask a hop to reach.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// `host:port`, with IPv6 literals bracketed.
impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
