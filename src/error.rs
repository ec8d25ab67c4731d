//! Connection-level error taxonomy.
//!
//! Every variant is local to one client connection. None of them touch the
//! listener, the routing store, or other connections.

use thiserror::Error;

use crate::resilience::timeouts::Phase;

/// Errors that terminate a single proxied connection.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The client sent something other than `CONNECT host:port HTTP/x`.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// The client header block grew past the configured bound.
    #[error("Request header exceeds {limit} bytes")]
    HeaderTooLarge { limit: usize },

    /// The client went away before finishing its header block.
    #[error("Client closed before completing the request header")]
    ClientClosed,

    /// Dial failure or refused handshake at a hop (or the direct target).
    #[error("Upstream connection failed via {hop}: {reason}")]
    UpstreamConnect { hop: String, reason: String },

    /// A hop answered with bytes that make no sense for its protocol.
    #[error("Protocol violation from {hop}: {reason}")]
    ProtocolViolation { hop: String, reason: String },

    /// A phase exceeded its configured deadline.
    #[error("{phase} timed out after {secs}s")]
    Timeout { phase: Phase, secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    pub(crate) fn upstream(hop: impl ToString, reason: impl Into<String>) -> Self {
        Self::UpstreamConnect {
            hop: hop.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn violation(hop: impl ToString, reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            hop: hop.to_string(),
            reason: reason.into(),
        }
    }

    /// Status line to send the client before closing, if any.
    pub fn response_status(&self) -> Option<&'static str> {
        match self {
            Self::MalformedRequest(_) | Self::HeaderTooLarge { .. } => Some("400 Bad Request"),
            Self::UpstreamConnect { .. } | Self::ProtocolViolation { .. } => {
                Some("502 Bad Gateway")
            }
            Self::Timeout { phase, .. } => match phase {
                Phase::Header => None,
                Phase::Connect | Phase::Handshake => Some("502 Bad Gateway"),
            },
            Self::ClientClosed | Self::Io(_) => None,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRequest(_) | Self::HeaderTooLarge { .. } => "malformed_request",
            Self::ClientClosed => "client_closed",
            Self::UpstreamConnect { .. } => "upstream_connect",
            Self::ProtocolViolation { .. } => "protocol_violation",
            Self::Timeout { .. } => "timeout",
            Self::Io(_) => "io",
        }
    }
}

/// Result type alias for connection handling.
pub type Result<T> = std::result::Result<T, ProxyError>;
