//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound the client header phase, each TCP dial, and each hop handshake
//! - Cancel operations cleanly on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - A zero setting disables the deadline for that phase

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::config::TimeoutConfig;
use crate::error::{ProxyError, Result};

/// The phase of a connection a deadline applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the client's CONNECT header block.
    Header,
    /// Dialing the first hop or the direct target.
    Connect,
    /// One hop's protocol handshake.
    Handshake,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Header => "request header",
            Phase::Connect => "upstream connect",
            Phase::Handshake => "upstream handshake",
        };
        f.write_str(name)
    }
}

/// Resolved per-phase deadlines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimeouts {
    pub header: Option<Duration>,
    pub connect: Option<Duration>,
    pub handshake: Option<Duration>,
}

impl PhaseTimeouts {
    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self {
            header: secs(config.header_secs),
            connect: secs(config.connect_secs),
            handshake: secs(config.handshake_secs),
        }
    }

    pub fn limit(&self, phase: Phase) -> Option<Duration> {
        match phase {
            Phase::Header => self.header,
            Phase::Connect => self.connect,
            Phase::Handshake => self.handshake,
        }
    }

    /// Run `fut` under the deadline configured for `phase`.
    pub async fn run<T, F>(&self, phase: Phase, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        with_timeout(phase, self.limit(phase), fut).await
    }
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

/// Run `fut`, failing with [`ProxyError::Timeout`] if `limit` elapses first.
pub async fn with_timeout<T, F>(phase: Phase, limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(ProxyError::Timeout {
                phase,
                secs: limit.as_secs(),
            }),
        },
        None => fut.await,
    }
}
