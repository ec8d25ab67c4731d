//! Connection state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Track connection state (Accepted → ... → TunnelEstablished → Closed)
//! - Generate unique connection IDs for tracing
//! - Count live connections and established tunnels

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::routing::HopPlan;
use crate::upstream::Endpoint;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    ParsingHeaders,
    RouteResolved,
    /// Handshaking with hop `hop` (0 = outermost).
    ConnectingUpstream { hop: usize },
    TunnelEstablished,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    fn order(&self) -> u8 {
        match self {
            Self::Accepted => 0,
            Self::ParsingHeaders => 1,
            Self::RouteResolved => 2,
            Self::ConnectingUpstream { .. } => 3,
            Self::TunnelEstablished => 4,
            Self::Closed => 5,
        }
    }

    /// Legal moves: forward along the pipeline, hop to hop, or to Closed.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        match (self, next) {
            (Self::Closed, _) => false,
            (_, Self::Closed) => true,
            (Self::ConnectingUpstream { hop: a }, Self::ConnectingUpstream { hop: b }) => b == a + 1,
            (Self::RouteResolved, Self::ConnectingUpstream { hop }) => hop == 0,
            (Self::RouteResolved, Self::TunnelEstablished) => true,
            (current, next) => next.order() == current.order() + 1,
        }
    }
}

/// One client socket's unit of work.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    state: ConnectionState,
    target: Option<Endpoint>,
    plan: Option<HopPlan>,
}

impl Connection {
    pub fn accepted(peer: SocketAddr) -> Self {
        Self {
            id: ConnectionId::new(),
            peer,
            state: ConnectionState::Accepted,
            target: None,
            plan: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn target(&self) -> Option<&Endpoint> {
        self.target.as_ref()
    }

    pub fn plan(&self) -> Option<&HopPlan> {
        self.plan.as_ref()
    }

    /// Record the parsed target.
    pub fn set_target(&mut self, target: Endpoint) {
        self.target = Some(target);
    }

    /// Fix the hop plan. Later calls are ignored; the first plan wins.
    pub fn set_plan(&mut self, plan: HopPlan) {
        if self.plan.is_none() {
            self.plan = Some(plan);
            self.transition(ConnectionState::RouteResolved);
        }
    }

    pub fn transition(&mut self, next: ConnectionState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                connection_id = %self.id,
                from = ?self.state,
                to = ?next,
                "Ignoring illegal connection state transition"
            );
            return;
        }
        tracing::trace!(connection_id = %self.id, from = ?self.state, to = ?next, "Connection state");
        self.state = next;
    }

    pub fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            self.transition(ConnectionState::Closed);
        }
    }
}

/// Counts live client connections and established tunnels.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicU64>,
    tunnels: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active: Arc::clone(&self.active),
        }
    }

    /// Record an established tunnel for as long as the guard lives.
    pub fn track_tunnel(&self) -> TunnelGuard {
        self.tunnels.fetch_add(1, Ordering::SeqCst);
        metrics::gauge!("egress_active_tunnels").increment(1.0);
        TunnelGuard {
            tunnels: Arc::clone(&self.tunnels),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Get current established tunnel count.
    pub fn tunnel_count(&self) -> u64 {
        self.tunnels.load(Ordering::SeqCst)
    }
}

/// Decrements the active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<AtomicU64>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decrements the tunnel count when dropped.
#[derive(Debug)]
pub struct TunnelGuard {
    tunnels: Arc<AtomicU64>,
}

impl Drop for TunnelGuard {
    fn drop(&mut self) {
        self.tunnels.fetch_sub(1, Ordering::SeqCst);
        metrics::gauge!("egress_active_tunnels").decrement(1.0);
    }
}
