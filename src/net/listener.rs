//! Loopback TCP listener.
//!
//! # Responsibilities
//! - Bind to 127.0.0.1 only; the router is a local trust boundary, not a service
//! - Hand out accepted sockets together with a concurrency slot
//!
//! Slots come from a semaphore sized by `listener.max_connections`. While
//! every slot is taken the listener stops calling `accept`, so new clients
//! queue in the kernel backlog instead of being refused.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to accept: {0}")]
    Accept(#[source] std::io::Error),

    /// The slot semaphore was closed.
    #[error("Listener closed")]
    Closed,
}

/// The router's client-facing socket.
pub struct Listener {
    socket: TcpListener,
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl Listener {
    /// Bind `127.0.0.1:<port>`. Port 0 lets the OS choose.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.port));
        let socket = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let bound = socket
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        tracing::info!(
            address = %bound,
            max_connections = config.max_connections,
            "Loopback listener bound"
        );

        Ok(Self {
            socket,
            slots: Arc::new(Semaphore::new(config.max_connections)),
            capacity: config.max_connections,
        })
    }

    /// Wait for a free slot, then for a client.
    ///
    /// The returned [`ConnectionPermit`] must live as long as the client task.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, peer) = self.socket.accept().await.map_err(ListenerError::Accept)?;
        tracing::debug!(
            peer = %peer,
            free_slots = self.slots.available_permits(),
            "Client accepted"
        );

        Ok((stream, peer, ConnectionPermit { _slot: slot }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }

    /// Slots not currently held by a client task.
    pub fn available_permits(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.capacity
    }
}

/// One client's concurrency slot; released on drop, panics included.
#[derive(Debug)]
pub struct ConnectionPermit {
    _slot: OwnedSemaphorePermit,
}
