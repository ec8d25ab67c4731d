//! Per-connection pipeline.
//!
//! parse CONNECT → resolve plan → dial hops → `200` → splice. Any failure
//! before the tunnel is up ends only this connection, after the status line
//! its error maps to.

use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::{ProxyError, Result};
use crate::net::connection::{Connection, ConnectionState, ConnectionTracker};
use crate::net::request::read_connect_request;
use crate::net::tunnel::splice;
use crate::observability::metrics;
use crate::resilience::timeouts::{Phase, PhaseTimeouts};
use crate::routing::Resolver;
use crate::upstream::Connector;

pub const ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Everything a connection task needs, shared across tasks.
#[derive(Debug)]
pub(crate) struct ConnectionContext {
    pub resolver: Resolver,
    pub connector: Connector,
    pub timeouts: PhaseTimeouts,
    pub max_header_bytes: usize,
    pub tracker: ConnectionTracker,
}

/// Drive one accepted socket to completion.
pub(crate) async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, ctx: &ConnectionContext) {
    let _guard = ctx.tracker.track();
    let mut conn = Connection::accepted(peer);

    if let Err(e) = serve(&mut stream, &mut conn, ctx).await {
        report(&conn, &e);
        if let Some(status) = e.response_status() {
            let response = format!("HTTP/1.1 {}\r\n\r\n", status);
            let _ = stream.write_all(response.as_bytes()).await;
        }
    }

    let _ = stream.shutdown().await;
    conn.close();
}

async fn serve(stream: &mut TcpStream, conn: &mut Connection, ctx: &ConnectionContext) -> Result<()> {
    let id = conn.id();
    conn.transition(ConnectionState::ParsingHeaders);

    let request = ctx
        .timeouts
        .run(Phase::Header, read_connect_request(stream, ctx.max_header_bytes))
        .await?;
    conn.set_target(request.target.clone());

    // The plan is fixed here; later reloads do not affect this connection.
    let plan = ctx.resolver.resolve(&request.target.host);
    conn.set_plan(plan.clone());
    metrics::record_connection(plan.kind());
    tracing::info!(
        connection_id = %id,
        peer = %conn.peer(),
        target = %request.target,
        plan = %plan.kind(),
        hops = ?plan.hops(),
        "Route resolved"
    );

    let mut upstream = ctx
        .connector
        .establish(plan.hops(), &request.target, |index, hop| {
            conn.transition(ConnectionState::ConnectingUpstream { hop: index });
            tracing::debug!(connection_id = %id, hop = %hop, index, "Handshaking with hop");
        })
        .await?;

    stream.write_all(ESTABLISHED).await?;
    conn.transition(ConnectionState::TunnelEstablished);
    let _tunnel = ctx.tracker.track_tunnel();
    tracing::debug!(connection_id = %id, target = %request.target, "Tunnel established");

    match splice(stream, &mut upstream, &request.leftover).await {
        Ok(stats) => tracing::debug!(
            connection_id = %id,
            target = %request.target,
            sent = stats.client_to_upstream,
            received = stats.upstream_to_client,
            "Tunnel closed"
        ),
        Err(e) => tracing::debug!(
            connection_id = %id,
            target = %request.target,
            error = %e,
            "Tunnel closed with error"
        ),
    }
    Ok(())
}

fn report(conn: &Connection, error: &ProxyError) {
    metrics::record_error(error.kind());
    let target = conn
        .target()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string());
    let plan = conn.plan().map(|p| p.kind().as_str()).unwrap_or("-");

    match error {
        ProxyError::ClientClosed => {
            tracing::debug!(connection_id = %conn.id(), peer = %conn.peer(), "Client closed before sending a request");
        }
        ProxyError::MalformedRequest(_) | ProxyError::HeaderTooLarge { .. } => {
            tracing::warn!(connection_id = %conn.id(), peer = %conn.peer(), error = %error, "Rejected request");
        }
        _ => {
            tracing::warn!(
                connection_id = %conn.id(),
                target = %target,
                plan,
                state = ?conn.state(),
                error = %error,
                "Connection failed"
            );
        }
    }
}
