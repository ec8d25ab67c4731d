//! Bidirectional byte splicing.
//!
//! The proxy never looks at tunneled bytes. When one side reaches EOF the
//! write half of the other side is shut down, and the copy ends once both
//! directions are done or either errors.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Bytes moved in each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TunnelStats {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
}

/// Forward `preface` to `upstream`, then pipe both ways until close.
///
/// `preface` holds bytes the client sent right behind its CONNECT header.
pub async fn splice<C, U>(client: &mut C, upstream: &mut U, preface: &[u8]) -> std::io::Result<TunnelStats>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    if !preface.is_empty() {
        upstream.write_all(preface).await?;
    }

    let (up, down) = tokio::io::copy_bidirectional(client, upstream).await?;
    Ok(TunnelStats {
        client_to_upstream: up + preface.len() as u64,
        upstream_to_client: down,
    })
}
