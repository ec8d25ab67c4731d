//! HTTP CONNECT hop client.
//!
//! Sends `CONNECT next:port` to a proxy over an already-open stream and waits
//! for a 2xx status line. The response head is read one byte at a time and
//! never past its blank-line terminator: whatever follows belongs to the next
//! hop's handshake or to the tunnel.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProxyError, Result};
use crate::upstream::{Endpoint, ProxyUrl};

/// Largest proxy response head accepted.
pub const MAX_PROXY_HEAD_BYTES: usize = 16 * 1024;

/// Build the CONNECT request sent to `proxy` for `next`.
pub fn build_connect_request(proxy: &ProxyUrl, next: &Endpoint) -> String {
    let mut request = format!("CONNECT {next} HTTP/1.1\r\nHost: {next}\r\n");
    if let Some(credentials) = proxy.credentials() {
        request.push_str(&format!(
            "Proxy-Authorization: Basic {}\r\n",
            credentials.basic_auth()
        ));
    }
    request.push_str("\r\n");
    request
}

/// Ask `proxy` (already connected on `stream`) to open a tunnel to `next`.
pub async fn handshake<S>(stream: &mut S, proxy: &ProxyUrl, next: &Endpoint) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = build_connect_request(proxy, next);
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| ProxyError::upstream(proxy, format!("failed to send CONNECT: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| ProxyError::upstream(proxy, format!("failed to send CONNECT: {}", e)))?;

    let head = read_response_head(stream, proxy).await?;
    let status = parse_status_code(&head).map_err(|reason| ProxyError::violation(proxy, reason))?;

    if !(200..300).contains(&status) {
        return Err(ProxyError::upstream(
            proxy,
            format!("CONNECT to {} rejected with status {}", next, status),
        ));
    }

    tracing::debug!(hop = %proxy, next = %next, status, "HTTP CONNECT hop established");
    Ok(())
}

async fn read_response_head<S>(stream: &mut S, proxy: &ProxyUrl) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    loop {
        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| ProxyError::upstream(proxy, format!("failed to read CONNECT response: {}", e)))?;
        if n == 0 {
            return Err(ProxyError::upstream(
                proxy,
                "connection closed before CONNECT response completed",
            ));
        }
        head.push(byte[0]);
        if head.ends_with(b"\r\n\r\n") {
            return Ok(head);
        }
        if head.len() >= MAX_PROXY_HEAD_BYTES {
            return Err(ProxyError::violation(
                proxy,
                format!("CONNECT response head exceeds {} bytes", MAX_PROXY_HEAD_BYTES),
            ));
        }
    }
}

/// Extract the status code from `HTTP/1.x NNN reason`.
pub fn parse_status_code(head: &[u8]) -> std::result::Result<u16, String> {
    let line_end = head
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(head.len());
    let line = std::str::from_utf8(&head[..line_end])
        .map_err(|_| "status line is not UTF-8".to_string())?;

    let mut parts = line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(format!("malformed status line: {:?}", line));
    }
    let code = parts
        .next()
        .filter(|c| c.len() == 3 && c.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| format!("malformed status line: {:?}", line))?;
    code.parse::<u16>()
        .map_err(|_| format!("malformed status line: {:?}", line))
}
