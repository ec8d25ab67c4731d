//! SOCKS5 hop client (RFC 1928, with RFC 1929 username/password).
//!
//! The target is always sent as a domain name (`ATYP 0x03`). After a
//! successful reply the bound address is drained in full; leftover bytes would
//! otherwise be handed to the tunnel as payload.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProxyError, Result};
use crate::upstream::{Credentials, Endpoint, ProxyUrl};

pub const VERSION: u8 = 0x05;
pub const METHOD_NO_AUTH: u8 = 0x00;
pub const METHOD_USER_PASS: u8 = 0x02;
pub const CMD_CONNECT: u8 = 0x01;
pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;
pub const REPLY_SUCCEEDED: u8 = 0x00;

const AUTH_VERSION: u8 = 0x01;

/// Greeting bytes: no-auth only, or no-auth plus username/password.
pub fn greeting(credentials: Option<&Credentials>) -> Vec<u8> {
    match credentials {
        Some(_) => vec![VERSION, 0x02, METHOD_NO_AUTH, METHOD_USER_PASS],
        None => vec![VERSION, 0x01, METHOD_NO_AUTH],
    }
}

/// `VER CMD RSV ATYP=domain LEN HOST PORT`.
pub fn build_connect_request(proxy: &ProxyUrl, next: &Endpoint) -> Result<Vec<u8>> {
    let host = next.host.as_bytes();
    let len = u8::try_from(host.len()).map_err(|_| {
        ProxyError::violation(
            proxy,
            format!("target host is {} bytes, SOCKS5 allows at most 255", host.len()),
        )
    })?;
    if len == 0 {
        return Err(ProxyError::violation(proxy, "target host is empty"));
    }

    let mut request = Vec::with_capacity(7 + host.len());
    request.extend_from_slice(&[VERSION, CMD_CONNECT, 0x00, ATYP_DOMAIN, len]);
    request.extend_from_slice(host);
    request.extend_from_slice(&next.port.to_be_bytes());
    Ok(request)
}

/// Ask `proxy` (already connected on `stream`) to open a tunnel to `next`.
pub async fn handshake<S>(stream: &mut S, proxy: &ProxyUrl, next: &Endpoint) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Checked before any byte goes out.
    let request = build_connect_request(proxy, next)?;

    write(stream, proxy, &greeting(proxy.credentials())).await?;

    let mut choice = [0u8; 2];
    read_exact(stream, proxy, &mut choice).await?;
    match (choice, proxy.credentials()) {
        ([VERSION, METHOD_NO_AUTH], _) => {}
        ([VERSION, METHOD_USER_PASS], Some(credentials)) => {
            authenticate(stream, proxy, credentials).await?;
        }
        ([VERSION, method], _) => {
            return Err(ProxyError::upstream(
                proxy,
                format!("SOCKS5 proxy requires unsupported auth method 0x{:02x}", method),
            ));
        }
        ([version, _], _) => {
            return Err(ProxyError::violation(
                proxy,
                format!("SOCKS5 greeting reply has version 0x{:02x}", version),
            ));
        }
    }

    write(stream, proxy, &request).await?;

    let mut reply = [0u8; 4];
    read_exact(stream, proxy, &mut reply).await?;
    let [version, code, _reserved, atype] = reply;
    if version != VERSION {
        return Err(ProxyError::violation(
            proxy,
            format!("SOCKS5 connect reply has version 0x{:02x}", version),
        ));
    }
    if code != REPLY_SUCCEEDED {
        return Err(ProxyError::upstream(
            proxy,
            format!("SOCKS5 CONNECT to {} failed: {}", next, reply_label(code)),
        ));
    }

    drain_bound_address(stream, proxy, atype).await?;

    tracing::debug!(hop = %proxy, next = %next, "SOCKS5 hop established");
    Ok(())
}

async fn authenticate<S>(stream: &mut S, proxy: &ProxyUrl, credentials: &Credentials) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let user = credentials.username.as_bytes();
    let pass = credentials.password.as_bytes();
    let (Ok(ulen), Ok(plen)) = (u8::try_from(user.len()), u8::try_from(pass.len())) else {
        return Err(ProxyError::violation(proxy, "SOCKS5 credentials exceed 255 bytes"));
    };

    let mut message = Vec::with_capacity(3 + user.len() + pass.len());
    message.push(AUTH_VERSION);
    message.push(ulen);
    message.extend_from_slice(user);
    message.push(plen);
    message.extend_from_slice(pass);
    write(stream, proxy, &message).await?;

    let mut status = [0u8; 2];
    read_exact(stream, proxy, &mut status).await?;
    if status[1] != 0x00 {
        return Err(ProxyError::upstream(proxy, "SOCKS5 username/password rejected"));
    }
    Ok(())
}

/// Consume `BND.ADDR` and `BND.PORT` so the stream sits at tunnel payload.
///
/// IPv4: 4 + 2 bytes. IPv6: 16 + 2 bytes. Domain: 1 + N + 2 bytes.
async fn drain_bound_address<S>(stream: &mut S, proxy: &ProxyUrl, atype: u8) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    let remaining = match atype {
        ATYP_IPV4 => 4 + 2,
        ATYP_IPV6 => 16 + 2,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            read_exact(stream, proxy, &mut len).await?;
            usize::from(len[0]) + 2
        }
        other => {
            return Err(ProxyError::violation(
                proxy,
                format!("SOCKS5 reply has unknown address type 0x{:02x}", other),
            ));
        }
    };
    let mut bound = vec![0u8; remaining];
    read_exact(stream, proxy, &mut bound).await
}

async fn write<S>(stream: &mut S, proxy: &ProxyUrl, bytes: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(bytes)
        .await
        .map_err(|e| ProxyError::upstream(proxy, format!("SOCKS5 write failed: {}", e)))
}

async fn read_exact<S>(stream: &mut S, proxy: &ProxyUrl, buf: &mut [u8]) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    stream
        .read_exact(buf)
        .await
        .map(|_| ())
        .map_err(|e| ProxyError::upstream(proxy, format!("SOCKS5 reply truncated: {}", e)))
}

fn reply_label(code: u8) -> &'static str {
    match code {
        0x01 => "general failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown reply code",
    }
}
