//! Client CONNECT request parsing.
//!
//! [`HeadBuffer`] is the per-connection parser state: bytes accumulated so
//! far plus how far the terminator search has progressed. The read loop in
//! [`read_connect_request`] feeds it chunks until the header block is
//! complete, the bound is exceeded, or the first line turns out to be bad.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProxyError, Result};
use crate::upstream::Endpoint;

const TERMINATOR: &[u8] = b"\r\n\r\n";
const READ_CHUNK: usize = 4096;

/// A parsed `CONNECT host:port HTTP/x` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub target: Endpoint,
    pub version: String,
    /// Bytes received after the header block; forwarded before piping.
    pub leftover: Vec<u8>,
}

/// Incremental header-block accumulator.
#[derive(Debug)]
pub struct HeadBuffer {
    buf: Vec<u8>,
    limit: usize,
    /// Everything before this offset has been searched for the terminator.
    scanned: usize,
    first_line_checked: bool,
}

/// What the buffer knows after a chunk is pushed.
#[derive(Debug, PartialEq, Eq)]
pub enum HeadProgress {
    /// Keep reading.
    Incomplete,
    /// The header block ends at this offset (terminator included).
    Complete(usize),
}

impl HeadBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit.min(READ_CHUNK)),
            limit,
            scanned: 0,
            first_line_checked: false,
        }
    }

    /// Append a chunk and advance the terminator search.
    pub fn push(&mut self, chunk: &[u8]) -> Result<HeadProgress> {
        self.buf.extend_from_slice(chunk);

        if !self.first_line_checked {
            if let Some(end) = find(&self.buf, b"\r\n", 0) {
                parse_request_line(&self.buf[..end])?;
                self.first_line_checked = true;
            }
        }

        // Resume a few bytes back so a terminator split across chunks is found.
        let from = self.scanned.saturating_sub(TERMINATOR.len() - 1);
        if let Some(pos) = find(&self.buf, TERMINATOR, from) {
            let end = pos + TERMINATOR.len();
            if end > self.limit {
                return Err(ProxyError::HeaderTooLarge { limit: self.limit });
            }
            return Ok(HeadProgress::Complete(end));
        }
        self.scanned = self.buf.len();

        if self.buf.len() >= self.limit {
            return Err(ProxyError::HeaderTooLarge { limit: self.limit });
        }
        Ok(HeadProgress::Incomplete)
    }

    /// Turn a complete buffer into a request.
    pub fn finish(mut self, end: usize) -> Result<ConnectRequest> {
        let line_end = find(&self.buf, b"\r\n", 0).unwrap_or(end);
        let (target, version) = parse_request_line(&self.buf[..line_end])?;
        let leftover = self.buf.split_off(end);
        Ok(ConnectRequest {
            target,
            version,
            leftover,
        })
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Read from `stream` until a full CONNECT header block is buffered.
pub async fn read_connect_request<S>(stream: &mut S, max_header_bytes: usize) -> Result<ConnectRequest>
where
    S: AsyncRead + Unpin,
{
    let mut head = HeadBuffer::new(max_header_bytes);
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(ProxyError::ClientClosed);
        }
        if let HeadProgress::Complete(end) = head.push(&chunk[..n])? {
            return head.finish(end);
        }
    }
}

/// Parse `CONNECT <host>:<port> HTTP/<ver>`.
pub fn parse_request_line(line: &[u8]) -> Result<(Endpoint, String)> {
    let line = std::str::from_utf8(line)
        .map_err(|_| ProxyError::MalformedRequest("request line is not UTF-8".to_string()))?;
    let malformed = || ProxyError::MalformedRequest(format!("unsupported request line: {:?}", line));

    let mut parts = line.split(' ');
    let (Some(method), Some(authority), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };

    if method != "CONNECT" {
        return Err(malformed());
    }
    let version = version.strip_prefix("HTTP/").ok_or_else(malformed)?;
    if version.is_empty() {
        return Err(malformed());
    }

    let target = parse_authority(authority).ok_or_else(|| {
        ProxyError::MalformedRequest(format!("invalid CONNECT target: {:?}", authority))
    })?;
    Ok((target, version.to_string()))
}

/// `host:port` or `[v6]:port`. The port is mandatory and non-zero.
fn parse_authority(authority: &str) -> Option<Endpoint> {
    let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
        let (host, rest) = rest.split_once(']')?;
        (host, rest.strip_prefix(':')?)
    } else {
        let (host, port) = authority.rsplit_once(':')?;
        if host.contains(':') {
            return None;
        }
        (host, port)
    };

    if host.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let port: u16 = port.parse().ok()?;
    if port == 0 {
        return None;
    }
    Some(Endpoint::new(host, port))
}
