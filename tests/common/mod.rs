//! Shared utilities for integration tests: mock targets, mock upstream
//! proxies, and a router launcher.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use egress_router::config::Settings;
use egress_router::{EgressRouter, RouterHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// What a mock proxy does once its handshake succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterHandshake {
    /// Act as the target: echo every byte back.
    Echo,
    /// Dial the requested host:port and splice, like a real proxy.
    Forward,
}

/// Start an echo server standing in for the real target.
pub async fn start_echo_target() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    tokio::spawn(echo(socket));
                }
                Err(_) => break,
            }
        }
    });
    addr
}

async fn echo(mut socket: TcpStream) {
    let (mut reader, mut writer) = socket.split();
    let _ = tokio::io::copy(&mut reader, &mut writer).await;
}

/// Read up to and including the first blank line, one byte at a time.
pub async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        if n == 0 {
            break;
        }
        head.push(byte[0]);
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Start an HTTP CONNECT proxy that records each request head and answers
/// with `status_line` (e.g. `"200 Connection established"`).
pub async fn start_http_proxy(
    status_line: &'static str,
    after: AfterHandshake,
) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let authority = head
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or_default()
                    .to_string();
                let _ = tx.send(head);

                let response = format!("HTTP/1.1 {}\r\n\r\n", status_line);
                if socket.write_all(response.as_bytes()).await.is_err() {
                    return;
                }
                if !status_line.starts_with('2') {
                    return;
                }
                match after {
                    AfterHandshake::Echo => echo(socket).await,
                    AfterHandshake::Forward => {
                        if let Ok(mut upstream) = TcpStream::connect(authority.as_str()).await {
                            let _ = tokio::io::copy_bidirectional(&mut socket, &mut upstream).await;
                        }
                    }
                }
            });
        }
    });
    (addr, rx)
}

/// Start a proxy that accepts and reads but never answers.
pub async fn start_stalled_proxy() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut sink = [0u8; 1024];
                while let Ok(n) = socket.read(&mut sink).await {
                    if n == 0 {
                        break;
                    }
                }
            });
        }
    });
    addr
}

/// What a mock SOCKS5 proxy saw in a CONNECT request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksRequest {
    pub greeting: Vec<u8>,
    pub atype: u8,
    pub host: String,
    pub port: u16,
}

/// Start a no-auth SOCKS5 proxy.
///
/// The reply is `05 00 00` + `bound` (ATYP and bound address) immediately
/// followed by `injected`, all in one write, so a client that mis-sizes the
/// bound address would hand part of it to the tunnel.
pub async fn start_socks5_proxy(
    bound: Vec<u8>,
    injected: &'static [u8],
    after: AfterHandshake,
) -> (SocketAddr, mpsc::UnboundedReceiver<SocksRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            let bound = bound.clone();
            tokio::spawn(async move {
                let mut head = [0u8; 2];
                socket.read_exact(&mut head).await.unwrap();
                let mut methods = vec![0u8; usize::from(head[1])];
                socket.read_exact(&mut methods).await.unwrap();
                socket.write_all(&[0x05, 0x00]).await.unwrap();

                let mut request = [0u8; 4];
                socket.read_exact(&mut request).await.unwrap();
                let mut len = [0u8; 1];
                socket.read_exact(&mut len).await.unwrap();
                let mut host = vec![0u8; usize::from(len[0])];
                socket.read_exact(&mut host).await.unwrap();
                let mut port = [0u8; 2];
                socket.read_exact(&mut port).await.unwrap();

                let seen = SocksRequest {
                    greeting: [head.to_vec(), methods].concat(),
                    atype: request[3],
                    host: String::from_utf8(host).unwrap(),
                    port: u16::from_be_bytes(port),
                };
                let authority = format!("{}:{}", seen.host, seen.port);
                let _ = tx.send(seen);

                let mut reply = vec![0x05, 0x00, 0x00];
                reply.extend_from_slice(&bound);
                reply.extend_from_slice(injected);
                socket.write_all(&reply).await.unwrap();

                match after {
                    AfterHandshake::Echo => echo(socket).await,
                    AfterHandshake::Forward => {
                        if let Ok(mut upstream) = TcpStream::connect(authority.as_str()).await {
                            let _ = tokio::io::copy_bidirectional(&mut socket, &mut upstream).await;
                        }
                    }
                }
            });
        }
    });
    (addr, rx)
}

/// A router with its routing file in a temp dir.
pub struct TestRouter {
    pub handle: RouterHandle,
    pub routing_path: PathBuf,
    _dir: tempfile::TempDir,
}

impl TestRouter {
    pub fn addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }
}

/// Settings for a test router: ephemeral port, short timeouts.
pub fn test_settings(routing_path: &std::path::Path, watch: bool) -> Settings {
    let mut settings = Settings::default();
    settings.listener.port = 0;
    settings.routing.path = routing_path.display().to_string();
    settings.routing.watch = watch;
    settings.timeouts.header_secs = 5;
    settings.timeouts.connect_secs = 5;
    settings.timeouts.handshake_secs = 5;
    settings
}

/// Start a router. `routing` is written to its routing file if given.
pub async fn start_router(routing: Option<&str>, watch: bool) -> TestRouter {
    start_router_with(routing, watch, |_| {}).await
}

/// Like [`start_router`], with a hook to adjust the settings first.
pub async fn start_router_with<F>(routing: Option<&str>, watch: bool, adjust: F) -> TestRouter
where
    F: FnOnce(&mut Settings),
{
    let dir = tempfile::tempdir().unwrap();
    let routing_path = dir.path().join("routing.json");
    if let Some(routing) = routing {
        std::fs::write(&routing_path, routing).unwrap();
    }

    let mut settings = test_settings(&routing_path, watch);
    adjust(&mut settings);
    let handle = EgressRouter::new(settings)
        .start()
        .await
        .unwrap();

    TestRouter {
        handle,
        routing_path,
        _dir: dir,
    }
}

/// Send a CONNECT through the router and return the socket and response head.
pub async fn connect_via(router: SocketAddr, authority: &str) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(router).await.unwrap();
    let request = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n\r\n", authority);
    stream.write_all(request.as_bytes()).await.unwrap();
    let head = read_head(&mut stream).await;
    (stream, head)
}

/// Write `payload` and expect it echoed back unchanged.
pub async fn assert_echo(stream: &mut TcpStream, payload: &[u8]) {
    stream.write_all(payload).await.unwrap();
    let mut buf = vec![0u8; payload.len()];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("echo timed out")
        .unwrap();
    assert_eq!(buf, payload);
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

pub const ESTABLISHED: &str = "HTTP/1.1 200 Connection Established\r\n\r\n";
