//! Hot reload and shutdown behaviour.

use std::sync::Arc;
use std::time::Duration;

use egress_router::routing::Resolver;
use egress_router::{EgressRouter, PlanKind, RoutingConfig, RoutingStore};
use tokio::sync::mpsc;

mod common;
use common::{AfterHandshake, ESTABLISHED};

const RELOAD_WAIT: Duration = Duration::from_secs(10);

fn key_proxy_routing(host: &str, proxy: std::net::SocketAddr, ts: u64) -> String {
    format!(
        r#"{{
            "ts": {},
            "domainToProvider": {{ "{}": "acme" }},
            "activeKeys": {{ "acme": "k1" }},
            "keyProxies": {{ "k1": "http://{}" }}
        }}"#,
        ts, host, proxy
    )
}

#[tokio::test]
async fn test_reload_picks_up_new_table() {
    let router = common::start_router(Some(r#"{ "ts": 1 }"#), true).await;
    let store = Arc::clone(router.handle.store());
    assert_eq!(store.snapshot().ts, Some(1));

    let (proxy_addr, _seen) = common::start_http_proxy("200 OK", AfterHandshake::Echo).await;
    std::fs::write(&router.routing_path, key_proxy_routing("api.example.com", proxy_addr, 2)).unwrap();

    let reloaded = common::eventually(RELOAD_WAIT, || store.snapshot().ts == Some(2)).await;
    assert!(reloaded, "routing table was not reloaded");

    let resolver = Resolver::new(Arc::clone(&store));
    assert_eq!(resolver.resolve("api.example.com").kind(), PlanKind::ViaKeyProxyOnly);
    router.handle.stop().await;
}

#[tokio::test]
async fn test_reload_observer_sees_new_table() {
    let dir = tempfile::tempdir().unwrap();
    let routing_path = dir.path().join("routing.json");
    std::fs::write(&routing_path, r#"{ "ts": 1 }"#).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = EgressRouter::new(common::test_settings(&routing_path, true))
        .with_reload_observer(move |config| {
            let _ = tx.send(config.ts);
        })
        .start()
        .await
        .unwrap();

    std::fs::write(&routing_path, r#"{ "ts": 7 }"#).unwrap();

    let seen = tokio::time::timeout(RELOAD_WAIT, async {
        while let Some(ts) = rx.recv().await {
            if ts == Some(7) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    assert!(seen, "observer was not called with the new table");
    handle.stop().await;
}

#[tokio::test]
async fn test_malformed_write_keeps_current_table() {
    let router = common::start_router(Some(r#"{ "ts": 1 }"#), true).await;
    let store = Arc::clone(router.handle.store());

    std::fs::write(&router.routing_path, "{ not json").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(store.snapshot().ts, Some(1));

    // A later valid write is still picked up.
    std::fs::write(&router.routing_path, r#"{ "ts": 3 }"#).unwrap();
    assert!(common::eventually(RELOAD_WAIT, || store.snapshot().ts == Some(3)).await);
}

#[tokio::test]
async fn test_reload_does_not_touch_open_tunnel() {
    let target = common::start_echo_target().await;
    let router = common::start_router(Some(r#"{ "ts": 1 }"#), true).await;
    let store = Arc::clone(router.handle.store());

    let (mut tunnel, head) = common::connect_via(router.addr(), &target.to_string()).await;
    assert_eq!(head, ESTABLISHED);
    common::assert_echo(&mut tunnel, b"before").await;

    // Route the same host through a proxy that is not listening.
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);
    std::fs::write(&router.routing_path, key_proxy_routing("127.0.0.1", dead_addr, 2)).unwrap();
    assert!(common::eventually(RELOAD_WAIT, || store.snapshot().ts == Some(2)).await);

    common::assert_echo(&mut tunnel, b"after").await;

    let (_fresh, head) = common::connect_via(router.addr(), &target.to_string()).await;
    assert_eq!(head, "HTTP/1.1 502 Bad Gateway\r\n\r\n");
}

#[tokio::test]
async fn test_stop_leaves_established_tunnels_running() {
    let target = common::start_echo_target().await;
    let router = common::start_router(None, false).await;
    let addr = router.addr();

    let (mut tunnel, head) = common::connect_via(addr, &target.to_string()).await;
    assert_eq!(head, ESTABLISHED);
    let tracker = router.handle.tracker().clone();
    assert!(common::eventually(Duration::from_secs(5), || tracker.tunnel_count() == 1).await);

    router.handle.stop().await;

    common::assert_echo(&mut tunnel, b"still here").await;
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_routing_file_created_after_start() {
    let router = common::start_router(None, true).await;
    let store = Arc::clone(router.handle.store());
    assert!(store.snapshot().is_empty());

    std::fs::write(
        &router.routing_path,
        r#"{ "ts": 9, "domainToProvider": { "api.example.com": "acme" } }"#,
    )
    .unwrap();

    assert!(common::eventually(RELOAD_WAIT, || store.snapshot().ts == Some(9)).await);
    assert_eq!(store.snapshot().domain_to_provider.len(), 1);
}

#[tokio::test]
async fn test_missing_routing_directory_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let routing_path = dir.path().join("not-yet").join("routing.json");

    let handle = EgressRouter::new(common::test_settings(&routing_path, true))
        .start()
        .await
        .expect("router must start without its routing directory");
    assert!(handle.store().snapshot().is_empty());

    let target = common::start_echo_target().await;
    let (mut client, head) = common::connect_via(handle.local_addr(), &target.to_string()).await;
    assert_eq!(head, ESTABLISHED);
    common::assert_echo(&mut client, b"direct while unwatched").await;
    handle.stop().await;
}

#[tokio::test]
async fn test_replacing_shared_store_reroutes_new_connections() {
    let dir = tempfile::tempdir().unwrap();
    let routing_path = dir.path().join("routing.json");
    let store = Arc::new(RoutingStore::from_config(&routing_path, RoutingConfig::default()));

    let handle = EgressRouter::new(common::test_settings(&routing_path, false))
        .with_store(Arc::clone(&store))
        .start()
        .await
        .unwrap();
    assert!(Arc::ptr_eq(handle.store(), &store));

    let target = common::start_echo_target().await;
    let (mut before, head) = common::connect_via(handle.local_addr(), &target.to_string()).await;
    assert_eq!(head, ESTABLISHED);

    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);
    let config: RoutingConfig = serde_json::from_str(&key_proxy_routing("127.0.0.1", dead_addr, 4)).unwrap();
    store.replace(config);

    let (_after, head) = common::connect_via(handle.local_addr(), &target.to_string()).await;
    assert_eq!(head, "HTTP/1.1 502 Bad Gateway\r\n\r\n");
    common::assert_echo(&mut before, b"old plan").await;
    handle.stop().await;
}
