//! Route resolution.
//!
//! # Responsibilities
//! - Map target host → provider → active key → key proxy
//! - Compose the key proxy with the system proxy into an ordered hop list
//!
//! # Design Decisions
//! - One snapshot per resolution; nothing is re-read mid-lookup
//! - Any missing link in the chain means no per-key hop
//! - Host lookup is case-insensitive

use std::sync::Arc;

use crate::config::{RoutingConfig, RoutingStore};
use crate::routing::plan::{HopPlan, KeyRoute};

/// Resolve `host` against one routing snapshot.
pub fn resolve(config: &RoutingConfig, host: &str) -> HopPlan {
    HopPlan::new(config.system_proxy.clone(), key_route(config, host))
}

fn key_route(config: &RoutingConfig, host: &str) -> Option<KeyRoute> {
    let host = host.to_ascii_lowercase();
    let provider = config.domain_to_provider.get(&host)?;
    let key = config.active_keys.get(provider)?;
    let proxy = config.key_proxies.get(key)?.as_ref()?;
    Some(KeyRoute {
        provider: provider.clone(),
        key: key.clone(),
        proxy: proxy.clone(),
    })
}

/// Resolves against whatever snapshot the store holds right now.
#[derive(Debug, Clone)]
pub struct Resolver {
    store: Arc<RoutingStore>,
}

impl Resolver {
    pub fn new(store: Arc<RoutingStore>) -> Self {
        Self { store }
    }

    pub fn resolve(&self, host: &str) -> HopPlan {
        let snapshot = self.store.snapshot();
        resolve(&snapshot, host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::plan::PlanKind;

    fn config(json: &str) -> RoutingConfig {
        serde_json::from_str::<RoutingConfig>(json).unwrap().normalize()
    }

    const TABLE: &str = r#"{
        "domainToProvider": {"api.example.com": "acme", "api.other.com": "other", "api.nokey.com": "nokey"},
        "activeKeys": {"acme": "key1", "other": "key2"},
        "keyProxies": {"key1": "http://u:p@proxyhost:8080", "key2": null}
    }"#;

    #[test]
    fn unknown_host_is_direct() {
        let config = config(TABLE);
        for host in ["unknown.example.com", "example.com", "", "api.example.com.evil"] {
            assert_eq!(resolve(&config, host).kind(), PlanKind::Direct, "{host}");
        }
    }

    #[test]
    fn mapped_host_uses_key_proxy() {
        let plan = resolve(&config(TABLE), "api.example.com");
        assert_eq!(plan.kind(), PlanKind::ViaKeyProxyOnly);
        let route = plan.key_route().unwrap();
        assert_eq!(route.provider, "acme");
        assert_eq!(route.key, "key1");
        assert_eq!(route.proxy.host(), "proxyhost");
    }

    #[test]
    fn host_match_ignores_case() {
        let plan = resolve(&config(TABLE), "API.Example.COM");
        assert_eq!(plan.kind(), PlanKind::ViaKeyProxyOnly);
    }

    #[test]
    fn null_proxy_or_missing_key_is_direct() {
        let config = config(TABLE);
        assert!(resolve(&config, "api.other.com").is_direct());
        assert!(resolve(&config, "api.nokey.com").is_direct());
    }

    #[test]
    fn system_proxy_applies_to_every_host() {
        let json = r#"{
            "domainToProvider": {"api.example.com": "acme"},
            "activeKeys": {"acme": "key1"},
            "keyProxies": {"key1": "socks5://keyproxy:1080"},
            "systemProxy": "http://corp:3128"
        }"#;
        let config = config(json);

        let plain = resolve(&config, "www.example.org");
        assert_eq!(plain.kind(), PlanKind::ViaSystemOnly);
        assert_eq!(plain.hops().len(), 1);

        let keyed = resolve(&config, "api.example.com");
        assert_eq!(keyed.kind(), PlanKind::ViaSystemThenKeyProxy);
        assert_eq!(keyed.hops()[0].host(), "corp");
        assert_eq!(keyed.hops()[1].host(), "keyproxy");
    }

    #[test]
    fn every_mapped_triple_resolves_to_its_proxy() {
        let mut table = RoutingConfig::default();
        for i in 0..50 {
            let host = format!("api{i}.provider.test");
            let provider = format!("p{i}");
            let key = format!("k{i}");
            table.domain_to_provider.insert(host, provider.clone());
            table.active_keys.insert(provider, key.clone());
            table
                .key_proxies
                .insert(key, Some(format!("socks5://proxy{i}:1080").parse().unwrap()));
        }

        for i in 0..50 {
            let plan = resolve(&table, &format!("api{i}.provider.test"));
            assert_eq!(plan.key_proxy().unwrap().host(), format!("proxy{i}"));
        }
    }
}
