//! Hop plans produced by the resolver.

use std::fmt;

use crate::upstream::ProxyUrl;

/// The four shapes a plan can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanKind {
    Direct,
    ViaSystemOnly,
    ViaKeyProxyOnly,
    ViaSystemThenKeyProxy,
}

impl PlanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanKind::Direct => "direct",
            PlanKind::ViaSystemOnly => "via_system_only",
            PlanKind::ViaKeyProxyOnly => "via_key_proxy_only",
            PlanKind::ViaSystemThenKeyProxy => "via_system_then_key_proxy",
        }
    }
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The provider/key a per-key hop was chosen for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRoute {
    pub provider: String,
    pub key: String,
    pub proxy: ProxyUrl,
}

/// Route decision for one connection. Fixed once computed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HopPlan {
    system: Option<ProxyUrl>,
    key: Option<KeyRoute>,
    hops: Vec<ProxyUrl>,
}

impl HopPlan {
    pub fn direct() -> Self {
        Self::default()
    }

    pub fn new(system: Option<ProxyUrl>, key: Option<KeyRoute>) -> Self {
        let hops = system
            .iter()
            .cloned()
            .chain(key.iter().map(|k| k.proxy.clone()))
            .collect();
        Self { system, key, hops }
    }

    pub fn kind(&self) -> PlanKind {
        match (self.system.is_some(), self.key.is_some()) {
            (false, false) => PlanKind::Direct,
            (true, false) => PlanKind::ViaSystemOnly,
            (false, true) => PlanKind::ViaKeyProxyOnly,
            (true, true) => PlanKind::ViaSystemThenKeyProxy,
        }
    }

    /// Hops in dial order: system proxy first, then the key proxy.
    pub fn hops(&self) -> &[ProxyUrl] {
        &self.hops
    }

    pub fn system_proxy(&self) -> Option<&ProxyUrl> {
        self.system.as_ref()
    }

    pub fn key_route(&self) -> Option<&KeyRoute> {
        self.key.as_ref()
    }

    /// The per-key hop, if one was resolved.
    pub fn key_proxy(&self) -> Option<&ProxyUrl> {
        self.key.as_ref().map(|k| &k.proxy)
    }

    pub fn is_direct(&self) -> bool {
        self.hops.is_empty()
    }
}
