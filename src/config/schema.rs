//! Configuration schema definitions.
//!
//! Two documents are described here:
//! - [`Settings`]: the router process settings (TOML, optional, all defaulted).
//! - [`RoutingConfig`]: the routing table written by the key manager (JSON),
//!   replaced wholesale on every reload.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::upstream::ProxyUrl;

/// Root settings for the router process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Listener configuration (port, limits).
    pub listener: ListenerConfig,

    /// Where the routing table lives and whether it is watched.
    pub routing: RoutingSourceConfig,

    /// Per-phase timeouts.
    pub timeouts: TimeoutConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
///
/// There is no bind address: the listener is loopback-only.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// TCP port on 127.0.0.1. `0` lets the OS pick one.
    pub port: u16,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,

    /// Upper bound on the buffered CONNECT header block.
    pub max_header_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: 9999,
            max_connections: 1024,
            max_header_bytes: 16 * 1024,
        }
    }
}

/// Location of the routing table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingSourceConfig {
    /// Path to the routing JSON file.
    pub path: String,

    /// Attach a file watcher for hot reload.
    pub watch: bool,
}

impl Default for RoutingSourceConfig {
    fn default() -> Self {
        Self {
            path: "routing.json".to_string(),
            watch: true,
        }
    }
}

/// Timeout configuration, in seconds. Zero disables a timeout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed for the client to deliver its CONNECT header block.
    pub header_secs: u64,

    /// Time allowed for each TCP dial (first hop or direct target).
    pub connect_secs: u64,

    /// Time allowed for each hop handshake.
    pub handshake_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            header_secs: 30,
            connect_secs: 10,
            handshake_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive (trace, debug, info, warn, error, or an EnvFilter string).
    pub log_level: String,

    /// Log output format: `pretty` or `json`.
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// One complete routing snapshot.
///
/// Field names follow the JSON written by the key manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    /// Last-update timestamp set by the writer (milliseconds since epoch).
    /// Informational only: a value that is not a non-negative number is
    /// dropped instead of failing the table.
    #[serde(default, deserialize_with = "lenient_ts")]
    pub ts: Option<u64>,

    /// Exact target hostname → provider id. Keys are lowercase after loading.
    #[serde(default)]
    pub domain_to_provider: HashMap<String, String>,

    /// Provider id → active key id.
    #[serde(default)]
    pub active_keys: HashMap<String, String>,

    /// Key id → dedicated upstream proxy. `null` means no dedicated proxy.
    #[serde(default)]
    pub key_proxies: HashMap<String, Option<ProxyUrl>>,

    /// Outermost hop for every connection, if set.
    #[serde(default)]
    pub system_proxy: Option<ProxyUrl>,
}

impl RoutingConfig {
    /// Lowercase hostname keys so lookups are case-insensitive.
    pub(crate) fn normalize(mut self) -> Self {
        self.domain_to_provider = self
            .domain_to_provider
            .into_iter()
            .map(|(host, provider)| (host.to_ascii_lowercase(), provider))
            .collect();
        self
    }

    /// True when no routing rule and no system proxy is configured.
    pub fn is_empty(&self) -> bool {
        self.domain_to_provider.is_empty() && self.system_proxy.is_none()
    }
}

/// Accept integer, float, or numeric-string timestamps; anything else is `None`.
fn lenient_ts<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let ts = match &value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    if ts.is_none() && !value.is_null() {
        tracing::warn!(ts = %value, "Ignoring unusable routing table timestamp");
    }
    Ok(ts)
}
