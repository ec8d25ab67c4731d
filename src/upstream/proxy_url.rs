//! Upstream proxy URLs.
//!
//! `scheme://[user:pass@]host[:port]` with scheme in `http`, `https`,
//! `socks5`, `socks`. Display and Debug never show credentials.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::upstream::Endpoint;

/// Default port for SOCKS proxies when the URL omits one.
pub const DEFAULT_SOCKS_PORT: u16 = 1080;

/// Which handshake a hop speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopProtocol {
    HttpConnect,
    Socks5,
}

/// URL scheme as written in the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScheme {
    Http,
    Https,
    Socks5,
    Socks,
}

impl ProxyScheme {
    fn parse(scheme: &str) -> Option<Self> {
        match scheme {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "socks5" => Some(Self::Socks5),
            "socks" => Some(Self::Socks),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks5 => "socks5",
            Self::Socks => "socks",
        }
    }

    /// `https` still means a plaintext CONNECT to the proxy; the proxy never
    /// sees anything but the tunneled TLS of the client.
    pub fn protocol(&self) -> HopProtocol {
        match self {
            Self::Http | Self::Https => HopProtocol::HttpConnect,
            Self::Socks5 | Self::Socks => HopProtocol::Socks5,
        }
    }

    fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
            Self::Socks5 | Self::Socks => DEFAULT_SOCKS_PORT,
        }
    }
}

/// Username and password for a hop.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Value for a `Proxy-Authorization: Basic ...` header.
    pub fn basic_auth(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.username, self.password))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(***)")
    }
}

/// Error for an unusable proxy URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid proxy URL: {0}")]
pub struct ProxyUrlError(String);

/// A parsed upstream proxy.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProxyUrl {
    scheme: ProxyScheme,
    host: String,
    port: u16,
    credentials: Option<Credentials>,
}

impl ProxyUrl {
    pub fn scheme(&self) -> ProxyScheme {
        self.scheme
    }

    pub fn protocol(&self) -> HopProtocol {
        self.scheme.protocol()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Where to dial or tunnel to in order to reach this proxy.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    /// Full URL including credentials. Never log this.
    pub fn to_url_string(&self) -> String {
        let userinfo = match &self.credentials {
            Some(c) => format!(
                "{}:{}@",
                urlencoding::encode(&c.username),
                urlencoding::encode(&c.password)
            ),
            None => String::new(),
        };
        format!("{}://{}{}", self.scheme.as_str(), userinfo, self.endpoint())
    }
}

impl FromStr for ProxyUrl {
    type Err = ProxyUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s.trim()).map_err(|e| ProxyUrlError(e.to_string()))?;

        let scheme = ProxyScheme::parse(url.scheme())
            .ok_or_else(|| ProxyUrlError(format!("unsupported scheme '{}'", url.scheme())))?;

        let host = match url.host() {
            Some(Host::Domain(d)) if !d.is_empty() => d.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            _ => return Err(ProxyUrlError("missing host".to_string())),
        };

        let port = url.port_or_known_default().unwrap_or_else(|| scheme.default_port());

        let credentials = if url.username().is_empty() {
            None
        } else {
            let username = decode(url.username())?;
            let password = decode(url.password().unwrap_or(""))?;
            Some(Credentials { username, password })
        };

        Ok(Self {
            scheme,
            host,
            port,
            credentials,
        })
    }
}

fn decode(part: &str) -> Result<String, ProxyUrlError> {
    urlencoding::decode(part)
        .map(|s| s.into_owned())
        .map_err(|_| ProxyUrlError("credentials are not valid UTF-8".to_string()))
}

impl TryFrom<String> for ProxyUrl {
    type Error = ProxyUrlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProxyUrl> for String {
    fn from(url: ProxyUrl) -> Self {
        url.to_url_string()
    }
}

/// Redacted form, safe for logs.
impl fmt::Display for ProxyUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let auth = if self.credentials.is_some() { "***@" } else { "" };
        write!(f, "{}://{}{}", self.scheme.as_str(), auth, self.endpoint())
    }
}

impl fmt::Debug for ProxyUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProxyUrl({})", self)
    }
}
