//! Per-key egress router.
//!
//! A loopback-only CONNECT proxy that sends each tunnel through zero, one, or
//! two upstream proxies, chosen from the target host and the API key that is
//! currently active for the provider owning that host.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod server;
pub mod upstream;

pub use config::{RoutingConfig, RoutingStore, Settings};
pub use error::ProxyError;
pub use routing::{HopPlan, PlanKind};
pub use server::{EgressRouter, RouterHandle, StartError};
pub use upstream::{Endpoint, ProxyUrl};
