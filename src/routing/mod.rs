//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Target host (from the client's CONNECT line)
//!     → resolver.rs (one snapshot: host → provider → key → key proxy)
//!     → plan.rs (system proxy + key proxy, outermost first)
//!     → Return: HopPlan (Direct, ViaSystemOnly, ViaKeyProxyOnly,
//!               ViaSystemThenKeyProxy)
//! ```
//!
//! # Design Decisions
//! - Plans are computed once per connection and never re-evaluated
//! - Deterministic: same snapshot and host always give the same plan
//! - The real target is always the innermost endpoint

pub mod plan;
pub mod resolver;

pub use plan::{HopPlan, KeyRoute, PlanKind};
pub use resolver::{resolve, Resolver};
