//! Metrics emission.
//!
//! # Metrics
//! - `egress_connections_total` (counter): accepted CONNECT requests by plan
//! - `egress_connection_errors_total` (counter): failed connections by kind
//! - `egress_config_reloads_total` (counter): reload attempts by outcome
//! - `egress_active_tunnels` (gauge): tunnels currently established
//!
//! # Design Decisions
//! - Only the `metrics` facade is used; the embedding application installs
//!   a recorder/exporter if it wants one
//! - Labels are low-cardinality (plan kind, error kind), never hosts or keys

use crate::routing::PlanKind;

pub fn record_connection(plan: PlanKind) {
    metrics::counter!("egress_connections_total", "plan" => plan.as_str()).increment(1);
}

pub fn record_error(kind: &'static str) {
    metrics::counter!("egress_connection_errors_total", "kind" => kind).increment(1);
}

pub fn record_reload(outcome: &'static str) {
    metrics::counter!("egress_config_reloads_total", "outcome" => outcome).increment(1);
}
