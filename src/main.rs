//! Per-key egress router (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                   EGRESS ROUTER                       │
//!   local client      │  ┌──────────┐   ┌──────────┐   ┌────────────────┐    │
//!   CONNECT h:p ──────┼─▶│   net    │──▶│ routing  │──▶│   upstream     │────┼──▶ system proxy
//!                     │  │ listener │   │ resolver │   │ chain (http /  │    │     → key proxy
//!                     │  └──────────┘   └────▲─────┘   │ socks5 hops)   │    │       → target
//!                     │       │              │         └───────┬────────┘    │
//!   ◀── 200 + tunnel ─┼───────┴──── tunnel ◀─┼─────────────────┘             │
//!                     │                      │                               │
//!                     │  ┌───────────────────┴─────────┐                     │
//!                     │  │ config store (ArcSwap) ◀────┼── routing.json      │
//!                     │  │   + watcher (notify)        │   (hot reload)      │
//!                     │  └─────────────────────────────┘                     │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use egress_router::lifecycle::signals::wait_for_termination;
use egress_router::lifecycle::startup::{log_effective_settings, resolve_settings, Overrides};
use egress_router::observability::logging::init_logging;
use egress_router::EgressRouter;

#[derive(Parser, Debug)]
#[command(name = "egress-router")]
#[command(about = "Loopback CONNECT proxy routing each API key through its own upstream", long_about = None)]
struct Args {
    /// Settings file (TOML). Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Routing table (JSON), overrides `routing.path`.
    #[arg(short, long)]
    routing: Option<String>,

    /// Loopback port, overrides `listener.port`.
    #[arg(short, long)]
    port: Option<u16>,

    /// Log filter, overrides `observability.log_level`.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let settings = resolve_settings(
        args.config.as_deref(),
        Overrides {
            routing_path: args.routing,
            port: args.port,
            log_level: args.log_level,
        },
    )?;

    init_logging(&settings.observability)?;
    tracing::info!("egress-router v{} starting", env!("CARGO_PKG_VERSION"));
    log_effective_settings(&settings);

    let router = EgressRouter::new(settings)
        .with_reload_observer(|config| {
            tracing::info!(
                ts = ?config.ts,
                domains = config.domain_to_provider.len(),
                keys = config.active_keys.len(),
                "Routing policy updated"
            );
        })
        .start()
        .await?;

    tracing::info!(address = %router.local_addr(), "Listening for connections");

    wait_for_termination().await;
    router.stop().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
