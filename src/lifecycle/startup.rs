//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate settings (file, then command-line overrides)
//! - Log the effective configuration before anything binds
//!
//! # Design Decisions
//! - Fail fast: bad settings are fatal, a bad routing table is not
//! - The listener starts last (traffic only when ready)

use std::path::Path;

use crate::config::validation::validate_settings;
use crate::config::{load_settings, ConfigError, Settings};

/// Overrides supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub routing_path: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

/// Resolve the effective settings.
///
/// Without a settings file the defaults are used; overrides apply on top and
/// the result is validated again.
pub fn resolve_settings(path: Option<&Path>, overrides: Overrides) -> Result<Settings, ConfigError> {
    let mut settings = match path {
        Some(path) => load_settings(path)?,
        None => Settings::default(),
    };

    if let Some(routing_path) = overrides.routing_path {
        settings.routing.path = routing_path;
    }
    if let Some(port) = overrides.port {
        settings.listener.port = port;
    }
    if let Some(level) = overrides.log_level {
        settings.observability.log_level = level;
    }

    validate_settings(&settings).map_err(ConfigError::Validation)?;
    Ok(settings)
}

/// Log the settings the router is about to run with.
pub fn log_effective_settings(settings: &Settings) {
    tracing::info!(
        port = settings.listener.port,
        max_connections = settings.listener.max_connections,
        max_header_bytes = settings.listener.max_header_bytes,
        routing_path = %settings.routing.path,
        watch = settings.routing.watch,
        header_timeout_secs = settings.timeouts.header_secs,
        connect_timeout_secs = settings.timeouts.connect_secs,
        handshake_timeout_secs = settings.timeouts.handshake_secs,
        "Configuration loaded"
    );
}
