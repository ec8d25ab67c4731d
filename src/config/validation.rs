//! Settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, header bound large enough)
//! - Reject unknown log formats
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Settings → Result<(), Vec<ValidationError>>
//! - The routing table is validated by its own deserializer; a bad proxy URL
//!   fails the whole document

use std::fmt;

use crate::config::schema::Settings;

/// Smallest accepted header bound; a bare CONNECT line needs well under this.
pub const MIN_HEADER_BYTES: usize = 256;

/// A single semantic problem with the settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check settings for values that would make the router unusable.
pub fn validate_settings(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.listener.max_connections == 0 {
        errors.push(ValidationError {
            field: "listener.max_connections",
            message: "must be greater than 0".to_string(),
        });
    }

    if settings.listener.max_header_bytes < MIN_HEADER_BYTES {
        errors.push(ValidationError {
            field: "listener.max_header_bytes",
            message: format!("must be at least {}", MIN_HEADER_BYTES),
        });
    }

    if settings.routing.path.trim().is_empty() {
        errors.push(ValidationError {
            field: "routing.path",
            message: "must not be empty".to_string(),
        });
    }

    match settings.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError {
            field: "observability.log_format",
            message: format!("unknown format '{}', expected 'pretty' or 'json'", other),
        }),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
