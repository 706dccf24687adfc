//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals and timeouts > 0, addresses parse)
//! - Refuse an admin API guarded by the placeholder key
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{AdminConfig, RouterConfig};

/// One problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every problem.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be greater than 0"));
    }

    let models = &config.models;
    if models.preset.trim().is_empty() {
        errors.push(ValidationError::new("models.preset", "must not be empty"));
    }
    if models.watch && models.watch_interval_secs == 0 {
        errors.push(ValidationError::new(
            "models.watch_interval_secs",
            "must be greater than 0 when watching",
        ));
    }
    if models.load_timeout_secs == 0 {
        errors.push(ValidationError::new("models.load_timeout_secs", "must be greater than 0"));
    }
    if models.unload_timeout_secs == 0 {
        errors.push(ValidationError::new("models.unload_timeout_secs", "must be greater than 0"));
    }

    if config.backend.command.trim().is_empty() {
        errors.push(ValidationError::new("backend.command", "must not be empty"));
    }
    if !config.backend.health_path.starts_with('/') {
        errors.push(ValidationError::new("backend.health_path", "must start with '/'"));
    }
    if config.backend.probe_max_delay_ms < config.backend.probe_interval_ms {
        errors.push(ValidationError::new(
            "backend.probe_max_delay_ms",
            "must not be smaller than probe_interval_ms",
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.admin.enabled
        && (config.admin.api_key.is_empty() || config.admin.api_key == AdminConfig::default().api_key)
    {
        errors.push(ValidationError::new(
            "admin.api_key",
            "must be set to a non-placeholder value when admin is enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
