//! Configuration schema definitions.
//!
//! This module defines the process configuration of the router. It is read
//! once at startup; the model fleet itself lives in the preset file named by
//! `models.preset` and is reloaded separately.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the model router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Listener configuration (bind address, body limits).
    pub listener: ListenerConfig,

    /// Model fleet: preset location, watching and loading policy.
    pub models: ModelsConfig,

    /// How backend instances are launched and probed.
    pub backend: BackendConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request body accepted for inference calls.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Model fleet configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Path of the preset file declaring the fleet.
    pub preset: String,

    /// Re-read the preset periodically.
    pub watch: bool,

    /// Poll interval in seconds.
    pub watch_interval_secs: u64,

    /// Load newly declared or changed entries immediately.
    pub autoload: bool,

    /// Allow inference requests to load an unloaded model.
    pub on_demand: bool,

    /// Default deadline for one load, in seconds.
    pub load_timeout_secs: u64,

    /// Deadline for one unload, in seconds.
    pub unload_timeout_secs: u64,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            preset: "models.ini".to_string(),
            watch: true,
            watch_interval_secs: 5,
            autoload: false,
            on_demand: true,
            load_timeout_secs: 120,
            unload_timeout_secs: 30,
        }
    }
}

impl ModelsConfig {
    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn unload_timeout(&self) -> Duration {
        Duration::from_secs(self.unload_timeout_secs)
    }
}

/// Backend process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Server executable started for `model` / `hf_repo` entries.
    pub command: String,

    /// Interface backends bind to.
    pub host: String,

    /// Readiness endpoint on every backend.
    pub health_path: String,

    /// First delay between readiness probes, in milliseconds.
    pub probe_interval_ms: u64,

    /// Largest delay between readiness probes, in milliseconds.
    pub probe_max_delay_ms: u64,

    /// Probes against an `upstream` backend before giving up.
    pub upstream_probe_attempts: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: "llama-server".to_string(),
            host: "127.0.0.1".to_string(),
            health_path: "/health".to_string(),
            probe_interval_ms: 250,
            probe_max_delay_ms: 2000,
            upstream_probe_attempts: 10,
        }
    }
}

/// Timeout configuration for proxied requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 600 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
