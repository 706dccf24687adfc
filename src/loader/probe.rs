//! Backend readiness probing.
//!
//! # Responsibilities
//! - Issue `GET {base}{health_path}` against a backend
//! - Retry with jittered exponential backoff until ready
//!
//! # Design Decisions
//! - Only 2xx counts as ready; a 503 while weights load is "not yet"
//! - Each probe has its own short timeout so a stalled socket cannot hang a load

use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time;

use crate::config::BackendConfig;
use crate::resilience::backoff::calculate_backoff;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Polls backend health endpoints.
#[derive(Clone)]
pub struct ReadinessProbe {
    client: Client<HttpConnector, Body>,
    path: String,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl ReadinessProbe {
    pub fn new(config: &BackendConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            path: config.health_path.clone(),
            base_delay_ms: config.probe_interval_ms,
            max_delay_ms: config.probe_max_delay_ms,
        }
    }

    /// Probe once; `Err` carries a human readable reason.
    pub async fn check(&self, url: &str) -> Result<(), String> {
        let request = Request::builder()
            .method("GET")
            .uri(url)
            .header("user-agent", "model-router-probe")
            .body(Body::empty())
            .map_err(|e| format!("invalid probe request: {}", e))?;

        match time::timeout(PROBE_TIMEOUT, self.client.request(request)).await {
            Ok(Ok(response)) if response.status().is_success() => Ok(()),
            Ok(Ok(response)) => Err(format!("status {}", response.status())),
            Ok(Err(e)) => Err(format!("connection error: {}", e)),
            Err(_) => Err("probe timed out".to_string()),
        }
    }

    /// Health URL under `base`.
    pub fn health_url(&self, base: &url::Url) -> String {
        format!("{}{}", base.as_str().trim_end_matches('/'), self.path)
    }

    /// Delay before probe attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms)
    }
}
