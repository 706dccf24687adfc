//! Model loading subsystem.
//!
//! # Data Flow
//! ```text
//! ModelSpec + revision
//!     → ModelLoader::load
//!         - upstream source: probe the running backend until ready
//!         - model / hf_repo source: spawn backend process, then probe
//!     → ModelHandle (base URL, pid)
//!
//! ModelHandle
//!     → ModelLoader::unload (kill process, wait for exit)
//! ```
//!
//! # Design Decisions
//! - Loaders never touch the registry; the lifecycle commits their results
//! - Loads are cancellable by dropping the future (children are kill-on-drop)
//! - Deadlines are imposed by the caller, not the loader

pub mod probe;
pub mod process;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::preset::ModelSpec;

pub use process::ProcessLoader;

/// A running model instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelHandle {
    pub name: String,
    /// Revision of the spec this instance was started from.
    pub revision: u64,
    pub base_url: Url,
    /// Process id when the router owns the backend process.
    pub pid: Option<u32>,
}

impl ModelHandle {
    /// Absolute URL for a path (with optional query) on this backend.
    pub fn url_for(&self, path_and_query: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        if path_and_query.starts_with('/') {
            format!("{}{}", base, path_and_query)
        } else {
            format!("{}/{}", base, path_and_query)
        }
    }
}

/// Runtime failure starting or stopping a model.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid model source: {0}")]
    InvalidSource(String),

    #[error("failed to start backend '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backend exited before becoming ready ({0})")]
    Exited(String),

    #[error("backend at {url} not ready: {reason}")]
    NotReady { url: String, reason: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to stop backend: {0}")]
    Unload(String),
}

/// Starts and stops model instances.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Start an instance for `spec` and wait until it can serve requests.
    async fn load(&self, spec: &ModelSpec, revision: u64) -> Result<ModelHandle, LoadError>;

    /// Release the resources behind `handle`.
    async fn unload(&self, handle: &ModelHandle) -> Result<(), LoadError>;
}

/// Parse an upstream address (`host:port` or a full URL).
pub fn parse_upstream(address: &str) -> Result<Url, LoadError> {
    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };
    let url = Url::parse(&candidate)
        .map_err(|e| LoadError::InvalidSource(format!("'{}': {}", address, e)))?;
    if url.host_str().is_none() {
        return Err(LoadError::InvalidSource(format!("'{}': missing host", address)));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upstream() {
        let url = parse_upstream("127.0.0.1:8081").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8081/");
        let url = parse_upstream("http://backend.local:9000/base").unwrap();
        assert_eq!(url.host_str(), Some("backend.local"));
        assert!(parse_upstream("http://").is_err());
    }

    #[test]
    fn test_url_for() {
        let handle = ModelHandle {
            name: "a".into(),
            revision: 1,
            base_url: parse_upstream("127.0.0.1:8081").unwrap(),
            pid: None,
        };
        assert_eq!(handle.url_for("/v1/chat/completions"), "http://127.0.0.1:8081/v1/chat/completions");
        assert_eq!(handle.url_for("health"), "http://127.0.0.1:8081/health");
    }
}
