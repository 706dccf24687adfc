//! Backend process loader.
//!
//! # Responsibilities
//! - Start one backend server process per loaded model
//! - Translate spec attributes into command-line arguments
//! - Treat `upstream` models as externally managed (probe only)
//! - Stop owned processes on unload
//!
//! # Design Decisions
//! - Each process gets a fresh loopback port chosen by the OS
//! - Children are kill-on-drop, so an abandoned load leaves nothing behind
//! - Upstream probing gives up after a bounded number of attempts; owned
//!   processes are probed until they exit or the caller's deadline fires

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use url::Url;

use crate::config::BackendConfig;
use crate::loader::probe::ReadinessProbe;
use crate::loader::{parse_upstream, LoadError, ModelHandle, ModelLoader};
use crate::preset::{ModelSource, ModelSpec};

/// Loader that spawns backend servers or attaches to running ones.
pub struct ProcessLoader {
    config: BackendConfig,
    probe: ReadinessProbe,
    /// Owned children keyed by pid.
    children: Mutex<HashMap<u32, Child>>,
}

impl ProcessLoader {
    pub fn new(config: BackendConfig) -> Self {
        let probe = ReadinessProbe::new(&config);
        Self {
            config,
            probe,
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Arguments passed to the backend for `spec`, excluding host and port.
    pub fn backend_args(spec: &ModelSpec) -> Result<Vec<String>, LoadError> {
        let mut args = Vec::new();
        match &spec.source {
            Some(ModelSource::Local(path)) => {
                args.push("--model".to_string());
                args.push(path.clone());
            }
            Some(ModelSource::HuggingFace(repo)) => {
                args.push("--hf-repo".to_string());
                args.push(repo.clone());
            }
            Some(ModelSource::Upstream(_)) | None => {
                return Err(LoadError::InvalidSource(format!(
                    "model '{}' has no launchable source",
                    spec.name
                )))
            }
        }

        for (key, value) in spec.backend_args() {
            let flag = format!("--{}", key.replace('_', "-"));
            match value.trim().to_ascii_lowercase().as_str() {
                "true" => args.push(flag),
                "false" => {}
                _ => {
                    args.push(flag);
                    args.push(value.to_string());
                }
            }
        }
        Ok(args)
    }

    fn free_port(&self) -> Result<u16, LoadError> {
        let listener = std::net::TcpListener::bind((self.config.host.as_str(), 0)).map_err(|e| {
            LoadError::Spawn {
                command: self.config.command.clone(),
                source: e,
            }
        })?;
        let port = listener
            .local_addr()
            .map_err(|e| LoadError::Spawn {
                command: self.config.command.clone(),
                source: e,
            })?
            .port();
        Ok(port)
    }

    async fn wait_ready(
        &self,
        base: &Url,
        mut child: Option<&mut Child>,
        max_attempts: Option<u32>,
    ) -> Result<(), LoadError> {
        let url = self.probe.health_url(base);
        let mut attempt = 0u32;
        loop {
            if let Some(child) = child.as_deref_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(LoadError::Exited(status.to_string()));
                }
            }

            let reason = match self.probe.check(&url).await {
                Ok(()) => return Ok(()),
                Err(reason) => reason,
            };

            attempt += 1;
            if max_attempts.is_some_and(|max| attempt >= max) {
                return Err(LoadError::NotReady { url, reason });
            }
            tracing::trace!(url = %url, attempt, reason = %reason, "Backend not ready yet");
            tokio::time::sleep(self.probe.delay(attempt)).await;
        }
    }

    async fn spawn(&self, spec: &ModelSpec, revision: u64) -> Result<ModelHandle, LoadError> {
        let mut args = Self::backend_args(spec)?;
        let port = self.free_port()?;
        args.extend([
            "--host".to_string(),
            self.config.host.clone(),
            "--port".to_string(),
            port.to_string(),
        ]);

        let mut child = Command::new(&self.config.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LoadError::Spawn {
                command: self.config.command.clone(),
                source: e,
            })?;

        let pid = child.id();
        tracing::info!(model = %spec.name, revision, pid = ?pid, port, "Backend process started");

        let base_url = parse_upstream(&format!("{}:{}", self.config.host, port))?;
        self.wait_ready(&base_url, Some(&mut child), None).await?;

        let pid = pid.ok_or_else(|| LoadError::Exited("process has no pid".into()))?;
        self.children.lock().await.insert(pid, child);

        Ok(ModelHandle {
            name: spec.name.clone(),
            revision,
            base_url,
            pid: Some(pid),
        })
    }
}

#[async_trait]
impl ModelLoader for ProcessLoader {
    async fn load(&self, spec: &ModelSpec, revision: u64) -> Result<ModelHandle, LoadError> {
        match &spec.source {
            Some(ModelSource::Upstream(address)) => {
                let base_url = parse_upstream(address)?;
                self.wait_ready(&base_url, None, Some(self.config.upstream_probe_attempts.max(1)))
                    .await?;
                Ok(ModelHandle {
                    name: spec.name.clone(),
                    revision,
                    base_url,
                    pid: None,
                })
            }
            _ => self.spawn(spec, revision).await,
        }
    }

    async fn unload(&self, handle: &ModelHandle) -> Result<(), LoadError> {
        let Some(pid) = handle.pid else {
            return Ok(());
        };
        let child = self.children.lock().await.remove(&pid);
        match child {
            Some(mut child) => {
                child
                    .kill()
                    .await
                    .map_err(|e| LoadError::Unload(format!("pid {}: {}", pid, e)))?;
                tracing::info!(model = %handle.name, pid, "Backend process stopped");
                Ok(())
            }
            None => Ok(()),
        }
    }
}
