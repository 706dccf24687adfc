//! Model lifecycle: load, unload and resolve-for-use.
//!
//! # Responsibilities
//! - Move entries through `unloaded → loading → loaded | error`
//! - Run loader calls outside the registry lock, under a deadline
//! - Accept a load completion only for the revision it was started against
//! - Hand callers a handle for the current revision, waiting on in-flight loads
//!
//! # Design Decisions
//! - Marking `loading` and committing the result are two short commits;
//!   the loader call between them holds no lock
//! - A stale completion is released immediately, never published
//! - Concurrent callers share one load: only the first starts it, the rest wait
//! - Loads run in their own task, so a caller that goes away only abandons
//!   its wait

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::loader::{LoadError, ModelHandle, ModelLoader};
use crate::observability::metrics;
use crate::preset::ModelSpec;
use crate::registry::{ModelStatus, Registry, Slot, Txn};
use crate::resilience::timeouts::with_deadline;

/// Why a model could not be handed out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("model '{0}' not found")]
    UnknownModel(String),

    #[error("model '{0}' has been removed from the configuration")]
    NotConfigured(String),

    #[error("model '{name}' is misconfigured: {reason}")]
    InvalidSpec { name: String, reason: String },

    #[error("model '{0}' is not loaded and on-demand loading is disabled")]
    NotLoaded(String),

    #[error("model '{name}' failed to load: {reason}")]
    LoadFailed { name: String, reason: String },

    #[error("model '{name}' did not become ready within {limit:?}")]
    Timeout { name: String, limit: Duration },
}

/// Loading policy shared by the reconciler and request paths.
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Let resolve-for-use start loads.
    pub on_demand: bool,
    /// Default load deadline; a spec's `load_timeout` overrides it.
    pub load_timeout: Duration,
    pub unload_timeout: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            on_demand: true,
            load_timeout: Duration::from_secs(120),
            unload_timeout: Duration::from_secs(30),
        }
    }
}

/// A load that has been marked `loading` and must now be run.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    pub name: String,
    pub revision: u64,
    pub spec: ModelSpec,
}

impl LoadTicket {
    /// Mark `slot` as loading and capture what the load needs.
    pub(crate) fn issue(slot: &mut Slot) -> Self {
        slot.set_status(ModelStatus::Loading);
        slot.entry.last_error = None;
        Self {
            name: slot.entry.name.clone(),
            revision: slot.entry.revision,
            spec: slot.entry.spec.clone(),
        }
    }
}

enum LoadOutcome {
    Loaded(Arc<ModelHandle>),
    Failed(String),
    Superseded,
}

enum Step {
    Ready(Arc<ModelHandle>),
    Start(LoadTicket),
    Wait(u64),
    Failed(String),
}

/// Drives model loads and unloads against the registry.
pub struct ModelLifecycle {
    registry: Arc<Registry>,
    loader: Arc<dyn ModelLoader>,
    options: LifecycleOptions,
}

impl ModelLifecycle {
    pub fn new(
        registry: Arc<Registry>,
        loader: Arc<dyn ModelLoader>,
        options: LifecycleOptions,
    ) -> Self {
        Self {
            registry,
            loader,
            options,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn options(&self) -> &LifecycleOptions {
        &self.options
    }

    fn load_timeout(&self, spec: &ModelSpec) -> Duration {
        spec.options
            .load_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.options.load_timeout)
    }

    /// Resolve-for-use: a handle for `name`, loading it on demand if allowed.
    pub async fn resolve(self: &Arc<Self>, name: &str) -> Result<Arc<ModelHandle>, ResolveError> {
        self.acquire(name, self.options.on_demand).await
    }

    /// Explicit load, regardless of the on-demand setting.
    pub async fn load(self: &Arc<Self>, name: &str) -> Result<Arc<ModelHandle>, ResolveError> {
        self.acquire(name, true).await
    }

    async fn acquire(
        self: &Arc<Self>,
        name: &str,
        may_load: bool,
    ) -> Result<Arc<ModelHandle>, ResolveError> {
        let mut settled = false;
        loop {
            let step = self
                .registry
                .commit(|txn| Self::plan(txn, name, may_load, settled))?;

            match step {
                Step::Ready(handle) => return Ok(handle),
                Step::Failed(reason) => {
                    return Err(ResolveError::LoadFailed {
                        name: name.to_string(),
                        reason,
                    })
                }
                Step::Start(ticket) => {
                    settled = true;
                    // The load outlives this caller; dropping the wait must not
                    // strand the entry in `loading`.
                    let this = Arc::clone(self);
                    let load = tokio::spawn(async move { this.run_load(ticket).await });
                    match load.await {
                        Ok(LoadOutcome::Loaded(handle)) => return Ok(handle),
                        Ok(LoadOutcome::Failed(reason)) => {
                            return Err(ResolveError::LoadFailed {
                                name: name.to_string(),
                                reason,
                            })
                        }
                        Ok(LoadOutcome::Superseded) => continue,
                        Err(err) => {
                            return Err(ResolveError::LoadFailed {
                                name: name.to_string(),
                                reason: err.to_string(),
                            })
                        }
                    }
                }
                Step::Wait(revision) => {
                    settled = true;
                    let limit = self
                        .registry
                        .get(name)
                        .map(|e| self.load_timeout(&e.spec))
                        .unwrap_or(self.options.load_timeout)
                        + self.options.unload_timeout;
                    let waited = tokio::time::timeout(
                        limit,
                        self.registry.wait_for(name, |e| {
                            e.status != ModelStatus::Loading || e.revision != revision
                        }),
                    )
                    .await;
                    match waited {
                        Ok(Some(_)) => continue,
                        Ok(None) => return Err(ResolveError::UnknownModel(name.to_string())),
                        Err(_) => {
                            return Err(ResolveError::Timeout {
                                name: name.to_string(),
                                limit,
                            })
                        }
                    }
                }
            }
        }
    }

    /// Decide the next step for `acquire` under the registry lock.
    ///
    /// `settled` is set once the caller has started or waited on a load, so a
    /// failure is reported instead of retried in a loop.
    fn plan(
        txn: &mut Txn<'_>,
        name: &str,
        may_load: bool,
        settled: bool,
    ) -> Result<Step, ResolveError> {
        let entry = txn
            .get(name)
            .ok_or_else(|| ResolveError::UnknownModel(name.to_string()))?;

        if !entry.in_config {
            return Err(ResolveError::NotConfigured(name.to_string()));
        }
        if entry.invalid {
            return Err(ResolveError::InvalidSpec {
                name: name.to_string(),
                reason: entry.last_error.clone().unwrap_or_default(),
            });
        }

        let (status, revision) = (entry.status, entry.revision);
        let last_error = entry.last_error.clone();

        match status {
            ModelStatus::Loaded => match txn.handle(name) {
                Some(handle) => Ok(Step::Ready(handle.clone())),
                None => Ok(Step::Failed("loaded entry has no handle".into())),
            },
            ModelStatus::Loading => Ok(Step::Wait(revision)),
            ModelStatus::Unloaded | ModelStatus::Error if settled => Ok(Step::Failed(
                last_error.unwrap_or_else(|| "model was unloaded while loading".to_string()),
            )),
            ModelStatus::Unloaded | ModelStatus::Error if !may_load => {
                Err(ResolveError::NotLoaded(name.to_string()))
            }
            ModelStatus::Unloaded | ModelStatus::Error => {
                let slot = txn
                    .slot_mut(name)
                    .ok_or_else(|| ResolveError::UnknownModel(name.to_string()))?;
                Ok(Step::Start(LoadTicket::issue(slot)))
            }
        }
    }

    /// Start `ticket` in the background.
    pub fn spawn_load(self: &Arc<Self>, ticket: LoadTicket) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            this.run_load(ticket).await;
        })
    }

    /// Run the loader for `ticket` and commit the result if still current.
    async fn run_load(&self, ticket: LoadTicket) -> LoadOutcome {
        let limit = self.load_timeout(&ticket.spec);
        let started = Instant::now();
        tracing::info!(model = %ticket.name, revision = ticket.revision, "Loading model");

        let result = with_deadline(
            limit,
            self.loader.load(&ticket.spec, ticket.revision),
            LoadError::Timeout,
        )
        .await;

        match result {
            Ok(handle) => {
                let handle = Arc::new(handle);
                let accepted = self.registry.commit(|txn| {
                    if !Self::is_current(txn, &ticket) {
                        return false;
                    }
                    match txn.slot_mut(&ticket.name) {
                        Some(slot) => {
                            slot.set_status(ModelStatus::Loaded);
                            slot.handle = Some(handle.clone());
                            slot.entry.last_error = None;
                            true
                        }
                        None => false,
                    }
                });

                if accepted {
                    metrics::record_load("loaded", started.elapsed());
                    tracing::info!(
                        model = %ticket.name,
                        revision = ticket.revision,
                        url = %handle.base_url,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Model loaded"
                    );
                    LoadOutcome::Loaded(handle)
                } else {
                    metrics::record_load("superseded", started.elapsed());
                    tracing::info!(
                        model = %ticket.name,
                        revision = ticket.revision,
                        "Discarding load completion for superseded revision"
                    );
                    self.release(&handle).await;
                    LoadOutcome::Superseded
                }
            }
            Err(err) => {
                let reason = err.to_string();
                let recorded = self.registry.commit(|txn| {
                    if !Self::is_current(txn, &ticket) {
                        return false;
                    }
                    match txn.slot_mut(&ticket.name) {
                        Some(slot) => {
                            slot.set_status(ModelStatus::Error);
                            slot.entry.last_error = Some(reason.clone());
                            true
                        }
                        None => false,
                    }
                });

                metrics::record_load("failed", started.elapsed());
                if recorded {
                    tracing::warn!(
                        model = %ticket.name,
                        revision = ticket.revision,
                        error = %reason,
                        "Model failed to load"
                    );
                    LoadOutcome::Failed(reason)
                } else {
                    LoadOutcome::Superseded
                }
            }
        }
    }

    fn is_current(txn: &Txn<'_>, ticket: &LoadTicket) -> bool {
        txn.get(&ticket.name)
            .is_some_and(|e| e.revision == ticket.revision && e.status == ModelStatus::Loading)
    }

    /// Stop the instance behind `handle`, bounded by the unload deadline.
    pub async fn release(&self, handle: &ModelHandle) -> bool {
        let result = with_deadline(
            self.options.unload_timeout,
            self.loader.unload(handle),
            LoadError::Timeout,
        )
        .await;
        match result {
            Ok(()) => {
                tracing::info!(model = %handle.name, revision = handle.revision, "Model unloaded");
                true
            }
            Err(err) => {
                tracing::warn!(model = %handle.name, error = %err, "Failed to unload model");
                false
            }
        }
    }

    /// Release several handles concurrently; returns the names that failed.
    pub async fn release_all(&self, handles: Vec<Arc<ModelHandle>>) -> Vec<String> {
        let results = join_all(handles.iter().map(|h| self.release(h))).await;
        handles
            .iter()
            .zip(results)
            .filter(|(_, ok)| !ok)
            .map(|(h, _)| h.name.clone())
            .collect()
    }

    /// Explicit unload. Returns `true` if an instance was stopped.
    ///
    /// An in-flight load is cancelled by bumping the revision, so its
    /// completion is discarded.
    pub async fn unload(&self, name: &str) -> Result<bool, ResolveError> {
        let handle = self.registry.commit(|txn| {
            let status = txn
                .get(name)
                .map(|e| e.status)
                .ok_or_else(|| ResolveError::UnknownModel(name.to_string()))?;
            if status == ModelStatus::Unloaded {
                return Ok(None);
            }
            let slot = txn
                .slot_mut(name)
                .ok_or_else(|| ResolveError::UnknownModel(name.to_string()))?;
            let handle = slot.take_handle();
            if status == ModelStatus::Loading {
                slot.entry.revision += 1;
            }
            slot.set_status(ModelStatus::Unloaded);
            Ok(handle)
        })?;

        match handle {
            Some(handle) => {
                self.release(&handle).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Unload every running instance (shutdown).
    pub async fn unload_all(&self) -> usize {
        let handles = self.registry.commit(|txn| {
            let mut handles = Vec::new();
            for name in txn.names() {
                let status = txn.get(&name).map(|e| e.status);
                if !matches!(status, Some(ModelStatus::Loaded | ModelStatus::Loading)) {
                    continue;
                }
                if let Some(slot) = txn.slot_mut(&name) {
                    handles.extend(slot.take_handle());
                    if slot.entry.status == ModelStatus::Loading {
                        slot.entry.revision += 1;
                        slot.set_status(ModelStatus::Unloaded);
                    }
                }
            }
            handles
        });
        let count = handles.len();
        self.release_all(handles).await;
        count
    }
}
