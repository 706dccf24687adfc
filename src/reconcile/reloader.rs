//! Preset reload: read the source, detect change, hand the result to the reconciler.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::observability::metrics;
use crate::preset::{desired_set_from_bytes, Fingerprint, PresetError, PresetSource};
use crate::reconcile::{ReconcileReport, Reconciler};

/// Result of one reload check.
#[derive(Debug)]
pub enum ReloadOutcome {
    /// Fingerprint matches the last observed content.
    Unchanged,
    /// New content was parsed and reconciled.
    Applied(ReconcileReport),
    /// New content was rejected; the previous configuration stays in effect.
    Rejected(PresetError),
    /// The source could not be read; retried on the next check.
    SourceUnavailable(String),
}

/// Connects a [`PresetSource`] to a [`Reconciler`].
pub struct Reloader {
    source: Arc<dyn PresetSource>,
    reconciler: Arc<Reconciler>,
    last: Mutex<Option<Fingerprint>>,
}

impl Reloader {
    pub fn new(source: Arc<dyn PresetSource>, reconciler: Arc<Reconciler>) -> Self {
        Self {
            source,
            reconciler,
            last: Mutex::new(None),
        }
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    /// Read the source and reconcile if its content changed.
    ///
    /// `force` reconciles even when the fingerprint is unchanged. Rejected
    /// content is remembered, so it is reported once rather than every tick.
    pub async fn check(&self, force: bool) -> ReloadOutcome {
        let mut last = self.last.lock().await;
        let started = Instant::now();

        let content = match self.source.read().await {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(
                    source = %self.source.describe(),
                    error = %err,
                    "Failed to read model preset; keeping current configuration"
                );
                metrics::record_pass("source_error", started.elapsed());
                return ReloadOutcome::SourceUnavailable(err.to_string());
            }
        };

        if !force && last.as_ref() == Some(&content.fingerprint) {
            return ReloadOutcome::Unchanged;
        }
        if last.is_some() {
            tracing::info!(
                source = %self.source.describe(),
                fingerprint = %content.fingerprint.short(),
                forced = force,
                "Model preset change detected"
            );
        }
        *last = Some(content.fingerprint.clone());

        match desired_set_from_bytes(&content.bytes) {
            Ok(desired) => ReloadOutcome::Applied(self.reconciler.reconcile(desired).await),
            Err(err) => {
                tracing::error!(
                    source = %self.source.describe(),
                    error = %err,
                    "Rejected model preset; keeping current configuration"
                );
                metrics::record_pass("rejected", started.elapsed());
                ReloadOutcome::Rejected(err)
            }
        }
    }

    /// First load at startup. Any failure is fatal here.
    pub async fn initial(&self) -> Result<ReconcileReport, InitialLoadError> {
        match self.check(true).await {
            ReloadOutcome::Applied(report) => Ok(report),
            ReloadOutcome::Rejected(err) => Err(InitialLoadError::Rejected(err)),
            ReloadOutcome::SourceUnavailable(reason) => Err(InitialLoadError::Unavailable(reason)),
            ReloadOutcome::Unchanged => Ok(ReconcileReport::default()),
        }
    }
}

/// Why the startup load failed.
#[derive(Debug, thiserror::Error)]
pub enum InitialLoadError {
    #[error("model preset rejected: {0}")]
    Rejected(PresetError),
    #[error("{0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::lifecycle::models::testing::FakeLoader;
    use crate::lifecycle::models::{LifecycleOptions, ModelLifecycle};
    use crate::preset::{FileSource, MemorySource};
    use crate::registry::{ModelStatus, Registry};

    fn reloader(source: Arc<dyn PresetSource>) -> (Arc<Registry>, Reloader) {
        let registry = Arc::new(Registry::new());
        let lifecycle = Arc::new(ModelLifecycle::new(
            registry.clone(),
            Arc::new(FakeLoader::default()),
            LifecycleOptions {
                load_timeout: Duration::from_secs(5),
                ..LifecycleOptions::default()
            },
        ));
        let reconciler = Arc::new(Reconciler::new(lifecycle, false));
        (registry, Reloader::new(source, reconciler))
    }

    #[tokio::test]
    async fn test_unchanged_content_skips_reconcile() {
        let source = Arc::new(MemorySource::new("[a]\nhf_repo = org/a\n"));
        let (_, reloader) = reloader(source.clone());

        assert!(matches!(reloader.check(false).await, ReloadOutcome::Applied(_)));
        assert!(matches!(reloader.check(false).await, ReloadOutcome::Unchanged));
        assert_eq!(reloader.reconciler().passes(), 1);

        // A forced check reconciles even without a change.
        assert!(matches!(reloader.check(true).await, ReloadOutcome::Applied(ref r) if r.is_noop()));
    }

    #[tokio::test]
    async fn test_rejected_content_keeps_previous_state() {
        let source = Arc::new(MemorySource::new("[a]\nhf_repo = org/a\n"));
        let (registry, reloader) = reloader(source.clone());
        reloader.check(false).await;
        let generation = registry.generation();

        source.set("[a]\nhf_repo = org/a\n[a]\n");
        assert!(matches!(
            reloader.check(false).await,
            ReloadOutcome::Rejected(PresetError::Parse(_))
        ));
        // Reported once, then treated as seen.
        assert!(matches!(reloader.check(false).await, ReloadOutcome::Unchanged));

        assert_eq!(registry.generation(), generation);
        let a = registry.get("a").unwrap();
        assert_eq!(a.status, ModelStatus::Unloaded);
        assert!(a.in_config);

        // A later valid edit is applied against the last good set.
        source.set("[a]\nhf_repo = org/a\n\n[b]\nhf_repo = org/b\n");
        match reloader.check(false).await {
            ReloadOutcome::Applied(report) => assert_eq!(report.added, vec!["b"]),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_undecodable_file_is_rejected_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.ini");
        std::fs::write(&path, "[a]\nmodel = /models/a.gguf\n").unwrap();
        let (registry, reloader) = reloader(Arc::new(FileSource::new(&path)));
        assert!(matches!(reloader.check(false).await, ReloadOutcome::Applied(_)));
        let generation = registry.generation();

        std::fs::write(&path, b"[a]\nmodel = /models/\xff.gguf\n").unwrap();
        assert!(matches!(
            reloader.check(false).await,
            ReloadOutcome::Rejected(PresetError::Encoding(_))
        ));
        assert!(matches!(reloader.check(false).await, ReloadOutcome::Unchanged));
        assert_eq!(registry.generation(), generation);

        std::fs::write(&path, "[a]\nmodel = /models/b.gguf\n").unwrap();
        match reloader.check(false).await {
            ReloadOutcome::Applied(report) => assert_eq!(report.changed, vec!["a"]),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_reported_and_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.ini");
        let (registry, reloader) = reloader(Arc::new(FileSource::new(&path)));

        assert!(matches!(
            reloader.check(false).await,
            ReloadOutcome::SourceUnavailable(_)
        ));
        assert!(reloader.initial().await.is_err());

        std::fs::write(&path, "[a]\nmodel = /models/a.gguf\n").unwrap();
        assert!(matches!(reloader.check(false).await, ReloadOutcome::Applied(_)));
        assert!(registry.get("a").is_some());
    }
}
