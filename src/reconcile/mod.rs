//! Reconciliation: converge the registry onto a new Desired Set.
//!
//! # Data Flow
//! ```text
//! Reloader::check (source → fingerprint → parse/validate)
//!     → Reconciler::reconcile(desired)
//!         → Diff::compute(previous, desired)
//!         → one registry commit (bookkeeping, detach handles, issue tickets)
//!         → unload detached handles (concurrently, bounded)
//!         → spawn load tickets (background, bounded)
//! ```
//!
//! # Design Decisions
//! - Passes are serialized; a pass never overlaps another
//! - All registry mutation of a pass happens in one commit, so readers see
//!   either the whole pass or none of it
//! - Loads run in the background; a slow model never holds up the next pass
//! - Entries are never deleted: removal flips `in_config` and unloads

pub mod diff;
pub mod reloader;
pub mod watcher;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::lifecycle::models::{LoadTicket, ModelLifecycle};
use crate::loader::ModelHandle;
use crate::observability::metrics;
use crate::preset::{DesiredEntry, DesiredSet};
use crate::registry::{ModelStatus, Txn};

pub use diff::Diff;
pub use reloader::{ReloadOutcome, Reloader};
pub use watcher::Watcher;

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    pub unchanged: usize,
    /// Entries in the applied set that failed validation.
    pub invalid: Vec<String>,
    pub loads_started: Vec<String>,
    pub unloaded: Vec<String>,
    pub unload_failures: Vec<String>,
    pub generation: u64,
    pub duration_ms: u64,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

#[derive(Default)]
struct ApplyPlan {
    unloads: Vec<Arc<ModelHandle>>,
    loads: Vec<LoadTicket>,
}

/// Applies Desired Sets to the registry.
pub struct Reconciler {
    lifecycle: Arc<ModelLifecycle>,
    autoload: bool,
    current: Mutex<DesiredSet>,
    passes: AtomicU64,
}

impl Reconciler {
    /// `autoload` starts loads for new entries that do not say otherwise.
    pub fn new(lifecycle: Arc<ModelLifecycle>, autoload: bool) -> Self {
        Self {
            lifecycle,
            autoload,
            current: Mutex::new(DesiredSet::new()),
            passes: AtomicU64::new(0),
        }
    }

    pub fn lifecycle(&self) -> &Arc<ModelLifecycle> {
        &self.lifecycle
    }

    /// Number of completed passes, including no-op passes.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// The Desired Set applied by the last pass.
    pub async fn desired(&self) -> DesiredSet {
        self.current.lock().await.clone()
    }

    fn wants_eager_load(&self, entry: &DesiredEntry) -> bool {
        entry.is_valid() && entry.spec.options.load_on_startup.unwrap_or(self.autoload)
    }

    /// Run one pass against `desired`.
    pub async fn reconcile(&self, desired: DesiredSet) -> ReconcileReport {
        let started = Instant::now();
        let mut current = self.current.lock().await;
        let diff = Diff::compute(&current, &desired);
        let registry = self.lifecycle.registry();

        let mut report = ReconcileReport {
            added: diff.added.clone(),
            removed: diff.removed.clone(),
            changed: diff.changed.clone(),
            unchanged: diff.unchanged.len(),
            invalid: desired
                .iter()
                .filter(|e| !e.is_valid())
                .map(|e| e.spec.name.clone())
                .collect(),
            ..ReconcileReport::default()
        };

        if diff.is_empty() {
            *current = desired;
            self.passes.fetch_add(1, Ordering::Relaxed);
            report.generation = registry.generation();
            report.duration_ms = started.elapsed().as_millis() as u64;
            metrics::record_pass("unchanged", started.elapsed());
            tracing::debug!(models = report.unchanged, "Preset unchanged; nothing to reconcile");
            return report;
        }

        let plan = registry.commit(|txn| self.apply(txn, &diff, &desired));
        report.generation = registry.generation();

        report.unloaded = plan.unloads.iter().map(|h| h.name.clone()).collect();
        report.unload_failures = self.lifecycle.release_all(plan.unloads).await;

        for ticket in plan.loads {
            report.loads_started.push(ticket.name.clone());
            self.lifecycle.spawn_load(ticket);
        }

        *current = desired;
        self.passes.fetch_add(1, Ordering::Relaxed);
        report.duration_ms = started.elapsed().as_millis() as u64;
        metrics::record_pass("applied", started.elapsed());

        tracing::info!(
            added = ?report.added,
            removed = ?report.removed,
            changed = ?report.changed,
            unchanged = report.unchanged,
            invalid = report.invalid.len(),
            loads_started = report.loads_started.len(),
            generation = report.generation,
            "Reconciled model fleet"
        );
        report
    }

    /// Registry bookkeeping for one pass: removals, then changes, then additions.
    fn apply(&self, txn: &mut Txn<'_>, diff: &Diff, desired: &DesiredSet) -> ApplyPlan {
        let mut plan = ApplyPlan::default();

        for name in &diff.removed {
            let Some(slot) = txn.slot_mut(name) else {
                continue;
            };
            plan.unloads.extend(slot.take_handle());
            if slot.entry.status != ModelStatus::Unloaded {
                slot.set_status(ModelStatus::Unloaded);
            }
            slot.entry.in_config = false;
            slot.entry.revision += 1;
        }

        for name in &diff.changed {
            let Some(entry) = desired.get(name) else {
                continue;
            };
            let eager = self.wants_eager_load(entry);
            let Some(slot) = txn.slot_mut(name) else {
                continue;
            };
            let was = slot.entry.status;
            plan.unloads.extend(slot.take_handle());

            slot.entry.spec = entry.spec.clone();
            slot.entry.revision += 1;
            slot.entry.invalid = !entry.is_valid();
            slot.entry.last_error = entry.error.as_ref().map(|e| e.reason.clone());

            let reload = entry.is_valid()
                && match was {
                    ModelStatus::Loaded | ModelStatus::Loading => true,
                    ModelStatus::Error => eager,
                    ModelStatus::Unloaded => false,
                };
            if reload {
                plan.loads.push(LoadTicket::issue(slot));
            } else if slot.entry.status != ModelStatus::Unloaded {
                slot.set_status(ModelStatus::Unloaded);
            }
        }

        for name in &diff.added {
            let Some(entry) = desired.get(name) else {
                continue;
            };
            let eager = self.wants_eager_load(entry);
            let error = entry.error.as_ref().map(|e| e.reason.clone());

            let revived = txn.get(name).is_some();
            let slot = if revived {
                txn.slot_mut(name).map(|slot| {
                    plan.unloads.extend(slot.take_handle());
                    if slot.entry.status != ModelStatus::Unloaded {
                        slot.set_status(ModelStatus::Unloaded);
                    }
                    slot.entry.spec = entry.spec.clone();
                    slot.entry.revision += 1;
                    slot.entry.in_config = true;
                    slot.entry.invalid = error.is_some();
                    slot.entry.last_error = error;
                    slot
                })
            } else {
                txn.create(entry.spec.clone(), error)
            };

            if let (true, Some(slot)) = (eager, slot) {
                plan.loads.push(LoadTicket::issue(slot));
            }
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::lifecycle::models::testing::FakeLoader;
    use crate::lifecycle::models::LifecycleOptions;
    use crate::preset::desired_set_from_str;
    use crate::registry::Registry;

    struct Fixture {
        registry: Arc<Registry>,
        loader: Arc<FakeLoader>,
        reconciler: Reconciler,
    }

    fn fixture(autoload: bool) -> Fixture {
        let registry = Arc::new(Registry::new());
        let loader = Arc::new(FakeLoader::default());
        let lifecycle = Arc::new(ModelLifecycle::new(
            registry.clone(),
            loader.clone(),
            LifecycleOptions {
                load_timeout: Duration::from_secs(5),
                ..LifecycleOptions::default()
            },
        ));
        Fixture {
            registry,
            loader,
            reconciler: Reconciler::new(lifecycle, autoload),
        }
    }

    fn set(text: &str) -> DesiredSet {
        desired_set_from_str(text).unwrap()
    }

    async fn settled(registry: &Registry, name: &str) -> ModelStatus {
        registry
            .wait_for(name, |e| e.status != ModelStatus::Loading)
            .await
            .map(|e| e.status)
            .unwrap()
    }

    const TWO: &str = "[a]\nhf_repo = org/a\n\n[b]\nhf_repo = org/b\n";

    #[tokio::test]
    async fn test_second_identical_pass_is_noop() {
        let f = fixture(false);
        let first = f.reconciler.reconcile(set(TWO)).await;
        assert_eq!(first.added, vec!["a", "b"]);

        let generation = f.registry.generation();
        let second = f.reconciler.reconcile(set(TWO)).await;
        assert!(second.is_noop());
        assert_eq!(second.unchanged, 2);
        assert_eq!(f.registry.generation(), generation);
        assert_eq!(f.reconciler.passes(), 2);
    }

    #[tokio::test]
    async fn test_new_entries_start_unloaded() {
        let f = fixture(false);
        f.reconciler.reconcile(set(TWO)).await;
        for entry in f.registry.list() {
            assert_eq!(entry.status, ModelStatus::Unloaded);
            assert_eq!(entry.revision, 1);
            assert!(entry.in_config);
        }
        assert_eq!(f.loader.load_count("a"), 0);
    }

    #[tokio::test]
    async fn test_autoload_and_per_entry_override() {
        let f = fixture(true);
        let report = f
            .reconciler
            .reconcile(set("[a]\nhf_repo = org/a\n\n[b]\nhf_repo = org/b\nload_on_startup = false\n"))
            .await;
        assert_eq!(report.loads_started, vec!["a"]);
        assert_eq!(settled(&f.registry, "a").await, ModelStatus::Loaded);
        assert_eq!(f.registry.get("b").unwrap().status, ModelStatus::Unloaded);
    }

    #[tokio::test]
    async fn test_removal_is_soft_and_unloads() {
        let f = fixture(false);
        f.reconciler.reconcile(set(TWO)).await;
        f.reconciler.lifecycle().load("a").await.unwrap();

        let report = f.reconciler.reconcile(set("[b]\nhf_repo = org/b\n")).await;
        assert_eq!(report.removed, vec!["a"]);
        assert_eq!(report.unloaded, vec!["a"]);

        let a = f.registry.get("a").unwrap();
        assert!(!a.in_config);
        assert_eq!(a.status, ModelStatus::Unloaded);
        assert_eq!(a.revision, 2);
        assert_eq!(f.loader.unload_count("a"), 1);
        assert_eq!(f.registry.list().len(), 2);
    }

    #[tokio::test]
    async fn test_readded_entry_is_revived() {
        let f = fixture(false);
        f.reconciler.reconcile(set(TWO)).await;
        f.reconciler.reconcile(set("[b]\nhf_repo = org/b\n")).await;
        let created = f.registry.get("a").unwrap().created;

        let report = f.reconciler.reconcile(set(TWO)).await;
        assert_eq!(report.added, vec!["a"]);
        let a = f.registry.get("a").unwrap();
        assert!(a.in_config);
        assert_eq!(a.revision, 3);
        assert_eq!(a.created, created);
    }

    #[tokio::test]
    async fn test_changed_loaded_entry_is_reloaded() {
        let f = fixture(false);
        f.reconciler.reconcile(set(TWO)).await;
        let old = f.reconciler.lifecycle().load("a").await.unwrap();
        assert_eq!(old.revision, 1);

        let report = f
            .reconciler
            .reconcile(set("[a]\nhf_repo = org/a\nctx_size = 8192\n\n[b]\nhf_repo = org/b\n"))
            .await;
        assert_eq!(report.changed, vec!["a"]);
        assert_eq!(report.loads_started, vec!["a"]);
        assert_eq!(settled(&f.registry, "a").await, ModelStatus::Loaded);

        let handle = f.registry.handle("a").unwrap();
        assert_eq!(handle.revision, 2);
        assert_eq!(f.registry.get("a").unwrap().spec.options.ctx_size, Some(8192));
        assert_eq!(f.loader.unload_count("a"), 1);
        // Untouched sibling keeps its revision.
        assert_eq!(f.registry.get("b").unwrap().revision, 1);
    }

    #[tokio::test]
    async fn test_changed_unloaded_entry_stays_unloaded() {
        let f = fixture(false);
        f.reconciler.reconcile(set(TWO)).await;
        f.reconciler
            .reconcile(set("[a]\nhf_repo = org/a2\n\n[b]\nhf_repo = org/b\n"))
            .await;
        let a = f.registry.get("a").unwrap();
        assert_eq!(a.status, ModelStatus::Unloaded);
        assert_eq!(a.revision, 2);
        assert_eq!(f.loader.load_count("a"), 0);
    }

    #[tokio::test]
    async fn test_invalid_entry_is_recorded_not_loaded() {
        let f = fixture(true);
        let report = f
            .reconciler
            .reconcile(set("[ok]\nhf_repo = org/ok\n\n[bad]\nctx_size = 4\n"))
            .await;
        assert_eq!(report.invalid, vec!["bad"]);
        assert_eq!(report.loads_started, vec!["ok"]);

        let bad = f.registry.get("bad").unwrap();
        assert!(bad.invalid);
        assert_eq!(bad.status, ModelStatus::Unloaded);
        assert!(bad.last_error.unwrap().contains("no model source"));
        assert_eq!(settled(&f.registry, "ok").await, ModelStatus::Loaded);
    }

    #[tokio::test]
    async fn test_one_failing_load_does_not_affect_others() {
        let f = fixture(true);
        f.reconciler
            .reconcile(set("[good]\nhf_repo = org/good\n\n[broken]\nhf_repo = bad/repo\n"))
            .await;
        assert_eq!(settled(&f.registry, "good").await, ModelStatus::Loaded);
        assert_eq!(settled(&f.registry, "broken").await, ModelStatus::Error);
        assert!(f
            .registry
            .get("broken")
            .unwrap()
            .last_error
            .unwrap()
            .contains("repository not found"));
    }

    #[tokio::test]
    async fn test_fixing_errored_entry_resets_it() {
        let f = fixture(false);
        f.reconciler.reconcile(set("[m]\nhf_repo = bad/repo\n")).await;
        assert!(f.reconciler.lifecycle().load("m").await.is_err());
        assert_eq!(f.registry.get("m").unwrap().status, ModelStatus::Error);

        f.reconciler.reconcile(set("[m]\nhf_repo = org/fixed\n")).await;
        let m = f.registry.get("m").unwrap();
        assert_eq!(m.status, ModelStatus::Unloaded);
        assert!(m.last_error.is_none());
    }

    #[tokio::test]
    async fn test_spec_change_during_load_wins() {
        let registry = Arc::new(Registry::new());
        let loader = Arc::new(FakeLoader::with_delay(Duration::from_millis(50)));
        let lifecycle = Arc::new(ModelLifecycle::new(
            registry.clone(),
            loader.clone(),
            LifecycleOptions::default(),
        ));
        let reconciler = Reconciler::new(lifecycle, true);

        reconciler.reconcile(set("[a]\nhf_repo = org/a\n")).await;
        assert_eq!(registry.get("a").unwrap().status, ModelStatus::Loading);
        reconciler.reconcile(set("[a]\nhf_repo = org/a-v2\n")).await;

        let entry = registry
            .wait_for("a", |e| e.status == ModelStatus::Loaded)
            .await
            .unwrap();
        assert_eq!(entry.revision, 2);
        // Give the superseded load time to finish and be released.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(registry.handle("a").unwrap().revision, 2);
        assert!(loader.unloads.lock().iter().any(|(n, rev)| n == "a" && *rev == 1));
    }
}
