//! Model registry.
//!
//! # Data Flow
//! ```text
//! Writers (reconciler, model lifecycle):
//!     Registry::commit(|txn| ...)        short, synchronous, exclusive
//!     → entries mutated in place
//!     → new FleetSnapshot built and swapped in (arc-swap)
//!     → generation broadcast on a watch channel
//!
//! Readers (listing, resolve-for-use):
//!     Registry::snapshot() → Arc<FleetSnapshot>   lock-free
//!     Registry::wait_for(name, pred)               parks on the watch channel
//! ```
//!
//! # Design Decisions
//! - Entries are never removed; removal from config is a status change
//! - One commit publishes one snapshot, so a reader never sees half a commit
//! - The lock is never held across an await point

pub mod entry;

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::watch;

pub use entry::{ModelStatus, RegistryEntry};
pub(crate) use entry::Slot;

use crate::loader::ModelHandle;
use crate::observability::metrics;
use crate::preset::ModelSpec;

/// Immutable, consistent view of every entry ever created.
#[derive(Debug, Clone, Default)]
pub struct FleetSnapshot {
    /// Incremented on every commit.
    pub generation: u64,
    entries: IndexMap<String, RegistryEntry>,
}

impl FleetSnapshot {
    /// Entries in creation order.
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries per status.
    pub fn status_counts(&self) -> HashMap<ModelStatus, usize> {
        let mut counts: HashMap<ModelStatus, usize> =
            ModelStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for entry in self.entries.values() {
            *counts.entry(entry.status).or_default() += 1;
        }
        counts
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    slots: IndexMap<String, Slot>,
    generation: u64,
    next_created: u64,
}

/// Exclusive access to the registry for the duration of one commit.
pub struct Txn<'a> {
    state: &'a mut RegistryState,
    dirty: bool,
}

impl<'a> Txn<'a> {
    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.state.slots.get(name).map(|s| &s.entry)
    }

    /// Handle of the named entry, without marking the commit dirty.
    pub(crate) fn handle(&self, name: &str) -> Option<&Arc<ModelHandle>> {
        self.state.slots.get(name).and_then(|s| s.handle.as_ref())
    }

    pub(crate) fn slot_mut(&mut self, name: &str) -> Option<&mut Slot> {
        let slot = self.state.slots.get_mut(name);
        if slot.is_some() {
            self.dirty = true;
        }
        slot
    }

    /// Create a new `Unloaded` entry at revision 1.
    ///
    /// Returns `None` if the name already exists.
    pub(crate) fn create(&mut self, spec: ModelSpec, error: Option<String>) -> Option<&mut Slot> {
        if self.state.slots.contains_key(&spec.name) {
            return None;
        }
        let created = self.state.next_created;
        self.state.next_created += 1;
        let name = spec.name.clone();
        let entry = RegistryEntry {
            name: name.clone(),
            spec,
            status: ModelStatus::Unloaded,
            invalid: error.is_some(),
            last_error: error,
            revision: 1,
            in_config: true,
            created,
        };
        self.dirty = true;
        self.state.slots.insert(name.clone(), Slot::new(entry));
        self.state.slots.get_mut(&name)
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.state.slots.keys().cloned().collect()
    }
}

/// The single source of truth for model entries.
pub struct Registry {
    state: Mutex<RegistryState>,
    snapshot: ArcSwap<FleetSnapshot>,
    changes: watch::Sender<u64>,
}

impl Registry {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: Mutex::new(RegistryState::default()),
            snapshot: ArcSwap::from_pointee(FleetSnapshot::default()),
            changes,
        }
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<FleetSnapshot> {
        self.snapshot.load_full()
    }

    /// Every entry, in creation order.
    pub fn list(&self) -> Vec<RegistryEntry> {
        self.snapshot.load().entries().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<RegistryEntry> {
        self.snapshot.load().get(name).cloned()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot.load().generation
    }

    /// Handle of a loaded entry.
    pub fn handle(&self, name: &str) -> Option<Arc<ModelHandle>> {
        let state = self.state.lock();
        let slot = state.slots.get(name)?;
        match slot.entry.status {
            ModelStatus::Loaded => slot.handle.clone(),
            _ => None,
        }
    }

    /// Subscribe to commit notifications (the value is the generation).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Apply `f` under the exclusive lock and publish the result as one snapshot.
    ///
    /// Nothing is published if `f` touched no entry.
    pub fn commit<R>(&self, f: impl FnOnce(&mut Txn<'_>) -> R) -> R {
        let mut state = self.state.lock();
        let mut txn = Txn {
            state: &mut *state,
            dirty: false,
        };
        let result = f(&mut txn);
        if !txn.dirty {
            return result;
        }

        state.generation += 1;
        let next = FleetSnapshot {
            generation: state.generation,
            entries: state
                .slots
                .iter()
                .map(|(name, slot)| (name.clone(), slot.entry.clone()))
                .collect(),
        };
        let next = Arc::new(next);
        let previous = self.snapshot.swap(next.clone());
        let generation = state.generation;
        drop(state);

        record_transitions(&previous, &next);
        self.changes.send_replace(generation);
        result
    }

    /// Wait until `done` holds for the named entry.
    ///
    /// Returns `None` if the entry does not exist.
    pub async fn wait_for<F>(&self, name: &str, mut done: F) -> Option<RegistryEntry>
    where
        F: FnMut(&RegistryEntry) -> bool,
    {
        let mut changes = self.changes.subscribe();
        loop {
            let entry = self.get(name)?;
            if done(&entry) {
                return Some(entry);
            }
            if changes.changed().await.is_err() {
                return Some(entry);
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Entries whose status differs between two snapshots, with the old status.
fn status_changes<'a>(
    previous: &'a FleetSnapshot,
    current: &'a FleetSnapshot,
) -> impl Iterator<Item = (Option<ModelStatus>, &'a RegistryEntry)> + 'a {
    current.entries().filter_map(move |entry| {
        let before = previous.get(&entry.name).map(|e| e.status);
        (before != Some(entry.status)).then_some((before, entry))
    })
}

/// Log and count the transitions between `previous` and the snapshot one
/// commit built from it.
fn record_transitions(previous: &FleetSnapshot, current: &FleetSnapshot) {
    for (before, entry) in status_changes(previous, current) {
        tracing::debug!(
            model = %entry.name,
            from = ?before.map(|s| s.as_str()),
            to = %entry.status,
            revision = entry.revision,
            "Model status changed"
        );
        metrics::record_transition(entry.status);
    }
    metrics::record_fleet(&current.status_counts());
}
