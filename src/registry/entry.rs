//! Registry entries and the model status state machine.
//!
//! # States
//! - Unloaded: declared (or removed) and not running
//! - Loading: a load is in flight for the entry's current revision
//! - Loaded: a handle for the current revision is available
//! - Error: the last load attempt failed; inert until the next attempt
//!
//! # State Transitions
//! ```text
//! Unloaded → Loading            load requested (on demand, eager, explicit)
//! Loading  → Loaded | Error     load completion for the current revision
//! Loading  → Unloaded           removed from config or superseded
//! Loaded   → Unloaded           explicit unload or removal
//! Loaded   → Loading            spec changed, reload
//! Error    → Unloaded | Loading reset or retry
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::loader::ModelHandle;
use crate::preset::ModelSpec;

/// Runtime status of a model entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Unloaded,
    Loading,
    Loaded,
    Error,
}

impl ModelStatus {
    pub const ALL: [ModelStatus; 4] = [
        ModelStatus::Unloaded,
        ModelStatus::Loading,
        ModelStatus::Loaded,
        ModelStatus::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelStatus::Unloaded => "unloaded",
            ModelStatus::Loading => "loading",
            ModelStatus::Loaded => "loaded",
            ModelStatus::Error => "error",
        }
    }

    /// Whether `self → next` is an edge of the state machine.
    pub fn can_transition_to(self, next: ModelStatus) -> bool {
        use ModelStatus::*;
        self == next
            || matches!(
                (self, next),
                (Unloaded, Loading)
                    | (Loading, Loaded)
                    | (Loading, Error)
                    | (Loading, Unloaded)
                    | (Loaded, Unloaded)
                    | (Loaded, Loading)
                    | (Error, Unloaded)
                    | (Error, Loading)
            )
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one registry entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub name: String,
    /// Last known spec, kept after the entry leaves the configuration.
    pub spec: ModelSpec,
    pub status: ModelStatus,
    pub last_error: Option<String>,
    /// Bumped on every spec change, removal and re-addition.
    pub revision: u64,
    /// False once the name is absent from the current Desired Set.
    pub in_config: bool,
    /// True while the stored spec failed validation.
    pub invalid: bool,
    /// Creation sequence number; listing order.
    pub created: u64,
}

/// Registry-owned record: entry plus the live handle, if any.
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) entry: RegistryEntry,
    pub(crate) handle: Option<Arc<ModelHandle>>,
}

impl Slot {
    pub(crate) fn new(entry: RegistryEntry) -> Self {
        Self {
            entry,
            handle: None,
        }
    }

    /// Move to `next`, logging edges the state machine does not expect.
    pub(crate) fn set_status(&mut self, next: ModelStatus) {
        let current = self.entry.status;
        if !current.can_transition_to(next) {
            tracing::warn!(
                model = %self.entry.name,
                from = %current,
                to = %next,
                "Unexpected model status transition"
            );
        }
        self.entry.status = next;
        if next != ModelStatus::Loaded {
            self.handle = None;
        }
    }

    /// Detach the running handle, leaving the entry `Unloaded`.
    pub(crate) fn take_handle(&mut self) -> Option<Arc<ModelHandle>> {
        let handle = self.handle.take();
        if self.entry.status == ModelStatus::Loaded {
            self.set_status(ModelStatus::Unloaded);
        }
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ModelStatus::*;

    #[test]
    fn test_transition_table() {
        assert!(Unloaded.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Loaded));
        assert!(Loading.can_transition_to(Error));
        assert!(Loaded.can_transition_to(Unloaded));
        assert!(Error.can_transition_to(Unloaded));
        assert!(Error.can_transition_to(Loading));
        assert!(Loaded.can_transition_to(Loaded));

        assert!(!Unloaded.can_transition_to(Loaded));
        assert!(!Unloaded.can_transition_to(Error));
        assert!(!Error.can_transition_to(Loaded));
        assert!(!Loaded.can_transition_to(Error));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Loaded).unwrap(), "\"loaded\"");
        assert_eq!(Unloaded.to_string(), "unloaded");
    }
}
