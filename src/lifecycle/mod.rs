//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → registry/lifecycle/reconciler → initial preset pass
//!         → watcher task → HTTP listener
//!
//! Models (models.rs):
//!     resolve / load / unload → loader I/O → revision-guarded commit
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop watcher → drain HTTP → unload models → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//!     SIGHUP → forced preset reload
//! ```

pub mod models;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use models::{LifecycleOptions, ModelLifecycle, ResolveError};
pub use shutdown::Shutdown;
pub use startup::{ModelRouter, StartupError};
