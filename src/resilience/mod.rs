//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Loader call (load / unload):
//!     → timeouts.rs (deadline around the whole call)
//!     → inside the loader, readiness probes retry with backoff.rs
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline; expiry becomes a per-model error
//! - Jittered backoff keeps many starting backends from probing in lockstep

pub mod backoff;
pub mod timeouts;
