//! Model router library
//!
//! Declarative model fleet: a preset file names the models, the reconciler
//! keeps the registry in step with it, and the HTTP layer serves requests
//! from registry snapshots, loading models on demand.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod loader;
pub mod observability;
pub mod preset;
pub mod reconcile;
pub mod registry;
pub mod resilience;

pub use config::RouterConfig;
pub use http::HttpServer;
pub use lifecycle::{ModelRouter, Shutdown};
pub use registry::{ModelStatus, Registry};
