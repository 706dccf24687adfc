//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! router.toml (optional) + command-line overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated, immutable)
//!     → handed to startup, which builds every subsystem from it
//! ```
//!
//! The model fleet is not part of this configuration: it is declared in the
//! preset file (`models.preset`) and reconciled at runtime by `reconcile`.
//!
//! # Design Decisions
//! - Process config is immutable once loaded; the fleet is what hot-reloads
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use validation::validate_config;
pub use schema::{
    AdminConfig, BackendConfig, ListenerConfig, ModelsConfig, ObservabilityConfig, RouterConfig,
    TimeoutConfig,
};
