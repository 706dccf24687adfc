//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, request id)
//!     → models.rs (listing, explicit load/unload; registry reads only)
//!     → proxy.rs (resolve model, forward to its backend)
//!     → response.rs (JSON errors)
//! ```

pub mod models;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::ApiError;
pub use server::{AppState, HttpServer};
