//! Client for the model router HTTP API.

pub mod client;

pub use client::{ModelInfo, ModelStatusInfo, RouterClient};
