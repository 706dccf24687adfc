//! Model listing and explicit load/unload.
//!
//! Listing reads one registry snapshot and never fails because of bad
//! configuration: invalid and removed entries are listed with their state.

use axum::{extract::State, Json};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::registry::{ModelStatus, RegistryEntry};

const OWNED_BY: &str = "model-router";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatusView {
    pub value: ModelStatus,
    pub revision: u64,
    pub in_config: bool,
    pub failed: bool,
}

/// One entry of the model listing.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelView {
    pub id: String,
    pub object: String,
    pub owned_by: String,
    pub created: u64,
    pub status: StatusView,
    pub last_error: Option<String>,
    pub attributes: IndexMap<String, String>,
}

impl From<&RegistryEntry> for ModelView {
    fn from(entry: &RegistryEntry) -> Self {
        Self {
            id: entry.name.clone(),
            object: "model".to_string(),
            owned_by: OWNED_BY.to_string(),
            created: entry.created,
            status: StatusView {
                value: entry.status,
                revision: entry.revision,
                in_config: entry.in_config,
                failed: entry.status == ModelStatus::Error,
            },
            last_error: entry.last_error.clone(),
            attributes: entry.spec.attributes.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelView>,
}

#[derive(Debug, Deserialize)]
pub struct ModelRequest {
    pub model: String,
}

pub async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    let snapshot = state.lifecycle.registry().snapshot();
    Json(ModelList {
        object: "list".to_string(),
        data: snapshot.entries().map(ModelView::from).collect(),
    })
}

pub async fn load_model(
    State(state): State<AppState>,
    Json(request): Json<ModelRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let handle = state.lifecycle.load(&request.model).await?;
    tracing::info!(model = %request.model, revision = handle.revision, "Model loaded on request");
    Ok(Json(json!({ "success": true, "model": request.model, "revision": handle.revision })))
}

pub async fn unload_model(
    State(state): State<AppState>,
    Json(request): Json<ModelRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let unloaded = state.lifecycle.unload(&request.model).await?;
    Ok(Json(json!({ "success": true, "model": request.model, "unloaded": unloaded })))
}
