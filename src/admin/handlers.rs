use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::reconcile::{ReconcileReport, ReloadOutcome};
use crate::registry::RegistryEntry;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub preset: String,
    pub generation: u64,
    pub reconcile_passes: u64,
    pub models: BTreeMap<&'static str, usize>,
}

#[derive(Serialize)]
pub struct FleetEntry {
    pub name: String,
    pub status: &'static str,
    pub revision: u64,
    pub in_config: bool,
    pub invalid: bool,
    pub last_error: Option<String>,
    pub source: Option<String>,
    pub backend: Option<String>,
}

#[derive(Serialize)]
pub struct FleetView {
    pub generation: u64,
    pub entries: Vec<FleetEntry>,
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReconcileReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let snapshot = state.lifecycle.registry().snapshot();
    let models = snapshot
        .status_counts()
        .into_iter()
        .map(|(status, n)| (status.as_str(), n))
        .collect();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        preset: state.reloader.describe(),
        generation: snapshot.generation,
        reconcile_passes: state.reloader.reconciler().passes(),
        models,
    })
}

pub async fn get_fleet(State(state): State<AppState>) -> Json<FleetView> {
    let snapshot = state.lifecycle.registry().snapshot();
    let entries = snapshot
        .entries()
        .map(|entry: &RegistryEntry| FleetEntry {
            name: entry.name.clone(),
            status: entry.status.as_str(),
            revision: entry.revision,
            in_config: entry.in_config,
            invalid: entry.invalid,
            last_error: entry.last_error.clone(),
            source: entry.spec.source.as_ref().map(|s| s.to_string()),
            backend: state
                .lifecycle
                .registry()
                .handle(&entry.name)
                .map(|h| h.base_url.to_string()),
        })
        .collect();

    Json(FleetView {
        generation: snapshot.generation,
        entries,
    })
}

pub async fn post_reload(State(state): State<AppState>) -> Json<ReloadResponse> {
    tracing::info!("Forced reload requested through admin API");
    let response = match state.reloader.check(true).await {
        ReloadOutcome::Applied(report) => ReloadResponse {
            outcome: "applied",
            report: Some(report),
            error: None,
        },
        ReloadOutcome::Unchanged => ReloadResponse {
            outcome: "unchanged",
            report: None,
            error: None,
        },
        ReloadOutcome::Rejected(err) => ReloadResponse {
            outcome: "rejected",
            report: None,
            error: Some(err.to_string()),
        },
        ReloadOutcome::SourceUnavailable(reason) => ReloadResponse {
            outcome: "source_unavailable",
            report: None,
            error: Some(reason),
        },
    };
    Json(response)
}
