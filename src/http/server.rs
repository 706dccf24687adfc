//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (request id, tracing, body limit, timeout)
//! - Mount the admin API when enabled
//! - Serve until the shutdown broadcast fires

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    routing::{any, get, post},
    Json, Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::RouterConfig;
use crate::http::models::{list_models, load_model, unload_model};
use crate::http::proxy::proxy_handler;
use crate::http::request::X_REQUEST_ID;
use crate::lifecycle::models::ModelLifecycle;
use crate::reconcile::Reloader;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<ModelLifecycle>,
    pub reloader: Arc<Reloader>,
    pub client: Client<HttpConnector, Body>,
    pub config: Arc<RouterConfig>,
    pub started_at: Instant,
}

/// HTTP front end of the router.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(
        config: Arc<RouterConfig>,
        lifecycle: Arc<ModelLifecycle>,
        reloader: Arc<Reloader>,
    ) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let state = AppState {
            lifecycle,
            reloader,
            client,
            config,
            started_at: Instant::now(),
        };
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let config = state.config.clone();

        let mut router = Router::new()
            .route("/health", get(health))
            .route("/models", get(list_models))
            .route("/v1/models", get(list_models))
            .route("/models/load", post(load_model))
            .route("/models/unload", post(unload_model))
            .route("/v1/{*path}", any(proxy_handler))
            .with_state(state.clone());

        if config.admin.enabled {
            router = router.merge(admin::router(state));
        }

        router
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
    }

    /// The assembled router, for embedding or in-process tests.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on `listener` until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
