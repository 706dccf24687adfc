//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the registry, lifecycle, reconciler and reloader from config
//! - Apply the preset once before serving (fail fast)
//! - Start the watcher and the HTTP server
//! - On shutdown: stop the watcher, drain HTTP, unload every model
//!
//! # Design Decisions
//! - Any startup error is fatal; a bad preset at boot is an operator error
//! - Subsystems initialize in order, not concurrently
//! - The listener is bound by the caller, so tests can use an ephemeral port

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::RouterConfig;
use crate::http::HttpServer;
use crate::lifecycle::models::{LifecycleOptions, ModelLifecycle};
use crate::lifecycle::shutdown::Shutdown;
use crate::loader::ModelLoader;
use crate::preset::{FileSource, PresetSource};
use crate::reconcile::reloader::InitialLoadError;
use crate::reconcile::{Reconciler, Reloader, Watcher};
use crate::registry::Registry;

/// Fatal errors before or while serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("initial model preset load failed: {0}")]
    InitialLoad(#[from] InitialLoadError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fully initialized router, ready to serve.
pub struct ModelRouter {
    config: Arc<RouterConfig>,
    lifecycle: Arc<ModelLifecycle>,
    reloader: Arc<Reloader>,
    shutdown: Shutdown,
}

impl ModelRouter {
    /// Build every subsystem and apply the preset file named in `config`.
    pub async fn start(
        config: RouterConfig,
        loader: Arc<dyn ModelLoader>,
    ) -> Result<Self, StartupError> {
        let source: Arc<dyn PresetSource> = Arc::new(FileSource::new(&config.models.preset));
        Self::start_with_source(config, loader, source).await
    }

    /// Like [`ModelRouter::start`], reading the preset from `source`.
    pub async fn start_with_source(
        config: RouterConfig,
        loader: Arc<dyn ModelLoader>,
        source: Arc<dyn PresetSource>,
    ) -> Result<Self, StartupError> {
        let registry = Arc::new(Registry::new());
        let options = LifecycleOptions {
            on_demand: config.models.on_demand,
            load_timeout: config.models.load_timeout(),
            unload_timeout: config.models.unload_timeout(),
        };
        let lifecycle = Arc::new(ModelLifecycle::new(registry, loader, options));
        let reconciler = Arc::new(Reconciler::new(lifecycle.clone(), config.models.autoload));
        let reloader = Arc::new(Reloader::new(source, reconciler));

        let report = reloader.initial().await?;
        tracing::info!(
            preset = %reloader.describe(),
            models = report.added.len(),
            invalid = report.invalid.len(),
            loading = report.loads_started.len(),
            "Model preset applied"
        );

        Ok(Self {
            config: Arc::new(config),
            lifecycle,
            reloader,
            shutdown: Shutdown::new(),
        })
    }

    pub fn lifecycle(&self) -> &Arc<ModelLifecycle> {
        &self.lifecycle
    }

    pub fn reloader(&self) -> &Arc<Reloader> {
        &self.reloader
    }

    /// Handle for stopping [`ModelRouter::serve`].
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Bind the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener, StartupError> {
        let address = self.config.listener.bind_address.clone();
        TcpListener::bind(&address)
            .await
            .map_err(|source| StartupError::Bind { address, source })
    }

    /// Serve until shutdown, then unload every model.
    pub async fn serve(self, listener: TcpListener) -> Result<(), StartupError> {
        let watcher = if self.config.models.watch {
            let watcher = Watcher::new(self.reloader.clone(), self.config.models.watch_interval());
            Some(tokio::spawn(watcher.run(self.shutdown.subscribe())))
        } else {
            tracing::info!("Model preset watching disabled");
            None
        };

        let server = HttpServer::new(
            self.config.clone(),
            self.lifecycle.clone(),
            self.reloader.clone(),
        );
        let served = server.run(listener, self.shutdown.subscribe()).await;

        // The server may also stop on its own error; make sure the watcher stops too.
        self.shutdown.trigger();
        if let Some(task) = watcher {
            let _ = task.await;
        }

        let unloaded = self.lifecycle.unload_all().await;
        tracing::info!(models = unloaded, "Unloaded models on shutdown");

        served.map_err(StartupError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::models::testing::FakeLoader;
    use crate::preset::MemorySource;
    use crate::registry::ModelStatus;

    fn config() -> RouterConfig {
        let mut config = RouterConfig::default();
        config.listener.bind_address = "127.0.0.1:0".to_string();
        config.models.watch = false;
        config
    }

    #[tokio::test]
    async fn test_bad_preset_is_fatal() {
        let source = Arc::new(MemorySource::new("[a]\nmodel = x\n[a]\n"));
        let result =
            ModelRouter::start_with_source(config(), Arc::new(FakeLoader::default()), source).await;
        assert!(matches!(result, Err(StartupError::InitialLoad(_))));
    }

    #[tokio::test]
    async fn test_serve_and_shutdown_unloads_models() {
        let source = Arc::new(MemorySource::new("[a]\nhf_repo = org/a\n"));
        let loader = Arc::new(FakeLoader::default());
        let router = ModelRouter::start_with_source(config(), loader.clone(), source)
            .await
            .unwrap();

        router.lifecycle().load("a").await.unwrap();
        let lifecycle = router.lifecycle().clone();
        let shutdown = router.shutdown();
        let listener = router.bind().await.unwrap();
        let task = tokio::spawn(router.serve(listener));

        while shutdown.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }
        shutdown.trigger();
        task.await.unwrap().unwrap();
        assert_eq!(
            lifecycle.registry().get("a").unwrap().status,
            ModelStatus::Unloaded
        );
        assert_eq!(loader.unload_count("a"), 1);
    }
}
