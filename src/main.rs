//! Model router
//!
//! Serves a fleet of model backends declared in a preset file and keeps the
//! fleet in step with that file while running.
//!
//! # Architecture Overview
//!
//! ```text
//!   preset file ──▶ reconcile::Watcher ──▶ preset (parse, validate)
//!                                              │
//!                                              ▼
//!                                    reconcile::Reconciler
//!                                              │ one commit per pass
//!                                              ▼
//!   client ──▶ http ──▶ lifecycle::models ──▶ registry ◀── admin
//!                │            │
//!                │            ▼
//!                │         loader (spawn / probe backends)
//!                ▼
//!            backend (llama-server or upstream)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use model_router::config::{load_config, validate_config, ConfigError, RouterConfig};
use model_router::lifecycle::signals::spawn_signal_handler;
use model_router::lifecycle::ModelRouter;
use model_router::loader::ProcessLoader;
use model_router::observability::{logging, metrics};

#[derive(Parser, Debug, Default)]
#[command(name = "model-router", version, about = "Hot-reloading router for a fleet of model servers")]
struct Args {
    /// Router configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides `listener.bind_address`
    #[arg(long)]
    bind: Option<String>,

    /// Model preset file, overrides `models.preset`
    #[arg(long)]
    models_preset: Option<String>,

    /// Watch the preset for changes
    #[arg(long, overrides_with = "no_models_watch")]
    models_watch: bool,

    /// Do not watch the preset for changes
    #[arg(long)]
    no_models_watch: bool,

    /// Preset poll interval in seconds
    #[arg(long)]
    models_watch_interval: Option<u64>,

    /// Load models as soon as they are declared
    #[arg(long)]
    models_autoload: bool,

    /// Only serve models that are already loaded
    #[arg(long)]
    no_models_on_demand: bool,
}

impl Args {
    fn apply(&self, config: &mut RouterConfig) {
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(preset) = &self.models_preset {
            config.models.preset = preset.clone();
        }
        if self.models_watch {
            config.models.watch = true;
        }
        if self.no_models_watch {
            config.models.watch = false;
        }
        if let Some(secs) = self.models_watch_interval {
            config.models.watch_interval_secs = secs;
        }
        if self.models_autoload {
            config.models.autoload = true;
        }
        if self.no_models_on_demand {
            config.models.on_demand = false;
        }
    }
}

fn resolve_config(args: &Args) -> Result<RouterConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };
    args.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "model-router starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        preset = %config.models.preset,
        watch = config.models.watch,
        watch_interval_secs = config.models.watch_interval_secs,
        autoload = config.models.autoload,
        on_demand = config.models.on_demand,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let loader = Arc::new(ProcessLoader::new(config.backend.clone()));
    let router = ModelRouter::start(config, loader).await?;
    let listener = router.bind().await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let signals = spawn_signal_handler(router.shutdown(), router.reloader().clone());
    router.serve(listener).await?;
    signals.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_file() {
        let args = Args::parse_from([
            "model-router",
            "--bind",
            "127.0.0.1:7000",
            "--models-preset",
            "/etc/router/models.ini",
            "--no-models-watch",
            "--models-watch-interval",
            "2",
            "--models-autoload",
            "--no-models-on-demand",
        ]);
        let mut config = RouterConfig::default();
        args.apply(&mut config);

        assert_eq!(config.listener.bind_address, "127.0.0.1:7000");
        assert_eq!(config.models.preset, "/etc/router/models.ini");
        assert!(!config.models.watch);
        assert_eq!(config.models.watch_interval_secs, 2);
        assert!(config.models.autoload);
        assert!(!config.models.on_demand);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let args = Args::parse_from(["model-router", "--models-watch-interval", "0"]);
        assert!(matches!(
            resolve_config(&args),
            Err(ConfigError::Validation(_))
        ));
    }
}
