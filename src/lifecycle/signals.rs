//! OS signal handling.
//!
//! # Responsibilities
//! - SIGTERM/SIGINT trigger graceful shutdown
//! - SIGHUP forces a preset reload, regardless of the watcher
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A failed handler registration is logged and that signal ignored

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::Shutdown;
use crate::reconcile::{ReloadOutcome, Reloader};

/// Spawn the signal loop. It exits after triggering shutdown.
pub fn spawn_signal_handler(shutdown: Shutdown, reloader: Arc<Reloader>) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signals(&shutdown, &reloader).await;
        shutdown.trigger();
    })
}

#[cfg(unix)]
async fn wait_for_signals(shutdown: &Shutdown, reloader: &Reloader) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut stopped = shutdown.subscribe();
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            None
        }
    };
    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGHUP handler");
            None
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("SIGINT received, shutting down");
                return;
            }
            Some(_) = recv(&mut terminate) => {
                tracing::info!("SIGTERM received, shutting down");
                return;
            }
            Some(_) = recv(&mut hangup) => {
                tracing::info!("SIGHUP received, reloading model preset");
                if let ReloadOutcome::Rejected(err) = reloader.check(true).await {
                    tracing::warn!(error = %err, "Forced reload rejected");
                }
            }
            _ = stopped.recv() => return,
        }
    }
}

#[cfg(unix)]
async fn recv(signal: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match signal {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(not(unix))]
async fn wait_for_signals(shutdown: &Shutdown, _reloader: &Reloader) {
    let mut stopped = shutdown.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Ctrl+C received, shutting down"),
        _ = stopped.recv() => {}
    }
}
