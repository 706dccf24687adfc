//! Polling watcher for the model preset.
//!
//! # Responsibilities
//! - Check the preset source once per interval
//! - Stop on the shutdown broadcast
//!
//! # Design Decisions
//! - Polling rather than filesystem events: works for any source and
//!   collapses bursts of edits into one pass per interval
//! - Missed ticks are delayed, not replayed, so a slow pass never queues
//!   a backlog of checks

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::reconcile::{ReloadOutcome, Reloader};

/// Periodic driver of [`Reloader::check`].
pub struct Watcher {
    reloader: Arc<Reloader>,
    interval: Duration,
}

impl Watcher {
    pub fn new(reloader: Arc<Reloader>, interval: Duration) -> Self {
        Self { reloader, interval }
    }

    /// Run until `shutdown` fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            source = %self.reloader.describe(),
            interval_ms = self.interval.as_millis() as u64,
            "Model preset watcher started"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let ReloadOutcome::Applied(report) = self.reloader.check(false).await {
                        tracing::debug!(generation = report.generation, "Watcher pass applied");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Model preset watcher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
