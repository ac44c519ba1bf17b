//! Background task that physically deletes stale rows.
//!
//! The sweeper is bound to the store that spawned it: it stops when the store
//! is closed, and also when the store is dropped (the shutdown sender goes
//! away with it). It never keeps the runtime busy on its own account between
//! ticks.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::store::Core;

#[derive(Debug)]
pub(crate) struct Sweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}
impl Sweeper {
    /// Spawn the sweep loop. The first tick fires one `period` from now.
    pub(crate) fn spawn(core: Core, period: Duration) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(core, period, shutdown_rx));
        tracing::debug!(period_secs = period.as_secs(), "Sweeper started");
        Self { shutdown, handle }
    }

    /// Signal the loop and wait for it to finish. A sweep that is already in
    /// progress is allowed to commit or roll back first.
    pub(crate) async fn stop(self) {
        _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            tracing::error!(error = %err, "Sweeper task did not shut down cleanly");
        }
    }
}

async fn run(core: Core, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A failed sweep is not fatal; the next tick retries.
                if let Err(err) = core.sweep().await {
                    tracing::error!(error = ?err, "Cleanup failed");
                }
            }
            // Also fires when the sender is dropped along with the store.
            _ = shutdown.changed() => {
                tracing::debug!("Sweeper shutting down");
                break;
            }
        }
    }
}
