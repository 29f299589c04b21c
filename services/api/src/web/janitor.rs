//! services/api/src/web/janitor.rs
//!
//! The background task that reclaims idle and completed intake sessions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use speakfree_core::IntakeEngine;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Runs `purge_expired` every `every` until the token is cancelled.
pub fn spawn_janitor(
    engine: Arc<IntakeEngine>,
    every: Duration,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = every.as_secs(), "Session janitor started.");
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Session janitor stopped.");
                    return;
                }
                _ = ticker.tick() => {
                    match engine.purge_expired(Utc::now()).await {
                        Ok(0) => {}
                        Ok(count) => debug!(count, "Janitor reclaimed intake sessions."),
                        Err(e) => error!("Janitor failed to purge sessions: {}", e),
                    }
                }
            }
        }
    })
}
