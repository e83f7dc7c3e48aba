//! Playback tick task
//!
//! Drives the replay engine on a fixed wall-clock cadence and broadcasts
//! each accepted snapshot. Speed never changes the cadence — it only
//! scales how much virtual time each tick represents. The task measures
//! real elapsed time between ticks rather than assuming the interval, so
//! scheduling jitter does not warp virtual time.

use crate::state::AppState;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Wall-clock tick cadence.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Start (or restart) the playback task for the currently loaded engine.
pub async fn start(state: AppState) {
    // Cancel any previous task and install a fresh token.
    let cancel_token = {
        let mut cancel = state.playback_cancel.write().await;
        if let Some(token) = cancel.take() {
            token.cancel();
        }
        let token = CancellationToken::new();
        *cancel = Some(token.clone());
        token
    };

    tokio::spawn(run(state, cancel_token));
}

async fn run(state: AppState, cancel_token: CancellationToken) {
    info!("playback task started");

    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_tick = Instant::now();
    let mut last_sent = None;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        let wall_elapsed = now - last_tick;
        last_tick = now;

        // Phase 1: advance the clock under a short lock.
        let token = {
            let mut engine = state.engine.write().await;
            match engine.as_mut() {
                Some(engine) if !engine.clock().is_paused() => {
                    Some(engine.begin_tick(wall_elapsed))
                }
                Some(_) => None,
                None => break,
            }
        };
        let Some(token) = token else { continue };

        // Phase 2: project and publish. A seek accepted between the two
        // phases bumps the clock generation, so the commit is discarded —
        // the seek's handler already published its own snapshot. Publishing
        // under the same lock the control handlers publish under keeps
        // snapshots ordered with seeks for every subscriber.
        let mut engine = state.engine.write().await;
        match engine.as_mut() {
            Some(engine) => match engine.commit_tick(token) {
                Some(snapshot) => {
                    // Suppress repeats once the clock pins at the end.
                    if last_sent != Some(snapshot.time) {
                        last_sent = Some(snapshot.time);
                        // Ignore error if no receivers (they'll get the next one)
                        let _ = state.state_tx.send(snapshot.clone());
                    }
                }
                None => debug!("discarded stale tick update"),
            },
            None => break,
        }
    }

    info!("playback task ended");
}
