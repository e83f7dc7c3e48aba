//! OpenRaceReplay Server
//!
//! Loads recorded race sessions and replays them as a live-feeling
//! broadcast: REST control API plus an SSE stream of race-state snapshots
//! for external renderers.

use anyhow::Result;
use orr_server::{api, state};
use orr_sources::{ndjson, DemoSession};
use std::net::SocketAddr;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting OpenRaceReplay Server");

    let sessions_dir = state::default_sessions_dir();
    let state = state::AppState::new(sessions_dir.clone());

    // Built-in synthetic session plus whatever the cache directory holds
    state.register_source(Box::new(DemoSession::new())).await;
    match ndjson::scan_dir(&sessions_dir) {
        Ok(sessions) => {
            info!(
                "Found {} cached session(s) in {}",
                sessions.len(),
                sessions_dir.display()
            );
            for session in sessions {
                state.register_source(Box::new(session)).await;
            }
        }
        Err(e) => warn!("Failed to scan {}: {}", sessions_dir.display(), e),
    }

    // Build the router
    let app = api::create_router(state.clone());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], 9160));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
