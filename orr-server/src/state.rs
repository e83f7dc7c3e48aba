//! Application state management

use orr_core::{RaceState, ReplayEngine, SessionSource};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// All registered session sources
    pub sources: Arc<RwLock<Vec<Box<dyn SessionSource>>>>,

    /// Active replay engine (None when nothing is loaded)
    pub engine: Arc<RwLock<Option<ReplayEngine>>>,

    /// Broadcast channel for race-state snapshots
    /// Multiple consumers can subscribe to receive snapshots
    pub state_tx: broadcast::Sender<RaceState>,

    /// Cancellation token for the playback tick task
    pub playback_cancel: Arc<RwLock<Option<CancellationToken>>>,

    /// Directory uploaded/cached session files live in
    pub sessions_dir: PathBuf,
}

impl AppState {
    pub fn new(sessions_dir: PathBuf) -> Self {
        // Snapshots are coarse (10/s), so a small buffer is plenty
        let (state_tx, _) = broadcast::channel(64);

        Self {
            sources: Arc::new(RwLock::new(Vec::new())),
            engine: Arc::new(RwLock::new(None)),
            state_tx,
            playback_cancel: Arc::new(RwLock::new(None)),
            sessions_dir,
        }
    }

    /// Register a session source
    pub async fn register_source(&self, source: Box<dyn SessionSource>) {
        let mut sources = self.sources.write().await;
        sources.push(source);
    }

    /// Subscribe to race-state snapshots
    pub fn subscribe(&self) -> broadcast::Receiver<RaceState> {
        self.state_tx.subscribe()
    }
}

/// Default location for cached session files.
pub fn default_sessions_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("openracereplay").join("sessions"))
        .unwrap_or_else(|| PathBuf::from("sessions"))
}
