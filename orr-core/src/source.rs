//! Session source trait definition

use crate::model::TimingSample;
use crate::timeline::StatusPoint;
use anyhow::Result;

/// A fully loaded session, ready for timeline construction.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    /// Display name of the session (e.g. "2024 Dutch Grand Prix").
    pub name: String,

    /// Per-driver timing samples, in whatever order the source keeps them.
    pub samples: Vec<TimingSample>,

    /// Session-wide flag timeline, possibly empty.
    pub track_status: Vec<StatusPoint>,
}

/// Trait for providers of already-acquired session data
///
/// Each source is responsible for:
/// - Reporting whether its backing data is currently available
/// - Producing the complete set of timing samples for the session
///
/// Fetching from a remote timing provider is out of scope: a source hands
/// over data that is already resident (a cached file, a generator).
pub trait SessionSource: Send + Sync {
    /// Identifier the source is listed and selected by.
    fn name(&self) -> &str;

    /// Lightweight availability check (e.g. the backing file exists).
    fn available(&self) -> bool;

    /// Load the full session. Called once per replay; may do file I/O but
    /// never network I/O.
    fn load(&self) -> Result<SessionData>;
}
