//! OpenRaceReplay Core Library
//!
//! The replay engine for recorded race sessions: normalizes per-driver
//! timing samples into one ordered event timeline, runs a virtual playback
//! clock, and projects consistent race-state snapshots for any virtual
//! instant.

pub mod clock;
pub mod engine;
pub mod model;
pub mod projector;
pub mod source;
pub mod time;
pub mod timeline;

pub use clock::{ClockStatus, PlaybackClock};
pub use engine::{ReplayEngine, ReplayInfo, TickToken};
pub use model::{DriverId, Event, EventPayload, RaceState, SnapshotMask, TimingSample};
pub use projector::{OrderingPolicy, ProjectorConfig, StateProjector};
pub use source::{SessionData, SessionSource};
pub use time::{SessionTime, TimeSpan};
pub use timeline::{StatusPoint, Timeline, TimelineError};
