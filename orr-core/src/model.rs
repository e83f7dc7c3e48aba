//! Race timing data model
//!
//! Defines the input `TimingSample`, the derived `Event` variants the
//! timeline is built from, and the `RaceState` snapshot the projector
//! maintains. Uses `Option<T>` for fields a timing feed may not provide.

use crate::time::{SessionTime, TimeSpan};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Three-letter driver code (e.g. `VER`, `HAM`), as used by timing feeds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(String);

impl DriverId {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DriverId {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

/// Tyre compound fitted to a car.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TyreCompound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
}

/// Session-wide flag state, resolved per snapshot from the status timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    #[default]
    Clear,
    Yellow,
    SafetyCar,
    VirtualSafetyCar,
    Red,
}

/// Where a driver is in their session lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    /// No timing data seen yet (pre-start).
    #[default]
    Grid,
    OnTrack,
    InPit,
    Finished,
    /// Inferred: no timing data for longer than the retirement threshold
    /// while the session kept running.
    Retired,
}

/// Pit lane boundary crossing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitPhase {
    In,
    Out,
}

// =============================================================================
// Input samples
// =============================================================================

/// One raw timing measurement for one driver, as handed over by the
/// data-acquisition layer. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSample {
    pub driver: DriverId,

    /// Session time of the measurement. When absent, `cumulative` is used
    /// to derive a timestamp; a sample with neither is dropped.
    #[serde(default)]
    pub session_time: Option<SessionTime>,

    /// Lap the measurement belongs to (1-based).
    pub lap: u32,

    /// 1-based sector index; 0 marks the lap-aggregate sample.
    #[serde(default)]
    pub sector: u8,

    #[serde(default)]
    pub sector_time: Option<TimeSpan>,

    #[serde(default)]
    pub lap_time: Option<TimeSpan>,

    /// Cumulative race time at the measurement, when the feed provides it.
    #[serde(default)]
    pub cumulative: Option<TimeSpan>,

    #[serde(default)]
    pub compound: Option<TyreCompound>,

    #[serde(default)]
    pub pit_in: bool,

    #[serde(default)]
    pub pit_out: bool,

    /// Explicit track position, when the feed provides position deltas.
    #[serde(default)]
    pub position: Option<u32>,
}

// =============================================================================
// Derived events
// =============================================================================

/// An atomic race occurrence on the global timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub driver: DriverId,
    pub time: SessionTime,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Closed set of event kinds; the projector handles all of them
/// exhaustively, so adding a kind is a compile-time-checked change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    LapCompleted {
        lap: u32,
        lap_time: Option<TimeSpan>,
    },
    SectorRecorded {
        lap: u32,
        sector: u8,
        duration: TimeSpan,
    },
    PitStop {
        phase: PitPhase,
    },
    TyreChange {
        compound: TyreCompound,
    },
    PositionChange {
        position: u32,
    },
}

impl EventPayload {
    /// Application order for events sharing a timestamp: a pit stop and its
    /// tyre change logically precede the lap-time and position consequences
    /// they cause. Equal ranks keep input order (stable sort).
    pub(crate) fn apply_rank(&self) -> u8 {
        match self {
            EventPayload::PitStop { .. } => 0,
            EventPayload::TyreChange { .. } => 1,
            EventPayload::SectorRecorded { .. } => 2,
            EventPayload::LapCompleted { .. } => 3,
            EventPayload::PositionChange { .. } => 4,
        }
    }
}

// =============================================================================
// Projected state
// =============================================================================

/// Snapshot of the whole field at one virtual instant.
///
/// Always a pure function of (timeline, virtual time); handed to consumers
/// by value so nothing they hold is ever mutated behind their back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceState {
    /// Virtual time this snapshot corresponds to.
    pub time: SessionTime,

    /// Highest lap any driver has completed.
    pub leader_lap: u32,

    pub total_laps: u32,

    pub track_status: TrackStatus,

    /// Current race order, best first.
    pub leaderboard: Vec<DriverId>,

    pub drivers: BTreeMap<DriverId, DriverState>,

    /// Fastest sector times seen anywhere in the field so far.
    pub session_best_sectors: [Option<TimeSpan>; 3],
}

/// Per-driver slice of the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverState {
    pub status: DriverStatus,

    /// Laps completed.
    pub lap: u32,

    /// Last explicit position from the feed, if any.
    pub position: Option<u32>,

    pub in_pit: bool,

    /// Completed pit stops (counted at pit-out).
    pub pit_stops: u32,

    pub compound: Option<TyreCompound>,

    /// Laps completed since the last tyre change.
    pub tyre_age: u32,

    /// Sector times of the lap in progress.
    pub sectors: [Option<TimeSpan>; 3],

    /// Sector times of the previous lap, kept for display.
    pub prev_sectors: [Option<TimeSpan>; 3],

    pub best_sectors: [Option<TimeSpan>; 3],

    pub last_lap_time: Option<TimeSpan>,

    pub best_lap_time: Option<TimeSpan>,

    pub gap_to_leader: Option<TimeSpan>,

    /// Gap to the car ahead on the leaderboard.
    pub interval: Option<TimeSpan>,

    /// Line-crossing session time per completed lap (index = lap - 1).
    /// Bookkeeping for gap computation, not part of the wire snapshot.
    #[serde(skip)]
    pub(crate) crossings: Vec<SessionTime>,

    /// Timestamp of the driver's most recent event, for retirement
    /// inference.
    #[serde(skip)]
    pub(crate) last_event: Option<SessionTime>,

    /// Lap whose sector times currently occupy `sectors`.
    #[serde(skip)]
    pub(crate) sector_lap: u32,
}

impl DriverState {
    /// Crossing time for a completed lap, if the driver got that far.
    /// Laps missing from the feed are filled forward at build time.
    pub(crate) fn crossing(&self, lap: u32) -> Option<SessionTime> {
        if lap == 0 {
            return None;
        }
        self.crossings.get(lap as usize - 1).copied()
    }
}

// =============================================================================
// Snapshot field masking for the stream boundary
// =============================================================================

/// Selects which top-level `RaceState` sections to serialize.
///
/// Used by the streaming boundary to cut bandwidth when a consumer only
/// needs e.g. the leaderboard.
#[derive(Debug, Clone, Default)]
pub struct SnapshotMask {
    fields: HashSet<String>,
    include_all: bool,
}

impl SnapshotMask {
    /// Mask that includes every section.
    pub fn all() -> Self {
        Self {
            fields: HashSet::new(),
            include_all: true,
        }
    }

    /// Parse a comma-separated list of section names.
    pub fn parse(fields: &str) -> Self {
        let fields: HashSet<String> = fields
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            fields,
            include_all: false,
        }
    }

    pub fn includes(&self, field: &str) -> bool {
        self.include_all || self.fields.contains(&field.to_lowercase())
    }

    pub fn is_all(&self) -> bool {
        self.include_all
    }
}

impl FromStr for SnapshotMask {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl RaceState {
    /// Serialize this snapshot respecting the given mask.
    ///
    /// `time` is always included so consumers can order partial updates.
    pub fn to_json_filtered(&self, mask: Option<&SnapshotMask>) -> serde_json::Result<String> {
        let mask = match mask {
            Some(m) if !m.is_all() => m,
            _ => return serde_json::to_string(self),
        };

        let mut map = serde_json::Map::new();
        if let serde_json::Value::Object(full) = serde_json::to_value(self)? {
            for (key, value) in full {
                if key == "time" || mask.includes(&key) {
                    map.insert(key, value);
                }
            }
        }
        serde_json::to_string(&map)
    }
}
