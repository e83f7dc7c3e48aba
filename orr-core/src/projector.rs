//! Incremental race-state projection
//!
//! Maintains the `RaceState` for the playback clock's current position
//! without replaying the whole session on every tick: forward movement
//! applies only the events in the delta, backward movement restarts from
//! the nearest prior checkpoint (or session start) and replays forward.
//! The projected state is a pure function of (timeline, virtual time) —
//! every path to a given time produces an identical snapshot.

use crate::model::{
    DriverId, DriverState, DriverStatus, Event, EventPayload, PitPhase, RaceState,
};
use crate::time::{SessionTime, TimeSpan};
use crate::timeline::Timeline;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// How the leaderboard is derived when ranking the field.
///
/// Kept configurable: source data edge cases (safety cars, retirements)
/// may need the fallback rule adjusted without touching the projector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// Explicit position data is authoritative where present; drivers
    /// without it rank by laps completed, then crossing time.
    #[default]
    PositionThenTime,
    /// Ignore explicit positions entirely; rank purely by progress.
    TimeOnly,
}

#[derive(Debug, Clone, Copy)]
pub struct ProjectorConfig {
    /// Virtual-time spacing of rewind checkpoints. Zero disables
    /// checkpointing (backward seeks rebuild from session start).
    pub checkpoint_interval: TimeSpan,

    /// A driver producing no event for this much virtual time while the
    /// session continues is marked retired. Zero disables the inference.
    pub retirement_threshold: TimeSpan,

    pub ordering: OrderingPolicy,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: TimeSpan::from_millis(60_000),
            retirement_threshold: TimeSpan::from_millis(120_000),
            ordering: OrderingPolicy::default(),
        }
    }
}

/// Saved restart point for backward seeks.
#[derive(Debug, Clone)]
struct Checkpoint {
    time: SessionTime,
    cursor: usize,
    state: RaceState,
}

pub struct StateProjector {
    timeline: Arc<Timeline>,
    config: ProjectorConfig,
    state: RaceState,
    /// Index of the next unapplied event.
    cursor: usize,
    checkpoints: Vec<Checkpoint>,
    next_checkpoint: SessionTime,
}

impl StateProjector {
    pub fn new(timeline: Arc<Timeline>) -> Self {
        Self::with_config(timeline, ProjectorConfig::default())
    }

    pub fn with_config(timeline: Arc<Timeline>, config: ProjectorConfig) -> Self {
        let state = initial_state(&timeline);
        let next_checkpoint = timeline.start() + config.checkpoint_interval;
        Self {
            timeline,
            config,
            state,
            cursor: 0,
            checkpoints: Vec::new(),
            next_checkpoint,
        }
    }

    /// The retained state. Callers that hand state to other components
    /// must use `snapshot()` instead; this reference is mutated in place
    /// on the next advance.
    pub fn current(&self) -> &RaceState {
        &self.state
    }

    /// Immutable copy of the current state.
    pub fn snapshot(&self) -> RaceState {
        self.state.clone()
    }

    /// Move the projection to virtual time `t`, in either direction.
    pub fn advance_to(&mut self, t: SessionTime) {
        if t < self.state.time {
            self.rewind_to(t);
        }
        self.run_forward(t);
    }

    /// Restore the nearest restart point at or before `t`.
    fn rewind_to(&mut self, t: SessionTime) {
        match self.checkpoints.iter().rposition(|c| c.time <= t) {
            Some(idx) => {
                let checkpoint = &self.checkpoints[idx];
                self.state = checkpoint.state.clone();
                self.cursor = checkpoint.cursor;
            }
            None => {
                self.state = initial_state(&self.timeline);
                self.cursor = 0;
            }
        }
    }

    fn run_forward(&mut self, t: SessionTime) {
        let timeline = Arc::clone(&self.timeline);
        let events = timeline.events();

        while self.cursor < events.len() && events[self.cursor].time <= t {
            let event = &events[self.cursor];

            // Record restart points as boundaries are crossed. Boundaries
            // already passed once are never re-recorded (`next_checkpoint`
            // survives rewinds), so the set stays duplicate-free.
            if self.config.checkpoint_interval > TimeSpan::ZERO {
                while event.time > self.next_checkpoint {
                    self.checkpoints.push(Checkpoint {
                        time: self.next_checkpoint,
                        cursor: self.cursor,
                        state: self.state.clone(),
                    });
                    self.next_checkpoint += self.config.checkpoint_interval;
                }
            }

            // Retirement state must be current as of the event's own time,
            // not of the advance target; otherwise a re-rank triggered by
            // this event would depend on how the caller stepped here.
            self.sweep_retirements(event.time);
            self.apply_event(event);
            self.cursor += 1;
        }

        self.settle(t);
    }

    /// Mutate the retained state with one event.
    fn apply_event(&mut self, event: &Event) {
        let state = &mut self.state;
        let total_laps = state.total_laps;
        let Some(driver) = state.drivers.get_mut(&event.driver) else {
            return;
        };

        driver.last_event = Some(event.time);
        if matches!(driver.status, DriverStatus::Grid | DriverStatus::Retired) {
            driver.status = DriverStatus::OnTrack;
        }

        match event.payload {
            EventPayload::LapCompleted { lap, lap_time } => {
                driver.lap = driver.lap.max(lap);
                // Fill forward over laps missing from the feed so shared-lap
                // gap lookups stay defined.
                while driver.crossings.len() < lap as usize {
                    driver.crossings.push(event.time);
                }
                driver.last_lap_time = lap_time;
                if let Some(lap_time) = lap_time {
                    if driver.best_lap_time.map_or(true, |best| lap_time < best) {
                        driver.best_lap_time = Some(lap_time);
                    }
                }
                driver.tyre_age += 1;
                if total_laps > 0 && lap >= total_laps {
                    driver.status = DriverStatus::Finished;
                    driver.in_pit = false;
                }

                state.leader_lap = state.leader_lap.max(lap);
                rerank(state, self.config.ordering);
                recompute_gaps(state, &event.driver);
            }

            EventPayload::SectorRecorded {
                lap,
                sector,
                duration,
            } => {
                if lap > driver.sector_lap {
                    driver.prev_sectors = driver.sectors;
                    driver.sectors = [None; 3];
                    driver.sector_lap = lap;
                }
                let idx = (sector as usize).saturating_sub(1);
                if idx < 3 {
                    driver.sectors[idx] = Some(duration);
                    if driver.best_sectors[idx].map_or(true, |best| duration < best) {
                        driver.best_sectors[idx] = Some(duration);
                    }
                    if state.session_best_sectors[idx].map_or(true, |best| duration < best) {
                        state.session_best_sectors[idx] = Some(duration);
                    }
                }
            }

            EventPayload::PitStop { phase } => match phase {
                PitPhase::In => {
                    driver.in_pit = true;
                    if driver.status != DriverStatus::Finished {
                        driver.status = DriverStatus::InPit;
                    }
                }
                PitPhase::Out => {
                    driver.in_pit = false;
                    driver.pit_stops += 1;
                    if driver.status != DriverStatus::Finished {
                        driver.status = DriverStatus::OnTrack;
                    }
                }
            },

            EventPayload::TyreChange { compound } => {
                driver.compound = Some(compound);
                driver.tyre_age = 0;
            }

            EventPayload::PositionChange { position } => {
                driver.position = Some(position);
                rerank(state, self.config.ordering);
            }
        }
    }

    /// Final per-advance bookkeeping that depends on the target time
    /// rather than on any single event: snapshot time, flag state, and the
    /// retirement sweep. Pure in (state, t), so every path to `t` agrees.
    fn settle(&mut self, t: SessionTime) {
        self.state.time = t;
        self.state.track_status = self.timeline.status_at(t);
        self.sweep_retirements(t);
    }

    /// Mark drivers silent for longer than the threshold as retired, as of
    /// virtual time `at`. Never reverses: a later event for the driver
    /// revives them, a rebuild recomputes from scratch.
    fn sweep_retirements(&mut self, at: SessionTime) {
        let threshold = self.config.retirement_threshold;
        if threshold <= TimeSpan::ZERO {
            return;
        }
        let session_start = self.timeline.start();
        for driver in self.state.drivers.values_mut() {
            if matches!(
                driver.status,
                DriverStatus::Grid | DriverStatus::OnTrack | DriverStatus::InPit
            ) {
                let last = driver.last_event.unwrap_or(session_start);
                if at - last > threshold {
                    driver.status = DriverStatus::Retired;
                    driver.in_pit = false;
                }
            }
        }
    }
}

fn initial_state(timeline: &Timeline) -> RaceState {
    let drivers: BTreeMap<DriverId, DriverState> = timeline
        .drivers()
        .iter()
        .cloned()
        .map(|id| (id, DriverState::default()))
        .collect();

    RaceState {
        time: timeline.start(),
        leader_lap: 0,
        total_laps: timeline.total_laps(),
        track_status: Default::default(),
        leaderboard: drivers.keys().cloned().collect(),
        drivers,
        session_best_sectors: [None; 3],
    }
}

/// Re-derive the leaderboard. Only called for events that may change race
/// order (lap completions, explicit position changes); sector times, pit
/// phases and the retirement sweep leave the order untouched.
fn rerank(state: &mut RaceState, policy: OrderingPolicy) {
    let mut order: Vec<DriverId> = state.drivers.keys().cloned().collect();
    order.sort_by(|a, b| {
        compare_drivers(&state.drivers[a], &state.drivers[b], policy).then_with(|| a.cmp(b))
    });
    state.leaderboard = order;
}

fn compare_drivers(a: &DriverState, b: &DriverState, policy: OrderingPolicy) -> Ordering {
    let retired = |d: &DriverState| matches!(d.status, DriverStatus::Retired) as u8;
    retired(a).cmp(&retired(b)).then_with(|| match policy {
        OrderingPolicy::PositionThenTime => match (a.position, b.position) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| by_progress(a, b)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => by_progress(a, b),
        },
        OrderingPolicy::TimeOnly => by_progress(a, b),
    })
}

/// Laps completed descending, then crossing time at the shared lap
/// ascending: a driver on fewer laps ranks behind.
fn by_progress(a: &DriverState, b: &DriverState) -> Ordering {
    b.lap.cmp(&a.lap).then_with(|| {
        let shared = a.lap.min(b.lap);
        match (a.crossing(shared), b.crossing(shared)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    })
}

/// Refresh gap-to-leader and gap-to-car-ahead for one driver, using the
/// cumulative time delta at the shared (minimum) completed lap — the gap a
/// live feed would show as the car crosses the line.
fn recompute_gaps(state: &mut RaceState, driver: &DriverId) {
    let Some(idx) = state.leaderboard.iter().position(|d| d == driver) else {
        return;
    };
    if idx == 0 {
        if let Some(d) = state.drivers.get_mut(driver) {
            d.gap_to_leader = Some(TimeSpan::ZERO);
            d.interval = Some(TimeSpan::ZERO);
        }
        return;
    }

    let leader = state.leaderboard[0].clone();
    let ahead = state.leaderboard[idx - 1].clone();
    let gap_to_leader = shared_lap_gap(state, driver, &leader);
    let interval = shared_lap_gap(state, driver, &ahead);
    if let Some(d) = state.drivers.get_mut(driver) {
        d.gap_to_leader = gap_to_leader;
        d.interval = interval;
    }
}

fn shared_lap_gap(state: &RaceState, behind: &DriverId, ahead: &DriverId) -> Option<TimeSpan> {
    let behind = state.drivers.get(behind)?;
    let ahead = state.drivers.get(ahead)?;
    let shared = behind.lap.min(ahead.lap);
    Some(behind.crossing(shared)? - ahead.crossing(shared)?)
}
