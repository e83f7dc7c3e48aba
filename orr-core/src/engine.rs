//! Replay engine
//!
//! Owns the playback clock and the state projector and keeps them
//! consistent: control operations re-project immediately so a consumer
//! never observes a seek without its state, and tick work is tagged with
//! the clock generation so an update computed against a pre-seek time is
//! discarded instead of applied. Runtime-free — the caller supplies
//! measured wall-clock deltas, which makes the whole engine deterministic
//! under synthetic ticks.

use crate::clock::{ClockStatus, PlaybackClock};
use crate::model::{DriverId, RaceState};
use crate::projector::{ProjectorConfig, StateProjector};
use crate::time::{SessionTime, TimeSpan};
use crate::timeline::{Timeline, TimelineError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Receipt for an in-flight tick: the clock position it advanced to and
/// the generation it was computed against. `commit_tick` refuses receipts
/// that a later seek has made stale.
#[derive(Debug, Clone, Copy)]
pub struct TickToken {
    generation: u64,
    target: SessionTime,
}

pub struct ReplayEngine {
    session: String,
    timeline: Arc<Timeline>,
    clock: PlaybackClock,
    projector: StateProjector,
}

impl ReplayEngine {
    /// Fails on an empty timeline — the one fatal condition, since there
    /// is nothing to replay.
    pub fn new(session: impl Into<String>, timeline: Timeline) -> Result<Self, TimelineError> {
        Self::with_config(session, timeline, ProjectorConfig::default())
    }

    pub fn with_config(
        session: impl Into<String>,
        timeline: Timeline,
        config: ProjectorConfig,
    ) -> Result<Self, TimelineError> {
        if timeline.is_empty() {
            return Err(TimelineError::EmptyTimeline);
        }
        let timeline = Arc::new(timeline);
        let clock = PlaybackClock::new(timeline.start(), timeline.end());
        let mut projector = StateProjector::with_config(Arc::clone(&timeline), config);
        // Events at the very first instant belong to the initial state.
        projector.advance_to(clock.current());

        Ok(Self {
            session: session.into(),
            timeline,
            clock,
            projector,
        })
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn play(&mut self) {
        self.clock.resume();
    }

    pub fn pause(&mut self) {
        self.clock.pause();
    }

    pub fn set_speed(&mut self, multiplier: f64) {
        self.clock.set_speed(multiplier);
    }

    /// Jump to an absolute session time (clamped) and re-project at once.
    pub fn seek_to(&mut self, target: SessionTime) -> &RaceState {
        let target = self.clock.seek(target);
        self.projector.advance_to(target);
        self.projector.current()
    }

    /// Jump relative to the current position.
    pub fn seek_by(&mut self, delta: TimeSpan) -> &RaceState {
        self.seek_to(self.clock.current() + delta)
    }

    /// Advance the clock by a measured wall-clock delta and obtain the
    /// receipt for the matching projector update.
    pub fn begin_tick(&mut self, wall_elapsed: Duration) -> TickToken {
        TickToken {
            generation: self.clock.generation(),
            target: self.clock.tick(wall_elapsed),
        }
    }

    /// Apply a tick receipt. Returns `None` — and leaves the state
    /// untouched — when a seek superseded the receipt's generation.
    pub fn commit_tick(&mut self, token: TickToken) -> Option<&RaceState> {
        if token.generation != self.clock.generation() {
            return None;
        }
        self.projector.advance_to(token.target);
        Some(self.projector.current())
    }

    /// `begin_tick` + `commit_tick` in one step, for callers that hold the
    /// engine across the whole tick.
    pub fn tick(&mut self, wall_elapsed: Duration) -> Option<&RaceState> {
        let token = self.begin_tick(wall_elapsed);
        self.commit_tick(token)
    }

    /// Immutable copy of the current race state.
    pub fn snapshot(&self) -> RaceState {
        self.projector.snapshot()
    }

    pub fn info(&self) -> ReplayInfo {
        ReplayInfo {
            session: self.session.clone(),
            start: self.timeline.start(),
            end: self.timeline.end(),
            current: self.clock.current(),
            speed: self.clock.speed(),
            status: self.clock.status(),
            total_events: self.timeline.len(),
            total_laps: self.timeline.total_laps(),
            drivers: self.timeline.drivers().to_vec(),
            dropped_samples: self.timeline.dropped().len(),
            generated_at: Utc::now(),
        }
    }
}

/// Serializable replay description for the API boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayInfo {
    pub session: String,
    pub start: SessionTime,
    pub end: SessionTime,
    pub current: SessionTime,
    pub speed: f64,
    pub status: ClockStatus,
    pub total_events: usize,
    pub total_laps: u32,
    pub drivers: Vec<DriverId>,
    pub dropped_samples: usize,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TimingSample;

    fn lap_sample(driver: &str, secs: f64, lap: u32) -> TimingSample {
        TimingSample {
            driver: DriverId::from(driver),
            session_time: Some(SessionTime::from_secs_f64(secs)),
            lap,
            sector: 0,
            sector_time: None,
            lap_time: Some(TimeSpan::from_secs_f64(90.0)),
            cumulative: None,
            compound: None,
            pit_in: false,
            pit_out: false,
            position: None,
        }
    }

    fn engine() -> ReplayEngine {
        let samples = vec![
            lap_sample("AAA", 90.0, 1),
            lap_sample("AAA", 180.0, 2),
            lap_sample("AAA", 270.0, 3),
        ];
        ReplayEngine::new("test", Timeline::build(&samples).unwrap()).unwrap()
    }

    #[test]
    fn test_empty_timeline_refused() {
        let timeline = Timeline::build(&[lap_sample("AAA", 90.0, 1)]).unwrap();
        assert!(ReplayEngine::new("ok", timeline).is_ok());
        // An empty build already fails, so emptiness can only be proven at
        // the error type level here.
        assert_eq!(
            Timeline::build(&[]).unwrap_err(),
            TimelineError::EmptyTimeline
        );
    }

    #[test]
    fn test_tick_advances_and_projects() {
        let mut e = engine();
        e.set_speed(10.0);
        let state = e.tick(Duration::from_secs(10)).unwrap();
        assert_eq!(state.time.as_millis(), 190_000);
        assert_eq!(state.drivers[&DriverId::from("AAA")].lap, 2);
    }

    #[test]
    fn test_stale_tick_is_discarded() {
        let mut e = engine();
        e.set_speed(10.0);

        let token = e.begin_tick(Duration::from_secs(10));
        // A seek lands between the clock advance and the state update.
        e.seek_to(SessionTime::from_secs_f64(95.0));

        assert!(e.commit_tick(token).is_none());
        // The seek's projection stands.
        assert_eq!(e.snapshot().time.as_millis(), 95_000);
    }

    #[test]
    fn test_seek_projects_immediately() {
        let mut e = engine();
        let state = e.seek_to(SessionTime::from_secs_f64(185.0));
        assert_eq!(state.drivers[&DriverId::from("AAA")].lap, 2);
    }

    #[test]
    fn test_seek_by_is_relative_and_clamped() {
        let mut e = engine();
        e.seek_to(SessionTime::from_secs_f64(180.0));
        let start = e.timeline().start();
        let state = e.seek_by(TimeSpan::from_secs_f64(-1e6));
        assert_eq!(state.time, start);
    }

    #[test]
    fn test_pause_resume_roundtrip() {
        let mut e = engine();
        e.set_speed(4.0);
        e.pause();
        let t = e.tick(Duration::from_secs(1)).unwrap().time;
        assert_eq!(t, e.timeline().start());
        e.play();
        assert_eq!(e.clock().speed(), 4.0);
    }

    #[test]
    fn test_info_reflects_clock_and_timeline() {
        let mut e = engine();
        e.seek_to(SessionTime::from_secs_f64(270.0));
        let info = e.info();
        assert_eq!(info.session, "test");
        assert_eq!(info.total_events, 3);
        assert_eq!(info.total_laps, 3);
        assert_eq!(info.status, ClockStatus::Ended);
        assert_eq!(info.drivers, vec![DriverId::from("AAA")]);
        assert_eq!(info.dropped_samples, 0);
    }
}
