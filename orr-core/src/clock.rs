//! Virtual playback clock
//!
//! Tracks the current position along session time, independent of how fast
//! wall time passes. The owner feeds it measured wall-clock deltas; the
//! clock scales them by the speed multiplier. Seeks bump a generation
//! counter so projector work computed against a pre-seek time can be
//! recognized as stale and discarded.

use crate::time::{SessionTime, TimeSpan};
use serde::Serialize;
use std::time::Duration;

/// Highest accepted speed multiplier.
pub const MAX_SPEED: f64 = 64.0;

/// Coarse playback state for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockStatus {
    Running,
    Paused,
    /// Virtual time has reached the end of the timeline. The clock stays
    /// queryable and a backward seek remains valid.
    Ended,
}

#[derive(Debug, Clone)]
pub struct PlaybackClock {
    current: SessionTime,
    start: SessionTime,
    end: SessionTime,
    speed: f64,
    /// Speed to restore on `resume()`.
    resume_speed: f64,
    generation: u64,
}

impl PlaybackClock {
    pub fn new(start: SessionTime, end: SessionTime) -> Self {
        Self {
            current: start,
            start,
            end,
            speed: 1.0,
            resume_speed: 1.0,
            generation: 0,
        }
    }

    pub fn current(&self) -> SessionTime {
        self.current
    }

    pub fn start(&self) -> SessionTime {
        self.start
    }

    pub fn end(&self) -> SessionTime {
        self.end
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_paused(&self) -> bool {
        self.speed == 0.0
    }

    pub fn is_ended(&self) -> bool {
        self.current >= self.end
    }

    pub fn status(&self) -> ClockStatus {
        if self.is_ended() {
            ClockStatus::Ended
        } else if self.is_paused() {
            ClockStatus::Paused
        } else {
            ClockStatus::Running
        }
    }

    /// Change how much virtual time elapses per second of wall time, from
    /// the next tick on. Clamped to `[0, MAX_SPEED]`; zero pauses.
    pub fn set_speed(&mut self, multiplier: f64) {
        let speed = if multiplier.is_finite() {
            multiplier.clamp(0.0, MAX_SPEED)
        } else {
            0.0
        };
        if speed > 0.0 {
            self.resume_speed = speed;
        }
        self.speed = speed;
    }

    pub fn pause(&mut self) {
        if self.speed > 0.0 {
            self.resume_speed = self.speed;
            self.speed = 0.0;
        }
    }

    /// Restore the speed in effect before the last pause.
    pub fn resume(&mut self) {
        if self.speed == 0.0 {
            self.speed = self.resume_speed;
        }
    }

    /// Jump directly to `target`, clamped to the timeline bounds. Bumps the
    /// generation counter so in-flight tick work is discarded, not applied.
    pub fn seek(&mut self, target: SessionTime) -> SessionTime {
        self.current = target.clamp(self.start, self.end);
        self.generation += 1;
        self.current
    }

    /// Advance virtual time by `wall_elapsed * speed`, never past the end.
    pub fn tick(&mut self, wall_elapsed: Duration) -> SessionTime {
        if self.speed > 0.0 {
            self.current = (self.current + TimeSpan::from_wall(wall_elapsed, self.speed))
                .min(self.end);
        }
        self.current
    }
}
