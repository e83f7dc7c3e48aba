//! Integer-millisecond time types for the replay engine
//!
//! Session time (and the virtual playback position along it) is stored as
//! whole milliseconds so comparisons are exact, `Ord` works, and rebuilding
//! a race state from the same timeline is bit-for-bit reproducible.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub};
use std::time::Duration;

/// An instant on the session clock, in milliseconds since session start.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SessionTime(pub i64);

impl SessionTime {
    pub const ZERO: SessionTime = SessionTime(0);

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1000.0).round() as i64)
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl Sub for SessionTime {
    type Output = TimeSpan;

    fn sub(self, rhs: SessionTime) -> TimeSpan {
        TimeSpan(self.0 - rhs.0)
    }
}

impl Add<TimeSpan> for SessionTime {
    type Output = SessionTime;

    fn add(self, rhs: TimeSpan) -> SessionTime {
        SessionTime(self.0 + rhs.0)
    }
}

impl Sub<TimeSpan> for SessionTime {
    type Output = SessionTime;

    fn sub(self, rhs: TimeSpan) -> SessionTime {
        SessionTime(self.0 - rhs.0)
    }
}

impl AddAssign<TimeSpan> for SessionTime {
    fn add_assign(&mut self, rhs: TimeSpan) {
        self.0 += rhs.0;
    }
}

/// Formats as `H:MM:SS.mmm` (hours omitted when zero).
impl fmt::Display for SessionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let ms = self.0.unsigned_abs();
        let (h, m, s, frac) = (ms / 3_600_000, ms / 60_000 % 60, ms / 1000 % 60, ms % 1000);
        if h > 0 {
            write!(f, "{sign}{h}:{m:02}:{s:02}.{frac:03}")
        } else {
            write!(f, "{sign}{m}:{s:02}.{frac:03}")
        }
    }
}

/// A signed span between two session instants, in milliseconds.
///
/// Used for lap/sector times, gaps and intervals.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimeSpan(pub i64);

impl TimeSpan {
    pub const ZERO: TimeSpan = TimeSpan(0);

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1000.0).round() as i64)
    }

    /// Converts an elapsed wall-clock duration into virtual time at the
    /// given speed multiplier.
    pub fn from_wall(wall: Duration, speed: f64) -> Self {
        Self((wall.as_secs_f64() * speed * 1000.0).round() as i64)
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for TimeSpan {
    type Output = TimeSpan;

    fn add(self, rhs: TimeSpan) -> TimeSpan {
        TimeSpan(self.0 + rhs.0)
    }
}

impl Sub for TimeSpan {
    type Output = TimeSpan;

    fn sub(self, rhs: TimeSpan) -> TimeSpan {
        TimeSpan(self.0 - rhs.0)
    }
}

impl Neg for TimeSpan {
    type Output = TimeSpan;

    fn neg(self) -> TimeSpan {
        TimeSpan(-self.0)
    }
}

/// Formats as `M:SS.mmm`, with a leading `-` for negative spans.
impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let ms = self.0.unsigned_abs();
        let (m, s, frac) = (ms / 60_000, ms / 1000 % 60, ms % 1000);
        if m > 0 {
            write!(f, "{sign}{m}:{s:02}.{frac:03}")
        } else {
            write!(f, "{sign}{s}.{frac:03}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_time_roundtrip_secs() {
        let t = SessionTime::from_secs_f64(91.5);
        assert_eq!(t.as_millis(), 91_500);
        assert!((t.as_secs_f64() - 91.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_session_time_arithmetic() {
        let a = SessionTime::from_millis(90_000);
        let b = SessionTime::from_millis(91_500);
        assert_eq!(b - a, TimeSpan::from_millis(1500));
        assert_eq!(a + TimeSpan::from_millis(1500), b);

        let mut c = a;
        c += TimeSpan::from_millis(500);
        assert_eq!(c.as_millis(), 90_500);
    }

    #[test]
    fn test_from_wall_scales_by_speed() {
        let span = TimeSpan::from_wall(Duration::from_millis(100), 4.0);
        assert_eq!(span.as_millis(), 400);

        let paused = TimeSpan::from_wall(Duration::from_secs(10), 0.0);
        assert_eq!(paused, TimeSpan::ZERO);
    }

    #[test]
    fn test_clamp() {
        let lo = SessionTime::from_millis(10);
        let hi = SessionTime::from_millis(20);
        assert_eq!(SessionTime::from_millis(5).clamp(lo, hi), lo);
        assert_eq!(SessionTime::from_millis(25).clamp(lo, hi), hi);
        assert_eq!(SessionTime::from_millis(15).clamp(lo, hi).as_millis(), 15);
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(SessionTime::from_millis(5_025_123).to_string(), "1:23:45.123");
        assert_eq!(SessionTime::from_millis(83_456).to_string(), "1:23.456");
        assert_eq!(TimeSpan::from_millis(-1500).to_string(), "-1.500");
        assert_eq!(TimeSpan::from_millis(92_301).to_string(), "1:32.301");
    }

    #[test]
    fn test_serializes_as_plain_millis() {
        let json = serde_json::to_string(&SessionTime::from_millis(1234)).unwrap();
        assert_eq!(json, "1234");
        let back: SessionTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_millis(), 1234);
    }
}
