//! Timeline construction
//!
//! Normalizes raw per-driver timing samples into one globally ordered,
//! immutable sequence of events, plus a per-driver index. Samples with no
//! establishable timestamp are dropped and reported, never fatal; only a
//! session that yields zero usable events fails to build.

use crate::model::{
    DriverId, Event, EventPayload, PitPhase, TimingSample, TrackStatus, TyreCompound,
};
use crate::time::SessionTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that abort a timeline build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimelineError {
    #[error("session produced no usable timing events")]
    EmptyTimeline,
}

/// Why a single sample was left out of the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SampleError {
    #[error("no session time and no cumulative time to derive one")]
    NoTimestamp,
    #[error("negative timestamp ({millis}ms)")]
    NegativeTimestamp { millis: i64 },
}

/// Build-report entry for a dropped sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedSample {
    /// Index into the input sample collection.
    pub index: usize,
    pub driver: DriverId,
    pub reason: SampleError,
}

/// One point on the session-wide flag timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPoint {
    pub time: SessionTime,
    pub status: TrackStatus,
}

/// Globally ordered event sequence for one session. Immutable once built.
#[derive(Debug, Clone)]
pub struct Timeline {
    events: Vec<Event>,
    by_driver: HashMap<DriverId, Vec<usize>>,
    status: Vec<StatusPoint>,
    drivers: Vec<DriverId>,
    start: SessionTime,
    end: SessionTime,
    total_laps: u32,
    dropped: Vec<DroppedSample>,
}

impl Timeline {
    /// Build from samples alone (no flag data).
    pub fn build(samples: &[TimingSample]) -> Result<Timeline, TimelineError> {
        Self::build_with_status(samples, &[])
    }

    /// Build from samples plus a session-wide track-status timeline.
    pub fn build_with_status(
        samples: &[TimingSample],
        status: &[StatusPoint],
    ) -> Result<Timeline, TimelineError> {
        let mut dropped = Vec::new();

        // Timestamp every sample first; conversion below must see each
        // driver's samples in chronological order for change detection.
        let mut stamped: Vec<(SessionTime, usize)> = Vec::with_capacity(samples.len());
        for (index, sample) in samples.iter().enumerate() {
            match establish_timestamp(sample) {
                Ok(time) => stamped.push((time, index)),
                Err(reason) => dropped.push(DroppedSample {
                    index,
                    driver: sample.driver.clone(),
                    reason,
                }),
            }
        }
        stamped.sort_by_key(|&(time, index)| (time, index));

        let mut events = Vec::new();
        let mut last_compound: HashMap<DriverId, _> = HashMap::new();
        let mut last_position: HashMap<DriverId, u32> = HashMap::new();
        for &(time, index) in &stamped {
            convert_sample(
                &samples[index],
                time,
                &mut last_compound,
                &mut last_position,
                &mut events,
            );
        }

        // Stable sort keeps input order within equal (time, rank), which
        // pins rebuild determinism.
        events.sort_by_key(|e| (e.time, e.payload.apply_rank()));

        if events.is_empty() {
            return Err(TimelineError::EmptyTimeline);
        }

        let mut by_driver: HashMap<DriverId, Vec<usize>> = HashMap::new();
        for (idx, event) in events.iter().enumerate() {
            by_driver.entry(event.driver.clone()).or_default().push(idx);
        }

        let mut drivers: Vec<DriverId> = by_driver.keys().cloned().collect();
        drivers.sort();

        let total_laps = events
            .iter()
            .filter_map(|e| match e.payload {
                EventPayload::LapCompleted { lap, .. } => Some(lap),
                EventPayload::SectorRecorded { lap, .. } => Some(lap),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        let start = events.first().map(|e| e.time).unwrap_or_default();
        let end = events.last().map(|e| e.time).unwrap_or_default();

        let mut status: Vec<StatusPoint> = status.to_vec();
        status.sort_by_key(|p| p.time);

        Ok(Timeline {
            events,
            by_driver,
            status,
            drivers,
            start,
            end,
            total_laps,
            dropped,
        })
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events belonging to one driver, in timeline order.
    pub fn driver_events(&self, driver: &DriverId) -> impl Iterator<Item = &Event> {
        self.by_driver
            .get(driver)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|&idx| &self.events[idx])
    }

    /// Sorted roster of every driver with at least one event.
    pub fn drivers(&self) -> &[DriverId] {
        &self.drivers
    }

    pub fn start(&self) -> SessionTime {
        self.start
    }

    pub fn end(&self) -> SessionTime {
        self.end
    }

    pub fn total_laps(&self) -> u32 {
        self.total_laps
    }

    /// Flag state in effect at `t`.
    pub fn status_at(&self, t: SessionTime) -> TrackStatus {
        let idx = self.status.partition_point(|p| p.time <= t);
        if idx == 0 {
            TrackStatus::default()
        } else {
            self.status[idx - 1].status
        }
    }

    pub fn status_points(&self) -> &[StatusPoint] {
        &self.status
    }

    /// Samples dropped during the build, with reasons.
    pub fn dropped(&self) -> &[DroppedSample] {
        &self.dropped
    }
}

fn establish_timestamp(sample: &TimingSample) -> Result<SessionTime, SampleError> {
    let time = sample
        .session_time
        .or_else(|| sample.cumulative.map(|c| SessionTime::from_millis(c.as_millis())))
        .ok_or(SampleError::NoTimestamp)?;
    if time < SessionTime::ZERO {
        return Err(SampleError::NegativeTimestamp {
            millis: time.as_millis(),
        });
    }
    Ok(time)
}

/// Expand one sample into its events. Push order matches `apply_rank` so
/// the stable sort never reorders events of a single sample.
fn convert_sample(
    sample: &TimingSample,
    time: SessionTime,
    last_compound: &mut HashMap<DriverId, TyreCompound>,
    last_position: &mut HashMap<DriverId, u32>,
    events: &mut Vec<Event>,
) {
    let mut push = |payload: EventPayload| {
        events.push(Event {
            driver: sample.driver.clone(),
            time,
            payload,
        })
    };

    if sample.pit_in {
        push(EventPayload::PitStop {
            phase: PitPhase::In,
        });
    }
    if sample.pit_out {
        push(EventPayload::PitStop {
            phase: PitPhase::Out,
        });
    }

    if let Some(compound) = sample.compound {
        // The first known compound also counts, so tyre age starts at zero.
        if last_compound.insert(sample.driver.clone(), compound) != Some(compound) {
            push(EventPayload::TyreChange { compound });
        }
    }

    if sample.sector >= 1 {
        if let Some(sector_time) = sample.sector_time {
            push(EventPayload::SectorRecorded {
                lap: sample.lap,
                sector: sample.sector,
                duration: sector_time,
            });
        }
    } else if sample.lap_time.is_some() || sample.cumulative.is_some() {
        // A lap-aggregate sample needs an actual lap measurement; samples
        // that only mark a pit crossing or a position delta carry neither
        // and must not fabricate a lap crossing.
        push(EventPayload::LapCompleted {
            lap: sample.lap,
            lap_time: sample.lap_time,
        });
    }

    if let Some(position) = sample.position {
        if last_position.insert(sample.driver.clone(), position) != Some(position) {
            push(EventPayload::PositionChange { position });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TimeSpan;

    fn sample(driver: &str, secs: f64, lap: u32) -> TimingSample {
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

    #[test]
    fn test_build_sorts_globally_by_time() {
        let samples = vec![
            sample("HAM", 91.5, 1),
            sample("VER", 90.0, 1),
            sample("HAM", 183.0, 2),
            sample("VER", 180.5, 2),
        ];
        let timeline = Timeline::build(&samples).unwrap();
        let times: Vec<i64> = timeline.events().iter().map(|e| e.time.as_millis()).collect();
        assert_eq!(times, vec![90_000, 91_500, 180_500, 183_000]);
        assert_eq!(timeline.start().as_millis(), 90_000);
        assert_eq!(timeline.end().as_millis(), 183_000);
        assert_eq!(timeline.total_laps(), 2);
    }

    #[test]
    fn test_pit_events_sort_before_lap_at_same_instant() {
        let mut pit = sample("VER", 100.0, 3);
        pit.lap_time = None;
        pit.pit_in = true;
        let lap = sample("VER", 100.0, 3);

        // Lap sample first in input; pit must still apply first.
        let timeline = Timeline::build(&[lap, pit]).unwrap();
        assert!(matches!(
            timeline.events()[0].payload,
            EventPayload::PitStop {
                phase: PitPhase::In
            }
        ));
        assert!(matches!(
            timeline.events()[1].payload,
            EventPayload::LapCompleted { lap: 3, .. }
        ));
    }

    #[test]
    fn test_sample_without_timestamp_is_dropped_not_fatal() {
        let mut bad = sample("HAM", 0.0, 1);
        bad.session_time = None;
        let samples = vec![sample("VER", 90.0, 1), bad];

        let timeline = Timeline::build(&samples).unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.dropped().len(), 1);
        assert_eq!(timeline.dropped()[0].index, 1);
        assert_eq!(timeline.dropped()[0].reason, SampleError::NoTimestamp);
    }

    #[test]
    fn test_timestamp_derivable_from_cumulative() {
        let mut s = sample("VER", 0.0, 1);
        s.session_time = None;
        s.cumulative = Some(TimeSpan::from_secs_f64(90.0));
        let timeline = Timeline::build(&[s]).unwrap();
        assert_eq!(timeline.events()[0].time.as_millis(), 90_000);
    }

    #[test]
    fn test_negative_timestamp_is_dropped() {
        let samples = vec![sample("VER", 90.0, 1), sample("HAM", -1.0, 1)];
        let timeline = Timeline::build(&samples).unwrap();
        assert_eq!(timeline.len(), 1);
        assert!(matches!(
            timeline.dropped()[0].reason,
            SampleError::NegativeTimestamp { millis: -1000 }
        ));
    }

    #[test]
    fn test_empty_build_fails() {
        assert_eq!(
            Timeline::build(&[]).unwrap_err(),
            TimelineError::EmptyTimeline
        );

        let mut bad = sample("VER", 0.0, 1);
        bad.session_time = None;
        assert_eq!(
            Timeline::build(&[bad]).unwrap_err(),
            TimelineError::EmptyTimeline
        );
    }

    #[test]
    fn test_first_compound_emits_tyre_change() {
        let mut s1 = sample("VER", 90.0, 1);
        s1.compound = Some(TyreCompound::Medium);
        let mut s2 = sample("VER", 180.0, 2);
        s2.compound = Some(TyreCompound::Medium);
        let mut s3 = sample("VER", 270.0, 3);
        s3.compound = Some(TyreCompound::Hard);

        let timeline = Timeline::build(&[s1, s2, s3]).unwrap();
        let changes: Vec<TyreCompound> = timeline
            .events()
            .iter()
            .filter_map(|e| match e.payload {
                EventPayload::TyreChange { compound } => Some(compound),
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![TyreCompound::Medium, TyreCompound::Hard]);
    }

    #[test]
    fn test_position_change_only_on_change() {
        let mut s1 = sample("VER", 90.0, 1);
        s1.position = Some(2);
        let mut s2 = sample("VER", 180.0, 2);
        s2.position = Some(2);
        let mut s3 = sample("VER", 270.0, 3);
        s3.position = Some(1);

        let timeline = Timeline::build(&[s1, s2, s3]).unwrap();
        let positions: Vec<u32> = timeline
            .events()
            .iter()
            .filter_map(|e| match e.payload {
                EventPayload::PositionChange { position } => Some(position),
                _ => None,
            })
            .collect();
        assert_eq!(positions, vec![2, 1]);
    }

    #[test]
    fn test_pit_marker_sample_produces_no_lap_event() {
        let mut out = sample("VER", 120.0, 4);
        out.lap_time = None;
        out.pit_out = true;
        let timeline = Timeline::build(&[out]).unwrap();
        assert_eq!(timeline.len(), 1);
        assert!(matches!(
            timeline.events()[0].payload,
            EventPayload::PitStop {
                phase: PitPhase::Out
            }
        ));
    }

    #[test]
    fn test_missing_sector_is_skipped_without_aborting() {
        let mut s = sample("VER", 30.0, 1);
        s.sector = 2;
        s.lap_time = None;
        s.sector_time = None; // sector measurement missing from the feed
        let samples = vec![s, sample("VER", 90.0, 1)];
        let timeline = Timeline::build(&samples).unwrap();
        assert_eq!(timeline.len(), 1);
        assert!(timeline.dropped().is_empty());
    }

    #[test]
    fn test_driver_index_filters_merged_sequence() {
        let samples = vec![
            sample("VER", 90.0, 1),
            sample("HAM", 91.5, 1),
            sample("VER", 180.5, 2),
        ];
        let timeline = Timeline::build(&samples).unwrap();
        assert_eq!(timeline.drivers(), &[DriverId::from("HAM"), DriverId::from("VER")]);

        let ver: Vec<_> = timeline.driver_events(&DriverId::from("VER")).collect();
        assert_eq!(ver.len(), 2);
        assert!(ver.iter().all(|e| e.driver.as_str() == "VER"));
        assert!(timeline.driver_events(&DriverId::from("XXX")).next().is_none());
    }

    #[test]
    fn test_status_at_resolves_latest_point() {
        let status = vec![
            StatusPoint {
                time: SessionTime::from_secs_f64(100.0),
                status: TrackStatus::SafetyCar,
            },
            StatusPoint {
                time: SessionTime::from_secs_f64(50.0),
                status: TrackStatus::Yellow,
            },
        ];
        let timeline =
            Timeline::build_with_status(&[sample("VER", 90.0, 1)], &status).unwrap();

        assert_eq!(timeline.status_at(SessionTime::ZERO), TrackStatus::Clear);
        assert_eq!(
            timeline.status_at(SessionTime::from_secs_f64(60.0)),
            TrackStatus::Yellow
        );
        assert_eq!(
            timeline.status_at(SessionTime::from_secs_f64(100.0)),
            TrackStatus::SafetyCar
        );
    }
}
