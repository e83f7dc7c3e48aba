//! Integration tests for the DemoSession source

use orr_core::model::{DriverStatus, TrackStatus};
use orr_core::source::SessionSource;
use orr_core::timeline::Timeline;
use orr_core::{ReplayEngine, SessionTime};
use orr_sources::DemoSession;

#[test]
fn test_demo_source_name_and_availability() {
    let source = DemoSession::new();
    assert_eq!(source.name(), "demo");
    assert!(source.available(), "DemoSession should always be available");
}

#[test]
fn test_demo_load_is_deterministic() {
    let a = DemoSession::with_grid(6, 12).load().expect("load should succeed");
    let b = DemoSession::with_grid(6, 12).load().expect("load should succeed");
    assert_eq!(a.samples, b.samples);
    assert_eq!(a.track_status, b.track_status);
    assert_eq!(a.name, b.name);
}

#[test]
fn test_demo_timeline_builds_clean() {
    let data = DemoSession::new().load().expect("load should succeed");
    let timeline =
        Timeline::build_with_status(&data.samples, &data.track_status).expect("build");

    assert_eq!(timeline.dropped().len(), 0, "demo data should be complete");
    assert_eq!(timeline.total_laps(), 24);
    assert_eq!(timeline.drivers().len(), 10);
    assert!(timeline.start() < timeline.end());
}

#[test]
fn test_demo_grid_clamped_to_sane_bounds() {
    let data = DemoSession::with_grid(1000, 3).load().expect("load");
    let timeline = Timeline::build(&data.samples).expect("build");
    assert_eq!(timeline.drivers().len(), 20);
    assert_eq!(timeline.total_laps(), 6);
}

#[test]
fn test_demo_race_plays_out() {
    let data = DemoSession::with_grid(6, 12).load().expect("load");
    let timeline =
        Timeline::build_with_status(&data.samples, &data.track_status).expect("build");
    let mut engine = ReplayEngine::new(data.name, timeline).expect("engine");

    let end = engine.timeline().end();
    let state = engine.seek_to(end).clone();

    assert_eq!(state.leaderboard.len(), 6);
    for (driver, d) in &state.drivers {
        assert_eq!(d.status, DriverStatus::Finished, "{driver} should finish");
        assert_eq!(d.lap, 12);
        assert_eq!(d.pit_stops, 1, "{driver} should have stopped exactly once");
        assert!(d.compound.is_some());
        assert!(d.gap_to_leader.is_some());
    }

    // Leader has zero gap; everyone else trails.
    let leader = &state.drivers[&state.leaderboard[0]];
    assert_eq!(leader.gap_to_leader.unwrap().as_millis(), 0);
    let second = &state.drivers[&state.leaderboard[1]];
    assert!(second.gap_to_leader.unwrap().as_millis() > 0);
}

#[test]
fn test_demo_safety_car_window_is_flagged() {
    let data = DemoSession::with_grid(6, 12).load().expect("load");
    let timeline =
        Timeline::build_with_status(&data.samples, &data.track_status).expect("build");
    assert_eq!(data.track_status.len(), 2);

    let sc_mid = SessionTime::from_millis(
        (data.track_status[0].time.as_millis() + data.track_status[1].time.as_millis()) / 2,
    );
    assert_eq!(timeline.status_at(sc_mid), TrackStatus::SafetyCar);
    assert_eq!(timeline.status_at(timeline.end()), TrackStatus::Clear);
}
