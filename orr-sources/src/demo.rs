//! Demo source that generates a synthetic race for testing
//!
//! Simulates a full grid over a configurable number of laps: per-driver
//! pace with small lap-to-lap variation, a mid-race safety car, scripted
//! pit stops with compound changes, and explicit positions derived from
//! cumulative race time. Fully deterministic — the same configuration
//! always produces the same samples, so timelines built from it are
//! reproducible in tests.

use anyhow::Result;
use orr_core::model::{DriverId, TimingSample, TrackStatus, TyreCompound};
use orr_core::source::{SessionData, SessionSource};
use orr_core::time::{SessionTime, TimeSpan};
use orr_core::timeline::StatusPoint;

// =============================================================================
// Race script parameters
// =============================================================================

const DRIVER_CODES: [&str; 20] = [
    "VER", "NOR", "LEC", "PIA", "SAI", "HAM", "RUS", "PER", "ALO", "STR", "GAS", "OCO", "HUL",
    "MAG", "ALB", "SAR", "TSU", "RIC", "BOT", "ZHO",
];

/// Share of a lap spent in each sector.
const SECTOR_SPLIT: [f64; 3] = [0.30, 0.36, 0.34];

/// Front-of-grid lap time in seconds; each grid slot is a touch slower.
const BASE_LAP_SECS: f64 = 90.0;
const GRID_SPREAD_SECS: f64 = 0.25;

/// Lap-to-lap variation amplitude.
const JITTER_SECS: f64 = 1.6;

/// Time lost to a pit stop, folded into the out-lap.
const PIT_LOSS_SECS: f64 = 22.0;

/// Seconds between crossing the line into the pits and rejoining.
const PIT_DWELL_SECS: f64 = 20.0;

/// Extra seconds per lap while the safety car is out.
const SAFETY_CAR_PENALTY_SECS: f64 = 15.0;

/// A deterministic synthetic race session.
pub struct DemoSession {
    drivers: usize,
    laps: u32,
}

impl DemoSession {
    pub fn new() -> Self {
        Self {
            drivers: 10,
            laps: 24,
        }
    }

    /// Custom grid size and race length (clamped to sane bounds).
    pub fn with_grid(drivers: usize, laps: u32) -> Self {
        Self {
            drivers: drivers.clamp(2, DRIVER_CODES.len()),
            laps: laps.clamp(6, 100),
        }
    }
}

impl Default for DemoSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSource for DemoSession {
    fn name(&self) -> &str {
        "demo"
    }

    fn available(&self) -> bool {
        true
    }

    fn load(&self) -> Result<SessionData> {
        Ok(generate(self.drivers, self.laps))
    }
}

// =============================================================================
// Generation
// =============================================================================

/// Small deterministic PRNG so the script varies per driver and lap
/// without pulling in an RNG crate or wall-clock state.
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1)
    }

    /// Uniform value in [0, 1).
    fn next_unit(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Lap on which grid slot `i` pits (staggered across the field).
fn pit_lap(i: usize, laps: u32) -> u32 {
    (laps / 2 + (i % 5) as u32).saturating_sub(2).clamp(2, laps - 1)
}

fn generate(drivers: usize, laps: u32) -> SessionData {
    let sc_lap = (laps / 3).max(2);

    // Lap times first; everything else derives from them.
    let mut lap_times: Vec<Vec<f64>> = Vec::with_capacity(drivers);
    for i in 0..drivers {
        let mut lcg = Lcg::new(i as u64 + 1);
        let base = BASE_LAP_SECS + i as f64 * GRID_SPREAD_SECS;
        let mut times = Vec::with_capacity(laps as usize);
        for lap in 1..=laps {
            let mut t = base + (lcg.next_unit() - 0.5) * JITTER_SECS;
            if lap == sc_lap || lap == sc_lap + 1 {
                t += SAFETY_CAR_PENALTY_SECS;
            }
            if lap == pit_lap(i, laps) + 1 {
                t += PIT_LOSS_SECS;
            }
            times.push(t);
        }
        lap_times.push(times);
    }

    // Cumulative crossing time per driver per lap.
    let crossings: Vec<Vec<f64>> = lap_times
        .iter()
        .map(|times| {
            times
                .iter()
                .scan(0.0, |acc, t| {
                    *acc += t;
                    Some(*acc)
                })
                .collect()
        })
        .collect();

    let mut samples = Vec::new();
    for lap in 1..=laps {
        let lap_idx = lap as usize - 1;

        let mut order: Vec<usize> = (0..drivers).collect();
        order.sort_by(|&a, &b| crossings[a][lap_idx].total_cmp(&crossings[b][lap_idx]));

        for i in 0..drivers {
            let driver = DriverId::from(DRIVER_CODES[i]);
            let end = crossings[i][lap_idx];
            let start = if lap == 1 { 0.0 } else { crossings[i][lap_idx - 1] };
            let lap_time = lap_times[i][lap_idx];

            let mut sector_end = start;
            for (sector, &split) in SECTOR_SPLIT.iter().enumerate() {
                sector_end += lap_time * split;
                samples.push(TimingSample {
                    driver: driver.clone(),
                    session_time: Some(SessionTime::from_secs_f64(sector_end)),
                    lap,
                    sector: sector as u8 + 1,
                    sector_time: Some(TimeSpan::from_secs_f64(lap_time * split)),
                    lap_time: None,
                    cumulative: None,
                    compound: None,
                    pit_in: false,
                    pit_out: false,
                    position: None,
                });
            }

            let position = order.iter().position(|&d| d == i).map(|p| p as u32 + 1);
            samples.push(TimingSample {
                driver: driver.clone(),
                session_time: Some(SessionTime::from_secs_f64(end)),
                lap,
                sector: 0,
                sector_time: None,
                lap_time: Some(TimeSpan::from_secs_f64(lap_time)),
                cumulative: Some(TimeSpan::from_secs_f64(end)),
                compound: Some(compound_for(i, lap, laps)),
                pit_in: false,
                pit_out: false,
                position,
            });

            // Pit markers: in at the crossing that starts the stop, out
            // after the dwell, still before the next sector sample.
            if lap == pit_lap(i, laps) {
                samples.push(TimingSample {
                    driver: driver.clone(),
                    session_time: Some(SessionTime::from_secs_f64(end)),
                    lap: lap + 1,
                    sector: 0,
                    sector_time: None,
                    lap_time: None,
                    cumulative: None,
                    compound: None,
                    pit_in: true,
                    pit_out: false,
                    position: None,
                });
                samples.push(TimingSample {
                    driver: driver.clone(),
                    session_time: Some(SessionTime::from_secs_f64(end + PIT_DWELL_SECS)),
                    lap: lap + 1,
                    sector: 0,
                    sector_time: None,
                    lap_time: None,
                    cumulative: None,
                    compound: None,
                    pit_in: false,
                    pit_out: true,
                    position: None,
                });
            }
        }
    }

    // Safety car covers laps sc_lap..=sc_lap+1: deployed when the first
    // driver starts the slow lap, withdrawn when the last one ends it.
    let sc_from = crossings
        .iter()
        .map(|c| c[sc_lap as usize - 2])
        .fold(f64::INFINITY, f64::min);
    let sc_to = crossings
        .iter()
        .map(|c| c[sc_lap as usize])
        .fold(0.0, f64::max);
    let track_status = vec![
        StatusPoint {
            time: SessionTime::from_secs_f64(sc_from),
            status: TrackStatus::SafetyCar,
        },
        StatusPoint {
            time: SessionTime::from_secs_f64(sc_to),
            status: TrackStatus::Clear,
        },
    ];

    SessionData {
        name: format!("Demo Grand Prix ({drivers} cars, {laps} laps)"),
        samples,
        track_status,
    }
}

fn compound_for(i: usize, lap: u32, laps: u32) -> TyreCompound {
    let starting = if i % 2 == 0 {
        TyreCompound::Medium
    } else {
        TyreCompound::Soft
    };
    if lap > pit_lap(i, laps) {
        TyreCompound::Hard
    } else {
        starting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pit_lap_stays_in_race() {
        for i in 0..20 {
            for laps in [6u32, 24, 57] {
                let p = pit_lap(i, laps);
                assert!(p >= 2 && p < laps, "pit lap {p} outside race of {laps}");
            }
        }
    }

    #[test]
    fn test_lcg_is_deterministic() {
        let mut a = Lcg::new(7);
        let mut b = Lcg::new(7);
        for _ in 0..10 {
            assert_eq!(a.next_unit(), b.next_unit());
        }
        let x = Lcg::new(7).next_unit();
        assert!((0.0..1.0).contains(&x));
    }
}
