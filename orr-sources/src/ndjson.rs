//! NDJSON session files
//!
//! The cache format the acquisition tooling writes sessions in: one JSON
//! record per line — `TimingSample` records plus optional track-status
//! records — optionally zstd-compressed (`.ndjson.zst`). Unparseable
//! lines are skipped and counted, mirroring the timeline builder's
//! drop-don't-abort policy.

use anyhow::{Context, Result};
use orr_core::model::{TimingSample, TrackStatus};
use orr_core::source::{SessionData, SessionSource};
use orr_core::time::SessionTime;
use orr_core::timeline::StatusPoint;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One NDJSON line. Status records carry `time` + `track_status` and no
/// driver; anything else must parse as a timing sample.
#[derive(Deserialize)]
#[serde(untagged)]
enum Record {
    Status {
        time: SessionTime,
        track_status: TrackStatus,
    },
    Sample(TimingSample),
}

/// A session backed by an NDJSON file on disk.
pub struct NdjsonSession {
    name: String,
    path: PathBuf,
}

impl NdjsonSession {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = session_name(&path);
        Self { name, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionSource for NdjsonSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn available(&self) -> bool {
        self.path.is_file()
    }

    fn load(&self) -> Result<SessionData> {
        let raw = fs::read(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let text = decode(&self.path, raw)?;
        let (samples, track_status, skipped) = parse_ndjson(&text);
        if skipped > 0 {
            warn!("{}: skipped {} unparseable lines", self.name, skipped);
        }
        Ok(SessionData {
            name: self.name.clone(),
            samples,
            track_status,
        })
    }
}

/// Session name from the file name, with the format suffixes stripped.
fn session_name(path: &Path) -> String {
    let file = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("session");
    file.trim_end_matches(".zst")
        .trim_end_matches(".ndjson")
        .to_string()
}

fn decode(path: &Path, raw: Vec<u8>) -> Result<String> {
    let bytes = if path.extension().and_then(|e| e.to_str()) == Some("zst") {
        zstd::decode_all(raw.as_slice())
            .with_context(|| format!("failed to decompress {}", path.display()))?
    } else {
        raw
    };
    String::from_utf8(bytes).context("session file is not valid UTF-8")
}

/// Parse NDJSON text into samples and status points. Returns the number
/// of lines that parsed as neither.
pub fn parse_ndjson(text: &str) -> (Vec<TimingSample>, Vec<StatusPoint>, usize) {
    let mut samples = Vec::new();
    let mut status = Vec::new();
    let mut skipped = 0;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(line) {
            Ok(Record::Sample(sample)) => samples.push(sample),
            Ok(Record::Status { time, track_status }) => status.push(StatusPoint {
                time,
                status: track_status,
            }),
            Err(_) => skipped += 1,
        }
    }

    (samples, status, skipped)
}

/// List the NDJSON sessions in a directory, sorted by name. A missing
/// directory is just an empty listing.
pub fn scan_dir(dir: &Path) -> Result<Vec<NdjsonSession>> {
    let mut sessions = Vec::new();
    if !dir.is_dir() {
        return Ok(sessions);
    }
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?
    {
        let path = entry?.path();
        if is_session_file(&path) {
            sessions.push(NdjsonSession::new(path));
        }
    }
    sessions.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(sessions)
}

fn is_session_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| name.ends_with(".ndjson") || name.ends_with(".ndjson.zst"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_name_strips_suffixes() {
        assert_eq!(
            session_name(Path::new("/data/2024_dutch_gp.ndjson")),
            "2024_dutch_gp"
        );
        assert_eq!(
            session_name(Path::new("2024_dutch_gp.ndjson.zst")),
            "2024_dutch_gp"
        );
    }

    #[test]
    fn test_parse_mixed_records() {
        let text = r#"
            {"driver":"VER","session_time":90000,"lap":1,"lap_time":90000}
            {"time":200000,"track_status":"safety_car"}
            not json at all
            {"driver":"HAM","session_time":91500,"lap":1,"lap_time":91500}
        "#;
        let (samples, status, skipped) = parse_ndjson(text);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].driver.as_str(), "VER");
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].status, TrackStatus::SafetyCar);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_is_session_file() {
        assert!(is_session_file(Path::new("race.ndjson")));
        assert!(is_session_file(Path::new("race.ndjson.zst")));
        assert!(!is_session_file(Path::new("race.json")));
        assert!(!is_session_file(Path::new("race.zst")));
    }
}
