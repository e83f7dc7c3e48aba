//! Session sources for OpenRaceReplay

pub mod demo;
pub mod ndjson;

pub use demo::DemoSession;
pub use ndjson::NdjsonSession;
