//! Logic Module - Engines & Control Loops
//!
//! ## Layers (leaves first)
//! - `verdict/` - Finding / Verdict model
//! - `artifact/` - sampled units and their decoding
//! - `detector/` - detector contract, concrete detectors, registry
//! - `aggregator` - monotone-max fusion and cross-channel correlation
//! - `wire` - analysis service request / response bodies
//! - `alert/` - dedup + cool-down notification dispatch
//! - `monitor/` - capture sources, analysis client, control loop
//! - `supervisor/` - process-level watchdog
//! - `telemetry/` - append-only audit trail

pub mod verdict;
pub mod artifact;
pub mod detector;
pub mod aggregator;
pub mod wire;
pub mod config;

pub mod alert;
pub mod monitor;
pub mod supervisor;
pub mod telemetry;
