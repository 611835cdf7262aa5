//! Monitor Module
//!
//! The sampling side: capture sources, the analysis client and the control
//! loop tying them to the alert dispatcher.

pub mod capture;
pub mod client;
pub mod sampler;

#[cfg(test)]
mod tests;

pub use capture::{sources_from_config, CaptureError, CaptureSource, ChangeFilter, CommandCapture};
pub use client::{AnalysisService, ClientError, HealthStatus, HttpAnalysisClient};
pub use sampler::{CycleOutcome, MonitorLoop, StepOutcome};
