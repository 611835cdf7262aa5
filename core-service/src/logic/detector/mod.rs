//! Detector Module
//!
//! Polymorphic analysis units. Each detector looks at one artifact of a known
//! channel and raises zero or more `Finding`s; the aggregator turns those into
//! a `Verdict`.
//!
//! ## Structure
//! - `capability`: startup probe for optional feature-extraction support
//! - `rules`: thresholds (externally configurable)
//! - `dsp`: framing, FFT, spectral / pitch / amplitude features
//! - `audio`: voice-deepfake detector
//! - `text`: scam-text detector (clipboard, on-screen text)
//! - `screen`: alarm-colour detector (screenshots)
//! - `registry`: the read-only detector set shared across requests

pub mod capability;
pub mod rules;
pub mod dsp;
pub mod audio;
pub mod text;
pub mod screen;
pub mod registry;

#[cfg(test)]
mod tests;

use thiserror::Error;

use crate::logic::aggregator;
use crate::logic::artifact::Artifact;
use crate::logic::verdict::{Finding, Verdict};

pub use audio::AudioDeepfakeDetector;
pub use capability::{Availability, Capabilities, Capability};
pub use registry::DetectorRegistry;
pub use rules::DetectorConfig;
pub use screen::ScreenAlarmDetector;
pub use text::ScamTextDetector;

/// Detector failure kinds. None of them is fatal to the owning process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectorError {
    /// Channel or encoding not recognised
    #[error("unsupported artifact: {0}")]
    UnsupportedArtifact(String),
    /// A required feature-extraction capability is missing at runtime
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),
    /// Corrupt bytes
    #[error("malformed artifact: {0}")]
    Malformed(String),
}

impl DetectorError {
    pub fn kind(&self) -> &'static str {
        match self {
            DetectorError::UnsupportedArtifact(_) => "unsupported_artifact",
            DetectorError::DependencyUnavailable(_) => "dependency_unavailable",
            DetectorError::Malformed(_) => "malformed",
        }
    }
}

/// Analysis capability for one channel / payload kind.
///
/// Implementations must be deterministic and hold no mutable state: the
/// same artifact always yields the same findings.
pub trait Detector: Send + Sync {
    /// Stable identity written into every finding
    fn name(&self) -> &'static str;

    /// Whether this detector understands the artifact at all
    fn supports(&self, artifact: &Artifact) -> bool;

    /// Capability the detector cannot work without
    fn requires(&self) -> Option<Capability> {
        None
    }

    /// Raise findings. Empty or silent input yields `Ok(vec![])`.
    fn detect(&self, artifact: &Artifact) -> Result<Vec<Finding>, DetectorError>;

    /// Findings folded into a verdict for this detector alone
    fn analyze(&self, artifact: &Artifact) -> Result<Verdict, DetectorError> {
        if !self.supports(artifact) {
            return Err(DetectorError::UnsupportedArtifact(format!(
                "{} does not handle {} {}",
                self.name(),
                artifact.channel(),
                artifact.kind().as_str()
            )));
        }
        let findings = self.detect(artifact)?;
        Ok(aggregator::aggregate(
            artifact.channel(),
            artifact.meta(),
            findings,
            artifact.captured_at(),
        ))
    }
}
