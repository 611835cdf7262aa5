//! Detector Registry
//!
//! The detector set loaded once at service startup and shared read-only by
//! every request. Runs all detectors that understand an artifact and folds
//! their findings into one verdict.

use std::sync::Arc;

use super::capability::Capabilities;
use super::rules::DetectorConfig;
use super::{AudioDeepfakeDetector, Detector, DetectorError, ScamTextDetector, ScreenAlarmDetector};
use crate::logic::aggregator;
use crate::logic::artifact::Artifact;
use crate::logic::verdict::{Finding, Verdict};
use crate::logic::wire::AnalyzeRequest;

#[derive(Clone)]
pub struct DetectorRegistry {
    detectors: Vec<Arc<dyn Detector>>,
    capabilities: Capabilities,
}

impl DetectorRegistry {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { detectors: Vec::new(), capabilities }
    }

    /// Audio, text and screen detectors with the given thresholds
    pub fn standard(config: &DetectorConfig, capabilities: Capabilities) -> Self {
        let mut registry = Self::new(capabilities.clone());
        registry.register(Arc::new(AudioDeepfakeDetector::new(
            config.audio.clone(),
            capabilities.audio_features.clone(),
        )));
        registry.register(Arc::new(ScamTextDetector::new(config.text.clone())));
        registry.register(Arc::new(ScreenAlarmDetector::new(config.screen.clone())));
        registry
    }

    pub fn register(&mut self, detector: Arc<dyn Detector>) {
        log::info!("Registered detector: {}", detector.name());
        self.detectors.push(detector);
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Analyze with every supporting detector.
    ///
    /// A detector that fails is skipped as long as another one produced an
    /// opinion; if all of them fail, the first error is returned.
    pub fn analyze(&self, artifact: &Artifact) -> Result<Verdict, DetectorError> {
        let applicable: Vec<&Arc<dyn Detector>> =
            self.detectors.iter().filter(|d| d.supports(artifact)).collect();

        if applicable.is_empty() {
            return Err(DetectorError::UnsupportedArtifact(format!(
                "no detector for {} {}",
                artifact.channel(),
                artifact.kind().as_str()
            )));
        }

        let mut findings: Vec<Finding> = Vec::new();
        let mut first_error: Option<DetectorError> = None;
        let mut succeeded = 0usize;

        for detector in applicable {
            if let Some(capability) = detector.requires() {
                if let Some(reason) = unavailable_reason(&self.capabilities, capability) {
                    log::debug!("[{}] skipped: {} unavailable", detector.name(), capability.as_str());
                    first_error.get_or_insert(DetectorError::DependencyUnavailable(reason));
                    continue;
                }
            }

            match detector.detect(artifact) {
                Ok(mut raised) => {
                    succeeded += 1;
                    findings.append(&mut raised);
                }
                Err(e) => {
                    log::warn!("[{}] analysis failed: {}", detector.name(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if succeeded == 0 {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        Ok(aggregator::aggregate(
            artifact.channel(),
            artifact.meta(),
            findings,
            artifact.captured_at(),
        ))
    }

    /// Decode a wire request and analyze it
    pub fn analyze_request(&self, request: AnalyzeRequest) -> Result<Verdict, DetectorError> {
        let raw = request.into_raw()?;
        let artifact = Artifact::decode(&raw)?;
        self.analyze(&artifact)
    }
}

fn unavailable_reason(capabilities: &Capabilities, capability: super::Capability) -> Option<String> {
    match capabilities.get(capability) {
        super::Availability::Available => None,
        super::Availability::Unavailable(reason) => Some(reason.clone()),
    }
}
