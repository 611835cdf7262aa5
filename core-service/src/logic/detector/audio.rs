//! Audio Deepfake Detector
//!
//! Three independent checks over a mono recording, each raising findings on
//! its own:
//! - Spectral: synthetic voices tend to have a high, flat spectral shape
//! - Voice quality: unnaturally steady or out-of-range pitch
//! - Artifacts: low zero-crossing rate, flat loudness, compressed dynamics
//!
//! MITRE ATT&CK: T1566.004 - Phishing: Spearphishing Voice

use super::capability::{Availability, Capability};
use super::dsp::{self, PitchParams};
use super::rules::*;
use super::{Detector, DetectorError};
use crate::logic::artifact::{Artifact, Payload};
use crate::logic::verdict::{Finding, Indicator};

pub const DETECTOR_NAME: &str = "audio-deepfake";

// ============================================================================
// FEATURE SUMMARY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralSummary {
    pub centroid_mean: f32,
    pub rolloff_mean: f32,
    pub bandwidth_std: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchSummary {
    pub mean: f32,
    pub std: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArtifactSummary {
    pub zcr_mean: f32,
    pub rms_std: f32,
    pub peak_to_mean: f32,
}

/// Everything the rules look at. `None` means the check found nothing to
/// measure (no non-silent frames, no voiced frames).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFeatures {
    pub spectral: Option<SpectralSummary>,
    pub pitch: Option<PitchSummary>,
    pub artifacts: ArtifactSummary,
}

// ============================================================================
// DETECTOR
// ============================================================================

pub struct AudioDeepfakeDetector {
    thresholds: AudioThresholds,
    features: Availability,
}

impl AudioDeepfakeDetector {
    pub fn new(thresholds: AudioThresholds, features: Availability) -> Self {
        Self { thresholds, features }
    }

    pub fn thresholds(&self) -> &AudioThresholds {
        &self.thresholds
    }

    /// Extract the feature summary. Pitch tracking is best-effort: its
    /// failure only means no voice-quality findings.
    pub fn extract(&self, samples: &[f32], sample_rate: u32) -> AudioFeatures {
        let t = &self.thresholds;

        let spectral_frames =
            dsp::spectral_frames(samples, sample_rate, t.frame_length, t.hop_length, t.rolloff_percent);
        let centroids: Vec<f32> = spectral_frames.iter().map(|f| f.centroid).collect();
        let rolloffs: Vec<f32> = spectral_frames.iter().map(|f| f.rolloff).collect();
        let bandwidths: Vec<f32> = spectral_frames.iter().map(|f| f.bandwidth).collect();

        let spectral = match (dsp::mean(&centroids), dsp::mean(&rolloffs), dsp::std_dev(&bandwidths)) {
            (Some(centroid_mean), Some(rolloff_mean), Some(bandwidth_std)) => Some(SpectralSummary {
                centroid_mean,
                rolloff_mean,
                bandwidth_std,
            }),
            _ => None,
        };

        let params = PitchParams {
            frame_len: t.frame_length,
            hop: t.hop_length,
            min_hz: t.pitch_search_min_hz,
            max_hz: t.pitch_search_max_hz,
            voicing_threshold: t.voicing_threshold,
            min_rms: t.voicing_min_rms,
        };
        let pitch = match dsp::pitch_track(samples, sample_rate, &params) {
            Ok(voiced) => match (dsp::mean(&voiced), dsp::std_dev(&voiced)) {
                (Some(mean), Some(std)) => Some(PitchSummary { mean, std }),
                _ => None,
            },
            Err(e) => {
                log::debug!("[{}] pitch tracking skipped: {}", DETECTOR_NAME, e);
                None
            }
        };

        let frames = dsp::frames(samples, t.frame_length, t.hop_length);
        let zcrs: Vec<f32> = frames.iter().map(|f| dsp::zero_crossing_rate(f)).collect();
        let envelope: Vec<f32> = frames.iter().map(|f| dsp::rms(f)).collect();

        AudioFeatures {
            spectral,
            pitch,
            artifacts: ArtifactSummary {
                zcr_mean: dsp::mean(&zcrs).unwrap_or(0.0),
                rms_std: dsp::std_dev(&envelope).unwrap_or(0.0),
                peak_to_mean: dsp::peak_to_mean(samples),
            },
        }
    }

    /// Apply the rules to a feature summary
    pub fn evaluate(&self, features: &AudioFeatures) -> Vec<Finding> {
        let t = &self.thresholds;
        let mut findings = Vec::new();

        // Spectral check
        if let Some(s) = features.spectral {
            if s.centroid_mean > t.centroid_hz {
                findings.push(Finding::new(
                    Indicator::SpectralCenter,
                    SPECTRAL_CENTER_CONFIDENCE,
                    format!("Mean spectral centroid {:.0} Hz > {:.0} Hz", s.centroid_mean, t.centroid_hz),
                    DETECTOR_NAME,
                ));
            }
            if s.rolloff_mean > t.rolloff_hz {
                findings.push(Finding::new(
                    Indicator::SpectralRolloff,
                    SPECTRAL_ROLLOFF_CONFIDENCE,
                    format!("Mean spectral rolloff {:.0} Hz > {:.0} Hz", s.rolloff_mean, t.rolloff_hz),
                    DETECTOR_NAME,
                ));
            }
            if s.bandwidth_std < t.bandwidth_std {
                findings.push(Finding::new(
                    Indicator::SpectralBandwidth,
                    SPECTRAL_BW_CONFIDENCE,
                    format!("Spectral bandwidth std {:.1} < {:.1}", s.bandwidth_std, t.bandwidth_std),
                    DETECTOR_NAME,
                ));
            }
        }

        // Voice quality check
        if let Some(p) = features.pitch {
            if p.std < t.pitch_std_hz {
                findings.push(Finding::new(
                    Indicator::PitchStable,
                    PITCH_STABLE_CONFIDENCE,
                    format!("Pitch std {:.1} Hz < {:.1} Hz (unnaturally steady)", p.std, t.pitch_std_hz),
                    DETECTOR_NAME,
                ));
            }
            if p.mean < t.pitch_min_hz || p.mean > t.pitch_max_hz {
                findings.push(Finding::new(
                    Indicator::PitchRange,
                    PITCH_RANGE_CONFIDENCE,
                    format!(
                        "Mean pitch {:.0} Hz outside [{:.0}, {:.0}] Hz",
                        p.mean, t.pitch_min_hz, t.pitch_max_hz
                    ),
                    DETECTOR_NAME,
                ));
            }
        }

        // Artifact check
        let a = features.artifacts;
        if a.zcr_mean < t.zcr_min {
            findings.push(Finding::new(
                Indicator::ZcrLow,
                ZCR_LOW_CONFIDENCE,
                format!("Mean zero-crossing rate {:.3} < {:.3}", a.zcr_mean, t.zcr_min),
                DETECTOR_NAME,
            ));
        }
        if a.rms_std < t.rms_std_min {
            findings.push(Finding::new(
                Indicator::RmsStable,
                RMS_STABLE_CONFIDENCE,
                format!("Amplitude envelope std {:.4} < {:.4}", a.rms_std, t.rms_std_min),
                DETECTOR_NAME,
            ));
        }
        if a.peak_to_mean < t.dynamic_ratio_min {
            findings.push(Finding::new(
                Indicator::RmsDynamic,
                RMS_DYNAMIC_CONFIDENCE,
                format!("Peak/mean amplitude {:.2} < {:.2}", a.peak_to_mean, t.dynamic_ratio_min),
                DETECTOR_NAME,
            ));
        }

        findings
    }
}

impl Detector for AudioDeepfakeDetector {
    fn name(&self) -> &'static str {
        DETECTOR_NAME
    }

    fn supports(&self, artifact: &Artifact) -> bool {
        matches!(artifact.payload(), Payload::Audio { .. })
    }

    fn requires(&self) -> Option<Capability> {
        Some(Capability::AudioFeatures)
    }

    fn detect(&self, artifact: &Artifact) -> Result<Vec<Finding>, DetectorError> {
        let (samples, sample_rate) = match artifact.payload() {
            Payload::Audio { samples, sample_rate } => (samples, *sample_rate),
            _ => {
                return Err(DetectorError::UnsupportedArtifact(format!(
                    "{} expects audio, got {}",
                    DETECTOR_NAME,
                    artifact.kind().as_str()
                )))
            }
        };

        if let Availability::Unavailable(reason) = &self.features {
            return Err(DetectorError::DependencyUnavailable(reason.clone()));
        }

        // Empty or digitally silent input: nothing to judge
        if samples.is_empty() || samples.iter().all(|s| *s == 0.0) {
            return Ok(vec![]);
        }

        if sample_rate == 0 {
            return Err(DetectorError::Malformed("audio with zero sample rate".into()));
        }

        let features = self.extract(samples, sample_rate);
        Ok(self.evaluate(&features))
    }
}
