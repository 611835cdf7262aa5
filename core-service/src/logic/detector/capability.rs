//! Capability Probe
//!
//! Optional runtime capabilities are probed once at startup and then treated
//! as read-only. Detectors declare what they need and fail soft with
//! `DependencyUnavailable` when it is missing.

use serde::Serialize;

use super::dsp;
use crate::constants;

/// Optional capabilities a detector may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    AudioFeatures,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::AudioFeatures => "audio_features",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable(String),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// Result of the startup probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub audio_features: Availability,
}

impl Capabilities {
    /// Probe everything, honouring the `SCAMWATCH_AUDIO_FEATURES` kill-switch
    pub fn probe() -> Self {
        Self::probe_with(constants::is_audio_features_enabled())
    }

    pub fn probe_with(audio_enabled: bool) -> Self {
        let audio_features = if !audio_enabled {
            Availability::Unavailable("audio feature extraction disabled by configuration".into())
        } else {
            probe_spectral()
        };

        match &audio_features {
            Availability::Available => log::info!("Capability audio_features: available"),
            Availability::Unavailable(reason) => {
                log::warn!("Capability audio_features unavailable: {}", reason)
            }
        }

        Self { audio_features }
    }

    pub fn all_available() -> Self {
        Self { audio_features: Availability::Available }
    }

    pub fn get(&self, capability: Capability) -> &Availability {
        match capability {
            Capability::AudioFeatures => &self.audio_features,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.audio_features.is_available()
    }
}

/// Self-test: a 1 kHz tone must come out with its centroid near 1 kHz
fn probe_spectral() -> Availability {
    const RATE: u32 = 16_000;
    const TONE_HZ: f32 = 1_000.0;

    let samples: Vec<f32> = (0..4096)
        .map(|i| (2.0 * std::f32::consts::PI * TONE_HZ * i as f32 / RATE as f32).sin() * 0.5)
        .collect();

    let frames = dsp::spectral_frames(&samples, RATE, 2048, 512, 0.85);
    match dsp::mean(&frames.iter().map(|f| f.centroid).collect::<Vec<_>>()) {
        Some(centroid) if (centroid - TONE_HZ).abs() < 100.0 => Availability::Available,
        Some(centroid) => Availability::Unavailable(format!(
            "spectral self-test failed: centroid {:.1} Hz for a {} Hz tone",
            centroid, TONE_HZ
        )),
        None => Availability::Unavailable("spectral self-test produced no frames".into()),
    }
}
