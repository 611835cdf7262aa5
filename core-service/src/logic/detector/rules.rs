//! Detection Rules & Thresholds
//!
//! Every threshold is configuration. Defaults below can be overridden by a
//! JSON file named in `SCAMWATCH_DETECTOR_CONFIG`; missing keys keep their
//! default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::logic::config::ConfigError;

// ============================================================================
// FINDING CONFIDENCES (per indicator)
// ============================================================================

pub const SPECTRAL_CENTER_CONFIDENCE: u8 = 25;
pub const SPECTRAL_ROLLOFF_CONFIDENCE: u8 = 25;
pub const SPECTRAL_BW_CONFIDENCE: u8 = 20;
pub const PITCH_STABLE_CONFIDENCE: u8 = 30;
pub const PITCH_RANGE_CONFIDENCE: u8 = 20;
pub const ZCR_LOW_CONFIDENCE: u8 = 25;
pub const RMS_STABLE_CONFIDENCE: u8 = 20;
pub const RMS_DYNAMIC_CONFIDENCE: u8 = 25;

pub const PHONE_NUMBER_CONFIDENCE: u8 = 30;
pub const URGENT_LANGUAGE_CONFIDENCE: u8 = 40;
pub const PAYMENT_DEMAND_CONFIDENCE: u8 = 45;
pub const REMOTE_ACCESS_CONFIDENCE: u8 = 45;
pub const TECH_SUPPORT_SCAM_CONFIDENCE: u8 = 75;

pub const ALARM_COLOR_CONFIDENCE: u8 = 40;
pub const ALARM_FLOOD_CONFIDENCE: u8 = 60;

pub const CORRELATED_ALARM_CONFIDENCE: u8 = 70;

// ============================================================================
// AUDIO
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioThresholds {
    /// Mean spectral centroid above this is suspicious (Hz)
    pub centroid_hz: f32,
    /// Mean spectral rolloff above this is suspicious (Hz)
    pub rolloff_hz: f32,
    /// Bandwidth std-dev below this is suspicious
    pub bandwidth_std: f32,
    /// Voiced pitch std-dev below this is suspicious (Hz)
    pub pitch_std_hz: f32,
    pub pitch_min_hz: f32,
    pub pitch_max_hz: f32,
    pub zcr_min: f32,
    pub rms_std_min: f32,
    /// max |x| / mean |x| below this is suspicious
    pub dynamic_ratio_min: f32,

    // Feature extraction
    pub frame_length: usize,
    pub hop_length: usize,
    pub rolloff_percent: f32,
    /// Normalised autocorrelation peak needed to call a frame voiced
    pub voicing_threshold: f32,
    /// Frames quieter than this RMS are unvoiced
    pub voicing_min_rms: f32,
    pub pitch_search_min_hz: f32,
    pub pitch_search_max_hz: f32,
}

impl Default for AudioThresholds {
    fn default() -> Self {
        Self {
            centroid_hz: 4000.0,
            rolloff_hz: 7000.0,
            bandwidth_std: 500.0,
            pitch_std_hz: 20.0,
            pitch_min_hz: 50.0,
            pitch_max_hz: 300.0,
            zcr_min: 0.05,
            rms_std_min: 0.02,
            dynamic_ratio_min: 3.0,
            frame_length: 2048,
            hop_length: 512,
            rolloff_percent: 0.85,
            voicing_threshold: 0.5,
            voicing_min_rms: 0.01,
            pitch_search_min_hz: 40.0,
            pitch_search_max_hz: 1000.0,
        }
    }
}

// ============================================================================
// SCREEN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenThresholds {
    /// Share of alarm-red pixels that raises Alarm-Color
    pub alarm_share: f32,
    /// Share of alarm-red pixels that raises Alarm-Flood
    pub flood_share: f32,
    pub red_min: u8,
    pub other_max: u8,
}

impl Default for ScreenThresholds {
    fn default() -> Self {
        Self {
            alarm_share: 0.25,
            flood_share: 0.60,
            red_min: 180,
            other_max: 80,
        }
    }
}

// ============================================================================
// TEXT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextRules {
    /// Extra case-insensitive phrases counted as urgent language
    pub extra_urgent_phrases: Vec<String>,
    /// Text longer than this is truncated before matching (chars)
    pub max_chars: usize,
}

impl Default for TextRules {
    fn default() -> Self {
        Self {
            extra_urgent_phrases: vec![],
            max_chars: 20_000,
        }
    }
}

// ============================================================================
// DETECTOR CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub audio: AudioThresholds,
    pub screen: ScreenThresholds,
    pub text: TextRules,
}

impl DetectorConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.display().to_string(), e.to_string()))?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Invalid(path.display().to_string(), e.to_string()))
    }

    /// File named in `SCAMWATCH_DETECTOR_CONFIG`, or defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("SCAMWATCH_DETECTOR_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim())),
            _ => Ok(Self::default()),
        }
    }
}
