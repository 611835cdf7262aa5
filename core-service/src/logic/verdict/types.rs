//! Evidence & Verdict Types
//!
//! Core types shared by detectors, aggregator, alerting and the wire layer.
//! No scoring logic lives here - only data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound for every confidence value
pub const MAX_CONFIDENCE: u8 = 100;

/// A verdict is a threat only strictly above this confidence
pub const THREAT_THRESHOLD: u8 = 50;

// ============================================================================
// CHANNEL
// ============================================================================

/// Source channel an artifact was sampled from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Screen,
    Clipboard,
    Microphone,
    /// Derived from several channels of the same monitor cycle
    Composite,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Screen => "screen",
            Channel::Clipboard => "clipboard",
            Channel::Microphone => "microphone",
            Channel::Composite => "composite",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "screen" => Some(Channel::Screen),
            "clipboard" => Some(Channel::Clipboard),
            "microphone" | "mic" | "audio" => Some(Channel::Microphone),
            "composite" => Some(Channel::Composite),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// INDICATOR
// ============================================================================

/// Enumerated evidence tags raised by detectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Indicator {
    // Audio - spectral
    #[serde(rename = "Spectral-Center")]
    SpectralCenter,
    #[serde(rename = "Spectral-Rolloff")]
    SpectralRolloff,
    #[serde(rename = "Spectral-BW")]
    SpectralBandwidth,
    // Audio - voice quality
    #[serde(rename = "Pitch-Stable")]
    PitchStable,
    #[serde(rename = "Pitch-Range")]
    PitchRange,
    // Audio - artifacts
    #[serde(rename = "ZCR-Low")]
    ZcrLow,
    #[serde(rename = "RMS-Stable")]
    RmsStable,
    #[serde(rename = "RMS-Dynamic")]
    RmsDynamic,
    // Text
    #[serde(rename = "Phone-Number")]
    PhoneNumber,
    #[serde(rename = "Urgent-Language")]
    UrgentLanguage,
    #[serde(rename = "Payment-Demand")]
    PaymentDemand,
    #[serde(rename = "Remote-Access-Tool")]
    RemoteAccessTool,
    #[serde(rename = "Tech-Support-Scam")]
    TechSupportScam,
    // Screen
    #[serde(rename = "Alarm-Color")]
    AlarmColor,
    #[serde(rename = "Alarm-Flood")]
    AlarmFlood,
    // Cross-channel
    #[serde(rename = "Correlated-Alarm")]
    CorrelatedAlarm,
}

impl Indicator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Indicator::SpectralCenter => "Spectral-Center",
            Indicator::SpectralRolloff => "Spectral-Rolloff",
            Indicator::SpectralBandwidth => "Spectral-BW",
            Indicator::PitchStable => "Pitch-Stable",
            Indicator::PitchRange => "Pitch-Range",
            Indicator::ZcrLow => "ZCR-Low",
            Indicator::RmsStable => "RMS-Stable",
            Indicator::RmsDynamic => "RMS-Dynamic",
            Indicator::PhoneNumber => "Phone-Number",
            Indicator::UrgentLanguage => "Urgent-Language",
            Indicator::PaymentDemand => "Payment-Demand",
            Indicator::RemoteAccessTool => "Remote-Access-Tool",
            Indicator::TechSupportScam => "Tech-Support-Scam",
            Indicator::AlarmColor => "Alarm-Color",
            Indicator::AlarmFlood => "Alarm-Flood",
            Indicator::CorrelatedAlarm => "Correlated-Alarm",
        }
    }
}

impl std::fmt::Display for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// FINDING
// ============================================================================

/// One atomic piece of evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub indicator: Indicator,
    #[serde(deserialize_with = "clamped_confidence")]
    confidence: u8,
    pub detail: String,
    /// Identity of the detector that raised it
    pub detector: String,
}

impl Finding {
    /// Confidence is clamped into 0..=100
    pub fn new(indicator: Indicator, confidence: u8, detail: impl Into<String>, detector: &str) -> Self {
        Self {
            indicator,
            confidence: confidence.min(MAX_CONFIDENCE),
            detail: detail.into(),
            detector: detector.to_string(),
        }
    }

    pub fn confidence(&self) -> u8 {
        self.confidence
    }
}

fn clamped_confidence<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = u64::deserialize(deserializer)?;
    Ok(raw.min(MAX_CONFIDENCE as u64) as u8)
}

// ============================================================================
// ARTIFACT METADATA
// ============================================================================

/// Channel-specific description of the analysed artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_length: Option<usize>,
}

// ============================================================================
// VERDICT
// ============================================================================

/// Aggregated threat judgment for one artifact.
///
/// Only the aggregator builds these, so `confidence` is always the max of the
/// finding confidences and `is_threat` always matches `confidence > 50`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    is_threat: bool,
    confidence: u8,
    findings: Vec<Finding>,
    channel: Channel,
    metadata: ArtifactMeta,
    timestamp: DateTime<Utc>,
}

impl Verdict {
    pub(crate) fn from_parts(
        confidence: u8,
        findings: Vec<Finding>,
        channel: Channel,
        metadata: ArtifactMeta,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            is_threat: confidence > THREAT_THRESHOLD,
            confidence,
            findings,
            channel,
            metadata,
            timestamp,
        }
    }

    pub fn is_threat(&self) -> bool {
        self.is_threat
    }

    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn metadata(&self) -> &ArtifactMeta {
        &self.metadata
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn has_indicator(&self, indicator: Indicator) -> bool {
        self.findings.iter().any(|f| f.indicator == indicator)
    }

    /// Sorted, duplicate-free indicator set
    pub fn indicator_set(&self) -> Vec<Indicator> {
        let mut set: Vec<Indicator> = self.findings.iter().map(|f| f.indicator).collect();
        set.sort();
        set.dedup();
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finding_confidence_clamped() {
        let f = Finding::new(Indicator::PitchStable, 250, "x", "test");
        assert_eq!(f.confidence(), 100);
    }

    #[test]
    fn test_deserialized_confidence_clamped() {
        let json = r#"{"indicator":"Pitch-Stable","confidence":180,"detail":"","detector":"x"}"#;
        let f: Finding = serde_json::from_str(json).unwrap();
        assert_eq!(f.confidence(), 100);
    }

    #[test]
    fn test_indicator_wire_names() {
        let json = serde_json::to_string(&Indicator::SpectralBandwidth).unwrap();
        assert_eq!(json, "\"Spectral-BW\"");
        let back: Indicator = serde_json::from_str("\"ZCR-Low\"").unwrap();
        assert_eq!(back, Indicator::ZcrLow);
    }

    #[test]
    fn test_channel_from_name() {
        assert_eq!(Channel::from_name("Mic"), Some(Channel::Microphone));
        assert_eq!(Channel::from_name("webcam"), None);
    }
}
