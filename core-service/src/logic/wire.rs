//! Analysis Service Wire Types
//!
//! Request/response bodies shared by the analysis service and the monitor
//! loop's client.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::aggregator;
use crate::logic::artifact::{ArtifactKind, RawArtifact};
use crate::logic::detector::DetectorError;
use crate::logic::verdict::{ArtifactMeta, Channel, Finding, Indicator, Verdict};

// ============================================================================
// REQUEST
// ============================================================================

/// Channel-specific fields describing the encoded content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub channel: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub source_identifier: String,
    /// Standard base64 of the artifact bytes
    pub content: String,
    pub metadata: RequestMetadata,
}

impl AnalyzeRequest {
    pub fn from_raw(source_identifier: &str, raw: &RawArtifact) -> Self {
        Self {
            source_identifier: source_identifier.to_string(),
            content: STANDARD.encode(&raw.bytes),
            metadata: RequestMetadata {
                channel: raw.channel.as_str().to_string(),
                kind: raw.kind.as_str().to_string(),
                encoding: raw.encoding.clone(),
                sample_rate: None,
                width: raw.width,
                height: raw.height,
            },
        }
    }

    /// Channel named in the metadata, if it is a known one
    pub fn channel(&self) -> Option<Channel> {
        Channel::from_name(&self.metadata.channel)
    }

    pub fn into_raw(self) -> Result<RawArtifact, DetectorError> {
        let channel = self.channel().ok_or_else(|| {
            DetectorError::UnsupportedArtifact(format!("unknown channel '{}'", self.metadata.channel))
        })?;

        let kind = match self.metadata.kind.to_lowercase().as_str() {
            "audio" => ArtifactKind::Audio,
            "image" => ArtifactKind::Image,
            "text" => ArtifactKind::Text,
            other => {
                return Err(DetectorError::UnsupportedArtifact(format!("unknown kind '{}'", other)))
            }
        };

        let bytes = STANDARD
            .decode(self.content.trim())
            .map_err(|e| DetectorError::Malformed(format!("content is not base64: {}", e)))?;

        Ok(RawArtifact {
            channel,
            kind,
            bytes,
            encoding: self.metadata.encoding,
            width: self.metadata.width,
            height: self.metadata.height,
            captured_at: Utc::now(),
        })
    }
}

// ============================================================================
// RESPONSE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFinding {
    pub indicator: Indicator,
    pub confidence: u8,
    pub details: String,
    #[serde(default)]
    pub detector: String,
}

impl From<&Finding> for WireFinding {
    fn from(f: &Finding) -> Self {
        Self {
            indicator: f.indicator,
            confidence: f.confidence(),
            details: f.detail.clone(),
            detector: f.detector.clone(),
        }
    }
}

impl From<&WireFinding> for Finding {
    fn from(w: &WireFinding) -> Self {
        Finding::new(w.indicator, w.confidence, w.details.clone(), &w.detector)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    /// `None` when the service could not form an opinion
    pub is_threat: Option<bool>,
    pub confidence: u8,
    pub findings: Vec<WireFinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    #[serde(flatten)]
    pub metadata: ArtifactMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AnalyzeResponse {
    pub fn from_verdict(verdict: &Verdict) -> Self {
        Self {
            is_threat: Some(verdict.is_threat()),
            confidence: verdict.confidence(),
            findings: verdict.findings().iter().map(WireFinding::from).collect(),
            channel: Some(verdict.channel()),
            metadata: verdict.metadata().clone(),
            error: None,
            error_kind: None,
            timestamp: verdict.timestamp(),
        }
    }

    /// No-opinion response: `is_threat: null`, confidence 0, error set
    pub fn from_error(channel: Option<Channel>, error: &DetectorError) -> Self {
        Self {
            is_threat: None,
            confidence: 0,
            findings: vec![],
            channel,
            metadata: ArtifactMeta::default(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            timestamp: Utc::now(),
        }
    }

    /// Rebuild the verdict on the receiving side. Confidence is recomputed
    /// from the findings rather than trusted.
    pub fn to_verdict(&self, fallback_channel: Channel) -> Option<Verdict> {
        if self.error.is_some() || self.is_threat.is_none() {
            return None;
        }
        let findings: Vec<Finding> = self.findings.iter().map(Finding::from).collect();
        Some(aggregator::aggregate(
            self.channel.unwrap_or(fallback_channel),
            self.metadata.clone(),
            findings,
            self.timestamp,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip_to_raw() {
        let raw = RawArtifact::text(Channel::Clipboard, "call 555-123-4567");
        let request = AnalyzeRequest::from_raw("host-a", &raw);
        assert_eq!(request.metadata.channel, "clipboard");

        let back = request.into_raw().unwrap();
        assert_eq!(back.bytes, raw.bytes);
        assert_eq!(back.kind, ArtifactKind::Text);
    }

    #[test]
    fn test_bad_base64_is_malformed() {
        let request = AnalyzeRequest {
            source_identifier: "x".into(),
            content: "!!!not base64!!!".into(),
            metadata: RequestMetadata {
                channel: "clipboard".into(),
                kind: "text".into(),
                ..Default::default()
            },
        };
        assert!(matches!(request.into_raw(), Err(DetectorError::Malformed(_))));
    }

    #[test]
    fn test_unknown_channel_is_unsupported() {
        let request = AnalyzeRequest {
            source_identifier: "x".into(),
            content: String::new(),
            metadata: RequestMetadata {
                channel: "webcam".into(),
                kind: "image".into(),
                ..Default::default()
            },
        };
        assert!(matches!(request.into_raw(), Err(DetectorError::UnsupportedArtifact(_))));
    }

    #[test]
    fn test_error_response_shape() {
        let err = DetectorError::DependencyUnavailable("no features".into());
        let response = AnalyzeResponse::from_error(Some(Channel::Microphone), &err);
        let json = serde_json::to_value(&response).unwrap();

        assert!(json["is_threat"].is_null());
        assert_eq!(json["confidence"], 0);
        assert_eq!(json["error_kind"], "dependency_unavailable");
        assert!(response.to_verdict(Channel::Microphone).is_none());
    }

    #[test]
    fn test_to_verdict_recomputes_confidence() {
        let json = r#"{
            "is_threat": true,
            "confidence": 99,
            "findings": [{"indicator": "Pitch-Stable", "confidence": 30, "details": "steady"}],
            "channel": "microphone",
            "duration_secs": 2.0,
            "timestamp": "2026-01-01T00:00:00Z"
        }"#;
        let response: AnalyzeResponse = serde_json::from_str(json).unwrap();
        let verdict = response.to_verdict(Channel::Microphone).unwrap();
        assert_eq!(verdict.confidence(), 30);
        assert!(!verdict.is_threat());
        assert_eq!(verdict.metadata().duration_secs, Some(2.0));
    }
}
