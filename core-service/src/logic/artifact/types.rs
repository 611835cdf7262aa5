//! Artifact Types
//!
//! `RawArtifact` is what capture produces and what travels to the analysis
//! service. `Artifact` is the decoded, immutable unit detectors look at.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::wav;
use crate::logic::detector::DetectorError;
use crate::logic::verdict::{ArtifactMeta, Channel};

/// Payload kind of a raw artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Audio,
    Image,
    Text,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => "audio",
            ArtifactKind::Image => "image",
            ArtifactKind::Text => "text",
        }
    }
}

/// Pixel layouts accepted for image payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "rgb8" | "rgb" => Some(PixelFormat::Rgb8),
            "rgba8" | "rgba" => Some(PixelFormat::Rgba8),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

// ============================================================================
// RAW ARTIFACT
// ============================================================================

/// Encoded artifact bytes plus the fields needed to decode them
#[derive(Debug, Clone, PartialEq)]
pub struct RawArtifact {
    pub channel: Channel,
    pub kind: ArtifactKind,
    pub bytes: Vec<u8>,
    /// `wav` for audio, `rgb8`/`rgba8` for images, ignored for text
    pub encoding: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub captured_at: DateTime<Utc>,
}

impl RawArtifact {
    pub fn new(channel: Channel, kind: ArtifactKind, bytes: Vec<u8>) -> Self {
        Self {
            channel,
            kind,
            bytes,
            encoding: None,
            width: None,
            height: None,
            captured_at: Utc::now(),
        }
    }

    pub fn text(channel: Channel, text: &str) -> Self {
        Self::new(channel, ArtifactKind::Text, text.as_bytes().to_vec())
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_encoding(mut self, encoding: &str) -> Self {
        self.encoding = Some(encoding.to_string());
        self
    }
}

// ============================================================================
// DECODED ARTIFACT
// ============================================================================

/// Decoded payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Mono samples in -1.0..=1.0
    Audio { samples: Vec<f32>, sample_rate: u32 },
    Image { pixels: Vec<u8>, width: u32, height: u32, format: PixelFormat },
    Text(String),
}

/// Immutable sampled unit tagged with channel and capture time
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    channel: Channel,
    payload: Payload,
    captured_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(channel: Channel, payload: Payload, captured_at: DateTime<Utc>) -> Self {
        Self { channel, payload, captured_at }
    }

    /// Decode raw bytes. Unknown encodings are `UnsupportedArtifact`,
    /// corrupt bytes are `Malformed`.
    pub fn decode(raw: &RawArtifact) -> Result<Self, DetectorError> {
        let payload = match raw.kind {
            ArtifactKind::Audio => {
                let encoding = raw.encoding.as_deref().unwrap_or("wav");
                if !encoding.eq_ignore_ascii_case("wav") {
                    return Err(DetectorError::UnsupportedArtifact(format!(
                        "audio encoding '{}'",
                        encoding
                    )));
                }
                if raw.bytes.is_empty() {
                    // Nothing recorded; detectors treat this as silence
                    Payload::Audio { samples: Vec::new(), sample_rate: 0 }
                } else {
                    let decoded = wav::decode(&raw.bytes)?;
                    Payload::Audio { samples: decoded.samples, sample_rate: decoded.sample_rate }
                }
            }
            ArtifactKind::Image => {
                let encoding = raw.encoding.as_deref().unwrap_or("rgb8");
                let format = PixelFormat::from_name(encoding).ok_or_else(|| {
                    DetectorError::UnsupportedArtifact(format!("pixel format '{}'", encoding))
                })?;
                let (width, height) = match (raw.width, raw.height) {
                    (Some(w), Some(h)) => (w, h),
                    _ => return Err(DetectorError::Malformed("image without dimensions".into())),
                };
                let expected = (width as usize)
                    .checked_mul(height as usize)
                    .and_then(|n| n.checked_mul(format.bytes_per_pixel()))
                    .ok_or_else(|| {
                        DetectorError::Malformed(format!("image dimensions {}x{} overflow", width, height))
                    })?;
                if raw.bytes.len() != expected {
                    return Err(DetectorError::Malformed(format!(
                        "expected {} pixel bytes for {}x{}, got {}",
                        expected,
                        width,
                        height,
                        raw.bytes.len()
                    )));
                }
                Payload::Image { pixels: raw.bytes.clone(), width, height, format }
            }
            ArtifactKind::Text => {
                let text = String::from_utf8(raw.bytes.clone())
                    .map_err(|e| DetectorError::Malformed(format!("text is not UTF-8: {}", e)))?;
                Payload::Text(text)
            }
        };

        Ok(Self::new(raw.channel, payload, raw.captured_at))
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn kind(&self) -> ArtifactKind {
        match self.payload {
            Payload::Audio { .. } => ArtifactKind::Audio,
            Payload::Image { .. } => ArtifactKind::Image,
            Payload::Text(_) => ArtifactKind::Text,
        }
    }

    /// Duration / dimensions reported back with the verdict
    pub fn meta(&self) -> ArtifactMeta {
        match &self.payload {
            Payload::Audio { samples, sample_rate } => ArtifactMeta {
                duration_secs: Some(if *sample_rate > 0 {
                    samples.len() as f64 / *sample_rate as f64
                } else {
                    0.0
                }),
                sample_rate: Some(*sample_rate),
                ..Default::default()
            },
            Payload::Image { width, height, .. } => ArtifactMeta {
                width: Some(*width),
                height: Some(*height),
                ..Default::default()
            },
            Payload::Text(text) => ArtifactMeta {
                text_length: Some(text.chars().count()),
                ..Default::default()
            },
        }
    }
}
