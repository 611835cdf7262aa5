//! Screen Alarm Detector
//!
//! Scareware pages paint large areas in saturated alarm red. Measures the
//! share of such pixels in a screenshot.

use super::rules::*;
use super::{Detector, DetectorError};
use crate::logic::artifact::{Artifact, Payload, PixelFormat};
use crate::logic::verdict::{Finding, Indicator};

pub const DETECTOR_NAME: &str = "screen-alarm";

pub struct ScreenAlarmDetector {
    thresholds: ScreenThresholds,
}

impl ScreenAlarmDetector {
    pub fn new(thresholds: ScreenThresholds) -> Self {
        Self { thresholds }
    }

    /// Fraction of pixels that read as alarm red
    pub fn alarm_share(&self, pixels: &[u8], format: PixelFormat) -> f32 {
        let t = &self.thresholds;
        let bpp = format.bytes_per_pixel();
        let total = pixels.len() / bpp;
        if total == 0 {
            return 0.0;
        }
        let red = pixels
            .chunks_exact(bpp)
            .filter(|px| px[0] >= t.red_min && px[1] <= t.other_max && px[2] <= t.other_max)
            .count();
        red as f32 / total as f32
    }
}

impl Detector for ScreenAlarmDetector {
    fn name(&self) -> &'static str {
        DETECTOR_NAME
    }

    fn supports(&self, artifact: &Artifact) -> bool {
        matches!(artifact.payload(), Payload::Image { .. })
    }

    fn detect(&self, artifact: &Artifact) -> Result<Vec<Finding>, DetectorError> {
        let (pixels, format) = match artifact.payload() {
            Payload::Image { pixels, format, .. } => (pixels, *format),
            _ => {
                return Err(DetectorError::UnsupportedArtifact(format!(
                    "{} expects an image, got {}",
                    DETECTOR_NAME,
                    artifact.kind().as_str()
                )))
            }
        };

        let share = self.alarm_share(pixels, format);
        let mut findings = Vec::new();

        if share > self.thresholds.alarm_share {
            findings.push(Finding::new(
                Indicator::AlarmColor,
                ALARM_COLOR_CONFIDENCE,
                format!("{:.0}% of the screen is alarm red", share * 100.0),
                DETECTOR_NAME,
            ));
        }
        if share > self.thresholds.flood_share {
            findings.push(Finding::new(
                Indicator::AlarmFlood,
                ALARM_FLOOD_CONFIDENCE,
                format!("Screen flooded with alarm red ({:.0}%)", share * 100.0),
                DETECTOR_NAME,
            ));
        }

        Ok(findings)
    }
}
