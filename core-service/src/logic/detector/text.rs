//! Scam Text Detector
//!
//! Pattern checks over clipboard contents and on-screen text: call-back phone
//! numbers, pressure language, payment demands and remote-access tooling.
//! Urgent language together with a phone number is the classic tech-support
//! scam pop-up and raises its own, stronger indicator.

use once_cell::sync::Lazy;
use regex::Regex;

use super::rules::*;
use super::{Detector, DetectorError};
use crate::logic::artifact::{Artifact, Payload};
use crate::logic::verdict::{Finding, Indicator};

pub const DETECTOR_NAME: &str = "scam-text";

static PHONE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{3}\)|\b\d{3})[\s.-]?\d{3}[\s.-]?\d{4}\b")
        .expect("phone pattern")
});

static URGENT_LANGUAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:urgent|immediately|act now|call now|final notice|within 24 hours|virus detected|security alert|do not (?:turn off|restart|shut down|close this)|your (?:computer|pc|device|account|mac) (?:is|has been) (?:infected|locked|blocked|compromised|suspended))\b",
    )
    .expect("urgent pattern")
});

static PAYMENT_DEMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:gift ?cards?|itunes cards?|google play cards?|steam cards?|bitcoin|crypto ?wallet|wire transfer|western union|moneygram|pay (?:a|the) fine)\b",
    )
    .expect("payment pattern")
});

static REMOTE_ACCESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:anydesk|teamviewer|ultraviewer|logmein|supremo|quick ?assist|remote ?access)\b")
        .expect("remote access pattern")
});

pub struct ScamTextDetector {
    rules: TextRules,
    extra_urgent: Vec<String>,
}

impl ScamTextDetector {
    pub fn new(rules: TextRules) -> Self {
        let extra_urgent = rules
            .extra_urgent_phrases
            .iter()
            .map(|p| p.to_lowercase())
            .filter(|p| !p.trim().is_empty())
            .collect();
        Self { rules, extra_urgent }
    }

    fn urgent_match(&self, text: &str, lowered: &str) -> Option<String> {
        if let Some(m) = URGENT_LANGUAGE.find(text) {
            return Some(m.as_str().to_string());
        }
        self.extra_urgent.iter().find(|p| lowered.contains(p.as_str())).cloned()
    }

    /// Run every pattern over the text
    pub fn scan(&self, text: &str) -> Vec<Finding> {
        let text: String = text.chars().take(self.rules.max_chars).collect();
        let lowered = text.to_lowercase();
        let mut findings = Vec::new();

        let phone = PHONE_NUMBER.find(&text).map(|m| m.as_str().to_string());
        let urgent = self.urgent_match(&text, &lowered);

        if let Some(number) = &phone {
            findings.push(Finding::new(
                Indicator::PhoneNumber,
                PHONE_NUMBER_CONFIDENCE,
                format!("Call-back number: {}", number),
                DETECTOR_NAME,
            ));
        }
        if let Some(phrase) = &urgent {
            findings.push(Finding::new(
                Indicator::UrgentLanguage,
                URGENT_LANGUAGE_CONFIDENCE,
                format!("Pressure language: \"{}\"", phrase),
                DETECTOR_NAME,
            ));
        }
        if let Some(m) = PAYMENT_DEMAND.find(&text) {
            findings.push(Finding::new(
                Indicator::PaymentDemand,
                PAYMENT_DEMAND_CONFIDENCE,
                format!("Untraceable payment method: \"{}\"", m.as_str()),
                DETECTOR_NAME,
            ));
        }
        if let Some(m) = REMOTE_ACCESS.find(&text) {
            findings.push(Finding::new(
                Indicator::RemoteAccessTool,
                REMOTE_ACCESS_CONFIDENCE,
                format!("Remote-access tool mentioned: \"{}\"", m.as_str()),
                DETECTOR_NAME,
            ));
        }
        if let (Some(number), Some(phrase)) = (&phone, &urgent) {
            findings.push(Finding::new(
                Indicator::TechSupportScam,
                TECH_SUPPORT_SCAM_CONFIDENCE,
                format!("\"{}\" with call-back number {}", phrase, number),
                DETECTOR_NAME,
            ));
        }

        findings
    }
}

impl Detector for ScamTextDetector {
    fn name(&self) -> &'static str {
        DETECTOR_NAME
    }

    fn supports(&self, artifact: &Artifact) -> bool {
        matches!(artifact.payload(), Payload::Text(_))
    }

    fn detect(&self, artifact: &Artifact) -> Result<Vec<Finding>, DetectorError> {
        match artifact.payload() {
            Payload::Text(text) if text.trim().is_empty() => Ok(vec![]),
            Payload::Text(text) => Ok(self.scan(text)),
            _ => Err(DetectorError::UnsupportedArtifact(format!(
                "{} expects text, got {}",
                DETECTOR_NAME,
                artifact.kind().as_str()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indicators(findings: &[Finding]) -> Vec<Indicator> {
        findings.iter().map(|f| f.indicator).collect()
    }

    #[test]
    fn test_benign_text() {
        let d = ScamTextDetector::new(TextRules::default());
        assert!(d.scan("Lunch at noon? The usual place.").is_empty());
    }

    #[test]
    fn test_tech_support_popup() {
        let d = ScamTextDetector::new(TextRules::default());
        let findings = d.scan("WARNING! Your computer is infected. Call Microsoft Support at (888) 555-0199 immediately");
        let tags = indicators(&findings);
        assert!(tags.contains(&Indicator::PhoneNumber));
        assert!(tags.contains(&Indicator::UrgentLanguage));
        assert!(tags.contains(&Indicator::TechSupportScam));
    }

    #[test]
    fn test_payment_and_remote_access() {
        let d = ScamTextDetector::new(TextRules::default());
        let findings = d.scan("Install AnyDesk and buy Google Play cards to pay the fine");
        let tags = indicators(&findings);
        assert!(tags.contains(&Indicator::RemoteAccessTool));
        assert!(tags.contains(&Indicator::PaymentDemand));
        assert!(!tags.contains(&Indicator::TechSupportScam));
    }

    #[test]
    fn test_extra_urgent_phrase() {
        let d = ScamTextDetector::new(TextRules {
            extra_urgent_phrases: vec!["Tài khoản bị khóa".into()],
            ..Default::default()
        });
        let tags = indicators(&d.scan("tài khoản bị khóa"));
        assert_eq!(tags, vec![Indicator::UrgentLanguage]);
    }
}
