//! Audit Event Types
//!
//! Immutable, timestamped records of what each process decided and why.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::verdict::{Channel, Verdict};

// ============================================================================
// EVENT TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    SystemStart,
    SystemStop,
    /// Analysis service produced a verdict
    VerdictIssued,
    /// User was notified
    AlertSent,
    /// Alert dropped inside the cool-down window
    AlertSuppressed,
    UnitStarted,
    UnitRestarted,
    UnitStopped,
    /// Unit failed to start or was declared unhealthy
    UnitFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SystemStart => "system_start",
            EventType::SystemStop => "system_stop",
            EventType::VerdictIssued => "verdict_issued",
            EventType::AlertSent => "alert_sent",
            EventType::AlertSuppressed => "alert_suppressed",
            EventType::UnitStarted => "unit_started",
            EventType::UnitRestarted => "unit_restarted",
            EventType::UnitStopped => "unit_stopped",
            EventType::UnitFailed => "unit_failed",
        }
    }
}

// ============================================================================
// VERDICT SUMMARY
// ============================================================================

/// Compact view of a verdict for the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictSummary {
    pub channel: Channel,
    pub confidence: u8,
    pub is_threat: bool,
    pub indicators: Vec<String>,
}

impl From<&Verdict> for VerdictSummary {
    fn from(verdict: &Verdict) -> Self {
        Self {
            channel: verdict.channel(),
            confidence: verdict.confidence(),
            is_threat: verdict.is_threat(),
            indicators: verdict
                .indicator_set()
                .iter()
                .map(|i| i.as_str().to_string())
                .collect(),
        }
    }
}

// ============================================================================
// AUDIT EVENT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    /// Correlates events from one process run
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<VerdictSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub description: String,
}

impl AuditEvent {
    pub fn new(event_type: EventType, description: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            session_id: get_session_id(),
            verdict: None,
            unit: None,
            metadata: None,
            description: description.to_string(),
        }
    }

    pub fn with_verdict(mut self, verdict: &Verdict) -> Self {
        self.verdict = Some(VerdictSummary::from(verdict));
        self
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Single JSONL line
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

// ============================================================================
// SESSION ID
// ============================================================================

use std::sync::OnceLock;

static SESSION_ID: OnceLock<String> = OnceLock::new();

pub fn get_session_id() -> String {
    SESSION_ID
        .get_or_init(|| Uuid::new_v4().to_string())
        .clone()
}

// ============================================================================
// CONVENIENCE CONSTRUCTORS
// ============================================================================

impl AuditEvent {
    pub fn system_start(component: &str, version: &str) -> Self {
        Self::new(
            EventType::SystemStart,
            &format!("{} started (v{})", component, version),
        )
        .with_metadata(serde_json::json!({
            "component": component,
            "version": version,
            "platform": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }))
    }

    pub fn system_stop(component: &str, uptime_secs: u64) -> Self {
        Self::new(
            EventType::SystemStop,
            &format!("{} stopped (uptime: {}s)", component, uptime_secs),
        )
        .with_metadata(serde_json::json!({
            "component": component,
            "uptime_secs": uptime_secs,
        }))
    }

    pub fn verdict_issued(source: &str, verdict: &Verdict) -> Self {
        Self::new(
            EventType::VerdictIssued,
            &format!(
                "{} verdict for {}: confidence {}",
                verdict.channel(),
                source,
                verdict.confidence()
            ),
        )
        .with_verdict(verdict)
    }

    pub fn alert_sent(verdict: &Verdict, severity: &str, dedup_key: &str) -> Self {
        Self::new(
            EventType::AlertSent,
            &format!("{} alert on {} (confidence {})", severity, verdict.channel(), verdict.confidence()),
        )
        .with_verdict(verdict)
        .with_metadata(serde_json::json!({ "severity": severity, "dedup_key": dedup_key }))
    }

    pub fn alert_suppressed(verdict: &Verdict, dedup_key: &str, suppressed_count: u64) -> Self {
        Self::new(
            EventType::AlertSuppressed,
            &format!("Duplicate alert on {} suppressed", verdict.channel()),
        )
        .with_verdict(verdict)
        .with_metadata(serde_json::json!({
            "dedup_key": dedup_key,
            "suppressed_count": suppressed_count,
        }))
    }

    pub fn unit(event_type: EventType, unit: &str, description: &str) -> Self {
        Self::new(event_type, description).with_unit(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::aggregator;
    use crate::logic::verdict::{ArtifactMeta, Finding, Indicator};

    #[test]
    fn test_event_to_jsonl() {
        let event = AuditEvent::new(EventType::SystemStart, "Started");
        let jsonl = event.to_jsonl();
        assert!(jsonl.contains("SystemStart"));
        assert!(!jsonl.contains('\n'));
        assert!(!jsonl.contains("\"verdict\""));
    }

    #[test]
    fn test_session_id_consistency() {
        assert_eq!(get_session_id(), get_session_id());
    }

    #[test]
    fn test_verdict_summary() {
        let verdict = aggregator::aggregate(
            Channel::Clipboard,
            ArtifactMeta::default(),
            vec![
                Finding::new(Indicator::TechSupportScam, 75, "pop-up", "scam-text"),
                Finding::new(Indicator::PhoneNumber, 30, "number", "scam-text"),
            ],
            Utc::now(),
        );
        let event = AuditEvent::verdict_issued("host-a", &verdict);
        let summary = event.verdict.unwrap();
        assert_eq!(summary.confidence, 75);
        assert!(summary.is_threat);
        assert_eq!(summary.indicators.len(), 2);
        assert!(event.description.contains("host-a"));
    }
}
