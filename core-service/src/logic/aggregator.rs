//! Aggregator
//!
//! Folds findings into verdicts. The rule is monotone max: a verdict is as
//! confident as its strongest finding, so weak findings can never dilute a
//! strong one, and piling up weak findings can never manufacture a threat.
//!
//! Findings from different channels stay in separate per-channel verdicts.
//! Cross-channel evidence is added through `CorrelationRule`s, each of which
//! raises findings of its own.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::logic::detector::rules::CORRELATED_ALARM_CONFIDENCE;
use crate::logic::verdict::{ArtifactMeta, Channel, Finding, Indicator, Verdict, THREAT_THRESHOLD};

// ============================================================================
// MONOTONE MAX
// ============================================================================

/// Max finding confidence, 0 when there are none
pub fn aggregate_confidence(findings: &[Finding]) -> u8 {
    findings.iter().map(|f| f.confidence()).max().unwrap_or(0)
}

/// Build a verdict from the findings raised for one artifact
pub fn aggregate(
    channel: Channel,
    metadata: ArtifactMeta,
    findings: Vec<Finding>,
    timestamp: DateTime<Utc>,
) -> Verdict {
    let confidence = aggregate_confidence(&findings);
    Verdict::from_parts(confidence, findings, channel, metadata, timestamp)
}

/// Zero-confidence verdict for artifacts no detector could judge
pub fn empty(channel: Channel, metadata: ArtifactMeta, timestamp: DateTime<Utc>) -> Verdict {
    aggregate(channel, metadata, vec![], timestamp)
}

/// Merge verdicts of the same channel (several detectors, or correlated
/// artifacts of one channel). Returns `None` for an empty input or mixed
/// channels.
pub fn merge(verdicts: &[Verdict]) -> Option<Verdict> {
    let first = verdicts.first()?;
    if verdicts.iter().any(|v| v.channel() != first.channel()) {
        return None;
    }

    let findings: Vec<Finding> = verdicts.iter().flat_map(|v| v.findings().iter().cloned()).collect();
    let timestamp = verdicts.iter().map(|v| v.timestamp()).max().unwrap_or(first.timestamp());
    Some(aggregate(first.channel(), first.metadata().clone(), findings, timestamp))
}

// ============================================================================
// CROSS-CHANNEL CORRELATION
// ============================================================================

/// Extension point for evidence that only exists across channels.
///
/// Rules raise findings; they never rescale existing ones.
pub trait CorrelationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn correlate(&self, per_channel: &BTreeMap<Channel, Verdict>) -> Option<Finding>;
}

/// Alarm-red screen plus a call-back number in any text channel
pub struct AlarmWithPhoneNumber;

impl CorrelationRule for AlarmWithPhoneNumber {
    fn name(&self) -> &'static str {
        "alarm-with-phone-number"
    }

    fn correlate(&self, per_channel: &BTreeMap<Channel, Verdict>) -> Option<Finding> {
        let alarm = per_channel.values().find(|v| {
            v.has_indicator(Indicator::AlarmColor) || v.has_indicator(Indicator::AlarmFlood)
        })?;
        let number = per_channel
            .values()
            .find(|v| v.has_indicator(Indicator::PhoneNumber))?;

        Some(Finding::new(
            Indicator::CorrelatedAlarm,
            CORRELATED_ALARM_CONFIDENCE,
            format!(
                "Alarm colours on {} while a phone number is shown on {}",
                alarm.channel(),
                number.channel()
            ),
            self.name(),
        ))
    }
}

/// All verdicts of one monitor cycle, kept per channel
#[derive(Debug, Clone, Serialize)]
pub struct CompositeVerdict {
    pub per_channel: BTreeMap<Channel, Verdict>,
    /// Findings raised by correlation rules, on `Channel::Composite`
    pub correlated: Option<Verdict>,
}

impl CompositeVerdict {
    pub fn confidence(&self) -> u8 {
        self.per_channel
            .values()
            .chain(self.correlated.iter())
            .map(|v| v.confidence())
            .max()
            .unwrap_or(0)
    }

    pub fn is_threat(&self) -> bool {
        self.confidence() > THREAT_THRESHOLD
    }
}

pub struct Correlator {
    rules: Vec<Box<dyn CorrelationRule>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self { rules: vec![Box::new(AlarmWithPhoneNumber)] }
    }
}

impl Correlator {
    pub fn new(rules: Vec<Box<dyn CorrelationRule>>) -> Self {
        Self { rules }
    }

    pub fn correlate(&self, verdicts: Vec<Verdict>) -> CompositeVerdict {
        let mut grouped: BTreeMap<Channel, Vec<Verdict>> = BTreeMap::new();
        for v in verdicts {
            grouped.entry(v.channel()).or_default().push(v);
        }

        let per_channel: BTreeMap<Channel, Verdict> = grouped
            .into_iter()
            .filter_map(|(channel, list)| merge(&list).map(|v| (channel, v)))
            .collect();

        let findings: Vec<Finding> = self
            .rules
            .iter()
            .filter_map(|rule| rule.correlate(&per_channel))
            .collect();

        let correlated = if findings.is_empty() {
            None
        } else {
            let timestamp = per_channel
                .values()
                .map(|v| v.timestamp())
                .max()
                .unwrap_or_else(Utc::now);
            Some(aggregate(Channel::Composite, ArtifactMeta::default(), findings, timestamp))
        };

        CompositeVerdict { per_channel, correlated }
    }
}
