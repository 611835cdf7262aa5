//! Alert Dispatcher
//!
//! Computes a dedup key per threat verdict and lets at most one notification
//! per key through each cool-down window. The record store is the only
//! mutable state shared between callers; every decision is a single
//! read-modify-write under its lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::notifier::{NotifyError, Notifier};
use crate::logic::config::AlertConfig;
use crate::logic::telemetry::{self, AuditEvent};
use crate::logic::verdict::{Channel, Verdict, THREAT_THRESHOLD};

// ============================================================================
// SEVERITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Not a threat, never alerted
    Low,
    High,
    /// Also asks for confirmation
    Critical,
}

impl Severity {
    pub fn classify(confidence: u8, confirm_min_confidence: u8) -> Self {
        if confidence <= THREAT_THRESHOLD {
            Severity::Low
        } else if confidence >= confirm_min_confidence {
            Severity::Critical
        } else {
            Severity::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

// ============================================================================
// DEDUP KEY + RECORD
// ============================================================================

/// Hex SHA-256 of the channel and the sorted indicator set
pub fn dedup_key(verdict: &Verdict) -> String {
    let indicators: Vec<&str> = verdict.indicator_set().iter().map(|i| i.as_str()).collect();
    let mut hasher = Sha256::new();
    hasher.update(verdict.channel().as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(indicators.join(",").as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRecord {
    pub dedup_key: String,
    pub last_sent: Instant,
    pub suppressed_count: u64,
}

// ============================================================================
// ALERT
// ============================================================================

/// What the user sees
#[derive(Debug, Clone)]
pub struct Alert {
    pub severity: Severity,
    pub channel: Channel,
    pub confidence: u8,
    pub title: String,
    pub message: String,
    pub dedup_key: String,
}

impl Alert {
    fn from_verdict(verdict: &Verdict, severity: Severity, dedup_key: String) -> Self {
        let source = match verdict.channel() {
            Channel::Screen => "on your screen",
            Channel::Clipboard => "in copied text",
            Channel::Microphone => "in the audio",
            Channel::Composite => "across screen and text",
        };
        let top = verdict
            .findings()
            .iter()
            .max_by_key(|f| f.confidence())
            .map(|f| f.detail.clone())
            .unwrap_or_default();

        Self {
            severity,
            channel: verdict.channel(),
            confidence: verdict.confidence(),
            title: format!("Possible scam {} ({}%)", source, verdict.confidence()),
            message: top,
            dedup_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a threat
    Ignored,
    Sent {
        severity: Severity,
        /// `Some` when a confirmation dialog was shown
        confirmed: Option<bool>,
    },
    Suppressed {
        suppressed_count: u64,
    },
}

enum Decision {
    /// Carries the record replaced by this claim
    Send(Option<AlertRecord>),
    Suppress(u64),
}

// ============================================================================
// DISPATCHER
// ============================================================================

#[derive(Clone)]
pub struct AlertDispatcher {
    config: AlertConfig,
    notifier: Arc<dyn Notifier>,
    records: Arc<Mutex<HashMap<String, AlertRecord>>>,
}

impl AlertDispatcher {
    pub fn new(config: AlertConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            notifier,
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.config.cooldown
    }

    pub fn dispatch(&self, verdict: &Verdict) -> Result<DispatchOutcome, NotifyError> {
        self.dispatch_at(verdict, Instant::now())
    }

    /// Dispatch with an explicit clock reading
    pub fn dispatch_at(&self, verdict: &Verdict, now: Instant) -> Result<DispatchOutcome, NotifyError> {
        let severity = Severity::classify(verdict.confidence(), self.config.confirm_min_confidence);
        if !verdict.is_threat() || severity == Severity::Low {
            return Ok(DispatchOutcome::Ignored);
        }

        let key = dedup_key(verdict);
        let decision = self.decide(&key, now);

        match decision {
            Decision::Suppress(count) => {
                log::debug!("Alert {} suppressed ({} in window)", &key[..12], count);
                telemetry::record(AuditEvent::alert_suppressed(verdict, &key, count));
                Ok(DispatchOutcome::Suppressed { suppressed_count: count })
            }
            Decision::Send(previous) => {
                let alert = Alert::from_verdict(verdict, severity, key.clone());
                if let Err(e) = self.notifier.notify(&alert) {
                    self.release(&key, now, previous);
                    return Err(e);
                }

                let confirmed = if severity == Severity::Critical {
                    self.notifier.confirm(&alert).unwrap_or_else(|e| {
                        log::warn!("Confirmation for alert {} failed: {}", &key[..12], e);
                        None
                    })
                } else {
                    None
                };

                log::info!(
                    "Alert sent: {} {} (confidence {})",
                    severity.as_str(),
                    verdict.channel(),
                    verdict.confidence()
                );
                telemetry::record(AuditEvent::alert_sent(verdict, severity.as_str(), &key));
                Ok(DispatchOutcome::Sent { severity, confirmed })
            }
        }
    }

    /// Check-and-update of one record under the store lock
    fn decide(&self, key: &str, now: Instant) -> Decision {
        let cooldown = self.config.cooldown;
        let mut records = self.records.lock();

        match records.get_mut(key) {
            Some(record) if now.saturating_duration_since(record.last_sent) < cooldown => {
                record.suppressed_count += 1;
                Decision::Suppress(record.suppressed_count)
            }
            Some(record) => {
                let previous = record.clone();
                record.last_sent = now;
                record.suppressed_count = 0;
                Decision::Send(Some(previous))
            }
            None => {
                records.insert(
                    key.to_string(),
                    AlertRecord {
                        dedup_key: key.to_string(),
                        last_sent: now,
                        suppressed_count: 0,
                    },
                );
                Decision::Send(None)
            }
        }
    }

    /// Undo a claim whose notification was never delivered
    fn release(&self, key: &str, claimed_at: Instant, previous: Option<AlertRecord>) {
        let mut records = self.records.lock();
        if records.get(key).map(|r| r.last_sent) != Some(claimed_at) {
            return;
        }
        match previous {
            Some(record) => {
                records.insert(key.to_string(), record);
            }
            None => {
                records.remove(key);
            }
        }
    }

    pub fn record(&self, key: &str) -> Option<AlertRecord> {
        self.records.lock().get(key).cloned()
    }

    /// Drop records whose window has expired
    pub fn prune(&self, now: Instant) -> usize {
        let cooldown = self.config.cooldown;
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, r| now.saturating_duration_since(r.last_sent) < cooldown);
        before - records.len()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
