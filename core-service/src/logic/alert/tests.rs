use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::*;
use crate::logic::aggregator;
use crate::logic::config::AlertConfig;
use crate::logic::verdict::{ArtifactMeta, Channel, Finding, Indicator, Verdict};

#[derive(Default)]
struct CountingNotifier {
    notified: AtomicUsize,
    confirmed: AtomicUsize,
}

impl Notifier for CountingNotifier {
    fn notify(&self, _alert: &Alert) -> Result<(), NotifyError> {
        self.notified.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn confirm(&self, _alert: &Alert) -> Result<Option<bool>, NotifyError> {
        self.confirmed.fetch_add(1, Ordering::SeqCst);
        Ok(Some(true))
    }
}

/// Fails the first `failures` notifications, delivers the rest
#[derive(Default)]
struct FlakyNotifier {
    failures: AtomicUsize,
    delivered: AtomicUsize,
}

impl Notifier for FlakyNotifier {
    fn notify(&self, _alert: &Alert) -> Result<(), NotifyError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(NotifyError::Failed("notify-send".into(), 1));
        }
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn verdict(channel: Channel, findings: Vec<(Indicator, u8)>) -> Verdict {
    let findings = findings
        .into_iter()
        .map(|(i, c)| Finding::new(i, c, "test", "test"))
        .collect();
    aggregator::aggregate(channel, ArtifactMeta::default(), findings, Utc::now())
}

fn tech_support() -> Verdict {
    verdict(
        Channel::Clipboard,
        vec![(Indicator::TechSupportScam, 75), (Indicator::PhoneNumber, 30)],
    )
}

fn dispatcher(cooldown_secs: u64) -> (AlertDispatcher, Arc<CountingNotifier>) {
    let notifier = Arc::new(CountingNotifier::default());
    let dispatcher = AlertDispatcher::new(
        AlertConfig::new(Duration::from_secs(cooldown_secs)),
        notifier.clone(),
    );
    (dispatcher, notifier)
}

#[test]
fn test_dedup_scenario() {
    let (dispatcher, notifier) = dispatcher(60);
    let t0 = Instant::now();

    let first = dispatcher.dispatch_at(&tech_support(), t0).unwrap();
    assert!(matches!(first, DispatchOutcome::Sent { severity: Severity::High, confirmed: None }));

    let second = dispatcher.dispatch_at(&tech_support(), t0 + Duration::from_secs(10)).unwrap();
    assert_eq!(second, DispatchOutcome::Suppressed { suppressed_count: 1 });
    assert_eq!(notifier.notified.load(Ordering::SeqCst), 1);

    let third = dispatcher.dispatch_at(&tech_support(), t0 + Duration::from_secs(61)).unwrap();
    assert!(matches!(third, DispatchOutcome::Sent { .. }));
    assert_eq!(notifier.notified.load(Ordering::SeqCst), 2);

    let record = dispatcher.record(&dedup_key(&tech_support())).unwrap();
    assert_eq!(record.suppressed_count, 0);
    assert_eq!(record.last_sent, t0 + Duration::from_secs(61));
}

#[test]
fn test_non_threat_ignored() {
    let (dispatcher, notifier) = dispatcher(60);
    let weak = verdict(Channel::Microphone, vec![(Indicator::PitchStable, 30)]);
    let boundary = verdict(Channel::Screen, vec![(Indicator::AlarmFlood, 50)]);

    assert_eq!(dispatcher.dispatch(&weak).unwrap(), DispatchOutcome::Ignored);
    assert_eq!(dispatcher.dispatch(&boundary).unwrap(), DispatchOutcome::Ignored);
    assert_eq!(notifier.notified.load(Ordering::SeqCst), 0);
    assert!(dispatcher.is_empty());
}

#[test]
fn test_key_uses_channel_and_indicator_set() {
    let a = verdict(
        Channel::Clipboard,
        vec![(Indicator::PhoneNumber, 30), (Indicator::TechSupportScam, 75)],
    );
    let reordered = verdict(
        Channel::Clipboard,
        vec![(Indicator::TechSupportScam, 80), (Indicator::PhoneNumber, 30), (Indicator::PhoneNumber, 30)],
    );
    let other_channel = verdict(
        Channel::Screen,
        vec![(Indicator::PhoneNumber, 30), (Indicator::TechSupportScam, 75)],
    );

    assert_eq!(dedup_key(&a), dedup_key(&reordered));
    assert_ne!(dedup_key(&a), dedup_key(&other_channel));
    assert_eq!(dedup_key(&a).len(), 64);
}

#[test]
fn test_distinct_keys_not_suppressed() {
    let (dispatcher, notifier) = dispatcher(60);
    let now = Instant::now();

    dispatcher.dispatch_at(&tech_support(), now).unwrap();
    let flood = verdict(Channel::Screen, vec![(Indicator::AlarmFlood, 60)]);
    let outcome = dispatcher.dispatch_at(&flood, now).unwrap();

    assert!(matches!(outcome, DispatchOutcome::Sent { .. }));
    assert_eq!(notifier.notified.load(Ordering::SeqCst), 2);
    assert_eq!(dispatcher.len(), 2);
}

#[test]
fn test_severity() {
    assert_eq!(Severity::classify(0, 90), Severity::Low);
    assert_eq!(Severity::classify(50, 90), Severity::Low);
    assert_eq!(Severity::classify(51, 90), Severity::High);
    assert_eq!(Severity::classify(89, 90), Severity::High);
    assert_eq!(Severity::classify(90, 90), Severity::Critical);
    assert_eq!(Severity::classify(100, 90), Severity::Critical);
}

#[test]
fn test_critical_asks_for_confirmation() {
    let notifier = Arc::new(CountingNotifier::default());
    let mut config = AlertConfig::new(Duration::from_secs(60));
    config.confirm_min_confidence = 70;
    let dispatcher = AlertDispatcher::new(config, notifier.clone());

    let outcome = dispatcher.dispatch(&tech_support()).unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Sent { severity: Severity::Critical, confirmed: Some(true) }
    );
    assert_eq!(notifier.confirmed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failed_notification_retried_next_dispatch() {
    let notifier = Arc::new(FlakyNotifier { failures: AtomicUsize::new(1), ..Default::default() });
    let dispatcher = AlertDispatcher::new(AlertConfig::new(Duration::from_secs(60)), notifier.clone());
    let now = Instant::now();
    let critical = verdict(Channel::Screen, vec![(Indicator::AlarmFlood, 95)]);

    assert!(dispatcher.dispatch_at(&critical, now).is_err());
    assert!(dispatcher.record(&dedup_key(&critical)).is_none());

    let retried = dispatcher.dispatch_at(&critical, now + Duration::from_secs(1)).unwrap();
    assert!(matches!(retried, DispatchOutcome::Sent { severity: Severity::Critical, .. }));
    assert_eq!(
        dispatcher.dispatch_at(&critical, now + Duration::from_secs(2)).unwrap(),
        DispatchOutcome::Suppressed { suppressed_count: 1 }
    );
    assert_eq!(notifier.delivered.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failed_renotification_keeps_expired_record() {
    let notifier = Arc::new(FlakyNotifier::default());
    let dispatcher = AlertDispatcher::new(AlertConfig::new(Duration::from_secs(10)), notifier.clone());
    let t0 = Instant::now();
    dispatcher.dispatch_at(&tech_support(), t0).unwrap();

    notifier.failures.store(1, Ordering::SeqCst);
    let later = t0 + Duration::from_secs(20);
    assert!(dispatcher.dispatch_at(&tech_support(), later).is_err());
    assert_eq!(dispatcher.record(&dedup_key(&tech_support())).unwrap().last_sent, t0);

    assert!(matches!(
        dispatcher.dispatch_at(&tech_support(), later).unwrap(),
        DispatchOutcome::Sent { .. }
    ));
    assert_eq!(notifier.delivered.load(Ordering::SeqCst), 2);
}

#[test]
fn test_prune() {
    let (dispatcher, _) = dispatcher(30);
    let t0 = Instant::now();
    dispatcher.dispatch_at(&tech_support(), t0).unwrap();

    assert_eq!(dispatcher.prune(t0 + Duration::from_secs(5)), 0);
    assert_eq!(dispatcher.prune(t0 + Duration::from_secs(31)), 1);
    assert!(dispatcher.is_empty());
}

#[test]
fn test_concurrent_same_key_single_notification() {
    let (dispatcher, notifier) = dispatcher(60);
    let now = Instant::now();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || dispatcher.dispatch_at(&tech_support(), now).unwrap())
        })
        .collect();

    let outcomes: Vec<DispatchOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let sent = outcomes.iter().filter(|o| matches!(o, DispatchOutcome::Sent { .. })).count();

    assert_eq!(sent, 1);
    assert_eq!(notifier.notified.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.record(&dedup_key(&tech_support())).unwrap().suppressed_count, 7);
}
