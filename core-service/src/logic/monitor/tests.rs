use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::logic::alert::{Alert, AlertDispatcher, DispatchOutcome, NotifyError, Notifier};
use crate::logic::artifact::{ArtifactKind, RawArtifact};
use crate::logic::config::AlertConfig;
use crate::logic::detector::{Capabilities, DetectorConfig, DetectorRegistry};
use crate::logic::verdict::{Channel, Indicator};
use crate::logic::wire::{AnalyzeRequest, AnalyzeResponse};

const SCAM_TEXT: &str = "Security alert: your PC has been locked. Call 1-800-555-0142 now";

// ============================================================================
// FAKES
// ============================================================================

/// Replays scripted results, then repeats the last artifact
struct FakeSource {
    name: &'static str,
    channel: Channel,
    script: VecDeque<Result<Option<RawArtifact>, CaptureError>>,
    repeat: Option<RawArtifact>,
}

impl FakeSource {
    fn repeating(name: &'static str, raw: RawArtifact) -> Self {
        Self { name, channel: raw.channel, script: VecDeque::new(), repeat: Some(raw) }
    }

    fn scripted(
        name: &'static str,
        channel: Channel,
        script: Vec<Result<Option<RawArtifact>, CaptureError>>,
    ) -> Self {
        Self { name, channel, script: script.into(), repeat: None }
    }
}

#[async_trait]
impl CaptureSource for FakeSource {
    fn name(&self) -> &str {
        self.name
    }

    fn channel(&self) -> Channel {
        self.channel
    }

    async fn capture(&mut self) -> Result<Option<RawArtifact>, CaptureError> {
        match self.script.pop_front() {
            Some(result) => result,
            None => Ok(self.repeat.clone()),
        }
    }
}

/// Runs the standard detectors in-process
struct LocalService {
    registry: DetectorRegistry,
    calls: AtomicUsize,
}

impl LocalService {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: DetectorRegistry::standard(&DetectorConfig::default(), Capabilities::all_available()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AnalysisService for LocalService {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let channel = request.channel();
        Ok(match self.registry.analyze_request(request.clone()) {
            Ok(verdict) => AnalyzeResponse::from_verdict(&verdict),
            Err(e) => AnalyzeResponse::from_error(channel, &e),
        })
    }
}

/// Unreachable for the first `outages` calls, then answers locally
struct Flaky {
    outages: AtomicUsize,
    inner: Arc<LocalService>,
}

#[async_trait]
impl AnalysisService for Flaky {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, ClientError> {
        let left = self.outages.load(Ordering::SeqCst);
        if left > 0 {
            self.outages.store(left - 1, Ordering::SeqCst);
            return Err(ClientError::Transient("connection refused".into()));
        }
        self.inner.analyze(request).await
    }
}

enum Broken {
    Down,
    Refusing,
    Hanging,
}

#[async_trait]
impl AnalysisService for Broken {
    async fn analyze(&self, _request: &AnalyzeRequest) -> Result<AnalyzeResponse, ClientError> {
        match self {
            Broken::Down => Err(ClientError::Transient("connection refused".into())),
            Broken::Refusing => Err(ClientError::Rejected(400, "bad request".into())),
            Broken::Hanging => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(ClientError::Transient("unreachable".into()))
            }
        }
    }
}

#[derive(Default)]
struct CountingNotifier {
    count: AtomicUsize,
}

impl Notifier for CountingNotifier {
    fn notify(&self, _alert: &Alert) -> Result<(), NotifyError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn monitor(
    sources: Vec<Box<dyn CaptureSource>>,
    service: Arc<dyn AnalysisService>,
) -> (MonitorLoop, Arc<CountingNotifier>) {
    let notifier = Arc::new(CountingNotifier::default());
    let dispatcher = AlertDispatcher::new(AlertConfig::new(Duration::from_secs(300)), notifier.clone());
    let monitor = MonitorLoop::new(
        sources,
        service,
        dispatcher,
        "test-host",
        Duration::from_millis(10),
        Duration::from_millis(100),
    );
    (monitor, notifier)
}

fn red_screen() -> RawArtifact {
    RawArtifact::new(Channel::Screen, ArtifactKind::Image, [230u8, 20, 20].repeat(100))
        .with_dimensions(10, 10)
        .with_encoding("rgb8")
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_threat_alerted_once_per_window() {
    let service = LocalService::new();
    let source = FakeSource::repeating("clipboard", RawArtifact::text(Channel::Clipboard, SCAM_TEXT));
    let (mut monitor, notifier) = monitor(vec![Box::new(source)], service.clone());

    let first = monitor.run_cycle().await;
    let verdict = first.steps[0].1.verdict().unwrap();
    assert_eq!(verdict.confidence(), 75);
    assert!(verdict.has_indicator(Indicator::TechSupportScam));
    assert_eq!(first.sent_alerts(), 1);

    let second = monitor.run_cycle().await;
    assert_eq!(second.sent_alerts(), 0);
    assert!(matches!(second.alerts[0], DispatchOutcome::Suppressed { suppressed_count: 1 }));

    assert_eq!(notifier.count.load(Ordering::SeqCst), 1);
    assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    assert_eq!(monitor.cycles(), 2);
}

#[tokio::test]
async fn test_unchanged_clipboard_analysed_once() {
    let service = LocalService::new();
    let source = ChangeFilter::new(FakeSource::repeating(
        "clipboard",
        RawArtifact::text(Channel::Clipboard, "meeting at noon"),
    ));
    let (mut monitor, _) = monitor(vec![Box::new(source)], service.clone());

    let first = monitor.run_cycle().await;
    assert!(matches!(first.steps[0].1, StepOutcome::Analyzed(_)));

    let second = monitor.run_cycle().await;
    assert!(matches!(second.steps[0].1, StepOutcome::NothingNew));
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unchanged_clipboard_retried_after_outage() {
    let local = LocalService::new();
    let service = Arc::new(Flaky { outages: AtomicUsize::new(1), inner: local.clone() });
    let source = ChangeFilter::new(FakeSource::repeating(
        "clipboard",
        RawArtifact::text(Channel::Clipboard, SCAM_TEXT),
    ));
    let (mut monitor, notifier) = monitor(vec![Box::new(source)], service);

    let first = monitor.run_cycle().await;
    assert!(matches!(first.steps[0].1, StepOutcome::SoftFailure(_)));
    assert_eq!(notifier.count.load(Ordering::SeqCst), 0);

    let second = monitor.run_cycle().await;
    assert!(matches!(second.steps[0].1, StepOutcome::Analyzed(_)));
    assert_eq!(notifier.count.load(Ordering::SeqCst), 1);

    let third = monitor.run_cycle().await;
    assert!(matches!(third.steps[0].1, StepOutcome::NothingNew));
    assert_eq!(local.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unchanged_clipboard_not_resent_after_rejection() {
    let source = ChangeFilter::new(FakeSource::repeating(
        "clipboard",
        RawArtifact::text(Channel::Clipboard, SCAM_TEXT),
    ));
    let (mut monitor, _) = monitor(vec![Box::new(source)], Arc::new(Broken::Refusing));

    let first = monitor.run_cycle().await;
    assert!(matches!(first.steps[0].1, StepOutcome::HardFailure(_)));
    let second = monitor.run_cycle().await;
    assert!(matches!(second.steps[0].1, StepOutcome::NothingNew));
}

#[tokio::test]
async fn test_capture_failure_skips_only_that_source() {
    let service = LocalService::new();
    let broken = FakeSource::scripted(
        "screen",
        Channel::Screen,
        vec![Err(CaptureError::PermissionDenied("screencapture".into()))],
    );
    let clipboard = FakeSource::repeating("clipboard", RawArtifact::text(Channel::Clipboard, SCAM_TEXT));
    let (mut monitor, notifier) = monitor(vec![Box::new(broken), Box::new(clipboard)], service.clone());

    let outcome = monitor.run_cycle().await;
    assert!(matches!(outcome.steps[0].1, StepOutcome::SoftFailure(_)));
    assert!(matches!(outcome.steps[1].1, StepOutcome::Analyzed(_)));
    assert_eq!(notifier.count.load(Ordering::SeqCst), 1);

    // Script exhausted, source now reports nothing
    let next = monitor.run_cycle().await;
    assert!(matches!(next.steps[0].1, StepOutcome::NothingNew));
}

#[tokio::test]
async fn test_service_down_is_soft() {
    let source = FakeSource::repeating("clipboard", RawArtifact::text(Channel::Clipboard, SCAM_TEXT));
    let (mut monitor, notifier) = monitor(vec![Box::new(source)], Arc::new(Broken::Down));

    for _ in 0..3 {
        let outcome = monitor.run_cycle().await;
        assert!(matches!(outcome.steps[0].1, StepOutcome::SoftFailure(_)));
    }
    assert_eq!(monitor.cycles(), 3);
    assert_eq!(notifier.count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rejected_request_is_hard_but_not_fatal() {
    let source = FakeSource::repeating("clipboard", RawArtifact::text(Channel::Clipboard, SCAM_TEXT));
    let (mut monitor, _) = monitor(vec![Box::new(source)], Arc::new(Broken::Refusing));

    let outcome = monitor.run_cycle().await;
    assert!(matches!(outcome.steps[0].1, StepOutcome::HardFailure(_)));
    assert!(monitor.run_cycle().await.steps[0].1.is_failure());
}

#[tokio::test]
async fn test_hanging_call_abandoned_after_timeout() {
    let source = FakeSource::repeating("clipboard", RawArtifact::text(Channel::Clipboard, SCAM_TEXT));
    let (mut monitor, _) = monitor(vec![Box::new(source)], Arc::new(Broken::Hanging));

    let started = std::time::Instant::now();
    let outcome = monitor.run_cycle().await;
    assert!(matches!(outcome.steps[0].1, StepOutcome::SoftFailure(_)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_error_response_is_no_opinion() {
    let service = LocalService::new();
    let malformed = RawArtifact::new(Channel::Screen, ArtifactKind::Image, vec![1, 2, 3])
        .with_dimensions(10, 10);
    let source = FakeSource::repeating("screen", malformed);
    let (mut monitor, _) = monitor(vec![Box::new(source)], service);

    let outcome = monitor.run_cycle().await;
    assert!(matches!(outcome.steps[0].1, StepOutcome::SoftFailure(_)));
    assert!(outcome.composite.per_channel.is_empty());
}

#[tokio::test]
async fn test_cross_channel_correlation() {
    let service = LocalService::new();
    let screen = FakeSource::repeating("screen", red_screen());
    let clipboard = FakeSource::repeating(
        "clipboard",
        RawArtifact::text(Channel::Clipboard, "support line 555-123-4567"),
    );
    let (mut monitor, notifier) = monitor(vec![Box::new(screen), Box::new(clipboard)], service);

    let outcome = monitor.run_cycle().await;
    let clipboard = &outcome.composite.per_channel[&Channel::Clipboard];
    assert_eq!(clipboard.confidence(), 30);

    let correlated = outcome.composite.correlated.as_ref().unwrap();
    assert_eq!(correlated.channel(), Channel::Composite);
    assert!(correlated.has_indicator(Indicator::CorrelatedAlarm));
    assert_eq!(outcome.composite.confidence(), 70);

    // Screen flood (60) and the composite verdict (70)
    assert_eq!(outcome.sent_alerts(), 2);
    assert_eq!(notifier.count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_run_stops_on_cancel() {
    let service = LocalService::new();
    let source = FakeSource::repeating("clipboard", RawArtifact::text(Channel::Clipboard, "hello"));
    let (monitor, _) = monitor(vec![Box::new(source)], service.clone());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(80)).await;
        trigger.cancel();
    });

    let cycles = tokio::time::timeout(Duration::from_secs(5), monitor.run(cancel))
        .await
        .expect("loop did not stop");
    assert!(cycles >= 1);
    assert_eq!(service.calls.load(Ordering::SeqCst) as u64, cycles);
}
