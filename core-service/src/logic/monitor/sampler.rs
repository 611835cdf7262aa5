//! Monitor Loop
//!
//! One cycle per tick: capture each enabled source, submit it and wait for
//! the verdict, correlate the cycle's verdicts, then hand threats to the
//! alert dispatcher. A cycle finishes before the next tick is taken, so one
//! loop never has two requests in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::capture::{CaptureError, CaptureSource};
use super::client::{AnalysisService, ClientError};
use crate::logic::aggregator::{CompositeVerdict, Correlator};
use crate::logic::alert::{AlertDispatcher, DispatchOutcome};
use crate::logic::verdict::Verdict;
use crate::logic::wire::AnalyzeRequest;

// ============================================================================
// OUTCOMES
// ============================================================================

/// Result of one capture + submit step
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Analyzed(Verdict),
    /// Nothing captured or unchanged since last cycle
    NothingNew,
    /// Logged and skipped; the next cycle is the retry
    SoftFailure(String),
    /// Request refused or response unreadable; logged, loop continues
    HardFailure(String),
}

impl StepOutcome {
    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            StepOutcome::Analyzed(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::SoftFailure(_) | StepOutcome::HardFailure(_))
    }
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub steps: Vec<(String, StepOutcome)>,
    pub composite: CompositeVerdict,
    pub alerts: Vec<DispatchOutcome>,
}

impl CycleOutcome {
    pub fn sent_alerts(&self) -> usize {
        self.alerts
            .iter()
            .filter(|a| matches!(a, DispatchOutcome::Sent { .. }))
            .count()
    }
}

// ============================================================================
// LOOP
// ============================================================================

pub struct MonitorLoop {
    sources: Vec<Box<dyn CaptureSource>>,
    service: Arc<dyn AnalysisService>,
    correlator: Correlator,
    dispatcher: AlertDispatcher,
    source_identifier: String,
    poll_interval: Duration,
    request_timeout: Duration,
    cycles: u64,
}

impl MonitorLoop {
    pub fn new(
        sources: Vec<Box<dyn CaptureSource>>,
        service: Arc<dyn AnalysisService>,
        dispatcher: AlertDispatcher,
        source_identifier: &str,
        poll_interval: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            service,
            correlator: Correlator::default(),
            dispatcher,
            source_identifier: source_identifier.to_string(),
            poll_interval,
            request_timeout,
            cycles: 0,
        }
    }

    pub fn with_correlator(mut self, correlator: Correlator) -> Self {
        self.correlator = correlator;
        self
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run until `cancel` fires. An in-flight cycle is abandoned on cancel.
    pub async fn run(mut self, cancel: CancellationToken) -> u64 {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "Monitor loop started: {} source(s), every {:?}",
            self.sources.len(),
            self.poll_interval
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                outcome = self.run_cycle() => Some(outcome),
            };
            let Some(outcome) = outcome else { break };

            let failures = outcome.steps.iter().filter(|(_, s)| s.is_failure()).count();
            log::debug!(
                "Cycle {}: {} step(s), {} failure(s), confidence {}, {} alert(s)",
                self.cycles,
                outcome.steps.len(),
                failures,
                outcome.composite.confidence(),
                outcome.sent_alerts()
            );
            self.dispatcher.prune(std::time::Instant::now());
        }

        log::info!("Monitor loop stopped after {} cycle(s)", self.cycles);
        self.cycles
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.cycles += 1;

        let mut steps = Vec::with_capacity(self.sources.len());
        for index in 0..self.sources.len() {
            let outcome = self.step(index).await;
            steps.push((self.sources[index].name().to_string(), outcome));
        }

        let verdicts: Vec<Verdict> = steps.iter().filter_map(|(_, s)| s.verdict().cloned()).collect();
        let composite = self.correlator.correlate(verdicts);

        let mut alerts = Vec::new();
        for verdict in composite.per_channel.values().chain(composite.correlated.iter()) {
            if !verdict.is_threat() {
                continue;
            }
            if let Some(outcome) = dispatch(self.dispatcher.clone(), verdict.clone()).await {
                alerts.push(outcome);
            }
        }

        CycleOutcome { steps, composite, alerts }
    }

    async fn step(&mut self, index: usize) -> StepOutcome {
        let source = &mut self.sources[index];
        let channel = source.channel();

        let raw = match source.capture().await {
            Ok(Some(raw)) => raw,
            Ok(None) => return StepOutcome::NothingNew,
            Err(e) => {
                match &e {
                    CaptureError::Unavailable(_) | CaptureError::PermissionDenied(_) => {
                        log::warn!("Capture '{}' skipped: {}", source.name(), e)
                    }
                    _ => log::info!("Capture '{}' failed: {}", source.name(), e),
                }
                return StepOutcome::SoftFailure(e.to_string());
            }
        };

        let request = AnalyzeRequest::from_raw(&self.source_identifier, &raw);
        let response = match tokio::time::timeout(self.request_timeout, self.service.analyze(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_transient() => {
                log::warn!("Analysis of {} unavailable: {}", channel, e);
                source.rollback();
                return StepOutcome::SoftFailure(e.to_string());
            }
            Ok(Err(e)) => {
                log::error!("Analysis of {} failed: {}", channel, e);
                source.commit();
                return StepOutcome::HardFailure(e.to_string());
            }
            Err(_) => {
                let e = ClientError::Transient(format!("no response within {:?}", self.request_timeout));
                log::warn!("Analysis of {} abandoned: {}", channel, e);
                source.rollback();
                return StepOutcome::SoftFailure(e.to_string());
            }
        };
        source.commit();

        match response.to_verdict(channel) {
            Some(verdict) => StepOutcome::Analyzed(verdict),
            None => {
                let reason = response.error.unwrap_or_else(|| "no opinion".to_string());
                log::info!("No verdict for {}: {}", channel, reason);
                StepOutcome::SoftFailure(reason)
            }
        }
    }
}

/// Notification primitives may block; keep them off the runtime threads
async fn dispatch(dispatcher: AlertDispatcher, verdict: Verdict) -> Option<DispatchOutcome> {
    match tokio::task::spawn_blocking(move || dispatcher.dispatch(&verdict)).await {
        Ok(Ok(outcome)) => Some(outcome),
        Ok(Err(e)) => {
            log::error!("Failed to deliver alert: {}", e);
            None
        }
        Err(e) => {
            log::error!("Alert task panicked: {}", e);
            None
        }
    }
}
