//! Process Supervisor
//!
//! Starts each unit in order and waits (bounded) for it to become healthy,
//! then polls liveness on a fixed interval. Dead or unresponsive units are
//! relaunched according to their restart policy and backoff. On shutdown,
//! units are stopped in reverse start order, each given a grace period
//! before being killed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::launcher::{ExitInfo, UnitHandle, UnitLauncher};
use super::state::{write_status, SupervisorStatus, UnitState, UnitStatus};
use super::unit::{BackoffState, UnitSpec};
use super::SupervisorError;
use crate::logic::telemetry::{self, AuditEvent, EventType};

/// Interval between checks while waiting for a stopping unit
const EXIT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub health_poll: Duration,
    pub grace: Duration,
    /// Snapshot written after every poll when set
    pub state_file: Option<PathBuf>,
}

/// What a poll observed or did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitEvent {
    Exited { unit: String, exit: ExitInfo },
    Unresponsive { unit: String, failed_probes: u32 },
    Restarted { unit: String, restart_count: u32 },
    BackingOff { unit: String, delay: Duration },
    LaunchFailed { unit: String, reason: String },
    /// Restart policy says no
    GaveUp { unit: String },
}

struct ManagedUnit {
    spec: UnitSpec,
    handle: Option<Box<dyn UnitHandle>>,
    state: UnitState,
    restart_count: u32,
    probe_failures: u32,
    backoff: BackoffState,
    restart_at: Option<Instant>,
    launched_at: Option<Instant>,
    last_restart: Option<DateTime<Utc>>,
    last_exit: Option<ExitInfo>,
}

impl ManagedUnit {
    fn new(spec: UnitSpec) -> Self {
        Self {
            spec,
            handle: None,
            state: UnitState::Stopped,
            restart_count: 0,
            probe_failures: 0,
            backoff: BackoffState::default(),
            restart_at: None,
            launched_at: None,
            last_restart: None,
            last_exit: None,
        }
    }

    fn in_startup(&self, now: Instant) -> bool {
        self.state == UnitState::Starting
            && self.launched_at.map_or(false, |at| {
                now.saturating_duration_since(at) < Duration::from_millis(self.spec.startup_timeout_ms)
            })
    }
}

pub struct Supervisor {
    units: Vec<ManagedUnit>,
    launcher: Arc<dyn UnitLauncher>,
    settings: SupervisorSettings,
    started_at: DateTime<Utc>,
}

impl Supervisor {
    pub fn new(units: Vec<UnitSpec>, launcher: Arc<dyn UnitLauncher>, settings: SupervisorSettings) -> Self {
        Self {
            units: units.into_iter().map(ManagedUnit::new).collect(),
            launcher,
            settings,
            started_at: Utc::now(),
        }
    }

    // ========================================================================
    // STARTUP
    // ========================================================================

    /// Launch every unit in order. A unit that does not become healthy
    /// stops the already-started ones and fails the whole startup.
    pub async fn start_all(&mut self) -> Result<(), SupervisorError> {
        for index in 0..self.units.len() {
            if let Err(e) = self.start_unit(index).await {
                log::error!("{}", e);
                self.shutdown().await;
                self.units[index].state = UnitState::Failed;
                self.write_state();
                return Err(e);
            }
        }
        self.write_state();
        Ok(())
    }

    async fn start_unit(&mut self, index: usize) -> Result<(), SupervisorError> {
        let launcher = self.launcher.clone();
        let unit = &mut self.units[index];
        let name = unit.spec.name.clone();

        let mut handle = launcher.launch(&unit.spec).map_err(|e| {
            telemetry::record(AuditEvent::unit(EventType::UnitFailed, &name, &e.to_string()));
            e
        })?;
        unit.state = UnitState::Starting;
        unit.launched_at = Some(Instant::now());

        match wait_healthy(launcher.as_ref(), &unit.spec, handle.as_mut()).await {
            Ok(attempts) => {
                log::info!("{} healthy after {} probe(s) (pid {:?})", name, attempts, handle.pid());
                telemetry::record(AuditEvent::unit(
                    EventType::UnitStarted,
                    &name,
                    &format!("{} started (pid {:?})", name, handle.pid()),
                ));
                unit.handle = Some(handle);
                unit.state = UnitState::Running;
                unit.backoff.mark_healthy(Instant::now());
                Ok(())
            }
            Err(reason) => {
                handle.kill();
                unit.last_exit = handle.try_exit();
                telemetry::record(AuditEvent::unit(EventType::UnitFailed, &name, &reason));
                Err(SupervisorError::StartupFailed { unit: name, reason })
            }
        }
    }

    // ========================================================================
    // STEADY STATE
    // ========================================================================

    /// One liveness pass over all units
    pub async fn poll_once(&mut self) -> Vec<UnitEvent> {
        let mut events = Vec::new();
        for index in 0..self.units.len() {
            self.poll_unit(index, Instant::now(), &mut events).await;
        }
        self.write_state();
        events
    }

    async fn poll_unit(&mut self, index: usize, now: Instant, events: &mut Vec<UnitEvent>) {
        let launcher = self.launcher.clone();
        let unit = &mut self.units[index];

        match unit.state {
            UnitState::Stopped | UnitState::Failed => return,
            UnitState::Backoff => {
                if unit.restart_at.map_or(true, |at| now >= at) {
                    self.relaunch(index, now, events);
                }
                return;
            }
            UnitState::Starting | UnitState::Running => {}
        }

        let in_startup = unit.in_startup(now);
        let Some(handle) = unit.handle.as_mut() else {
            self.on_failure(index, false, now, events);
            return;
        };

        let failure = if let Some(exit) = handle.try_exit() {
            log::warn!("{} exited (code {:?})", unit.spec.name, exit.code);
            unit.last_exit = Some(exit);
            events.push(UnitEvent::Exited { unit: unit.spec.name.clone(), exit });
            Some(exit.success)
        } else if launcher.probe(&unit.spec, handle.as_mut()).await {
            if unit.state == UnitState::Starting {
                log::info!("{} ready again", unit.spec.name);
            }
            unit.state = UnitState::Running;
            unit.probe_failures = 0;
            unit.backoff.mark_healthy(now);
            None
        } else if in_startup {
            None
        } else {
            unit.probe_failures += 1;
            if unit.probe_failures >= unit.spec.unhealthy_threshold {
                log::warn!(
                    "{} unresponsive after {} failed probe(s), killing",
                    unit.spec.name,
                    unit.probe_failures
                );
                handle.kill();
                events.push(UnitEvent::Unresponsive {
                    unit: unit.spec.name.clone(),
                    failed_probes: unit.probe_failures,
                });
                Some(false)
            } else {
                log::debug!("{} probe failed ({})", unit.spec.name, unit.probe_failures);
                None
            }
        };

        if let Some(clean_exit) = failure {
            self.on_failure(index, clean_exit, now, events);
        }
    }

    fn on_failure(&mut self, index: usize, clean_exit: bool, now: Instant, events: &mut Vec<UnitEvent>) {
        let unit = &mut self.units[index];
        unit.handle = None;
        unit.probe_failures = 0;

        if !unit.spec.restart.should_restart(clean_exit) {
            unit.state = if clean_exit { UnitState::Stopped } else { UnitState::Failed };
            log::warn!("{} not restarted ({:?} policy)", unit.spec.name, unit.spec.restart);
            telemetry::record(AuditEvent::unit(
                EventType::UnitFailed,
                &unit.spec.name,
                &format!("{} left {}", unit.spec.name, unit.state.as_str()),
            ));
            events.push(UnitEvent::GaveUp { unit: unit.spec.name.clone() });
            return;
        }

        let delay = unit.backoff.on_failure(&unit.spec.backoff, now);
        if delay.is_zero() {
            self.relaunch(index, now, events);
        } else {
            log::info!("{} restarting in {:?}", unit.spec.name, delay);
            unit.state = UnitState::Backoff;
            unit.restart_at = Some(now + delay);
            events.push(UnitEvent::BackingOff { unit: unit.spec.name.clone(), delay });
        }
    }

    fn relaunch(&mut self, index: usize, now: Instant, events: &mut Vec<UnitEvent>) {
        let launcher = self.launcher.clone();
        let unit = &mut self.units[index];

        match launcher.launch(&unit.spec) {
            Ok(handle) => {
                unit.restart_count += 1;
                unit.last_restart = Some(Utc::now());
                unit.launched_at = Some(Instant::now());
                unit.restart_at = None;
                unit.state = UnitState::Starting;
                log::warn!(
                    "Restarted {} (pid {:?}, restart #{})",
                    unit.spec.name,
                    handle.pid(),
                    unit.restart_count
                );
                telemetry::record(
                    AuditEvent::unit(
                        EventType::UnitRestarted,
                        &unit.spec.name,
                        &format!("{} restarted", unit.spec.name),
                    )
                    .with_metadata(serde_json::json!({
                        "restart_count": unit.restart_count,
                        "pid": handle.pid(),
                    })),
                );
                unit.handle = Some(handle);
                events.push(UnitEvent::Restarted {
                    unit: unit.spec.name.clone(),
                    restart_count: unit.restart_count,
                });
            }
            Err(e) => {
                log::error!("{}", e);
                telemetry::record(AuditEvent::unit(EventType::UnitFailed, &unit.spec.name, &e.to_string()));
                let delay = unit
                    .backoff
                    .on_failure(&unit.spec.backoff, now)
                    .max(Duration::from_millis(unit.spec.backoff.initial_ms));
                unit.state = UnitState::Backoff;
                unit.restart_at = Some(now + delay);
                events.push(UnitEvent::LaunchFailed {
                    unit: unit.spec.name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Poll until `cancel` fires, then shut everything down
    pub async fn run(&mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.health_poll);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            for event in self.poll_once().await {
                log::debug!("Supervisor event: {:?}", event);
            }
        }

        self.shutdown().await;
    }

    // ========================================================================
    // SHUTDOWN
    // ========================================================================

    /// Stop units in reverse start order
    pub async fn shutdown(&mut self) {
        let grace = self.settings.grace;

        for unit in self.units.iter_mut().rev() {
            if let Some(mut handle) = unit.handle.take() {
                if handle.try_exit().is_none() {
                    log::info!("Stopping {} (pid {:?})", unit.spec.name, handle.pid());
                    handle.terminate();

                    let deadline = Instant::now() + grace;
                    while handle.try_exit().is_none() && Instant::now() < deadline {
                        tokio::time::sleep(EXIT_POLL).await;
                    }
                    if handle.try_exit().is_none() {
                        log::warn!("{} ignored stop request for {:?}, killing", unit.spec.name, grace);
                        handle.kill();
                    }
                }
                unit.last_exit = handle.try_exit();
                telemetry::record(AuditEvent::unit(
                    EventType::UnitStopped,
                    &unit.spec.name,
                    &format!("{} stopped", unit.spec.name),
                ));
            }
            if unit.state != UnitState::Failed {
                unit.state = UnitState::Stopped;
            }
        }

        self.write_state();
    }

    // ========================================================================
    // STATUS
    // ========================================================================

    pub fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            pid: std::process::id(),
            started_at: self.started_at,
            updated_at: Utc::now(),
            units: self
                .units
                .iter()
                .map(|u| UnitStatus {
                    name: u.spec.name.clone(),
                    pid: u.handle.as_ref().and_then(|h| h.pid()),
                    state: u.state,
                    restart_count: u.restart_count,
                    last_restart: u.last_restart,
                    last_exit_code: u.last_exit.and_then(|e| e.code),
                })
                .collect(),
        }
    }

    pub fn restart_count(&self, name: &str) -> Option<u32> {
        self.units.iter().find(|u| u.spec.name == name).map(|u| u.restart_count)
    }

    pub fn unit_state(&self, name: &str) -> Option<UnitState> {
        self.units.iter().find(|u| u.spec.name == name).map(|u| u.state)
    }

    fn write_state(&self) {
        if let Some(path) = &self.settings.state_file {
            if let Err(e) = write_status(path, &self.status()) {
                log::warn!("Cannot write supervisor state {:?}: {}", path, e);
            }
        }
    }
}

/// Probe until healthy, bounded by retry count and the startup timeout.
/// Returns the number of probes used.
async fn wait_healthy(
    launcher: &dyn UnitLauncher,
    spec: &UnitSpec,
    handle: &mut dyn UnitHandle,
) -> Result<u32, String> {
    let limit = Duration::from_millis(spec.startup_timeout_ms);
    let interval = Duration::from_millis(spec.startup_interval_ms);

    let attempts = async {
        for attempt in 1..=spec.startup_retries {
            if let Some(exit) = handle.try_exit() {
                return Err(format!("exited during startup (code {:?})", exit.code));
            }
            if launcher.probe(spec, &mut *handle).await {
                return Ok(attempt);
            }
            if attempt < spec.startup_retries {
                tokio::time::sleep(interval).await;
            }
        }
        Err(format!("not healthy after {} probe(s)", spec.startup_retries))
    };

    match tokio::time::timeout(limit, attempts).await {
        Ok(result) => result,
        Err(_) => Err(format!("not healthy within {:?}", limit)),
    }
}
