//! Unit Launchers
//!
//! The supervisor talks to processes only through `UnitLauncher` and
//! `UnitHandle`, so it can be driven by fake processes in tests.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use sysinfo::{Pid, Signal, System};

use super::unit::{HealthProbe, UnitSpec};
use super::SupervisorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub success: bool,
}

/// A launched unit instance
pub trait UnitHandle: Send {
    fn pid(&self) -> Option<u32>;

    /// `Some` once the process has exited; never blocks
    fn try_exit(&mut self) -> Option<ExitInfo>;

    /// Ask the process to stop (SIGTERM)
    fn terminate(&mut self);

    /// Force-stop
    fn kill(&mut self);
}

#[async_trait]
pub trait UnitLauncher: Send + Sync {
    fn launch(&self, spec: &UnitSpec) -> Result<Box<dyn UnitHandle>, SupervisorError>;

    /// One bounded health check; `true` when ready
    async fn probe(&self, spec: &UnitSpec, handle: &mut dyn UnitHandle) -> bool;
}

// ============================================================================
// OS PROCESSES
// ============================================================================

pub struct ProcessHandle {
    child: tokio::process::Child,
    pid: Option<u32>,
    exit: Option<ExitInfo>,
}

impl UnitHandle for ProcessHandle {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn try_exit(&mut self) -> Option<ExitInfo> {
        if self.exit.is_none() {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    self.exit = Some(ExitInfo { code: status.code(), success: status.success() })
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Cannot query pid {:?}: {}", self.pid, e);
                    self.exit = Some(ExitInfo { code: None, success: false });
                }
            }
        }
        self.exit
    }

    fn terminate(&mut self) {
        match self.pid {
            Some(pid) if self.exit.is_none() => {
                if !send_terminate(pid) {
                    self.kill();
                }
            }
            _ => {}
        }
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            log::debug!("Kill of pid {:?} failed: {}", self.pid, e);
        }
    }
}

/// SIGTERM via sysinfo; `false` when the process is gone or the signal is
/// not supported on this platform
pub fn send_terminate(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    if !system.refresh_process(pid) {
        return false;
    }
    system
        .process(pid)
        .and_then(|p| p.kill_with(Signal::Term))
        .unwrap_or(false)
}

/// Whether a process with this pid exists
pub fn is_running(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_process(Pid::from_u32(pid))
}

pub struct ProcessLauncher {
    http: reqwest::Client,
}

impl ProcessLauncher {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UnitLauncher for ProcessLauncher {
    fn launch(&self, spec: &UnitSpec) -> Result<Box<dyn UnitHandle>, SupervisorError> {
        let child = tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::Launch(spec.name.clone(), e.to_string()))?;

        let pid = child.id();
        log::info!("Launched {} (pid {:?}): {}", spec.name, pid, spec.command_line());
        Ok(Box::new(ProcessHandle { child, pid, exit: None }))
    }

    async fn probe(&self, spec: &UnitSpec, handle: &mut dyn UnitHandle) -> bool {
        if handle.try_exit().is_some() {
            return false;
        }

        match &spec.health {
            HealthProbe::Process => true,
            HealthProbe::Http { url, timeout_ms } => {
                let result = self
                    .http
                    .get(url)
                    .timeout(Duration::from_millis(*timeout_ms))
                    .send()
                    .await;
                match result {
                    Ok(response) => response.status().is_success(),
                    Err(e) => {
                        log::debug!("Probe of {} failed: {}", spec.name, e);
                        false
                    }
                }
            }
        }
    }
}
