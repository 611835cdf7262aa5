//! Notification Primitives
//!
//! The dispatcher only decides; a `Notifier` shows the alert to the user.

use std::process::{Command, Stdio};

use thiserror::Error;

use super::dispatcher::Alert;
use crate::logic::config::CommandSpec;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to run {0}: {1}")]
    Spawn(String, String),
    #[error("{0} exited with status {1}")]
    Failed(String, i32),
}

pub trait Notifier: Send + Sync {
    /// Show a non-blocking notification
    fn notify(&self, alert: &Alert) -> Result<(), NotifyError>;

    /// Blocking confirmation dialog; `true` when the user acknowledged it.
    /// Notifiers without a dialog return `Ok(None)`.
    fn confirm(&self, _alert: &Alert) -> Result<Option<bool>, NotifyError> {
        Ok(None)
    }
}

// ============================================================================
// LOG NOTIFIER
// ============================================================================

/// Fallback when no notification command is configured
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        log::warn!("[ALERT] {} - {}", alert.title, alert.message);
        Ok(())
    }
}

// ============================================================================
// COMMAND NOTIFIER
// ============================================================================

/// Runs external programs with the alert title and message appended as the
/// last two arguments
pub struct CommandNotifier {
    notify: Option<CommandSpec>,
    confirm: Option<CommandSpec>,
}

impl CommandNotifier {
    pub fn new(notify: Option<CommandSpec>, confirm: Option<CommandSpec>) -> Self {
        Self { notify, confirm }
    }

    fn run(spec: &CommandSpec, alert: &Alert) -> Result<i32, NotifyError> {
        let status = Command::new(&spec.program)
            .args(&spec.args)
            .arg(&alert.title)
            .arg(&alert.message)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .map_err(|e| NotifyError::Spawn(spec.program.clone(), e.to_string()))?;

        Ok(status.code().unwrap_or(-1))
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        match &self.notify {
            Some(spec) => match Self::run(spec, alert)? {
                0 => Ok(()),
                code => Err(NotifyError::Failed(spec.program.clone(), code)),
            },
            None => LogNotifier.notify(alert),
        }
    }

    /// Exit status 0 means acknowledged, anything else dismissed
    fn confirm(&self, alert: &Alert) -> Result<Option<bool>, NotifyError> {
        match &self.confirm {
            Some(spec) => Ok(Some(Self::run(spec, alert)? == 0)),
            None => Ok(None),
        }
    }
}
