//! Runtime Configuration
//!
//! Typed configuration for the monitor loop and alerting, read once at
//! startup from the environment (defaults in `constants`).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{self, env_opt};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("required setting {0} is not set")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("cannot read {0}: {1}")]
    Io(String, String),
}

// ============================================================================
// COMMAND SPEC
// ============================================================================

/// External program invocation: `program arg1 arg2 ...` (no shell)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?.to_string();
        Some(Self { program, args: parts.map(str::to_string).collect() })
    }

    fn from_env(name: &str) -> Option<Self> {
        env_opt(name).and_then(|line| Self::parse(&line))
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

// ============================================================================
// CAPTURE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenImageConfig {
    pub command: CommandSpec,
    pub width: u32,
    pub height: u32,
    /// `rgb8` or `rgba8`
    pub encoding: String,
}

/// Which capture sources are enabled; unset commands disable the source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureConfig {
    pub clipboard: Option<CommandSpec>,
    pub screen_text: Option<CommandSpec>,
    pub screen_image: Option<ScreenImageConfig>,
    pub microphone: Option<CommandSpec>,
}

impl CaptureConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let screen_image = match CommandSpec::from_env("SCAMWATCH_SCREEN_CMD") {
            Some(command) => {
                let size = env_opt("SCAMWATCH_SCREEN_SIZE")
                    .ok_or_else(|| ConfigError::Missing("SCAMWATCH_SCREEN_SIZE".into()))?;
                let (width, height) = parse_size(&size)
                    .ok_or_else(|| ConfigError::Invalid("SCAMWATCH_SCREEN_SIZE".into(), size.clone()))?;
                Some(ScreenImageConfig {
                    command,
                    width,
                    height,
                    encoding: env_opt("SCAMWATCH_SCREEN_FORMAT").unwrap_or_else(|| "rgb8".into()),
                })
            }
            None => None,
        };

        Ok(Self {
            clipboard: CommandSpec::from_env("SCAMWATCH_CLIPBOARD_CMD"),
            screen_text: CommandSpec::from_env("SCAMWATCH_SCREEN_TEXT_CMD"),
            screen_image,
            microphone: CommandSpec::from_env("SCAMWATCH_MIC_CMD"),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.clipboard.is_none()
            && self.screen_text.is_none()
            && self.screen_image.is_none()
            && self.microphone.is_none()
    }
}

/// `1920x1080` -> (1920, 1080)
pub fn parse_size(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.trim().split_once(['x', 'X'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

// ============================================================================
// MONITOR
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub server_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub source_identifier: String,
    pub capture: CaptureConfig,
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server_url: constants::get_server_url(),
            poll_interval: Duration::from_millis(constants::get_poll_interval_ms().max(1)),
            request_timeout: Duration::from_millis(constants::get_request_timeout_ms().max(1)),
            source_identifier: constants::get_source_identifier(),
            capture: CaptureConfig::from_env()?,
        })
    }
}

// ============================================================================
// ALERTS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    /// Identical alerts inside this window are suppressed
    pub cooldown: Duration,
    pub confirm_min_confidence: u8,
    pub notify_command: Option<CommandSpec>,
    pub confirm_command: Option<CommandSpec>,
}

impl AlertConfig {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            confirm_min_confidence: constants::DEFAULT_CONFIRM_MIN_CONFIDENCE,
            notify_command: None,
            confirm_command: None,
        }
    }

    /// `SCAMWATCH_ALERT_COOLDOWN_SECS` is required
    pub fn from_env() -> Result<Self, ConfigError> {
        let cooldown = constants::get_alert_cooldown_secs()
            .ok_or_else(|| ConfigError::Missing("SCAMWATCH_ALERT_COOLDOWN_SECS".into()))?;

        Ok(Self {
            cooldown: Duration::from_secs(cooldown),
            confirm_min_confidence: constants::get_confirm_min_confidence(),
            notify_command: CommandSpec::from_env("SCAMWATCH_NOTIFY_CMD"),
            confirm_command: CommandSpec::from_env("SCAMWATCH_CONFIRM_CMD"),
        })
    }
}

// ============================================================================
// SUPERVISOR
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    pub health_poll: Duration,
    pub grace: Duration,
    pub state_dir: PathBuf,
    /// JSON unit list; `None` runs the standard units
    pub units_file: Option<PathBuf>,
    pub server_url: String,
}

impl SupervisorConfig {
    pub fn from_env() -> Self {
        Self {
            health_poll: Duration::from_millis(constants::get_health_poll_ms().max(1)),
            grace: Duration::from_millis(constants::get_grace_ms()),
            state_dir: constants::get_state_dir(),
            units_file: env_opt("SCAMWATCH_UNITS_FILE").map(PathBuf::from),
            server_url: constants::get_server_url(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        let cmd = CommandSpec::parse("  xclip -selection clipboard -o ").unwrap();
        assert_eq!(cmd.program, "xclip");
        assert_eq!(cmd.args, vec!["-selection", "clipboard", "-o"]);
        assert_eq!(cmd.to_string(), "xclip -selection clipboard -o");
        assert!(CommandSpec::parse("   ").is_none());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1920x1080"), Some((1920, 1080)));
        assert_eq!(parse_size("800 X 600"), Some((800, 600)));
        assert_eq!(parse_size("big"), None);
    }
}
