//! Supervised Unit Descriptions
//!
//! Declarative: what to run, how to tell it is healthy, and what to do when
//! it is not. Read once at startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::SupervisorError;
use crate::logic::monitor::client::HEALTH_PATH;

// ============================================================================
// HEALTH PROBE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealthProbe {
    /// GET `url`; any 2xx within `timeout_ms` is ready
    Http {
        url: String,
        #[serde(default = "default_probe_timeout_ms")]
        timeout_ms: u64,
    },
    /// Alive as long as the process has not exited
    Process,
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

// ============================================================================
// RESTART POLICY + BACKOFF
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    Always,
    /// Clean exits (status 0) are left alone
    OnFailure,
    Never,
}

impl RestartPolicy {
    pub fn should_restart(&self, clean_exit: bool) -> bool {
        match self {
            RestartPolicy::Always => true,
            RestartPolicy::OnFailure => !clean_exit,
            RestartPolicy::Never => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub initial_ms: u64,
    pub multiplier: u32,
    pub max_ms: u64,
    /// Healthy this long and the failure streak is forgotten
    pub reset_after_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            multiplier: 2,
            max_ms: 30_000,
            reset_after_ms: 60_000,
        }
    }
}

/// Consecutive-failure bookkeeping for one unit
#[derive(Debug, Clone, Default)]
pub struct BackoffState {
    pub consecutive_failures: u32,
    pub healthy_since: Option<Instant>,
}

impl BackoffState {
    pub fn mark_healthy(&mut self, now: Instant) {
        self.healthy_since.get_or_insert(now);
    }

    /// Register a failure and return how long to wait before relaunching.
    /// The first failure of a streak restarts immediately.
    pub fn on_failure(&mut self, policy: &BackoffPolicy, now: Instant) -> Duration {
        if let Some(since) = self.healthy_since.take() {
            if now.saturating_duration_since(since) >= Duration::from_millis(policy.reset_after_ms) {
                self.consecutive_failures = 0;
            }
        }

        let delay = match self.consecutive_failures {
            0 => Duration::ZERO,
            n => {
                let factor = (policy.multiplier.max(1) as u64).saturating_pow(n - 1);
                Duration::from_millis(policy.initial_ms.saturating_mul(factor).min(policy.max_ms))
            }
        };
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        delay
    }
}

// ============================================================================
// UNIT SPEC
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub health: HealthProbe,
    #[serde(default = "default_restart")]
    pub restart: RestartPolicy,
    #[serde(default)]
    pub backoff: BackoffPolicy,
    /// Probes attempted before startup is declared failed
    #[serde(default = "default_startup_retries")]
    pub startup_retries: u32,
    #[serde(default = "default_startup_interval_ms")]
    pub startup_interval_ms: u64,
    /// Overall bound on waiting for the first healthy probe
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
    /// Consecutive failed liveness probes before the unit is restarted
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

fn default_restart() -> RestartPolicy {
    RestartPolicy::Always
}

fn default_startup_retries() -> u32 {
    40
}

fn default_startup_interval_ms() -> u64 {
    250
}

fn default_startup_timeout_ms() -> u64 {
    15_000
}

fn default_unhealthy_threshold() -> u32 {
    3
}

impl UnitSpec {
    pub fn new(name: &str, program: &str, args: &[&str], health: HealthProbe) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: BTreeMap::new(),
            health,
            restart: default_restart(),
            backoff: BackoffPolicy::default(),
            startup_retries: default_startup_retries(),
            startup_interval_ms: default_startup_interval_ms(),
            startup_timeout_ms: default_startup_timeout_ms(),
            unhealthy_threshold: default_unhealthy_threshold(),
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn validate(&self) -> Result<(), SupervisorError> {
        if self.name.trim().is_empty() || self.program.trim().is_empty() {
            return Err(SupervisorError::Config("unit needs a name and a program".into()));
        }
        if self.startup_retries == 0 || self.unhealthy_threshold == 0 {
            return Err(SupervisorError::Config(format!(
                "{}: startup_retries and unhealthy_threshold must be positive",
                self.name
            )));
        }
        Ok(())
    }
}

/// Units listed in a JSON file, in start order
pub fn load_units(path: &Path) -> Result<Vec<UnitSpec>, SupervisorError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SupervisorError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let units: Vec<UnitSpec> = serde_json::from_str(&content)
        .map_err(|e| SupervisorError::Config(format!("invalid {}: {}", path.display(), e)))?;
    validate_units(&units)?;
    Ok(units)
}

pub fn validate_units(units: &[UnitSpec]) -> Result<(), SupervisorError> {
    if units.is_empty() {
        return Err(SupervisorError::Config("no units configured".into()));
    }
    for (i, unit) in units.iter().enumerate() {
        unit.validate()?;
        if units[..i].iter().any(|u| u.name == unit.name) {
            return Err(SupervisorError::Config(format!("duplicate unit '{}'", unit.name)));
        }
    }
    Ok(())
}

/// The analysis server (HTTP probe) followed by the monitor loop (process
/// probe), both taken from the directory holding `exe`
pub fn standard_units(exe: &Path, server_url: &str) -> Vec<UnitSpec> {
    let dir = exe.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    let server = dir.join(format!("scamwatch-server{}", std::env::consts::EXE_SUFFIX));

    vec![
        UnitSpec::new(
            "analysis-server",
            &server.to_string_lossy(),
            &[],
            HealthProbe::Http {
                url: format!("{}{}", server_url.trim_end_matches('/'), HEALTH_PATH),
                timeout_ms: default_probe_timeout_ms(),
            },
        ),
        UnitSpec::new("monitor", &exe.to_string_lossy(), &["monitor"], HealthProbe::Process),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence() {
        let policy = BackoffPolicy::default();
        let mut state = BackoffState::default();
        let now = Instant::now();

        assert_eq!(state.on_failure(&policy, now), Duration::ZERO);
        assert_eq!(state.on_failure(&policy, now), Duration::from_millis(500));
        assert_eq!(state.on_failure(&policy, now), Duration::from_millis(1_000));
        assert_eq!(state.on_failure(&policy, now), Duration::from_millis(2_000));
        for _ in 0..20 {
            state.on_failure(&policy, now);
        }
        assert_eq!(state.on_failure(&policy, now), Duration::from_millis(30_000));
    }

    #[test]
    fn test_backoff_resets_after_healthy_run() {
        let policy = BackoffPolicy::default();
        let mut state = BackoffState::default();
        let t0 = Instant::now();

        state.on_failure(&policy, t0);
        state.on_failure(&policy, t0);

        // Short healthy spell keeps the streak
        state.mark_healthy(t0);
        assert_eq!(state.on_failure(&policy, t0 + Duration::from_secs(5)), Duration::from_millis(1_000));

        state.mark_healthy(t0 + Duration::from_secs(10));
        assert_eq!(state.on_failure(&policy, t0 + Duration::from_secs(75)), Duration::ZERO);
        assert_eq!(state.consecutive_failures, 1);
    }

    #[test]
    fn test_restart_policy() {
        assert!(RestartPolicy::Always.should_restart(true));
        assert!(!RestartPolicy::OnFailure.should_restart(true));
        assert!(RestartPolicy::OnFailure.should_restart(false));
        assert!(!RestartPolicy::Never.should_restart(false));
    }

    #[test]
    fn test_unit_json_defaults() {
        let json = r#"[
            {"name": "api", "program": "/usr/bin/api", "health": {"type": "http", "url": "http://127.0.0.1:1/health"}},
            {"name": "loop", "program": "/usr/bin/loop", "args": ["run"], "health": {"type": "process"}, "restart": "on-failure"}
        ]"#;
        let units: Vec<UnitSpec> = serde_json::from_str(json).unwrap();
        validate_units(&units).unwrap();

        assert_eq!(units[0].restart, RestartPolicy::Always);
        assert_eq!(units[0].unhealthy_threshold, 3);
        assert_eq!(
            units[0].health,
            HealthProbe::Http { url: "http://127.0.0.1:1/health".into(), timeout_ms: 2_000 }
        );
        assert_eq!(units[1].restart, RestartPolicy::OnFailure);
        assert_eq!(units[1].command_line(), "/usr/bin/loop run");
    }

    #[test]
    fn test_duplicate_units_rejected() {
        let unit = UnitSpec::new("a", "/bin/a", &[], HealthProbe::Process);
        assert!(validate_units(&[unit.clone(), unit]).is_err());
        assert!(validate_units(&[]).is_err());
    }

    #[test]
    fn test_standard_units() {
        let units = standard_units(Path::new("/opt/scamwatch/scamwatch"), "http://127.0.0.1:8765/");
        assert_eq!(units[0].name, "analysis-server");
        assert!(units[0].program.starts_with("/opt/scamwatch/scamwatch-server"));
        assert!(matches!(&units[0].health, HealthProbe::Http { url, .. } if url == "http://127.0.0.1:8765/health"));
        assert_eq!(units[1].args, vec!["monitor"]);
    }
}
