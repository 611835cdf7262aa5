//! Supervisor State File
//!
//! JSON snapshot rewritten after every poll; read by `scamwatch status` and
//! `scamwatch stop`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STATE_FILE: &str = "supervisor.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Starting,
    Running,
    /// Waiting out a backoff delay before relaunch
    Backoff,
    Stopped,
    /// Gave up (restart policy or startup failure)
    Failed,
}

impl UnitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Starting => "starting",
            UnitState::Running => "running",
            UnitState::Backoff => "backoff",
            UnitState::Stopped => "stopped",
            UnitState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub name: String,
    pub pid: Option<u32>,
    pub state: UnitState,
    pub restart_count: u32,
    pub last_restart: Option<DateTime<Utc>>,
    pub last_exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorStatus {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub units: Vec<UnitStatus>,
}

impl SupervisorStatus {
    pub fn unit(&self, name: &str) -> Option<&UnitStatus> {
        self.units.iter().find(|u| u.name == name)
    }
}

pub fn state_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STATE_FILE)
}

/// Write via a temp file and rename so readers never see a partial file
pub fn write_status(path: &Path, status: &SupervisorStatus) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_vec_pretty(status)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
}

pub fn read_status(path: &Path) -> std::io::Result<SupervisorStatus> {
    let content = std::fs::read(path)?;
    serde_json::from_slice(&content)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

pub fn remove_status(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Cannot remove {:?}: {}", path, e);
        }
    }
}
