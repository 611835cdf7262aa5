//! Supervisor Module
//!
//! Process-level watchdog for the analysis service and the monitor loop.
//!
//! ## Structure
//! - `unit.rs` - declarative unit description, restart policy, backoff
//! - `launcher.rs` - launching / probing / signalling processes
//! - `supervisor.rs` - startup, liveness polling, restart, shutdown
//! - `state.rs` - JSON snapshot for `status` / `stop`

pub mod launcher;
pub mod state;
pub mod supervisor;
pub mod unit;


use thiserror::Error;

pub use launcher::{is_running, send_terminate, ExitInfo, ProcessLauncher, UnitHandle, UnitLauncher};
pub use state::{read_status, remove_status, state_path, write_status, SupervisorStatus, UnitState, UnitStatus};
pub use supervisor::{Supervisor, SupervisorSettings, UnitEvent};
pub use unit::{load_units, standard_units, BackoffPolicy, HealthProbe, RestartPolicy, UnitSpec};

#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A unit never became healthy; startup is aborted
    #[error("unit '{unit}' failed to start: {reason}")]
    StartupFailed { unit: String, reason: String },
    #[error("cannot launch '{0}': {1}")]
    Launch(String, String),
    #[error("invalid unit configuration: {0}")]
    Config(String),
}
