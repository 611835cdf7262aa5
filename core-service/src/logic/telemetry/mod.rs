//! Telemetry Module
//!
//! Audit trail for every process: what was decided, alerted, restarted.
//!
//! ## Structure
//! - `event.rs` - AuditEvent struct (immutable, timestamped)
//! - `recorder.rs` - Append-only JSONL writer (thread-safe, rotating)
//!
//! ## Usage
//! ```ignore
//! telemetry::init(&state_dir, "monitor")?;
//! telemetry::record(AuditEvent::alert_sent(&verdict, "high", &key));
//! telemetry::shutdown();
//! ```

pub mod event;
pub mod recorder;

pub use event::{get_session_id, AuditEvent, EventType, VerdictSummary};

pub use recorder::{
    current_log_file,
    events_recorded,
    init,
    list_log_files,
    read_events,
    record,
    shutdown,
    Recorder,
};
