//! Central Configuration Constants
//!
//! Single source of truth for configuration defaults and the environment
//! variables that override them.

use std::path::PathBuf;

/// Default analysis service URL
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8765";

/// Default analysis service port
pub const DEFAULT_PORT: u16 = 8765;

/// Default monitor polling interval (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Default per-request timeout for analysis calls (milliseconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Verdicts at or above this confidence also ask for confirmation
pub const DEFAULT_CONFIRM_MIN_CONFIDENCE: u8 = 90;

/// Default supervisor liveness poll interval (milliseconds)
pub const DEFAULT_HEALTH_POLL_MS: u64 = 5_000;

/// Default shutdown grace period (milliseconds)
pub const DEFAULT_GRACE_MS: u64 = 5_000;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "Scamwatch";

// ============================================
// Helper functions to read from env with fallback
// ============================================

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Non-empty env value
pub fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

/// Get analysis service URL from environment or use default
pub fn get_server_url() -> String {
    env_opt("SCAMWATCH_SERVER_URL").unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
}

pub fn get_port() -> u16 {
    env_or("SCAMWATCH_PORT", DEFAULT_PORT)
}

pub fn get_poll_interval_ms() -> u64 {
    env_or("SCAMWATCH_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)
}

pub fn get_request_timeout_ms() -> u64 {
    env_or("SCAMWATCH_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)
}

/// Alert cool-down has no default; `None` when unset or unparsable
pub fn get_alert_cooldown_secs() -> Option<u64> {
    env_opt("SCAMWATCH_ALERT_COOLDOWN_SECS").and_then(|s| s.trim().parse().ok())
}

pub fn get_confirm_min_confidence() -> u8 {
    env_or("SCAMWATCH_CONFIRM_MIN_CONFIDENCE", DEFAULT_CONFIRM_MIN_CONFIDENCE)
}

pub fn get_health_poll_ms() -> u64 {
    env_or("SCAMWATCH_HEALTH_POLL_MS", DEFAULT_HEALTH_POLL_MS)
}

pub fn get_grace_ms() -> u64 {
    env_or("SCAMWATCH_GRACE_MS", DEFAULT_GRACE_MS)
}

/// State directory (supervisor snapshot, audit logs)
pub fn get_state_dir() -> PathBuf {
    env_opt("SCAMWATCH_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("scamwatch")
        })
}

/// Check if audio feature extraction is enabled (kill-switch)
pub fn is_audio_features_enabled() -> bool {
    std::env::var("SCAMWATCH_AUDIO_FEATURES")
        .map(|s| {
            let s = s.to_lowercase();
            s != "off" && s != "false" && s != "0"
        })
        .unwrap_or(true)
}

/// Identifier sent with every analysis request
pub fn get_source_identifier() -> String {
    env_opt("SCAMWATCH_SOURCE_ID").unwrap_or_else(|| {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string())
    })
}
