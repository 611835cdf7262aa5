//! Configuration module

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use scamwatch_core::constants::{self, env_opt};
use scamwatch_core::logic::config::ConfigError;
use scamwatch_core::logic::detector::DetectorConfig;

/// Default request body limit (32 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,

    /// Largest accepted request body
    pub max_body_bytes: usize,

    /// Detector thresholds (defaults, or `SCAMWATCH_DETECTOR_CONFIG`)
    pub detectors: DetectorConfig,

    /// Audit log location
    pub state_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = match env_opt("SCAMWATCH_HOST") {
            Some(h) => h
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("SCAMWATCH_HOST".into(), h.clone()))?,
            None => IpAddr::V4(Ipv4Addr::LOCALHOST),
        };

        let max_body_bytes = match env_opt("SCAMWATCH_MAX_BODY_BYTES") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("SCAMWATCH_MAX_BODY_BYTES".into(), v.clone()))?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        Ok(Self {
            host,
            port: constants::get_port(),
            max_body_bytes,
            detectors: DetectorConfig::from_env()?,
            state_dir: constants::get_state_dir(),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
