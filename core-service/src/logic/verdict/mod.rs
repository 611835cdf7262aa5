//! Verdict Module
//!
//! Evidence (`Finding`) and result (`Verdict`) types shared by every layer.

pub mod types;

pub use types::{
    ArtifactMeta,
    Channel,
    Finding,
    Indicator,
    Verdict,
    MAX_CONFIDENCE,
    THREAT_THRESHOLD,
};
