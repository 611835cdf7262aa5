//! Scamwatch Core
//!
//! Detection engine, monitor loop, alert dispatcher and process supervisor
//! shared by the `scamwatch` binary and the analysis server.

pub mod constants;
pub mod logic;
