//! Artifact Module
//!
//! Raw sampled units (as captured / as carried on the wire) and their decoded
//! form handed to detectors.
//!
//! ## Structure
//! - `types`: `RawArtifact`, `Artifact`, `Payload`
//! - `wav`: RIFF/WAVE decoding into mono `f32` samples

pub mod types;
pub mod wav;

pub use types::{Artifact, ArtifactKind, Payload, PixelFormat, RawArtifact};
