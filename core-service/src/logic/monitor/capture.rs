//! Capture Sources
//!
//! OS capture primitives are external programs (screenshot tool, clipboard
//! reader, recorder) whose stdout is the artifact. Any failure here is soft:
//! the loop logs it and skips the source for this cycle.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::logic::artifact::{ArtifactKind, RawArtifact};
use crate::logic::config::{CaptureConfig, CommandSpec};
use crate::logic::verdict::Channel;

/// Upper bound for one capture command
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum CaptureError {
    /// Capture tool missing
    #[error("capture tool unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("capture timed out: {0}")]
    Timeout(String),
    #[error("capture failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait CaptureSource: Send {
    fn name(&self) -> &str;

    fn channel(&self) -> Channel;

    /// `Ok(None)` when there is nothing new to analyse
    async fn capture(&mut self) -> Result<Option<RawArtifact>, CaptureError>;

    /// The last captured artifact got a definitive answer
    fn commit(&mut self) {}

    /// The last captured artifact was not analysed and must be offered again
    fn rollback(&mut self) {}
}

// ============================================================================
// COMMAND CAPTURE
// ============================================================================

pub struct CommandCapture {
    name: String,
    channel: Channel,
    kind: ArtifactKind,
    command: CommandSpec,
    dimensions: Option<(u32, u32)>,
    encoding: Option<String>,
    timeout: Duration,
}

impl CommandCapture {
    pub fn new(name: &str, channel: Channel, kind: ArtifactKind, command: CommandSpec) -> Self {
        Self {
            name: name.to_string(),
            channel,
            kind,
            command,
            dimensions: None,
            encoding: None,
            timeout: CAPTURE_TIMEOUT,
        }
    }

    pub fn with_image(mut self, width: u32, height: u32, encoding: &str) -> Self {
        self.dimensions = Some((width, height));
        self.encoding = Some(encoding.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the command and return its stdout
    async fn run(&self) -> Result<Vec<u8>, CaptureError> {
        let child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => CaptureError::Unavailable(self.command.program.clone()),
                ErrorKind::PermissionDenied => {
                    CaptureError::PermissionDenied(self.command.program.clone())
                }
                _ => CaptureError::Failed(format!("{}: {}", self.command.program, e)),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CaptureError::Timeout(self.command.to_string()))?
            .map_err(|e| CaptureError::Failed(format!("{}: {}", self.command.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Failed(format!(
                "{} exited with {}: {}",
                self.command.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }

    fn to_artifact(&self, bytes: Vec<u8>) -> RawArtifact {
        let mut raw = RawArtifact::new(self.channel, self.kind, bytes);
        if let Some((w, h)) = self.dimensions {
            raw = raw.with_dimensions(w, h);
        }
        if let Some(encoding) = &self.encoding {
            raw = raw.with_encoding(encoding);
        }
        raw
    }
}

#[async_trait]
impl CaptureSource for CommandCapture {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel(&self) -> Channel {
        self.channel
    }

    async fn capture(&mut self) -> Result<Option<RawArtifact>, CaptureError> {
        let bytes = self.run().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.to_artifact(bytes)))
    }
}

// ============================================================================
// CHANGE SUPPRESSION
// ============================================================================

/// Wraps a text source and reports nothing new while its content is unchanged.
/// A fingerprint only sticks once the capture is committed.
pub struct ChangeFilter<S> {
    inner: S,
    last_fingerprint: Option<u32>,
    pending: Option<u32>,
}

impl<S: CaptureSource> ChangeFilter<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, last_fingerprint: None, pending: None }
    }
}

#[async_trait]
impl<S: CaptureSource> CaptureSource for ChangeFilter<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn channel(&self) -> Channel {
        self.inner.channel()
    }

    async fn capture(&mut self) -> Result<Option<RawArtifact>, CaptureError> {
        let Some(raw) = self.inner.capture().await? else {
            return Ok(None);
        };

        let fingerprint = crc32fast::hash(&raw.bytes);
        if self.last_fingerprint == Some(fingerprint) {
            return Ok(None);
        }
        self.pending = Some(fingerprint);
        Ok(Some(raw))
    }

    fn commit(&mut self) {
        if let Some(fingerprint) = self.pending.take() {
            self.last_fingerprint = Some(fingerprint);
        }
        self.inner.commit();
    }

    fn rollback(&mut self) {
        self.pending = None;
        self.inner.rollback();
    }
}

// ============================================================================
// FACTORY
// ============================================================================

/// Build the enabled sources, in capture order
pub fn sources_from_config(config: &CaptureConfig) -> Vec<Box<dyn CaptureSource>> {
    let mut sources: Vec<Box<dyn CaptureSource>> = Vec::new();

    if let Some(cmd) = &config.screen_image {
        sources.push(Box::new(
            CommandCapture::new("screen", Channel::Screen, ArtifactKind::Image, cmd.command.clone())
                .with_image(cmd.width, cmd.height, &cmd.encoding),
        ));
    }
    if let Some(cmd) = &config.screen_text {
        sources.push(Box::new(ChangeFilter::new(CommandCapture::new(
            "screen-text",
            Channel::Screen,
            ArtifactKind::Text,
            cmd.clone(),
        ))));
    }
    if let Some(cmd) = &config.clipboard {
        sources.push(Box::new(ChangeFilter::new(CommandCapture::new(
            "clipboard",
            Channel::Clipboard,
            ArtifactKind::Text,
            cmd.clone(),
        ))));
    }
    if let Some(cmd) = &config.microphone {
        sources.push(Box::new(CommandCapture::new(
            "microphone",
            Channel::Microphone,
            ArtifactKind::Audio,
            cmd.clone(),
        )));
    }

    sources
}
