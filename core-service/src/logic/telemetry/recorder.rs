//! Audit Recorder
//!
//! Append-only JSONL writer, one file series per process (`prefix`).
//! Thread-safe and flushed after every line.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;

use super::event::AuditEvent;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Maximum file size before rotation (50 MB)
const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

const LOG_EXT: &str = "jsonl";

// ============================================================================
// RECORDER STATE
// ============================================================================

static RECORDER: Mutex<Option<Recorder>> = Mutex::new(None);

static EVENTS_RECORDED: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// RECORDER
// ============================================================================

pub struct Recorder {
    writer: BufWriter<File>,
    current_file: PathBuf,
    current_size: u64,
    base_dir: PathBuf,
    prefix: String,
    max_size: u64,
    started: Instant,
    component: String,
}

impl Recorder {
    pub fn new(base_dir: PathBuf, prefix: &str) -> std::io::Result<Self> {
        Self::with_max_size(base_dir, prefix, MAX_FILE_SIZE)
    }

    pub fn with_max_size(base_dir: PathBuf, prefix: &str, max_size: u64) -> std::io::Result<Self> {
        std::fs::create_dir_all(&base_dir)?;
        let (file_path, file) = Self::open_new_file(&base_dir, prefix)?;

        Ok(Self {
            writer: BufWriter::new(file),
            current_file: file_path,
            current_size: 0,
            base_dir,
            prefix: prefix.to_string(),
            max_size,
            started: Instant::now(),
            component: prefix.to_string(),
        })
    }

    fn open_new_file(base_dir: &Path, prefix: &str) -> std::io::Result<(PathBuf, File)> {
        // Millisecond stamp plus pid keeps rotated files and concurrent
        // processes apart
        let stem = format!(
            "{}_{}_{}",
            prefix,
            Utc::now().format("%Y_%m_%d_%H%M%S%3f"),
            std::process::id(),
        );
        let mut file_path = base_dir.join(format!("{}.{}", stem, LOG_EXT));
        let mut n = 1;
        while file_path.exists() {
            file_path = base_dir.join(format!("{}_{}.{}", stem, n, LOG_EXT));
            n += 1;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;

        log::info!("Opened audit log: {:?}", file_path);
        Ok((file_path, file))
    }

    pub fn record(&mut self, event: &AuditEvent) -> std::io::Result<()> {
        let line = event.to_jsonl();
        let bytes = line.as_bytes();

        if self.current_size > 0 && self.current_size + bytes.len() as u64 + 1 > self.max_size {
            self.rotate()?;
        }

        self.writer.write_all(bytes)?;
        self.writer.write_all(b"\n")?;
        self.current_size += bytes.len() as u64 + 1;
        self.writer.flush()?;

        EVENTS_RECORDED.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        self.writer.flush()?;

        let (new_path, new_file) = Self::open_new_file(&self.base_dir, &self.prefix)?;
        self.writer = BufWriter::new(new_file);

        log::info!("Rotated from {:?} to {:?}", self.current_file, new_path);
        self.current_file = new_path;
        self.current_size = 0;

        Ok(())
    }

    pub fn current_file(&self) -> &Path {
        &self.current_file
    }
}

// ============================================================================
// GLOBAL API
// ============================================================================

/// Initialize the process-wide recorder under `<dir>/audit` and record
/// `SystemStart` for `component`
pub fn init(state_dir: &Path, component: &str) -> std::io::Result<()> {
    let recorder = Recorder::new(state_dir.join("audit"), component)?;
    *RECORDER.lock() = Some(recorder);

    record(AuditEvent::system_start(component, crate::constants::APP_VERSION));
    Ok(())
}

/// Record an event; dropped with a debug line when not initialized
pub fn record(event: AuditEvent) {
    let mut guard = RECORDER.lock();
    if let Some(recorder) = guard.as_mut() {
        if let Err(e) = recorder.record(&event) {
            log::error!("Failed to record audit event: {}", e);
        }
    } else {
        log::debug!("Audit recorder not initialized, event dropped: {}", event.description);
    }
}

pub fn events_recorded() -> u64 {
    EVENTS_RECORDED.load(Ordering::SeqCst)
}

pub fn current_log_file() -> Option<PathBuf> {
    RECORDER.lock().as_ref().map(|r| r.current_file().to_path_buf())
}

/// Record `SystemStop` and close the recorder
pub fn shutdown() {
    let mut guard = RECORDER.lock();
    if let Some(mut recorder) = guard.take() {
        let uptime = recorder.started.elapsed().as_secs();
        let stop = AuditEvent::system_stop(&recorder.component, uptime);
        let _ = recorder.record(&stop);
        let _ = recorder.writer.flush();
        log::info!("Audit recorder shutdown. Total events: {}", events_recorded());
    }
}

// ============================================================================
// QUERY API
// ============================================================================

/// Read every parsable event from a log file
pub fn read_events(file_path: &Path) -> std::io::Result<Vec<AuditEvent>> {
    let reader = BufReader::new(File::open(file_path)?);
    let mut events = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if !line.is_empty() {
            if let Ok(event) = serde_json::from_str::<AuditEvent>(&line) {
                events.push(event);
            }
        }
    }

    Ok(events)
}

/// All `.jsonl` files in `dir`, sorted by name (timestamped)
pub fn list_log_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if dir.is_dir() {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |e| e == LOG_EXT) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

// ============================================================================
// TESTS
// ============================================================================
