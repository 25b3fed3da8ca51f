//! JSONL frame log with size-based rotation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::frame::Frame;

const FILE_PREFIX: &str = "frames_";
const FILE_EXTENSION: &str = "jsonl";

/// Whether a frame left or reached this node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

/// One line of the frame log
#[derive(Debug, Clone, Serialize)]
pub struct FrameRecord {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub source: u8,
    pub target: u8,
    pub payload_hex: String,
    pub payload_text: String,
}

impl FrameRecord {
    pub fn new(direction: Direction, frame: &Frame) -> Self {
        Self {
            timestamp: Utc::now(),
            direction,
            source: frame.source,
            target: frame.target,
            payload_hex: hex::encode_upper(&frame.payload),
            payload_text: frame.payload_text(),
        }
    }
}

/// Writes [`FrameRecord`]s to rotating JSONL files
///
/// A new file is started after `max_records_per_file` records; only the
/// newest `max_files_to_keep` files are kept in `log_dir`.
pub struct FrameLogger {
    log_dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    file_seq: u64,
}

impl FrameLogger {
    /// Create the log directory if needed
    ///
    /// No file is opened until the first record is written.
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        Self::with_limits(
            &config.log_dir,
            config.max_records_per_file,
            config.max_files_to_keep,
        )
    }

    pub fn with_limits<P: AsRef<Path>>(
        log_dir: P,
        max_records_per_file: usize,
        max_files_to_keep: usize,
    ) -> Result<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();
        fs::create_dir_all(&log_dir)?;
        info!("Frame log directory: {}", log_dir.display());

        Ok(Self {
            log_dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            records_in_file: 0,
            file_seq: 0,
        })
    }

    /// Append one record, rotating first if the current file is full
    pub fn log(&mut self, record: &FrameRecord) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            self.records_in_file += 1;
        }
        Ok(())
    }

    /// Convenience wrapper building the record from `frame`
    pub fn log_frame(&mut self, direction: Direction, frame: &Frame) -> Result<()> {
        self.log(&FrameRecord::new(direction, frame))
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.file_seq,
            FILE_EXTENSION
        );
        self.file_seq += 1;

        let path = self.log_dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Opened frame log {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.prune()
    }

    /// Delete the oldest log files beyond the retention limit
    fn prune(&self) -> Result<()> {
        let mut files = self.log_files()?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove old frame log {}: {}", path.display(), e);
            }
        }
        Ok(())
    }

    /// Frame log files in the log directory, unsorted
    pub fn log_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.log_dir)? {
            let path = entry?.path();
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(FILE_PREFIX))
                && path.extension().is_some_and(|e| e == FILE_EXTENSION);
            if is_log {
                files.push(path);
            }
        }
        Ok(files)
    }
}
