//! Position/timestamp log file.
//!
//! One tab-separated line per visited position: commanded x/y/z, the
//! stage's reported actual x/y/z, then one timestamp per readout.
//! Records are appended and flushed before the next position begins, so
//! an aborted scan loses at most the position in flight.

use crate::coord::StagePosition;
use crate::daq::Timestamp;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// One log line: where the stage was told to go, where it reports
/// being, and when each readout completed.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Commanded absolute stage position
    pub commanded: StagePosition,
    /// Actual stage position reported after the move
    pub actual: StagePosition,
    /// Completion timestamp of every readout at this position
    pub timestamps: Vec<Timestamp>,
}

impl LogRecord {
    /// Renders the record as one tab-separated, newline-terminated line.
    ///
    /// Timestamps are integer microseconds since the Unix epoch.
    pub fn to_line(&self) -> String {
        let mut line = String::new();
        for value in self.commanded.axes().iter().chain(self.actual.axes().iter()) {
            let _ = write!(line, "{value}\t");
        }
        for timestamp in &self.timestamps {
            let _ = write!(line, "{}\t", timestamp.timestamp_micros());
        }
        line.push('\n');
        line
    }
}

/// Append-only writer for the position/timestamp log.
pub struct PositionLog {
    file: File,
    path: PathBuf,
}

impl PositionLog {
    /// Opens the log file in append mode, creating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { file, path })
    }

    /// Appends one record and flushes it to disk.
    pub async fn append(&mut self, record: &LogRecord) -> std::io::Result<()> {
        self.file.write_all(record.to_line().as_bytes()).await?;
        self.file.flush().await
    }

    /// Flushes and releases the underlying file.
    ///
    /// Called on every exit path of a scan, including cancellation.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.file.shutdown().await
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
