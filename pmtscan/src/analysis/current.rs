//! Current-mode analysis.
//!
//! Picoamperemeter blocks are reduced to a per-channel mean and
//! standard error and appended to the scan data file; reference blocks
//! go to a separate reference file. Both files carry a one-off header.

use super::{Analyser, AnalysisError};
use crate::daq::{Block, Timestamp};
use chrono::Utc;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

struct CurrentState {
    pending: VecDeque<Block>,
    data_header_written: bool,
    reference_header_written: bool,
}

/// Current-mode analyser.
pub struct CurrentModeAnalysis {
    data_file: PathBuf,
    reference_file: PathBuf,
    state: Mutex<CurrentState>,
}

impl CurrentModeAnalysis {
    /// Creates a current-mode analyser writing into `output_dir`.
    pub fn new(output_dir: &Path) -> Self {
        let date = Utc::now().date_naive();
        Self {
            data_file: output_dir.join(format!("{date}_photocurrent_scan.txt")),
            reference_file: output_dir.join(format!("{date}_PHD_reference.txt")),
            state: Mutex::new(CurrentState {
                pending: VecDeque::new(),
                data_header_written: false,
                reference_header_written: false,
            }),
        }
    }

    /// Number of blocks waiting to be processed.
    pub async fn pending_blocks(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    fn header(block: &Block) -> String {
        let mut header = String::from("#");
        for channel in 0..block.len() {
            let _ = write!(
                header,
                "Mean_chn.{channel}\tStandard_error_chn.{channel}\t"
            );
        }
        header.push('\n');
        header
    }

    fn summary_line(block: &Block, timestamp: Option<Timestamp>) -> String {
        let mut line = String::new();
        if let Some(ts) = timestamp {
            let _ = write!(line, "{}\t", ts.timestamp_micros());
        }
        for readings in block {
            let (mean, error) = mean_and_stderr(readings);
            let _ = write!(line, "{mean}\t{error}\t");
        }
        line.push('\n');
        line
    }
}

impl Analyser for CurrentModeAnalysis {
    async fn append(&self, block: Block) {
        self.state.lock().await.pending.push_back(block);
    }

    async fn process_next(&self) -> Result<(), AnalysisError> {
        let (block, write_header) = {
            let mut state = self.state.lock().await;
            let Some(block) = state.pending.pop_front() else {
                debug!("no pending block to analyse");
                return Ok(());
            };
            let write_header = !state.data_header_written;
            state.data_header_written = true;
            (block, write_header)
        };

        if write_header {
            super::append_line(&self.data_file, &Self::header(&block)).await?;
        }
        super::append_line(&self.data_file, &Self::summary_line(&block, None)).await?;
        Ok(())
    }

    async fn analyse_reference(
        &self,
        block: Block,
        timestamp: Timestamp,
    ) -> Result<(), AnalysisError> {
        let write_header = {
            let mut state = self.state.lock().await;
            let write_header = !state.reference_header_written;
            state.reference_header_written = true;
            write_header
        };

        if write_header {
            super::append_line(&self.reference_file, &Self::header(&block)).await?;
        }
        super::append_line(&self.reference_file, &Self::summary_line(&block, Some(timestamp)))
            .await?;
        Ok(())
    }
}

fn mean_and_stderr(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
    (mean, (variance / n).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_process_next_is_noop_on_empty_queue() {
        let dir = tempfile::TempDir::new().unwrap();
        let analyser = CurrentModeAnalysis::new(dir.path());

        assert!(analyser.process_next().await.is_ok());
        // No file is created by a no-op drain.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_data_file_gets_header_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let analyser = CurrentModeAnalysis::new(dir.path());

        analyser.append(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).await;
        analyser.append(vec![vec![1.5, 2.5, 3.5], vec![4.5, 5.5, 6.5]]).await;
        analyser.process_next().await.unwrap();
        analyser.process_next().await.unwrap();

        let entry = std::fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        let content = std::fs::read_to_string(entry.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("#Mean_chn.0"));
        assert!(lines[1].starts_with('2')); // mean of 1,2,3
    }

    #[tokio::test]
    async fn test_reference_line_carries_timestamp() {
        let dir = tempfile::TempDir::new().unwrap();
        let analyser = CurrentModeAnalysis::new(dir.path());

        let ts = Utc::now();
        analyser
            .analyse_reference(vec![vec![1.0, 1.0]], ts)
            .await
            .unwrap();

        let content = std::fs::read_to_string(
            dir.path().join(format!("{}_PHD_reference.txt", ts.date_naive())),
        )
        .unwrap();
        let data_line = content.lines().nth(1).unwrap();
        assert!(data_line.starts_with(&ts.timestamp_micros().to_string()));
    }
}
