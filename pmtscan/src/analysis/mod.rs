//! Data analysis interface and the two concrete analysers.
//!
//! The orchestrator hands acquired blocks to an [`Analyser`] and drains
//! them one step behind acquisition, so analysis compute hides behind
//! the next readout's hardware latency. [`PulseModeAnalysis`] extracts
//! pulse-shape metrics from oscilloscope waveform blocks;
//! [`CurrentModeAnalysis`] summarizes picoamperemeter readings.

mod current;
mod pulse;

pub use current::CurrentModeAnalysis;
pub use pulse::PulseModeAnalysis;

use crate::daq::{Block, Timestamp};
use std::future::Future;
use thiserror::Error;

/// Errors raised during data analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Pulse analysis was asked to process before the time axis was
    /// derived from a first device block.
    #[error("pulse analysis time axis has not been primed")]
    NotPrimed,

    /// Writing an analysis output file failed
    #[error("analysis output error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability interface of the data analyser.
///
/// `append` enqueues an acquired block; `process_next` drains the
/// oldest pending block, or does nothing if the queue is empty. The
/// orchestrator calls it once alongside every pipeline job.
pub trait Analyser: Send + Sync + 'static {
    /// Enqueues one acquired block for later processing.
    fn append(&self, block: Block) -> impl Future<Output = ()> + Send;

    /// Processes the oldest pending block, if any.
    fn process_next(&self) -> impl Future<Output = Result<(), AnalysisError>> + Send;

    /// Analyses a reference block and records the result.
    fn analyse_reference(
        &self,
        block: Block,
        timestamp: Timestamp,
    ) -> impl Future<Output = Result<(), AnalysisError>> + Send;
}

/// Appends one line to a text output file, creating it if needed.
pub(crate) async fn append_line(path: &std::path::Path, line: &str) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}
