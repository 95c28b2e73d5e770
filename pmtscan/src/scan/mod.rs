//! Scan orchestration core.
//!
//! [`ScanManager`] consumes a validated position queue and drives the
//! repeating cycle of reference recalibration, stage motion, pipelined
//! acquisition and analysis, and position logging. [`PositionLog`]
//! writes the per-position log file.

mod log;
mod manager;

pub use log::{LogRecord, PositionLog};
pub use manager::{ScanManager, ScanStats};

use crate::analysis::AnalysisError;
use crate::daq::DeviceError;
use crate::motion::MotionError;
use thiserror::Error;

/// Errors that terminate a scan run.
///
/// Recoverable conditions (an unreachable queued position, a failed
/// reference cycle other than a boundary violation) are handled inside
/// the control loop and never surface here.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The DAQ instrument failed during position acquisition
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// The motion stage failed, or a reference target is misconfigured
    #[error("motion error: {0}")]
    Motion(#[from] MotionError),

    /// Analysis of an acquired block failed
    #[error("analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// The position log could not be written
    #[error("position log error: {0}")]
    Log(#[from] std::io::Error),

    /// The operator aborted the scan
    #[error("scan cancelled by operator")]
    Cancelled,
}
