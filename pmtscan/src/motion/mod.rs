//! Motion stage interface.
//!
//! The scan core drives the 3-axis stage through the
//! [`MotionController`] capability trait. Scan-plane coordinates are
//! mapped to absolute machine positions by the controller itself (the
//! cathode centre plus a curvature correction), so the orchestrator
//! never reasons about machine coordinates. [`StageController`] is the
//! simulated implementation standing in for the serial stage driver.

mod stage;

pub use stage::{StageController, StageGeometry};

use crate::coord::{Coordinate, StagePosition};
use std::future::Future;
use thiserror::Error;

/// Errors raised by the motion stage.
#[derive(Debug, Error)]
pub enum MotionError {
    /// A named reference target lies outside machine limits.
    ///
    /// This is a configuration error: a scan cannot run without its
    /// reference point, so this is fatal rather than skippable.
    #[error("reference target {0} lies outside machine limits")]
    Boundary(StagePosition),

    /// An operation was issued before `connect_and_configure()`
    #[error("stage is not connected")]
    NotConnected,

    /// The stage hardware reported a fault
    #[error("stage fault: {0}")]
    Hardware(String),
}

/// Capability interface of the motorized stage.
///
/// A stage handle is single-owner for the duration of a scan: the
/// orchestrator takes it by value and nothing else commands the
/// hardware while it runs.
pub trait MotionController: Send + Sync + 'static {
    /// Opens the stage connection and applies axis configuration.
    fn connect_and_configure(&self) -> impl Future<Output = Result<(), MotionError>> + Send;

    /// Whether a scan coordinate maps to a position inside machine
    /// limits under the current calibration.
    ///
    /// Used by grid validation; evaluated without moving.
    fn check_reachable(&self, target: Coordinate) -> bool;

    /// Moves to a scan coordinate.
    ///
    /// Returns `Ok(false)` without moving if the coordinate is
    /// unreachable at execution time (the caller skips it), `Ok(true)`
    /// once the move completed.
    fn move_to(&self, target: Coordinate) -> impl Future<Output = Result<bool, MotionError>> + Send;

    /// Moves to the designated reference target.
    ///
    /// # Errors
    ///
    /// [`MotionError::Boundary`] if the configured target itself lies
    /// outside machine limits.
    fn move_to_reference_target(&self) -> impl Future<Output = Result<(), MotionError>> + Send;

    /// Reads back the stage's current absolute position.
    fn current_position(&self) -> impl Future<Output = Result<StagePosition, MotionError>> + Send;

    /// The last absolute position a move was commanded to.
    fn last_commanded(&self) -> StagePosition;
}
