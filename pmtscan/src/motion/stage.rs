//! Simulated 3-axis stage.

use super::{MotionController, MotionError};
use crate::config::MotionSettings;
use crate::coord::{Coordinate, StagePosition};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Geometry mapping scan coordinates onto absolute stage positions.
///
/// The cathode surface is curved; to keep the probe at a constant
/// distance from it, the z axis is offset by `coefficient * radius^2`
/// for a scan point at `radius` from the centre. Absolute positions are
/// valid in the half-open interval `[limit_min, limit_max)` on every
/// axis.
#[derive(Debug, Clone)]
pub struct StageGeometry {
    centre: StagePosition,
    limit_min: f64,
    limit_max: f64,
    curvature_coefficient: f64,
}

impl StageGeometry {
    /// Creates the geometry from motion settings.
    pub fn new(settings: &MotionSettings) -> Self {
        Self {
            centre: settings.centre,
            limit_min: settings.limit_min,
            limit_max: settings.limit_max,
            curvature_coefficient: settings.curvature_coefficient,
        }
    }

    /// Absolute stage position for a scan-plane coordinate.
    pub fn absolute_target(&self, target: Coordinate) -> StagePosition {
        let radius = target.radius();
        StagePosition::new(
            self.centre.x + target.x,
            self.centre.y + target.y,
            self.centre.z + self.curvature_offset(radius),
        )
    }

    /// Whether an absolute position lies inside machine limits.
    pub fn within_limits(&self, position: StagePosition) -> bool {
        position
            .axes()
            .iter()
            .all(|&v| v >= self.limit_min && v < self.limit_max)
    }

    fn curvature_offset(&self, radius: f64) -> f64 {
        self.curvature_coefficient * radius * radius
    }
}

struct StageState {
    connected: bool,
    position: StagePosition,
    last_commanded: StagePosition,
}

/// Simulated stage controller.
///
/// Applies the curvature-corrected coordinate mapping and machine-limit
/// checks of the real stage, and models motion with a settle-time
/// sleep. Position readback reproduces the commanded target (the real
/// encoders report sub-micron deviations the simulation has no use
/// for).
pub struct StageController {
    geometry: StageGeometry,
    reference_target: StagePosition,
    settle: Duration,
    serial_ports: Vec<String>,
    state: Mutex<StageState>,
}

impl StageController {
    /// Creates a stage controller.
    ///
    /// `reference_target` is the named position for reference
    /// measurements; which one applies depends on the measurement mode
    /// (second PMT for pulse, photodiode for current).
    pub fn new(settings: &MotionSettings, reference_target: StagePosition) -> Self {
        Self {
            geometry: StageGeometry::new(settings),
            reference_target,
            settle: Duration::from_millis(settings.settle_ms),
            serial_ports: settings.serial_ports.clone(),
            state: Mutex::new(StageState {
                connected: false,
                position: settings.centre,
                last_commanded: settings.centre,
            }),
        }
    }

    /// The geometry in use, for callers that need the same mapping.
    pub fn geometry(&self) -> &StageGeometry {
        &self.geometry
    }

    fn ensure_connected(&self) -> Result<(), MotionError> {
        if self.state.lock().connected {
            Ok(())
        } else {
            Err(MotionError::NotConnected)
        }
    }

    async fn drive_to(&self, target: StagePosition) {
        {
            let mut state = self.state.lock();
            state.last_commanded = target;
        }
        tokio::time::sleep(self.settle).await;
        self.state.lock().position = target;
    }
}

impl MotionController for StageController {
    async fn connect_and_configure(&self) -> Result<(), MotionError> {
        info!(ports = ?self.serial_ports, "connecting stage axes");
        self.state.lock().connected = true;
        Ok(())
    }

    fn check_reachable(&self, target: Coordinate) -> bool {
        self.geometry
            .within_limits(self.geometry.absolute_target(target))
    }

    async fn move_to(&self, target: Coordinate) -> Result<bool, MotionError> {
        self.ensure_connected()?;

        let absolute = self.geometry.absolute_target(target);
        if !self.geometry.within_limits(absolute) {
            warn!(%target, %absolute, "move rejected, outside machine limits");
            return Ok(false);
        }

        debug!(%target, %absolute, "moving stage");
        self.drive_to(absolute).await;
        Ok(true)
    }

    async fn move_to_reference_target(&self) -> Result<(), MotionError> {
        self.ensure_connected()?;

        if !self.geometry.within_limits(self.reference_target) {
            return Err(MotionError::Boundary(self.reference_target));
        }

        debug!(target = %self.reference_target, "moving stage to reference target");
        self.drive_to(self.reference_target).await;
        Ok(())
    }

    async fn current_position(&self) -> Result<StagePosition, MotionError> {
        self.ensure_connected()?;
        Ok(self.state.lock().position)
    }

    fn last_commanded(&self) -> StagePosition {
        self.state.lock().last_commanded
    }
}
