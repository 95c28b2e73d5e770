//! Coordinate types for the scan plane and the motion stage.
//!
//! Scan positions are expressed in a 2-D frame centred on the cathode
//! ([`Coordinate`]); the motion layer maps them onto absolute 3-axis
//! stage positions ([`StagePosition`]) by adding the configured cathode
//! centre and a curvature correction.

use std::fmt;

/// A scan-plane coordinate, relative to the cathode centre.
///
/// Immutable value type. The derived polar form ([`Coordinate::radius`],
/// [`Coordinate::angle_deg`]) is used for geometric reasoning such as
/// the disk cut and the curvature correction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coordinate {
    /// Horizontal offset from the cathode centre, in mm
    pub x: f64,
    /// Vertical offset from the cathode centre, in mm
    pub y: f64,
}

impl Coordinate {
    /// Creates a coordinate from cartesian components.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Creates a coordinate from polar components (angle in degrees).
    pub fn from_polar(radius: f64, angle_deg: f64) -> Self {
        let angle = angle_deg.to_radians();
        Self {
            x: radius * angle.cos(),
            y: radius * angle.sin(),
        }
    }

    /// Distance from the cathode centre.
    #[inline]
    pub fn radius(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Polar angle in degrees, measured from the positive x axis.
    #[inline]
    pub fn angle_deg(&self) -> f64 {
        self.y.atan2(self.x).to_degrees()
    }

    /// Returns the polar form `(radius, angle_deg)`.
    pub fn to_polar(&self) -> (f64, f64) {
        (self.radius(), self.angle_deg())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

/// An absolute position of the 3-axis motion stage, in mm.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StagePosition {
    /// X axis, in machine coordinates
    pub x: f64,
    /// Y axis, in machine coordinates
    pub y: f64,
    /// Z axis (probe-to-cathode distance), in machine coordinates
    pub z: f64,
}

impl StagePosition {
    /// Creates a stage position from its three axis values.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns the axis values in `[x, y, z]` order.
    ///
    /// Used when iterating axes uniformly (limit checks, log records).
    #[inline]
    pub fn axes(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl fmt::Display for StagePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_of_axis_point() {
        let c = Coordinate::new(-3.0, 4.0);
        assert!((c.radius() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_angle_of_quadrants() {
        assert!((Coordinate::new(1.0, 0.0).angle_deg() - 0.0).abs() < 1e-9);
        assert!((Coordinate::new(0.0, 1.0).angle_deg() - 90.0).abs() < 1e-9);
        assert!((Coordinate::new(-1.0, 0.0).angle_deg() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_polar_round_trip() {
        let original = Coordinate::new(2.5, -1.75);
        let (r, phi) = original.to_polar();
        let back = Coordinate::from_polar(r, phi);

        assert!((back.x - original.x).abs() < 1e-9);
        assert!((back.y - original.y).abs() < 1e-9);
    }

    #[test]
    fn test_stage_position_axes_order() {
        let p = StagePosition::new(1.0, 2.0, 3.0);
        assert_eq!(p.axes(), [1.0, 2.0, 3.0]);
    }
}
