//! Traversal grid generation and validation.
//!
//! A [`Grid`] is the deterministic, ordered set of candidate scan
//! coordinates inside a disk of a given radius. Before a scan it must
//! be filtered through the motion controller's reachability predicate,
//! producing a [`ValidatedQueue`] that the scan orchestrator consumes
//! front-to-back. Validation preserves the grid's raster order.

use crate::coord::Coordinate;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::debug;

/// Errors from grid construction.
#[derive(Debug, Error)]
pub enum GridError {
    /// A grid parameter was zero or negative.
    #[error("invalid grid parameter: {name} must be positive, got {value}")]
    InvalidParameter {
        /// Name of the offending parameter
        name: &'static str,
        /// The rejected value
        value: f64,
    },
}

/// An ordered disk-shaped lattice of candidate scan coordinates.
///
/// Generated once from `max_radius` and `step`; every member satisfies
/// `radius <= max_radius`. Enumeration order is lexicographic in
/// `(x, y)`, which becomes the scan's raster order.
#[derive(Debug, Clone)]
pub struct Grid {
    max_radius: f64,
    step: f64,
    positions: Vec<Coordinate>,
}

impl Grid {
    /// Builds the grid for a disk of `max_radius` sampled at `step`.
    ///
    /// The underlying square lattice spans `{-k*step, ..., 0, ..., k*step}`
    /// on both axes with `k = ceil(max_radius / step)`, symmetric around
    /// zero; lattice points outside the disk are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidParameter`] if either input is not
    /// strictly positive. This is checked before any hardware is touched.
    pub fn generate(max_radius: f64, step: f64) -> Result<Self, GridError> {
        if !max_radius.is_finite() || max_radius <= 0.0 {
            return Err(GridError::InvalidParameter {
                name: "max_radius",
                value: max_radius,
            });
        }
        if !step.is_finite() || step <= 0.0 {
            return Err(GridError::InvalidParameter {
                name: "step",
                value: step,
            });
        }

        let k = (max_radius / step).ceil() as i64;
        let axis: Vec<f64> = (-k..=k).map(|i| i as f64 * step).collect();

        let mut positions = Vec::new();
        for &x in &axis {
            for &y in &axis {
                let candidate = Coordinate::new(x, y);
                if candidate.radius() <= max_radius {
                    positions.push(candidate);
                }
            }
        }

        debug!(
            count = positions.len(),
            max_radius, step, "built cathode scan grid"
        );

        Ok(Self {
            max_radius,
            step,
            positions,
        })
    }

    /// The candidate coordinates in raster order.
    pub fn positions(&self) -> &[Coordinate] {
        &self.positions
    }

    /// Number of candidate coordinates.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if the grid holds no candidates.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The disk radius this grid was generated for.
    pub fn max_radius(&self) -> f64 {
        self.max_radius
    }

    /// The lattice step this grid was generated for.
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Filters the grid through a reachability predicate.
    ///
    /// The predicate is supplied by the motion controller and evaluated
    /// once per candidate at validation time (it depends on the
    /// controller's current calibration). The resulting queue is a
    /// subsequence of the grid in the same order; the grid itself is
    /// untouched and can be validated again later.
    pub fn validate<F>(&self, mut reachable: F) -> ValidatedQueue
    where
        F: FnMut(Coordinate) -> bool,
    {
        let kept: VecDeque<Coordinate> = self
            .positions
            .iter()
            .copied()
            .filter(|&c| reachable(c))
            .collect();

        debug!(
            kept = kept.len(),
            dropped = self.positions.len() - kept.len(),
            "validated scan grid against stage reachability"
        );

        ValidatedQueue { positions: kept }
    }
}

/// The ordered queue of reachable scan positions.
///
/// Produced by [`Grid::validate`] and consumed destructively, strictly
/// front-to-back, by a single scan orchestrator. The orchestrator takes
/// its own copy at construction, so a queue held by the caller is never
/// aliased into a running scan.
#[derive(Debug, Clone, Default)]
pub struct ValidatedQueue {
    positions: VecDeque<Coordinate>,
}

impl ValidatedQueue {
    /// Removes and returns the next scan position, if any.
    pub fn pop_front(&mut self) -> Option<Coordinate> {
        self.positions.pop_front()
    }

    /// Number of positions still queued.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if no positions remain.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Iterates the queued positions front-to-back without consuming.
    pub fn iter(&self) -> impl Iterator<Item = &Coordinate> {
        self.positions.iter()
    }

    pub(crate) fn into_deque(self) -> VecDeque<Coordinate> {
        self.positions
    }
}
