//! Scan control loop.
//!
//! The manager owns its hardware handles and a private copy of the
//! validated queue, and runs the whole scan as one cooperative loop:
//!
//! 1. an unconditional initial reference measurement,
//! 2. per position: `readouts_per_position` device reads, each joined
//!    with one analyser drain of the block read one step earlier, then
//!    a final job that takes a periodic reference measurement when due
//!    and starts the move to the next position while the last block
//!    drains,
//! 3. one flushed log record per visited position,
//! 4. an unconditional final reference measurement.
//!
//! Device reads dominate wall-clock time, so the one-step-lagged drain
//! and the early move hide analysis and motion behind acquisition
//! latency.

use super::log::{LogRecord, PositionLog};
use super::ScanError;
use crate::analysis::Analyser;
use crate::config::StatisticsSettings;
use crate::coord::Coordinate;
use crate::daq::Device;
use crate::grid::ValidatedQueue;
use crate::motion::{MotionController, MotionError};
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters summarizing a scan run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Positions measured and logged
    pub positions_visited: usize,
    /// Queued positions skipped because they were unreachable at move time
    pub positions_skipped: usize,
    /// Reference cycles attempted (initial and final included)
    pub reference_cycles: usize,
    /// Reference cycles that failed and were recovered
    pub reference_failures: usize,
}

/// The scan orchestrator.
///
/// Takes its device, stage and analyser handles by value: while a scan
/// runs, nothing else can command the same hardware. The validated
/// queue is copied at construction, so the caller's queue is never
/// aliased into a running scan.
pub struct ScanManager<D, M, A> {
    device: D,
    motors: M,
    analyser: A,
    queue: VecDeque<Coordinate>,
    readouts_per_position: u32,
    reference_period: u32,
    measurements_since_last_reference: u32,
    stats: ScanStats,
    log: PositionLog,
}

impl<D, M, A> ScanManager<D, M, A>
where
    D: Device,
    M: MotionController,
    A: Analyser,
{
    /// Creates a manager over a private copy of `queue`.
    pub fn new(
        queue: &ValidatedQueue,
        device: D,
        motors: M,
        analyser: A,
        statistics: &StatisticsSettings,
        log: PositionLog,
    ) -> Self {
        Self {
            device,
            motors,
            analyser,
            queue: queue.clone().into_deque(),
            readouts_per_position: statistics.readouts_per_position,
            reference_period: statistics.reference_period,
            measurements_since_last_reference: 0,
            stats: ScanStats::default(),
            log,
        }
    }

    /// Positions still queued.
    pub fn remaining_positions(&self) -> usize {
        self.queue.len()
    }

    /// Runs the scan to completion or cancellation.
    ///
    /// On cancellation the operation in flight is dropped; instrument
    /// state after that is undefined and not rolled back. The position
    /// log is flushed on every exit path.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<ScanStats, ScanError> {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                info!("scan cancelled by operator");
                Err(ScanError::Cancelled)
            }
            result = self.run_inner() => result,
        };

        if let Err(error) = self.log.shutdown().await {
            warn!(%error, "failed to flush position log");
        }

        outcome.map(|_| self.stats)
    }

    async fn run_inner(&mut self) -> Result<(), ScanError> {
        info!(
            queued = self.queue.len(),
            readouts_per_position = self.readouts_per_position,
            reference_period = self.reference_period,
            "starting cathode scan"
        );

        // Initial reference, before any position is visited.
        self.reference_checkpoint().await?;

        let mut at_position =
            advance_queue(&self.motors, &mut self.queue, &mut self.stats).await?;
        while at_position {
            at_position = self.measure_current_position().await?;
        }

        // Final reference, after the queue is exhausted.
        self.reference_checkpoint().await?;

        info!(
            visited = self.stats.positions_visited,
            skipped = self.stats.positions_skipped,
            references = self.stats.reference_cycles,
            "scan finished"
        );
        Ok(())
    }

    /// Runs a reference cycle; everything except a boundary violation
    /// of the reference target itself is recovered.
    async fn reference_checkpoint(&mut self) -> Result<(), ScanError> {
        self.stats.reference_cycles += 1;
        self.measurements_since_last_reference = 0;

        match reference_cycle(&self.device, &self.motors, &self.analyser).await {
            Ok(()) => Ok(()),
            Err(error) if is_fatal_reference_error(&error) => Err(error),
            Err(error) => {
                self.stats.reference_failures += 1;
                warn!(%error, "reference measurement failed, continuing scan");
                Ok(())
            }
        }
    }

    /// Measures the position the stage is currently on.
    ///
    /// Returns whether the final pipeline job left the stage on another
    /// position (false once the queue is exhausted).
    async fn measure_current_position(&mut self) -> Result<bool, ScanError> {
        debug!("measuring current position");

        // Captured before the pipeline runs: its final job already
        // moves the stage toward the next position.
        let commanded = self.motors.last_commanded();
        let actual = self.motors.current_position().await?;

        let mut timestamps = Vec::with_capacity(self.readouts_per_position as usize);

        // Each acquisition is joined with one drain of the block read
        // one step earlier (a no-op on the first readout).
        for _ in 0..self.readouts_per_position {
            let (read, drained) =
                tokio::join!(self.device.read(), self.analyser.process_next());
            let (block, timestamp) = read?;
            drained?;
            timestamps.push(timestamp);
            self.analyser.append(block).await;
        }

        // Final job: periodic reference if due, then the move to the
        // next position, both overlapped with draining the last block.
        let device = &self.device;
        let motors = &self.motors;
        let analyser = &self.analyser;
        let queue = &mut self.queue;
        let counter = &mut self.measurements_since_last_reference;
        let stats = &mut self.stats;
        let period = self.reference_period;

        let reference_and_advance = async {
            if *counter > period {
                stats.reference_cycles += 1;
                *counter = 0;
                match reference_cycle(device, motors, analyser).await {
                    Ok(()) => {}
                    Err(error) if is_fatal_reference_error(&error) => return Err(error),
                    Err(error) => {
                        stats.reference_failures += 1;
                        warn!(%error, "reference measurement failed, continuing scan");
                    }
                }
            }
            advance_queue(motors, queue, stats).await
        };

        let (advanced, drained) =
            tokio::join!(reference_and_advance, analyser.process_next());
        let at_position = advanced?;
        drained?;

        self.measurements_since_last_reference += 1;
        self.stats.positions_visited += 1;

        self.log
            .append(&LogRecord {
                commanded,
                actual,
                timestamps,
            })
            .await?;

        Ok(at_position)
    }
}

/// Pops queued positions until a move succeeds or the queue runs out.
///
/// Positions that became unreachable since validation are skipped in
/// place; the iteration is bounded by the remaining queue length, so a
/// queue dominated by rejected points cannot grow the call stack.
async fn advance_queue<M: MotionController>(
    motors: &M,
    queue: &mut VecDeque<Coordinate>,
    stats: &mut ScanStats,
) -> Result<bool, ScanError> {
    while let Some(target) = queue.pop_front() {
        if motors.move_to(target).await? {
            debug!(%target, remaining = queue.len(), "stage at next scan position");
            return Ok(true);
        }
        warn!(%target, "skipping position unreachable at move time");
        stats.positions_skipped += 1;
    }
    info!("no more positions to scan");
    Ok(false)
}

/// One reference measurement: park the stage on the reference target
/// while the device switches to its secondary configuration, take a
/// single reference read, then restore the primary configuration while
/// the result is analysed.
async fn reference_cycle<D, M, A>(device: &D, motors: &M, analyser: &A) -> Result<(), ScanError>
where
    D: Device,
    M: MotionController,
    A: Analyser,
{
    info!("measuring reference device");

    let (moved, configured) = tokio::join!(
        motors.move_to_reference_target(),
        device.configure_for_secondary()
    );
    moved?;
    configured?;

    let (block, timestamp) = device.read_reference().await?;

    let (analysed, restored) = tokio::join!(
        analyser.analyse_reference(block, timestamp),
        device.configure_for_primary()
    );
    analysed?;
    restored?;
    Ok(())
}

/// A reference target outside machine limits is a configuration error;
/// a scan cannot run without its reference point.
fn is_fatal_reference_error(error: &ScanError) -> bool {
    matches!(error, ScanError::Motion(MotionError::Boundary(_)))
}
