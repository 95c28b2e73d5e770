//! Integration tests for the scan orchestration core.
//!
//! These tests drive `ScanManager` against counting mock instruments
//! to verify the pipeline contract (reads and drains per position),
//! reference cadence, skip-on-unreachable behavior, reference failure
//! isolation, cancellation, and the log file contract.

use chrono::Utc;
use pmtscan::analysis::{Analyser, AnalysisError};
use pmtscan::config::StatisticsSettings;
use pmtscan::coord::{Coordinate, StagePosition};
use pmtscan::daq::{Block, Device, DeviceError, Timestamp};
use pmtscan::grid::{Grid, ValidatedQueue};
use pmtscan::motion::{MotionController, MotionError};
use pmtscan::scan::{PositionLog, ScanError, ScanManager, ScanStats};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Mock instruments
// =============================================================================

#[derive(Default)]
struct Counters {
    reads: AtomicUsize,
    reference_reads: AtomicUsize,
    drains: AtomicUsize,
    appends: AtomicUsize,
    reference_analyses: AtomicUsize,
}

struct MockDevice {
    counters: Arc<Counters>,
    fail_reference_read: bool,
    latency: Duration,
}

impl MockDevice {
    fn new(counters: Arc<Counters>) -> Self {
        Self {
            counters,
            fail_reference_read: false,
            latency: Duration::ZERO,
        }
    }
}

impl Device for MockDevice {
    async fn connect(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn configure_for_primary(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn configure_for_secondary(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn read(&self) -> Result<(Block, Timestamp), DeviceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        Ok((vec![vec![0.0; 8]], Utc::now()))
    }

    async fn read_reference(&self) -> Result<(Block, Timestamp), DeviceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.counters.reference_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reference_read {
            return Err(DeviceError::Acquisition("simulated failure".to_string()));
        }
        Ok((vec![vec![0.0; 8]], Utc::now()))
    }

    fn name(&self) -> &str {
        "mock-device"
    }
}

struct MockStage {
    rejected: Vec<Coordinate>,
    boundary_reference_target: bool,
    visited: Mutex<Vec<Coordinate>>,
    last_commanded: Mutex<StagePosition>,
}

impl MockStage {
    fn new() -> Self {
        Self {
            rejected: Vec::new(),
            boundary_reference_target: false,
            visited: Mutex::new(Vec::new()),
            last_commanded: Mutex::new(StagePosition::default()),
        }
    }
}

impl MotionController for MockStage {
    async fn connect_and_configure(&self) -> Result<(), MotionError> {
        Ok(())
    }

    fn check_reachable(&self, _target: Coordinate) -> bool {
        true
    }

    async fn move_to(&self, target: Coordinate) -> Result<bool, MotionError> {
        if self.rejected.contains(&target) {
            return Ok(false);
        }
        self.visited.lock().unwrap().push(target);
        *self.last_commanded.lock().unwrap() = StagePosition::new(target.x, target.y, 0.0);
        Ok(true)
    }

    async fn move_to_reference_target(&self) -> Result<(), MotionError> {
        if self.boundary_reference_target {
            return Err(MotionError::Boundary(StagePosition::new(
                -1.0, -1.0, -1.0,
            )));
        }
        Ok(())
    }

    async fn current_position(&self) -> Result<StagePosition, MotionError> {
        Ok(*self.last_commanded.lock().unwrap())
    }

    fn last_commanded(&self) -> StagePosition {
        *self.last_commanded.lock().unwrap()
    }
}

struct MockAnalyser {
    counters: Arc<Counters>,
}

impl Analyser for MockAnalyser {
    async fn append(&self, _block: Block) {
        self.counters.appends.fetch_add(1, Ordering::SeqCst);
    }

    async fn process_next(&self) -> Result<(), AnalysisError> {
        self.counters.drains.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn analyse_reference(
        &self,
        _block: Block,
        _timestamp: Timestamp,
    ) -> Result<(), AnalysisError> {
        self.counters.reference_analyses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// The five reachable positions of the max_radius=2, step=2 grid.
fn five_point_queue() -> ValidatedQueue {
    Grid::generate(2.0, 2.0).unwrap().validate(|_| true)
}

struct Harness {
    counters: Arc<Counters>,
    log_path: PathBuf,
    _dir: TempDir,
}

impl Harness {
    fn new() -> (Self, Arc<Counters>) {
        let dir = TempDir::new().unwrap();
        let counters = Arc::new(Counters::default());
        let harness = Self {
            counters: Arc::clone(&counters),
            log_path: dir.path().join("positions.txt"),
            _dir: dir,
        };
        (harness, counters)
    }

    async fn run(
        &self,
        queue: &ValidatedQueue,
        device: MockDevice,
        stage: MockStage,
        statistics: StatisticsSettings,
        cancel: CancellationToken,
    ) -> Result<ScanStats, ScanError> {
        let analyser = MockAnalyser {
            counters: Arc::clone(&self.counters),
        };
        let log = PositionLog::open(&self.log_path).await.unwrap();
        let manager = ScanManager::new(queue, device, stage, analyser, &statistics, log);
        manager.run(cancel).await
    }

    fn log_lines(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log_path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn statistics(readouts: u32, period: u32) -> StatisticsSettings {
    StatisticsSettings {
        readouts_per_position: readouts,
        reference_period: period,
    }
}

// =============================================================================
// Integration tests
// =============================================================================

#[tokio::test]
async fn test_pipeline_read_and_drain_counts() {
    let (harness, counters) = Harness::new();
    let queue = five_point_queue();
    let device = MockDevice::new(Arc::clone(&counters));

    let stats = harness
        .run(
            &queue,
            device,
            MockStage::new(),
            statistics(3, 100),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(stats.positions_visited, 5);
    // Exactly N reads and N+1 drains per visited position.
    assert_eq!(counters.reads.load(Ordering::SeqCst), 5 * 3);
    assert_eq!(counters.drains.load(Ordering::SeqCst), 5 * 4);
    assert_eq!(counters.appends.load(Ordering::SeqCst), 5 * 3);
    // Only the initial and final reference with a long period.
    assert_eq!(counters.reference_reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_reference_cadence_preserves_period_plus_one() {
    let (harness, counters) = Harness::new();
    let queue = five_point_queue();
    let device = MockDevice::new(Arc::clone(&counters));

    let stats = harness
        .run(
            &queue,
            device,
            MockStage::new(),
            statistics(1, 1),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // floor(5 / (1+1)) = 2 periodic cycles, plus initial and final.
    assert_eq!(stats.reference_cycles, 4);
    assert_eq!(counters.reference_reads.load(Ordering::SeqCst), 4);
    assert_eq!(
        counters.reference_analyses.load(Ordering::SeqCst),
        4
    );
}

#[tokio::test]
async fn test_unreachable_positions_are_skipped_in_order() {
    let (harness, counters) = Harness::new();
    let queue = five_point_queue();
    let mut stage = MockStage::new();
    stage.rejected = vec![Coordinate::new(0.0, -2.0), Coordinate::new(0.0, 2.0)];
    let device = MockDevice::new(Arc::clone(&counters));

    let stats = harness
        .run(
            &queue,
            device,
            stage,
            statistics(2, 100),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(stats.positions_visited, 3);
    assert_eq!(stats.positions_skipped, 2);
    assert_eq!(harness.log_lines().len(), 3);
}

#[tokio::test]
async fn test_manager_copies_the_queue_at_construction() {
    let (harness, counters) = Harness::new();
    let queue = five_point_queue();
    let device = MockDevice::new(Arc::clone(&counters));

    let analyser = MockAnalyser {
        counters: Arc::clone(&harness.counters),
    };
    let log = PositionLog::open(&harness.log_path).await.unwrap();
    let manager = ScanManager::new(
        &queue,
        device,
        MockStage::new(),
        analyser,
        &statistics(1, 100),
        log,
    );

    // The manager holds its own copy; the caller's queue is untouched
    // and remains usable by other consumers.
    assert_eq!(manager.remaining_positions(), 5);
    assert_eq!(queue.len(), 5);
}

#[tokio::test]
async fn test_visit_order_follows_the_validated_queue() {
    let (harness, counters) = Harness::new();
    let queue = five_point_queue();
    let mut stage = MockStage::new();
    stage.rejected = vec![Coordinate::new(0.0, 0.0)];
    let device = MockDevice::new(Arc::clone(&counters));

    let expected: Vec<Coordinate> = queue
        .iter()
        .copied()
        .filter(|c| *c != Coordinate::new(0.0, 0.0))
        .collect();

    let stats = harness
        .run(
            &queue,
            device,
            stage,
            statistics(1, 100),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // The manager consumed the stage, so the order is read back from
    // the log's commanded x/y columns.
    assert_eq!(stats.positions_visited, expected.len());
    let lines = harness.log_lines();
    assert_eq!(lines.len(), expected.len());
    for (line, coordinate) in lines.iter().zip(&expected) {
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields[0], format!("{}", coordinate.x));
        assert_eq!(fields[1], format!("{}", coordinate.y));
    }
}

#[tokio::test]
async fn test_reference_failure_is_isolated() {
    let (harness, counters) = Harness::new();
    let queue = five_point_queue();
    let mut device = MockDevice::new(Arc::clone(&counters));
    device.fail_reference_read = true;

    let stats = harness
        .run(
            &queue,
            device,
            MockStage::new(),
            statistics(2, 1),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // Every reference cycle failed, yet every position was measured.
    assert_eq!(stats.positions_visited, 5);
    assert_eq!(stats.reference_cycles, 4);
    assert_eq!(stats.reference_failures, 4);
    assert_eq!(counters.reference_analyses.load(Ordering::SeqCst), 0);
    assert_eq!(harness.log_lines().len(), 5);
}

#[tokio::test]
async fn test_out_of_bounds_reference_target_is_fatal() {
    let (harness, counters) = Harness::new();
    let queue = five_point_queue();
    let mut stage = MockStage::new();
    stage.boundary_reference_target = true;
    let device = MockDevice::new(Arc::clone(&counters));

    let result = harness
        .run(
            &queue,
            device,
            stage,
            statistics(2, 100),
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(ScanError::Motion(MotionError::Boundary(_)))
    ));
    // The initial reference is taken before any position: nothing read.
    assert_eq!(counters.reads.load(Ordering::SeqCst), 0);
    // The log was still flushed into existence.
    assert!(harness.log_path.exists());
}

#[tokio::test]
async fn test_cancellation_stops_the_scan_and_flushes_the_log() {
    let (harness, counters) = Harness::new();
    let queue = five_point_queue();
    let mut device = MockDevice::new(Arc::clone(&counters));
    device.latency = Duration::from_millis(5);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = harness
        .run(&queue, device, MockStage::new(), statistics(2, 100), cancel)
        .await;

    assert!(matches!(result, Err(ScanError::Cancelled)));
    assert!(harness.log_path.exists());
    // The caller's queue is untouched by the aborted run.
    assert_eq!(queue.len(), 5);
}

#[tokio::test]
async fn test_end_to_end_five_positions_two_references() {
    let (harness, counters) = Harness::new();
    let queue = five_point_queue();
    let device = MockDevice::new(Arc::clone(&counters));

    let stats = harness
        .run(
            &queue,
            device,
            MockStage::new(),
            statistics(2, 10),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(stats.positions_visited, 5);
    assert_eq!(stats.positions_skipped, 0);
    assert_eq!(stats.reference_cycles, 2);
    assert_eq!(stats.reference_failures, 0);

    let lines = harness.log_lines();
    assert_eq!(lines.len(), 5);
    for line in &lines {
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        // commanded x/y/z, actual x/y/z, then one timestamp per readout
        assert_eq!(fields.len(), 6 + 2);
    }
}
