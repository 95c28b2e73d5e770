//! Scan session assembly.
//!
//! Wires a complete scan run from configuration: picks the device and
//! analyser pair for the configured measurement mode, connects the
//! instruments, generates and validates the traversal grid, and runs
//! the orchestrator under a cancellation token.

use crate::analysis::{Analyser, CurrentModeAnalysis, PulseModeAnalysis};
use crate::config::{MeasurementMode, ScanConfig};
use crate::daq::{Device, DeviceError, SimOscilloscope, SimPicoammeter};
use crate::grid::{Grid, GridError};
use crate::motion::{MotionController, MotionError, StageController};
use crate::scan::{PositionLog, ScanError, ScanManager, ScanStats};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Errors raised while assembling or running a scan session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Grid generation rejected its parameters
    #[error("grid error: {0}")]
    Grid(#[from] GridError),

    /// An instrument failed during connection or priming
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// The stage failed during connection
    #[error("motion error: {0}")]
    Motion(#[from] MotionError),

    /// Output directory or position log could not be prepared
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    /// The scan itself failed
    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Runs one complete scan from configuration.
///
/// Cancelling `cancel` aborts the scan at the next suspension point;
/// the position log is flushed either way.
pub async fn run_session(
    config: &ScanConfig,
    cancel: CancellationToken,
) -> Result<ScanStats, SessionError> {
    let mode = config.daq.mode;
    info!(%mode, "assembling scan session");

    let motors = StageController::new(
        &config.motion,
        config.motion.reference_target(mode),
    );
    motors.connect_and_configure().await?;

    tokio::fs::create_dir_all(&config.paths.output_dir).await?;

    match mode {
        MeasurementMode::Pulse => {
            let device = SimOscilloscope::new(&config.daq);
            device.connect().await?;

            let analyser = PulseModeAnalysis::new(&config.daq, &config.paths.output_dir);
            // The time axis comes from one throwaway block read before
            // the scan starts.
            let (block, _) = device.read().await?;
            if let Some(waveform) = block.first() {
                analyser.prime_time_axis(waveform).await;
            }

            scan_with(config, device, motors, analyser, cancel).await
        }
        MeasurementMode::Current => {
            let device = SimPicoammeter::new(&config.daq);
            device.connect().await?;

            let analyser = CurrentModeAnalysis::new(&config.paths.output_dir);
            scan_with(config, device, motors, analyser, cancel).await
        }
    }
}

async fn scan_with<D, M, A>(
    config: &ScanConfig,
    device: D,
    motors: M,
    analyser: A,
    cancel: CancellationToken,
) -> Result<ScanStats, SessionError>
where
    D: Device,
    M: MotionController,
    A: Analyser,
{
    let grid = Grid::generate(config.grid.max_radius, config.grid.step)?;
    let queue = grid.validate(|c| motors.check_reachable(c));
    info!(
        candidates = grid.len(),
        reachable = queue.len(),
        "grid validated"
    );

    let log = PositionLog::open(config.paths.position_log_path()).await?;
    let manager = ScanManager::new(&queue, device, motors, analyser, &config.statistics, log);

    Ok(manager.run(cancel).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DaqSettings, GridSettings, MotionSettings, PathsSettings, ScanConfig, StatisticsSettings};

    fn fast_config(dir: &std::path::Path) -> ScanConfig {
        ScanConfig {
            grid: GridSettings {
                max_radius: 2.0,
                step: 2.0,
            },
            statistics: StatisticsSettings {
                readouts_per_position: 1,
                reference_period: 10,
            },
            daq: DaqSettings {
                waveforms_per_block: 2,
                samples_per_waveform: 64,
                read_latency_ms: 0,
                ..DaqSettings::default()
            },
            motion: MotionSettings {
                settle_ms: 0,
                ..MotionSettings::default()
            },
            paths: PathsSettings {
                output_dir: dir.to_path_buf(),
                position_log: "positions.txt".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_pulse_session_end_to_end() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = fast_config(dir.path());

        let stats = run_session(&config, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.positions_visited, 5);
        assert_eq!(stats.positions_skipped, 0);
        assert_eq!(stats.reference_cycles, 2);

        let log = std::fs::read_to_string(dir.path().join("positions.txt")).unwrap();
        assert_eq!(log.lines().count(), 5);
    }

    #[tokio::test]
    async fn test_current_session_end_to_end() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = fast_config(dir.path());
        config.daq.mode = MeasurementMode::Current;

        let stats = run_session(&config, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.positions_visited, 5);
        // Scan summaries plus the reference file were written.
        assert!(dir
            .path()
            .read_dir()
            .unwrap()
            .any(|e| e.unwrap().file_name().to_string_lossy().contains("photocurrent")));
    }

    #[tokio::test]
    async fn test_invalid_grid_parameters_fail_before_scanning() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = fast_config(dir.path());
        config.grid.step = -1.0;

        assert!(matches!(
            run_session(&config, CancellationToken::new()).await,
            Err(SessionError::Grid(_))
        ));
    }
}
