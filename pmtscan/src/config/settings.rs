//! Settings structs and their defaults.

use crate::coord::StagePosition;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default disk radius of the scanned cathode area, in mm.
pub const DEFAULT_MAX_RADIUS: f64 = 40.0;
/// Default lattice step, in mm.
pub const DEFAULT_STEP: f64 = 2.5;
/// Default number of device readouts per scan position.
pub const DEFAULT_READOUTS_PER_POSITION: u32 = 5;
/// Default number of positions between periodic reference measurements.
pub const DEFAULT_REFERENCE_PERIOD: u32 = 30;

/// Which acquisition chain drives the scan.
///
/// Selects the device and analyser pair at session construction:
/// oscilloscope waveform blocks (pulse mode) or picoamperemeter
/// current readings (current mode). Each mode also designates its own
/// reference target on the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeasurementMode {
    /// Single-photoelectron pulses read from an oscilloscope
    #[default]
    Pulse,
    /// DC photocurrent read from a picoamperemeter
    Current,
}

impl fmt::Display for MeasurementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementMode::Pulse => write!(f, "pulse"),
            MeasurementMode::Current => write!(f, "current"),
        }
    }
}

impl FromStr for MeasurementMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pulse" => Ok(MeasurementMode::Pulse),
            "current" => Ok(MeasurementMode::Current),
            other => Err(format!("unknown measurement mode '{other}'")),
        }
    }
}

/// Grid geometry parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSettings {
    /// Disk radius of the scanned area, in mm
    pub max_radius: f64,
    /// Lattice step between neighbouring scan positions, in mm
    pub step: f64,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            max_radius: DEFAULT_MAX_RADIUS,
            step: DEFAULT_STEP,
        }
    }
}

/// Acquisition statistics parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsSettings {
    /// Device readouts acquired at every scan position
    pub readouts_per_position: u32,
    /// Positions measured between two periodic reference measurements.
    ///
    /// The trigger fires once the running count strictly exceeds this
    /// value, so the effective cadence is `reference_period + 1`
    /// positions. Downstream calibration tooling relies on that exact
    /// behavior.
    pub reference_period: u32,
}

impl Default for StatisticsSettings {
    fn default() -> Self {
        Self {
            readouts_per_position: DEFAULT_READOUTS_PER_POSITION,
            reference_period: DEFAULT_REFERENCE_PERIOD,
        }
    }
}

/// DAQ instrument settings.
///
/// Covers both instrument variants; the active [`MeasurementMode`]
/// decides which fields matter (waveform geometry for pulse mode,
/// channel count and port for current mode). Time windows are in ns
/// on the waveform time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct DaqSettings {
    /// Acquisition chain to use
    pub mode: MeasurementMode,
    /// Oscilloscope channel carrying the scanned PMT signal
    pub primary_channel: String,
    /// Oscilloscope channel carrying the reference device signal
    pub secondary_channel: String,
    /// Oscilloscope sampling interval, in ns
    pub sampling_interval_ns: f64,
    /// Waveforms captured per block readout
    pub waveforms_per_block: usize,
    /// Samples per captured waveform
    pub samples_per_waveform: usize,
    /// Modelled block acquisition latency, in ms
    pub read_latency_ms: u64,
    /// Serial port of the picoamperemeter (current mode)
    pub picoamp_port: String,
    /// Current readings per block readout (current mode)
    pub readings_per_block: usize,
    /// Baseline window start on the time axis, in ns
    pub baseline_tmin_ns: f64,
    /// Baseline window end, in ns
    pub baseline_tmax_ns: f64,
    /// Reference baseline window start, in ns
    pub reference_baseline_tmin_ns: f64,
    /// Reference baseline window end, in ns
    pub reference_baseline_tmax_ns: f64,
    /// Reference signal window start, in ns
    pub reference_signal_tmin_ns: f64,
    /// Reference signal window end, in ns
    pub reference_signal_tmax_ns: f64,
}

impl Default for DaqSettings {
    fn default() -> Self {
        Self {
            mode: MeasurementMode::Pulse,
            primary_channel: "A".to_string(),
            secondary_channel: "B".to_string(),
            sampling_interval_ns: 0.8,
            waveforms_per_block: 200,
            samples_per_waveform: 500,
            read_latency_ms: 50,
            picoamp_port: "COM13".to_string(),
            readings_per_block: 10,
            baseline_tmin_ns: 0.0,
            baseline_tmax_ns: 30.0,
            reference_baseline_tmin_ns: 0.0,
            reference_baseline_tmax_ns: 30.0,
            reference_signal_tmin_ns: 60.0,
            reference_signal_tmax_ns: 90.0,
        }
    }
}

/// Motion stage settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionSettings {
    /// Lower absolute machine limit, shared by all axes, in mm
    pub limit_min: f64,
    /// Upper absolute machine limit (exclusive), in mm
    pub limit_max: f64,
    /// Absolute stage position of the cathode centre
    pub centre: StagePosition,
    /// Reference PMT position, used as the pulse-mode reference target
    pub second_pmt_target: StagePosition,
    /// Photodiode position, used as the current-mode reference target
    pub diode_target: StagePosition,
    /// Quadratic coefficient of the curvature correction, in mm^-1.
    ///
    /// The probe-to-cathode distance is kept constant by offsetting the
    /// z axis by `coefficient * radius^2` for a scan point at `radius`.
    pub curvature_coefficient: f64,
    /// Modelled settle time after a move, in ms
    pub settle_ms: u64,
    /// Serial ports of the three stage axes
    pub serial_ports: Vec<String>,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            limit_min: 0.0,
            limit_max: 300.0,
            centre: StagePosition::new(150.0, 150.0, 80.0),
            second_pmt_target: StagePosition::new(40.0, 260.0, 80.0),
            diode_target: StagePosition::new(260.0, 40.0, 80.0),
            curvature_coefficient: 0.004,
            settle_ms: 100,
            serial_ports: vec![
                "COM3".to_string(),
                "COM4".to_string(),
                "COM5".to_string(),
            ],
        }
    }
}

impl MotionSettings {
    /// The reference target designated for a measurement mode.
    pub fn reference_target(&self, mode: MeasurementMode) -> StagePosition {
        match mode {
            MeasurementMode::Pulse => self.second_pmt_target,
            MeasurementMode::Current => self.diode_target,
        }
    }
}

/// Output locations.
#[derive(Debug, Clone, PartialEq)]
pub struct PathsSettings {
    /// Directory receiving all scan output files
    pub output_dir: PathBuf,
    /// File name of the position/timestamp log, inside `output_dir`
    pub position_log: String,
}

impl Default for PathsSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
            position_log: "positions_and_timestamps.txt".to_string(),
        }
    }
}

impl PathsSettings {
    /// Full path of the position/timestamp log file.
    pub fn position_log_path(&self) -> PathBuf {
        self.output_dir.join(&self.position_log)
    }
}

/// Complete configuration of a scan run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanConfig {
    /// Grid geometry
    pub grid: GridSettings,
    /// Acquisition statistics
    pub statistics: StatisticsSettings,
    /// DAQ instrument
    pub daq: DaqSettings,
    /// Motion stage
    pub motion: MotionSettings,
    /// Output locations
    pub paths: PathsSettings,
}

impl ScanConfig {
    /// Loads configuration from an INI file.
    ///
    /// A missing file yields the defaults; a present file overrides
    /// individual keys.
    pub fn load_from(path: &Path) -> Result<Self, super::ConfigFileError> {
        super::file::load_from(path)
    }
}
