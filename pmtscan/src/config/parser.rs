//! INI to settings conversion.
//!
//! Every key is optional; a missing key keeps the default baked into
//! the settings structs. A present key with an uninterpretable value is
//! a hard error rather than a silent fallback.

use super::file::ConfigFileError;
use super::settings::{MeasurementMode, ScanConfig};
use crate::coord::StagePosition;
use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

/// Converts a loaded INI document into a [`ScanConfig`].
pub fn parse_ini(ini: &Ini) -> Result<ScanConfig, ConfigFileError> {
    let mut config = ScanConfig::default();

    if let Some(grid) = ini.section(Some("grid")) {
        config.grid.max_radius = get_f64(grid, "grid", "max_radius", config.grid.max_radius)?;
        config.grid.step = get_f64(grid, "grid", "step", config.grid.step)?;
    }

    if let Some(stats) = ini.section(Some("statistics")) {
        config.statistics.readouts_per_position = get_u32(
            stats,
            "statistics",
            "readouts_per_position",
            config.statistics.readouts_per_position,
        )?;
        config.statistics.reference_period = get_u32(
            stats,
            "statistics",
            "reference_period",
            config.statistics.reference_period,
        )?;
    }

    if let Some(daq) = ini.section(Some("daq")) {
        if let Some(raw) = daq.get("mode") {
            config.daq.mode = MeasurementMode::from_str(raw).map_err(|reason| {
                invalid("daq", "mode", raw, reason)
            })?;
        }
        if let Some(raw) = daq.get("primary_channel") {
            config.daq.primary_channel = raw.trim().to_string();
        }
        if let Some(raw) = daq.get("secondary_channel") {
            config.daq.secondary_channel = raw.trim().to_string();
        }
        config.daq.sampling_interval_ns = get_f64(
            daq,
            "daq",
            "sampling_interval_ns",
            config.daq.sampling_interval_ns,
        )?;
        config.daq.waveforms_per_block = get_usize(
            daq,
            "daq",
            "waveforms_per_block",
            config.daq.waveforms_per_block,
        )?;
        config.daq.samples_per_waveform = get_usize(
            daq,
            "daq",
            "samples_per_waveform",
            config.daq.samples_per_waveform,
        )?;
        config.daq.read_latency_ms =
            get_u64(daq, "daq", "read_latency_ms", config.daq.read_latency_ms)?;
        if let Some(raw) = daq.get("picoamp_port") {
            config.daq.picoamp_port = raw.trim().to_string();
        }
        config.daq.readings_per_block = get_usize(
            daq,
            "daq",
            "readings_per_block",
            config.daq.readings_per_block,
        )?;
        config.daq.baseline_tmin_ns =
            get_f64(daq, "daq", "baseline_tmin_ns", config.daq.baseline_tmin_ns)?;
        config.daq.baseline_tmax_ns =
            get_f64(daq, "daq", "baseline_tmax_ns", config.daq.baseline_tmax_ns)?;
        config.daq.reference_baseline_tmin_ns = get_f64(
            daq,
            "daq",
            "reference_baseline_tmin_ns",
            config.daq.reference_baseline_tmin_ns,
        )?;
        config.daq.reference_baseline_tmax_ns = get_f64(
            daq,
            "daq",
            "reference_baseline_tmax_ns",
            config.daq.reference_baseline_tmax_ns,
        )?;
        config.daq.reference_signal_tmin_ns = get_f64(
            daq,
            "daq",
            "reference_signal_tmin_ns",
            config.daq.reference_signal_tmin_ns,
        )?;
        config.daq.reference_signal_tmax_ns = get_f64(
            daq,
            "daq",
            "reference_signal_tmax_ns",
            config.daq.reference_signal_tmax_ns,
        )?;
    }

    if let Some(motion) = ini.section(Some("motion")) {
        config.motion.limit_min =
            get_f64(motion, "motion", "limit_min", config.motion.limit_min)?;
        config.motion.limit_max =
            get_f64(motion, "motion", "limit_max", config.motion.limit_max)?;
        config.motion.centre = get_position(motion, "motion", "centre", config.motion.centre)?;
        config.motion.second_pmt_target = get_position(
            motion,
            "motion",
            "second_pmt_target",
            config.motion.second_pmt_target,
        )?;
        config.motion.diode_target =
            get_position(motion, "motion", "diode_target", config.motion.diode_target)?;
        config.motion.curvature_coefficient = get_f64(
            motion,
            "motion",
            "curvature_coefficient",
            config.motion.curvature_coefficient,
        )?;
        config.motion.settle_ms =
            get_u64(motion, "motion", "settle_ms", config.motion.settle_ms)?;
        if let Some(raw) = motion.get("serial_ports") {
            config.motion.serial_ports = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    if let Some(paths) = ini.section(Some("paths")) {
        if let Some(raw) = paths.get("output_dir") {
            config.paths.output_dir = PathBuf::from(raw.trim());
        }
        if let Some(raw) = paths.get("position_log") {
            config.paths.position_log = raw.trim().to_string();
        }
    }

    Ok(config)
}

fn invalid(
    section: &str,
    key: &str,
    value: &str,
    reason: impl Into<String>,
) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn get_f64(
    props: &Properties,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, ConfigFileError> {
    match props.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid(section, key, raw, "expected a number")),
        None => Ok(default),
    }
}

fn get_u32(
    props: &Properties,
    section: &str,
    key: &str,
    default: u32,
) -> Result<u32, ConfigFileError> {
    match props.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid(section, key, raw, "expected a non-negative integer")),
        None => Ok(default),
    }
}

fn get_u64(
    props: &Properties,
    section: &str,
    key: &str,
    default: u64,
) -> Result<u64, ConfigFileError> {
    match props.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid(section, key, raw, "expected a non-negative integer")),
        None => Ok(default),
    }
}

fn get_usize(
    props: &Properties,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, ConfigFileError> {
    match props.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid(section, key, raw, "expected a non-negative integer")),
        None => Ok(default),
    }
}

/// Parses an `x, y, z` triplet into a stage position.
fn get_position(
    props: &Properties,
    section: &str,
    key: &str,
    default: StagePosition,
) -> Result<StagePosition, ConfigFileError> {
    let Some(raw) = props.get(key) else {
        return Ok(default);
    };

    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(invalid(section, key, raw, "expected 'x, y, z'"));
    }

    let mut axes = [0.0f64; 3];
    for (slot, part) in axes.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| invalid(section, key, raw, "expected 'x, y, z'"))?;
    }

    Ok(StagePosition::new(axes[0], axes[1], axes[2]))
}
