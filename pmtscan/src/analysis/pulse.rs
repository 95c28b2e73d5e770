//! Pulse-mode waveform analysis.
//!
//! Extracts per-waveform pulse metrics (baseline-subtracted amplitude,
//! transit time, charge, FWHM, rise and fall times) from oscilloscope
//! blocks and appends them to one data file per scan position.
//! Reference blocks are reduced to a mean charge with its standard
//! error and appended to a reference summary file.

use super::{Analyser, AnalysisError};
use crate::config::DaqSettings;
use crate::daq::{Block, Timestamp};
use chrono::Utc;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

/// Half-width of the pulse integration window around the peak, in ns.
const PULSE_HALF_WINDOW_NS: f64 = 15.0;

/// Sentinel recorded when the pulse-shape fit fails for a waveform.
const SHAPE_FAILED: f64 = -1.0;

struct PulseState {
    pending: VecDeque<Block>,
    time_axis: Vec<f64>,
    position_index: usize,
}

/// Pulse-mode analyser.
///
/// The waveform time axis is derived once from a first device block
/// (see [`PulseModeAnalysis::prime_time_axis`]) before any block is
/// processed.
pub struct PulseModeAnalysis {
    sampling_interval_ns: f64,
    baseline_window: (f64, f64),
    reference_baseline_window: (f64, f64),
    reference_signal_window: (f64, f64),
    data_file_prefix: PathBuf,
    reference_file: PathBuf,
    state: Mutex<PulseState>,
}

impl PulseModeAnalysis {
    /// Creates a pulse-mode analyser writing into `output_dir`.
    pub fn new(settings: &DaqSettings, output_dir: &std::path::Path) -> Self {
        let date = Utc::now().date_naive();
        Self {
            sampling_interval_ns: settings.sampling_interval_ns,
            baseline_window: (settings.baseline_tmin_ns, settings.baseline_tmax_ns),
            reference_baseline_window: (
                settings.reference_baseline_tmin_ns,
                settings.reference_baseline_tmax_ns,
            ),
            reference_signal_window: (
                settings.reference_signal_tmin_ns,
                settings.reference_signal_tmax_ns,
            ),
            data_file_prefix: output_dir.join(format!("{date}_pulse_mode_scan")),
            reference_file: output_dir.join(format!("{date}_2ndPMT_reference.txt")),
            state: Mutex::new(PulseState {
                pending: VecDeque::new(),
                time_axis: Vec::new(),
                position_index: 0,
            }),
        }
    }

    /// Derives the time axis from one waveform's sample count.
    ///
    /// Must be called once, with a waveform from a throwaway device
    /// read, before the scan starts.
    pub async fn prime_time_axis(&self, waveform: &[f64]) {
        let mut state = self.state.lock().await;
        state.time_axis = (0..waveform.len())
            .map(|i| i as f64 * self.sampling_interval_ns)
            .collect();
        debug!(samples = waveform.len(), "primed pulse analysis time axis");
    }

    /// Number of blocks waiting to be processed.
    pub async fn pending_blocks(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    fn process_block(
        &self,
        time_axis: &[f64],
        block: &Block,
        position_index: usize,
    ) -> (PathBuf, String) {
        let baseline = window_mean(time_axis, block, self.baseline_window);

        let mut lines = String::new();
        for waveform in block {
            let corrected: Vec<f64> = waveform.iter().map(|v| v - baseline).collect();
            let metrics = waveform_metrics(
                time_axis,
                &corrected,
                self.baseline_window,
                self.sampling_interval_ns,
            );
            for value in metrics {
                let _ = write!(lines, "{value}\t");
            }
            lines.push('\n');
        }

        let path = PathBuf::from(format!(
            "{}{}.txt",
            self.data_file_prefix.display(),
            position_index
        ));
        (path, lines)
    }
}

impl Analyser for PulseModeAnalysis {
    async fn append(&self, block: Block) {
        self.state.lock().await.pending.push_back(block);
    }

    async fn process_next(&self) -> Result<(), AnalysisError> {
        let (block, time_axis, position_index) = {
            let mut state = self.state.lock().await;
            let Some(block) = state.pending.pop_front() else {
                debug!("no pending block to analyse");
                return Ok(());
            };
            if state.time_axis.is_empty() {
                state.pending.push_front(block);
                return Err(AnalysisError::NotPrimed);
            }
            let index = state.position_index;
            state.position_index += 1;
            (block, state.time_axis.clone(), index)
        };

        let (path, lines) = self.process_block(&time_axis, &block, position_index);
        super::append_line(&path, &lines).await?;
        Ok(())
    }

    async fn analyse_reference(
        &self,
        block: Block,
        timestamp: Timestamp,
    ) -> Result<(), AnalysisError> {
        let time_axis = {
            let state = self.state.lock().await;
            if state.time_axis.is_empty() {
                return Err(AnalysisError::NotPrimed);
            }
            state.time_axis.clone()
        };

        let baseline = window_mean(&time_axis, &block, self.reference_baseline_window);
        let charges: Vec<f64> = block
            .iter()
            .map(|waveform| {
                let (t, v) = window_slice(&time_axis, waveform, self.reference_signal_window);
                let corrected: Vec<f64> = v.iter().map(|s| s - baseline).collect();
                trapezoid(&t, &corrected)
            })
            .collect();

        let (mean, error) = mean_and_stderr(&charges);
        let line = format!("{}\t{mean}\t{error}\n", timestamp.timestamp_micros());
        super::append_line(&self.reference_file, &line).await?;
        Ok(())
    }
}

/// Per-waveform metrics in output-column order:
/// pedestal charge, transit time, charge, amplitude, FWHM, rise, fall.
fn waveform_metrics(
    time_axis: &[f64],
    waveform: &[f64],
    baseline_window: (f64, f64),
    sampling_interval_ns: f64,
) -> [f64; 7] {
    let samples = waveform.len().min(time_axis.len());
    if samples == 0 {
        return [0.0, 0.0, 0.0, 0.0, SHAPE_FAILED, SHAPE_FAILED, SHAPE_FAILED];
    }
    let (max_index, amplitude) = argmax(&waveform[..samples]);
    let transit_time = time_axis[max_index];

    let half_window = (PULSE_HALF_WINDOW_NS / sampling_interval_ns).round() as usize;
    let start = max_index.saturating_sub(half_window);
    let end = (max_index + half_window).min(samples - 1);
    let pulse = &waveform[start..=end];
    let pulse_time = &time_axis[start..=end];

    let (fwhm, rise, fall) = pulse_shape(pulse_time, pulse)
        .unwrap_or((SHAPE_FAILED, SHAPE_FAILED, SHAPE_FAILED));

    let charge = trapezoid(pulse_time, pulse);
    let (ped_t, ped_v) = window_slice(time_axis, waveform, baseline_window);
    let pedestal_charge = trapezoid(&ped_t, &ped_v);

    [
        pedestal_charge,
        transit_time,
        charge,
        amplitude,
        fwhm,
        rise,
        fall,
    ]
}

/// FWHM, rise time (20% to 80%) and fall time (80% to 20%) of a pulse,
/// by linear interpolation of the threshold crossings on each edge.
///
/// Returns `None` when an edge never crosses a threshold inside the
/// window (clipped or malformed pulse).
fn pulse_shape(time: &[f64], pulse: &[f64]) -> Option<(f64, f64, f64)> {
    if pulse.len() < 3 {
        return None;
    }
    let (max_index, max_value) = argmax(pulse);
    if max_value <= 0.0 {
        return None;
    }

    let fractions = [0.8, 0.5, 0.2];
    let mut leading = [0.0f64; 3];
    let mut trailing = [0.0f64; 3];

    for (slot, &fraction) in fractions.iter().enumerate() {
        let level = fraction * max_value;

        // Leading edge: walk back from the peak to the first sample
        // below the level.
        let mut crossing = None;
        for i in (0..max_index).rev() {
            if pulse[i] < level {
                crossing = Some(interpolate_crossing(
                    level, pulse[i], pulse[i + 1], time[i], time[i + 1],
                ));
                break;
            }
        }
        leading[slot] = crossing?;

        // Trailing edge: walk forward from the peak.
        let mut crossing = None;
        for i in (max_index + 1)..pulse.len() {
            if pulse[i] < level {
                crossing = Some(interpolate_crossing(
                    level, pulse[i - 1], pulse[i], time[i - 1], time[i],
                ));
                break;
            }
        }
        trailing[slot] = crossing?;
    }

    let fwhm = trailing[1] - leading[1];
    let rise = leading[0] - leading[2];
    let fall = trailing[2] - trailing[0];
    Some((fwhm, rise, fall))
}

fn interpolate_crossing(level: f64, y_below: f64, y_above: f64, x_below: f64, x_above: f64) -> f64 {
    x_below + (level - y_below) * (x_above - x_below) / (y_above - y_below)
}

fn argmax(values: &[f64]) -> (usize, f64) {
    let mut index = 0;
    let mut best = f64::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best {
            best = v;
            index = i;
        }
    }
    (index, best)
}

/// Trapezoidal integral of `y` over `x`.
fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| 0.5 * (ys[0] + ys[1]) * (xs[1] - xs[0]))
        .sum()
}

/// Samples of a waveform falling strictly inside a time window,
/// together with their time values.
fn window_slice(
    time_axis: &[f64],
    waveform: &[f64],
    (tmin, tmax): (f64, f64),
) -> (Vec<f64>, Vec<f64>) {
    time_axis
        .iter()
        .zip(waveform)
        .filter(|(&t, _)| t > tmin && t < tmax)
        .map(|(&t, &v)| (t, v))
        .unzip()
}

/// Mean of all samples of a block inside a time window.
fn window_mean(time_axis: &[f64], block: &Block, window: (f64, f64)) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for waveform in block {
        let (_, values) = window_slice(time_axis, waveform, window);
        sum += values.iter().sum::<f64>();
        count += values.len();
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn mean_and_stderr(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
    (mean, (variance / n).sqrt())
}
