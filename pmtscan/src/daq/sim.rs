//! Simulated DAQ instruments.
//!
//! Stand-ins for the oscilloscope and picoamperemeter drivers: they
//! model acquisition latency with a sleep and synthesize plausible
//! blocks, so the scan pipeline can be exercised without hardware.

use super::{Block, Device, DeviceError, Timestamp};
use crate::config::DaqSettings;
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveChannel {
    Primary,
    Secondary,
}

struct SimState {
    connected: bool,
    channel: ActiveChannel,
    rng: SmallRng,
}

impl SimState {
    fn new(seed: u64) -> Self {
        Self {
            connected: false,
            channel: ActiveChannel::Primary,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

/// Simulated oscilloscope for pulse-mode scans.
///
/// `read()` produces a block of waveforms, each a noisy baseline with a
/// single Gaussian pulse whose arrival time and amplitude jitter from
/// waveform to waveform.
pub struct SimOscilloscope {
    primary_channel: String,
    secondary_channel: String,
    waveforms_per_block: usize,
    samples_per_waveform: usize,
    read_latency: Duration,
    sampling_interval_ns: f64,
    state: Mutex<SimState>,
}

impl SimOscilloscope {
    /// Creates a simulated oscilloscope from the DAQ settings.
    pub fn new(settings: &DaqSettings) -> Self {
        Self {
            primary_channel: settings.primary_channel.clone(),
            secondary_channel: settings.secondary_channel.clone(),
            waveforms_per_block: settings.waveforms_per_block,
            samples_per_waveform: settings.samples_per_waveform,
            read_latency: Duration::from_millis(settings.read_latency_ms),
            sampling_interval_ns: settings.sampling_interval_ns,
            state: Mutex::new(SimState::new(0x5ca1ab1e)),
        }
    }

    fn ensure_connected(&self) -> Result<(), DeviceError> {
        if self.state.lock().connected {
            Ok(())
        } else {
            Err(DeviceError::NotConnected)
        }
    }

    fn synthesize_block(&self) -> Block {
        let mut state = self.state.lock();
        let span_ns = self.samples_per_waveform as f64 * self.sampling_interval_ns;
        let mut block = Vec::with_capacity(self.waveforms_per_block);

        for _ in 0..self.waveforms_per_block {
            // Pulse somewhere past the baseline window, sigma a few ns wide.
            let arrival_ns = span_ns * (0.4 + 0.2 * state.rng.random::<f64>());
            let amplitude_mv = 40.0 + 20.0 * state.rng.random::<f64>();
            let sigma_ns = 3.0;

            let waveform: Vec<f64> = (0..self.samples_per_waveform)
                .map(|i| {
                    let t = i as f64 * self.sampling_interval_ns;
                    let noise = state.rng.random_range(-0.5..0.5);
                    let pulse = amplitude_mv
                        * (-((t - arrival_ns) * (t - arrival_ns))
                            / (2.0 * sigma_ns * sigma_ns))
                            .exp();
                    noise + pulse
                })
                .collect();
            block.push(waveform);
        }
        block
    }
}

impl Device for SimOscilloscope {
    async fn connect(&self) -> Result<(), DeviceError> {
        info!(device = self.name(), "connecting oscilloscope");
        self.state.lock().connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        info!(device = self.name(), "disconnecting oscilloscope");
        self.state.lock().connected = false;
        Ok(())
    }

    async fn configure_for_primary(&self) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        debug!(channel = %self.primary_channel, "configuring primary channel");
        self.state.lock().channel = ActiveChannel::Primary;
        Ok(())
    }

    async fn configure_for_secondary(&self) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        debug!(channel = %self.secondary_channel, "configuring secondary channel");
        self.state.lock().channel = ActiveChannel::Secondary;
        Ok(())
    }

    async fn read(&self) -> Result<(Block, Timestamp), DeviceError> {
        self.ensure_connected()?;
        tokio::time::sleep(self.read_latency).await;
        Ok((self.synthesize_block(), Utc::now()))
    }

    async fn read_reference(&self) -> Result<(Block, Timestamp), DeviceError> {
        self.ensure_connected()?;
        if self.state.lock().channel != ActiveChannel::Secondary {
            return Err(DeviceError::Configuration(
                "reference read on primary channel".to_string(),
            ));
        }
        tokio::time::sleep(self.read_latency).await;
        Ok((self.synthesize_block(), Utc::now()))
    }

    fn name(&self) -> &str {
        "sim-oscilloscope"
    }
}

/// Simulated picoamperemeter for current-mode scans.
///
/// `read()` produces one row of current readings per channel; the
/// primary channel carries the photocurrent, the secondary a stable
/// monitor current.
pub struct SimPicoammeter {
    port: String,
    readings_per_block: usize,
    read_latency: Duration,
    state: Mutex<SimState>,
}

impl SimPicoammeter {
    /// Creates a simulated picoamperemeter from the DAQ settings.
    pub fn new(settings: &DaqSettings) -> Self {
        Self {
            port: settings.picoamp_port.clone(),
            readings_per_block: settings.readings_per_block,
            read_latency: Duration::from_millis(settings.read_latency_ms),
            state: Mutex::new(SimState::new(0xf007ba11)),
        }
    }

    fn ensure_connected(&self) -> Result<(), DeviceError> {
        if self.state.lock().connected {
            Ok(())
        } else {
            Err(DeviceError::NotConnected)
        }
    }

    fn synthesize_block(&self) -> Block {
        let mut state = self.state.lock();
        let photocurrent: Vec<f64> = (0..self.readings_per_block)
            .map(|_| 120.0 + state.rng.random_range(-2.0..2.0))
            .collect();
        let monitor: Vec<f64> = (0..self.readings_per_block)
            .map(|_| 35.0 + state.rng.random_range(-0.2..0.2))
            .collect();
        vec![photocurrent, monitor]
    }
}

impl Device for SimPicoammeter {
    async fn connect(&self) -> Result<(), DeviceError> {
        info!(device = self.name(), port = %self.port, "connecting picoamperemeter");
        self.state.lock().connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        info!(device = self.name(), "disconnecting picoamperemeter");
        self.state.lock().connected = false;
        Ok(())
    }

    async fn configure_for_primary(&self) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.state.lock().channel = ActiveChannel::Primary;
        Ok(())
    }

    async fn configure_for_secondary(&self) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.state.lock().channel = ActiveChannel::Secondary;
        Ok(())
    }

    async fn read(&self) -> Result<(Block, Timestamp), DeviceError> {
        self.ensure_connected()?;
        tokio::time::sleep(self.read_latency).await;
        Ok((self.synthesize_block(), Utc::now()))
    }

    async fn read_reference(&self) -> Result<(Block, Timestamp), DeviceError> {
        self.ensure_connected()?;
        tokio::time::sleep(self.read_latency).await;
        Ok((self.synthesize_block(), Utc::now()))
    }

    fn name(&self) -> &str {
        "sim-picoamperemeter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaqSettings;

    fn fast_settings() -> DaqSettings {
        DaqSettings {
            waveforms_per_block: 4,
            samples_per_waveform: 64,
            read_latency_ms: 0,
            readings_per_block: 5,
            ..DaqSettings::default()
        }
    }

    #[tokio::test]
    async fn test_oscilloscope_requires_connection() {
        let scope = SimOscilloscope::new(&fast_settings());
        assert!(matches!(
            scope.read().await,
            Err(DeviceError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_oscilloscope_block_dimensions() {
        let scope = SimOscilloscope::new(&fast_settings());
        scope.connect().await.unwrap();

        let (block, _) = scope.read().await.unwrap();
        assert_eq!(block.len(), 4);
        assert!(block.iter().all(|w| w.len() == 64));
    }

    #[tokio::test]
    async fn test_reference_read_requires_secondary_channel() {
        let scope = SimOscilloscope::new(&fast_settings());
        scope.connect().await.unwrap();
        scope.configure_for_primary().await.unwrap();

        assert!(matches!(
            scope.read_reference().await,
            Err(DeviceError::Configuration(_))
        ));

        scope.configure_for_secondary().await.unwrap();
        assert!(scope.read_reference().await.is_ok());
    }

    #[tokio::test]
    async fn test_picoammeter_block_has_two_channels() {
        let meter = SimPicoammeter::new(&fast_settings());
        meter.connect().await.unwrap();

        let (block, _) = meter.read().await.unwrap();
        assert_eq!(block.len(), 2);
        assert!(block.iter().all(|ch| ch.len() == 5));
    }
}
