//! Data-acquisition device interface.
//!
//! The scan core talks to the instrument through the [`Device`]
//! capability trait; the hardware protocols themselves live behind it.
//! This crate ships two simulated instruments ([`SimOscilloscope`] for
//! pulse mode, [`SimPicoammeter`] for current mode) that model
//! acquisition latency and produce synthetic data blocks.

mod sim;

pub use sim::{SimOscilloscope, SimPicoammeter};

use chrono::{DateTime, Utc};
use std::future::Future;
use thiserror::Error;

/// One acquired data block.
///
/// Pulse mode: `waveforms x samples` voltage samples in mV.
/// Current mode: `channels x readings` currents in nA.
pub type Block = Vec<Vec<f64>>;

/// Wall-clock timestamp of a completed readout.
pub type Timestamp = DateTime<Utc>;

/// Errors raised by DAQ devices.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// An operation was issued before `connect()`
    #[error("device is not connected")]
    NotConnected,

    /// The instrument rejected a configuration change
    #[error("device configuration failed: {0}")]
    Configuration(String),

    /// A readout failed or returned corrupt data
    #[error("acquisition failed: {0}")]
    Acquisition(String),
}

/// Capability interface of the data-acquisition instrument.
///
/// All operations suspend while the hardware works and may fail with a
/// [`DeviceError`]. A device handle is single-owner for the duration of
/// a scan: the orchestrator takes it by value, so no two scans can
/// command the same instrument.
pub trait Device: Send + Sync + 'static {
    /// Opens the instrument connection.
    fn connect(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Closes the instrument connection.
    fn disconnect(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Configures the instrument for the main scan channel.
    fn configure_for_primary(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Configures the instrument for the reference channel.
    fn configure_for_secondary(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Acquires one block on the currently configured scan channel.
    ///
    /// Returns the block together with the wall-clock timestamp of the
    /// completed readout.
    fn read(&self) -> impl Future<Output = Result<(Block, Timestamp), DeviceError>> + Send;

    /// Acquires one block from the reference channel.
    fn read_reference(
        &self,
    ) -> impl Future<Output = Result<(Block, Timestamp), DeviceError>> + Send;

    /// Instrument name for logging.
    fn name(&self) -> &str;
}
