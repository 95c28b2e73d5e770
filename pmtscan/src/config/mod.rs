//! Scan configuration.
//!
//! Configuration is grouped into one settings struct per concern (grid
//! geometry, acquisition statistics, DAQ instrument, motion stage,
//! output paths) and assembled into [`ScanConfig`]. Settings are loaded
//! from an INI file; every key has a default so a missing file or a
//! sparse file still yields a runnable configuration.
//!
//! Structs live in [`settings`], INI loading in [`file`], key parsing
//! in [`parser`].

mod file;
mod parser;
mod settings;

pub use file::ConfigFileError;
pub use settings::{
    DaqSettings, GridSettings, MeasurementMode, MotionSettings, PathsSettings, ScanConfig,
    StatisticsSettings,
};
