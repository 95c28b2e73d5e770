//! pmtscan - Automated photomultiplier cathode scanning
//!
//! This library drives a 2-D raster scan of a photomultiplier cathode:
//! a motorized 3-axis stage walks a validated disk-shaped grid while a
//! data-acquisition instrument reads out blocks at every position, with
//! periodic reference calibration measurements interleaved to track
//! drift.
//!
//! # High-Level API
//!
//! For most use cases, the [`session`] module runs a complete scan from
//! a loaded configuration:
//!
//! ```ignore
//! use pmtscan::config::ScanConfig;
//! use pmtscan::session;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ScanConfig::load_from("pmtscan.ini".as_ref())?;
//! let stats = session::run_session(&config, CancellationToken::new()).await?;
//! println!("visited {} positions", stats.positions_visited);
//! ```
//!
//! The building blocks are exposed for callers that need to assemble a
//! session themselves: [`grid`] produces and validates the traversal
//! grid, [`daq`], [`motion`] and [`analysis`] define the capability
//! interfaces (and simulated implementations), and [`scan`] contains
//! the orchestration core.

pub mod analysis;
pub mod config;
pub mod coord;
pub mod daq;
pub mod grid;
pub mod logging;
pub mod motion;
pub mod scan;
pub mod session;

/// Version of the pmtscan library and CLI.
///
/// Synchronized across the workspace and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
