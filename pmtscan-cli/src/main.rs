//! pmtscan CLI - runs an automated cathode scan from the command line.
//!
//! Loads the INI configuration, applies command-line overrides, and
//! drives one scan session. Ctrl-C cancels the scan; the position log
//! is flushed before the process exits.

mod error;

use clap::{Parser, ValueEnum};
use error::CliError;
use pmtscan::config::{MeasurementMode, ScanConfig};
use pmtscan::logging::{default_log_dir, default_log_file, init_logging};
use pmtscan::scan::ScanError;
use pmtscan::session::{run_session, SessionError};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Single-photoelectron pulses from the oscilloscope
    Pulse,
    /// DC photocurrent from the picoamperemeter
    Current,
}

impl From<ModeArg> for MeasurementMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Pulse => MeasurementMode::Pulse,
            ModeArg::Current => MeasurementMode::Current,
        }
    }
}

#[derive(Parser)]
#[command(name = "pmtscan")]
#[command(about = "Automated 2-D raster scan of a photomultiplier cathode", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the INI configuration file
    #[arg(long, default_value = "pmtscan.ini")]
    config: PathBuf,

    /// Override the disk radius of the scanned area, in mm
    #[arg(long)]
    max_radius: Option<f64>,

    /// Override the lattice step, in mm
    #[arg(long)]
    step: Option<f64>,

    /// Override the device readouts per scan position
    #[arg(long)]
    readouts_per_position: Option<u32>,

    /// Override the periodic reference period, in positions
    #[arg(long)]
    reference_period: Option<u32>,

    /// Override the measurement mode
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Override the output directory
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn apply_overrides(config: &mut ScanConfig, args: &Args) {
    if let Some(max_radius) = args.max_radius {
        config.grid.max_radius = max_radius;
    }
    if let Some(step) = args.step {
        config.grid.step = step;
    }
    if let Some(readouts) = args.readouts_per_position {
        config.statistics.readouts_per_position = readouts;
    }
    if let Some(period) = args.reference_period {
        config.statistics.reference_period = period;
    }
    if let Some(mode) = args.mode {
        config.daq.mode = mode.into();
    }
    if let Some(output_dir) = &args.output_dir {
        config.paths.output_dir = output_dir.clone();
    }
}

async fn run(args: Args) -> Result<(), CliError> {
    let mut config = ScanConfig::load_from(&args.config)
        .map_err(|e| CliError::Config(e.to_string()))?;
    apply_overrides(&mut config, &args);

    let _logging_guard = init_logging(default_log_dir(), default_log_file())
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

    info!(version = pmtscan::VERSION, "pmtscan starting");

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping scan");
            signal_token.cancel();
        }
    });

    match run_session(&config, cancel).await {
        Ok(stats) => {
            println!(
                "Scan finished: {} positions measured, {} skipped, {} reference cycles ({} failed)",
                stats.positions_visited,
                stats.positions_skipped,
                stats.reference_cycles,
                stats.reference_failures
            );
            Ok(())
        }
        Err(SessionError::Scan(ScanError::Cancelled)) => {
            println!("Scan cancelled; partial results are in the output directory");
            Err(CliError::Scan(SessionError::Scan(ScanError::Cancelled)))
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        e.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_on_top_of_defaults() {
        let mut config = ScanConfig::default();
        let args = Args::parse_from([
            "pmtscan",
            "--max-radius",
            "10",
            "--readouts-per-position",
            "3",
            "--mode",
            "current",
        ]);

        apply_overrides(&mut config, &args);

        assert_eq!(config.grid.max_radius, 10.0);
        assert_eq!(config.statistics.readouts_per_position, 3);
        assert_eq!(config.daq.mode, MeasurementMode::Current);
        // Untouched settings keep their defaults.
        assert_eq!(config.grid.step, ScanConfig::default().grid.step);
    }
}
