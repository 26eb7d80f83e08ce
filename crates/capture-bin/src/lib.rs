//! `picam-capture` command line.
//!
//! Opens the first connected PICam camera (or a demo camera), applies the
//! configuration sequence, reads the sensor temperature, then acquires an ROI
//! frame sequence into `<OUTPUT_DIR>/<OUTPUT_FILENAME>`.
//!
//! # Exit Codes
//!
//! | code | meaning                                         |
//! |------|-------------------------------------------------|
//! | 0    | success                                         |
//! | 2    | usage error                                     |
//! | 3    | configuration could not be loaded               |
//! | 4    | no camera could be opened                       |
//! | 5    | invalid ROI geometry                            |
//! | 6    | ROI constraint could not be fetched             |
//! | 7    | ROI update or commit failed                     |
//! | 8    | acquisition failed                              |
//! | 9    | output file could not be written                |
//! | 10   | configuration sequence aborted (hard stop)      |

use anyhow::{Context, Result};
use capture_core::{
    CameraLibrary, CaptureConfig, ConfigError, ConfigOverrides, DeviceError, LogFormat,
};
use capture_driver_picam::{
    AcquisitionSummary, CameraHandle, ConfigurationSequencer, OpenError, RoiError, RoiPipeline,
    RoiRequest, SequenceError, TemperatureMonitor,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Process exit codes.
pub mod exit_code {
    /// Frames written.
    pub const SUCCESS: u8 = 0;
    /// Errors without a dedicated code.
    pub const FAILURE: u8 = 1;
    /// Bad command line (clap's own exit code).
    pub const USAGE: u8 = 2;
    /// Configuration could not be loaded or failed validation.
    pub const CONFIG: u8 = 3;
    /// Neither an attached nor a demo camera could be opened.
    pub const OPEN: u8 = 4;
    /// ROI outside the sensor or off the constraint grid.
    pub const INVALID_GEOMETRY: u8 = 5;
    /// ROI constraint could not be fetched.
    pub const CONSTRAINT_FETCH: u8 = 6;
    /// ROI update or commit failed.
    pub const COMMIT: u8 = 7;
    /// Acquisition failed or reported errors.
    pub const ACQUISITION: u8 = 8;
    /// Output file could not be written.
    pub const OUTPUT_WRITE: u8 = 9;
    /// Hard-stop configuration sequence aborted.
    pub const SEQUENCE_ABORTED: u8 = 10;
}

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "picam-capture")]
#[command(about = "Configure a PICam camera and acquire an ROI frame sequence to disk", long_about = None)]
#[command(version, allow_negative_numbers = true)]
pub struct Cli {
    /// Directory the frame file is written to
    pub output_dir: PathBuf,

    /// Name of the frame file
    pub output_filename: String,

    /// Left edge of the region, in sensor pixels
    pub x0: i32,

    /// Top edge of the region, in sensor pixels
    pub y0: i32,

    /// Region width in pixels
    pub width: i32,

    /// Region height in pixels
    pub height: i32,

    /// Exposure time in milliseconds
    pub exposure_ms: f64,

    /// Number of frames to acquire
    pub frames: u64,

    /// Configuration file (TOML format)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (overrides the configuration file; RUST_LOG wins over both)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormatArg>,
}

/// `--log-format` values.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormatArg {
    /// Human-readable lines
    Pretty,
    /// One JSON object per line
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(format: LogFormatArg) -> Self {
        match format {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl Cli {
    /// `<OUTPUT_DIR>/<OUTPUT_FILENAME>`; the directory must already exist.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_filename)
    }

    /// Region and frame count from the positionals.
    pub fn roi_request(&self) -> RoiRequest {
        RoiRequest {
            x0: self.x0,
            y0: self.y0,
            width: self.width,
            height: self.height,
            frame_count: self.frames,
        }
    }

    /// Load the configuration with command-line options as the top layer.
    pub fn load_config(&self) -> Result<CaptureConfig, ConfigError> {
        let overrides = ConfigOverrides {
            log_level: self.log_level.clone(),
            log_format: self.log_format.map(LogFormat::from),
        };
        CaptureConfig::load_with_overrides(self.config.as_deref(), &overrides)
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log filter")?;

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(env_filter),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_filter(env_filter),
            )
            .try_init(),
    }
    .context("Failed to initialize tracing")
}

/// Open, configure, read temperature, acquire, close.
pub fn run<L: CameraLibrary>(
    cli: &Cli,
    config: &CaptureConfig,
    library: &L,
) -> Result<AcquisitionSummary> {
    let camera = CameraHandle::open(library, &config.demo_camera)?;

    ConfigurationSequencer::new(cli.exposure_ms, &config.sequence)
        .run(&*camera, config.commit_policy.configure)?;

    match TemperatureMonitor::read(&*camera) {
        Ok(reading) => tracing::info!(%reading, "Temperature"),
        Err(e) => tracing::warn!("{}", e),
    }

    let summary = RoiPipeline::acquire(
        &*camera,
        &cli.output_path(),
        &cli.roi_request(),
        config.commit_policy.roi,
    )?;

    if let Err(e) = camera.close() {
        tracing::warn!(code = e.code(), "Failed to close camera: {}", e);
    }
    Ok(summary)
}

/// Exit code for an error returned by [`run`].
pub fn exit_code_for(error: &anyhow::Error) -> u8 {
    if let Some(err) = error.downcast_ref::<RoiError>() {
        return match err {
            RoiError::InvalidGeometry { .. } => exit_code::INVALID_GEOMETRY,
            RoiError::ConstraintFetchFailed(_) => exit_code::CONSTRAINT_FETCH,
            RoiError::RoiUpdateFailed(_)
            | RoiError::CommitFailed { .. }
            | RoiError::CommitCallFailed(_) => exit_code::COMMIT,
            RoiError::AcquisitionFailed(_) => exit_code::ACQUISITION,
            RoiError::OutputWriteFailed { .. } => exit_code::OUTPUT_WRITE,
        };
    }
    if error.downcast_ref::<SequenceError>().is_some() {
        return exit_code::SEQUENCE_ABORTED;
    }
    if error.downcast_ref::<OpenError>().is_some() || error.downcast_ref::<DeviceError>().is_some()
    {
        return exit_code::OPEN;
    }
    if error.downcast_ref::<ConfigError>().is_some() {
        return exit_code::CONFIG;
    }
    exit_code::FAILURE
}

#[cfg(not(feature = "picam_sdk"))]
fn execute(cli: &Cli, config: &CaptureConfig) -> Result<AcquisitionSummary> {
    tracing::info!("Built without PICam SDK support; using a demo camera");
    run(cli, config, &capture_driver_picam::SimulatedLibrary::new())
}

#[cfg(feature = "picam_sdk")]
fn execute(cli: &Cli, config: &CaptureConfig) -> Result<AcquisitionSummary> {
    let library = capture_driver_picam::PicamLibrary::new()
        .context("Failed to initialize PICam library")?;
    run(cli, config, &library)
}

/// Entry point behind `main`.
pub fn main_with(cli: Cli) -> ExitCode {
    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(exit_code::CONFIG);
        }
    };
    if let Err(e) = init_tracing(&config.log_level, config.log_format) {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(exit_code::FAILURE);
    }

    match execute(&cli, &config) {
        Ok(summary) => {
            tracing::info!(
                path = %summary.output.display(),
                frames = summary.frame_count,
                bytes = summary.bytes_written,
                "Acquisition complete"
            );
            ExitCode::from(exit_code::SUCCESS)
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}
