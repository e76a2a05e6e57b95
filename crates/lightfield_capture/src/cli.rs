// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command-line interface.

use crate::settings::{CaptureSettings, SETTINGS_FILE_NAME};
use clap::{Args, Parser, Subcommand};
use lightfield_rig::{ConfigError, ExportPolicy, FrameFormat, GridConfig};
use std::path::{Path, PathBuf};

/// Settings could not be assembled from the command line
#[derive(Debug, thiserror::Error)]
pub enum ArgsError {
    /// Settings file missing or malformed
    #[error("Failed to load settings: {0}")]
    Settings(#[from] std::io::Error),
    /// Overrides produce an invalid grid
    #[error("Invalid grid override: {0}")]
    Grid(#[from] ConfigError),
}

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "lightfield_capture", version)]
#[command(about = "Headless light-field camera-array capture", long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a full scan and write one frame per grid position
    Run(RunArgs),
    /// Write a settings file with default values
    Init {
        /// Where to write the settings file
        #[arg(default_value = SETTINGS_FILE_NAME)]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print every sample position and its offset
    Layout(GridArgs),
}

/// Settings file plus grid overrides
#[derive(Args, Debug, Clone, Default)]
pub struct GridArgs {
    /// Settings file (RON); defaults are used when omitted
    #[arg(short, long)]
    pub settings: Option<PathBuf>,
    /// Number of samples along the horizontal axis
    #[arg(long)]
    pub columns: Option<u32>,
    /// Number of samples along the vertical axis
    #[arg(long)]
    pub rows: Option<u32>,
    /// Distance between adjacent samples
    #[arg(long)]
    pub spacing: Option<f32>,
}

impl GridArgs {
    /// Load the settings file (or defaults) with these overrides applied
    pub fn load(&self) -> Result<CaptureSettings, ArgsError> {
        load_with(self.settings.as_deref(), |settings| self.apply(settings))
    }

    /// Apply grid overrides, re-validating the result
    pub fn apply(&self, settings: &mut CaptureSettings) -> Result<(), ConfigError> {
        let grid = settings.grid;
        settings.grid = GridConfig::new(
            self.columns.unwrap_or(grid.columns()),
            self.rows.unwrap_or(grid.rows()),
            self.spacing.unwrap_or(grid.spacing()),
        )?;
        Ok(())
    }
}

/// Overrides for the `run` subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Settings file and grid overrides
    #[command(flatten)]
    pub grid: GridArgs,
    /// Directory that receives the session folder
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Frame format: png, jpg, bmp or tga
    #[arg(long, value_parser = parse_format)]
    pub format: Option<FrameFormat>,
    /// Frames per second (0 = unlimited)
    #[arg(long)]
    pub fps: Option<u32>,
    /// Stop the scan at the first export failure
    #[arg(long)]
    pub halt_on_error: bool,
}

impl RunArgs {
    /// Load the settings file (or defaults) with every override applied
    pub fn load(&self) -> Result<CaptureSettings, ArgsError> {
        load_with(self.grid.settings.as_deref(), |settings| self.apply(settings))
    }

    /// Apply every override to `settings`
    pub fn apply(&self, settings: &mut CaptureSettings) -> Result<(), ConfigError> {
        self.grid.apply(settings)?;
        if let Some(output) = &self.output {
            settings.output.root = output.clone();
        }
        if let Some(format) = self.format {
            settings.output.format = format;
        }
        if let Some(fps) = self.fps {
            settings.timing.target_frame_rate = fps;
        }
        if self.halt_on_error {
            settings.output.export_policy = ExportPolicy::Halt;
        }
        Ok(())
    }
}

fn load_with(
    path: Option<&Path>,
    apply: impl FnOnce(&mut CaptureSettings) -> Result<(), ConfigError>,
) -> Result<CaptureSettings, ArgsError> {
    let mut settings = CaptureSettings::load_or_default(path)?;
    apply(&mut settings)?;
    Ok(settings)
}

fn parse_format(s: &str) -> Result<FrameFormat, String> {
    FrameFormat::from_extension(s).ok_or_else(|| format!("unsupported frame format '{s}'"))
}
