// SPDX-License-Identifier: MIT OR Apache-2.0
//! Capture settings.
//!
//! This module manages the settings file for a capture run:
//! - Grid layout and array origin
//! - Tripod orientation
//! - Output location, frame format and failure policy
//! - Frame pacing
//! - Preview renderer parameters

use lightfield_rig::{ExportPolicy, FrameFormat, GridConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Default settings file name
pub const SETTINGS_FILE_NAME: &str = "capture.ron";

/// Tripod orientation in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TripodSettings {
    /// Azimuth, wrapped into [0, 360)
    pub azimuth: f32,
    /// Elevation, clamped into [-90, 90]
    pub elevation: f32,
}

/// Where and how frames are written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Directory that receives one timestamped folder per session
    pub root: PathBuf,
    /// Frame container
    #[serde(default)]
    pub format: FrameFormat,
    /// What to do when a frame fails to export
    #[serde(default)]
    pub export_policy: ExportPolicy,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("captures"),
            format: FrameFormat::Png,
            export_policy: ExportPolicy::Continue,
        }
    }
}

/// Frame pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Frames per second (0 = unlimited)
    pub target_frame_rate: u32,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            target_frame_rate: 5,
        }
    }
}

/// Preview renderer parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Vertical field of view in degrees
    pub vertical_fov: f32,
    /// Distance from the array origin to the backdrop
    pub backdrop_distance: f32,
    /// Distance from the array origin to the foreground card
    pub card_distance: f32,
    /// Size of one checker square on the backdrop
    pub checker_size: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            vertical_fov: 50.0,
            backdrop_distance: 5.0,
            card_distance: 1.5,
            checker_size: 0.25,
        }
    }
}

/// Full settings document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Format version
    pub version: u32,
    /// Camera array layout
    #[serde(default)]
    pub grid: GridConfig,
    /// Array origin in world space
    #[serde(default)]
    pub base_position: [f32; 3],
    /// Tripod orientation
    #[serde(default)]
    pub tripod: TripodSettings,
    /// Output settings
    #[serde(default)]
    pub output: OutputSettings,
    /// Frame pacing
    #[serde(default)]
    pub timing: TimingSettings,
    /// Preview renderer
    #[serde(default)]
    pub render: RenderSettings,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            grid: GridConfig::default(),
            base_position: [0.0, 0.0, 0.0],
            tripod: TripodSettings::default(),
            output: OutputSettings::default(),
            timing: TimingSettings::default(),
            render: RenderSettings::default(),
        }
    }
}

impl CaptureSettings {
    /// Load settings from a file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: CaptureSettings = ron::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        // Version check
        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Settings version {} is newer than supported version {}",
                    settings.version, SETTINGS_FORMAT_VERSION
                ),
            ));
        }

        if settings.render.width == 0 || settings.render.height == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Render size must be non-zero",
            ));
        }

        Ok(settings)
    }

    /// Load settings if a path is given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> std::io::Result<Self> {
        match path {
            Some(path) => {
                let settings = Self::load(path)?;
                tracing::info!("Loaded capture settings from {}", path.display());
                Ok(settings)
            }
            None => Ok(Self::default()),
        }
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);

        let content = ron::ser::to_string_pretty(self, config).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        std::fs::write(path, content)
    }
}
