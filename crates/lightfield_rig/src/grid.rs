// SPDX-License-Identifier: MIT OR Apache-2.0
//! Camera-array grid model.
//!
//! Maps a discrete `(col, row)` sample index to a physical offset from the
//! array's centre. All functions here are pure.

use serde::{Deserialize, Serialize};

/// Default number of samples along each axis
pub const DEFAULT_SAMPLES: u32 = 16;

/// Default distance between adjacent samples
pub const DEFAULT_SPACING: f32 = 0.05;

/// Errors raised when validating a grid configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Column count was zero
    #[error("Grid must have at least one column")]
    NoColumns,
    /// Row count was zero
    #[error("Grid must have at least one row")]
    NoRows,
    /// Spacing was zero, negative or not finite
    #[error("Grid spacing must be a positive finite number, got {0}")]
    InvalidSpacing(f32),
}

/// Immutable layout of the camera array
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGridConfig", into = "RawGridConfig")]
pub struct GridConfig {
    columns: u32,
    rows: u32,
    spacing: f32,
}

/// Unvalidated form used for (de)serialization
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename = "GridConfig")]
struct RawGridConfig {
    columns: u32,
    rows: u32,
    spacing: f32,
}

impl TryFrom<RawGridConfig> for GridConfig {
    type Error = ConfigError;

    fn try_from(raw: RawGridConfig) -> Result<Self, Self::Error> {
        GridConfig::new(raw.columns, raw.rows, raw.spacing)
    }
}

impl From<GridConfig> for RawGridConfig {
    fn from(config: GridConfig) -> Self {
        Self {
            columns: config.columns,
            rows: config.rows,
            spacing: config.spacing,
        }
    }
}

impl GridConfig {
    /// Create a validated grid configuration
    pub fn new(columns: u32, rows: u32, spacing: f32) -> Result<Self, ConfigError> {
        if columns == 0 {
            return Err(ConfigError::NoColumns);
        }
        if rows == 0 {
            return Err(ConfigError::NoRows);
        }
        if !spacing.is_finite() || spacing <= 0.0 {
            return Err(ConfigError::InvalidSpacing(spacing));
        }

        Ok(Self {
            columns,
            rows,
            spacing,
        })
    }

    /// Number of samples along the horizontal axis
    pub fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of samples along the vertical axis
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Distance between adjacent samples
    pub fn spacing(&self) -> f32 {
        self.spacing
    }

    /// Total number of sample positions
    pub fn sample_count(&self) -> u64 {
        u64::from(self.columns) * u64::from(self.rows)
    }

    /// Physical width and height of the array
    pub fn array_extent(&self) -> [f32; 2] {
        [
            self.spacing * (self.columns - 1) as f32,
            self.spacing * (self.rows - 1) as f32,
        ]
    }

    /// Offset of a position from the array centre
    pub fn offset(&self, position: GridPosition) -> [f32; 3] {
        offset_for(position, self)
    }

    /// Clamp a (possibly out-of-range) index into this grid
    pub fn clamp(&self, col: i64, row: i64) -> GridPosition {
        clamp_position(col, row, self)
    }

    /// Whether a position lies inside the grid
    pub fn contains(&self, position: GridPosition) -> bool {
        position.col < self.columns && position.row < self.rows
    }

    /// Iterate every position in scan order (column-major)
    pub fn sample_positions(&self) -> SamplePositions {
        SamplePositions {
            columns: self.columns,
            rows: self.rows,
            next: 0,
        }
    }

    /// Iterate every position with its offset, in scan order
    pub fn sample_offsets(&self) -> impl Iterator<Item = (GridPosition, [f32; 3])> + '_ {
        self.sample_positions().map(move |p| (p, self.offset(p)))
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            columns: DEFAULT_SAMPLES,
            rows: DEFAULT_SAMPLES,
            spacing: DEFAULT_SPACING,
        }
    }
}

/// A `(col, row)` sample index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    /// Column index (horizontal axis)
    pub col: u32,
    /// Row index (vertical axis)
    pub row: u32,
}

impl GridPosition {
    /// Create a position without range checking
    pub const fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }
}

impl std::fmt::Display for GridPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// Step size along one axis.
///
/// A single-sample axis has no extent, so its step is zero instead of `0/0`.
fn axis_step(extent: f32, samples: u32) -> f32 {
    if samples > 1 {
        extent / (samples - 1) as f32
    } else {
        0.0
    }
}

/// Offset of `position` from the centre of the array described by `config`
pub fn offset_for(position: GridPosition, config: &GridConfig) -> [f32; 3] {
    let [array_width, array_height] = config.array_extent();
    let dx = axis_step(array_width, config.columns);
    let dy = axis_step(array_height, config.rows);

    [
        position.col as f32 * dx - array_width / 2.0,
        position.row as f32 * dy - array_height / 2.0,
        0.0,
    ]
}

/// Clamp each coordinate independently into `[0, columns)` / `[0, rows)`
pub fn clamp_position(col: i64, row: i64, config: &GridConfig) -> GridPosition {
    let clamp_axis = |value: i64, samples: u32| -> u32 {
        // samples >= 1, so the upper bound is never negative
        value.clamp(0, i64::from(samples) - 1) as u32
    };

    GridPosition {
        col: clamp_axis(col, config.columns),
        row: clamp_axis(row, config.rows),
    }
}

/// Iterator over grid positions, outer loop over columns
#[derive(Debug, Clone)]
pub struct SamplePositions {
    columns: u32,
    rows: u32,
    next: u64,
}

impl Iterator for SamplePositions {
    type Item = GridPosition;

    fn next(&mut self) -> Option<Self::Item> {
        let total = u64::from(self.columns) * u64::from(self.rows);
        if self.next >= total {
            return None;
        }

        let rows = u64::from(self.rows);
        let position = GridPosition {
            col: (self.next / rows) as u32,
            row: (self.next % rows) as u32,
        };
        self.next += 1;
        Some(position)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let total = u64::from(self.columns) * u64::from(self.rows);
        let remaining = total.saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SamplePositions {}
