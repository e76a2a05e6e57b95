// SPDX-License-Identifier: MIT OR Apache-2.0
//! Camera array behaviour.
//!
//! Owns the grid layout and the current sample index, and writes
//! `base_position + offset` to an injected camera whenever either changes.

use crate::grid::{GridConfig, GridPosition};

/// Anything that accepts a world-space position assignment
pub trait CameraHandle {
    /// Move the camera to `position`
    fn set_position(&mut self, position: [f32; 3]);
}

impl<C: CameraHandle + ?Sized> CameraHandle for &mut C {
    fn set_position(&mut self, position: [f32; 3]) {
        (**self).set_position(position);
    }
}

impl<C: CameraHandle + ?Sized> CameraHandle for Box<C> {
    fn set_position(&mut self, position: [f32; 3]) {
        (**self).set_position(position);
    }
}

/// A camera moved across a grid of sample points
#[derive(Debug)]
pub struct CameraArray<C: CameraHandle> {
    config: GridConfig,
    position: GridPosition,
    base_position: [f32; 3],
    camera: C,
    initialized: bool,
}

impl<C: CameraHandle> CameraArray<C> {
    /// Create an array centred on `base_position`.
    ///
    /// The camera is not touched until [`initialize`](Self::initialize) or the
    /// first mutation.
    pub fn new(config: GridConfig, base_position: [f32; 3], camera: C) -> Self {
        Self {
            config,
            position: GridPosition::default(),
            base_position,
            camera,
            initialized: false,
        }
    }

    /// Push the current position to the camera. Safe to call repeatedly.
    pub fn initialize(&mut self) {
        if !self.initialized {
            tracing::debug!(
                "Camera array initialized: {}x{} samples, spacing {}",
                self.config.columns(),
                self.config.rows(),
                self.config.spacing()
            );
            self.initialized = true;
        }
        self.apply();
    }

    /// Per-frame host entry point
    pub fn tick(&mut self) {
        if !self.initialized {
            self.initialize();
        }
    }

    /// Move to `(col, row)`, clamped into the grid. Returns the position used.
    pub fn set_position(&mut self, col: i64, row: i64) -> GridPosition {
        let clamped = self.config.clamp(col, row);
        if clamped != self.position || !self.initialized {
            self.position = clamped;
            self.initialized = true;
            self.apply();
        }
        clamped
    }

    /// Move to a position already known to be in range
    pub fn move_to(&mut self, position: GridPosition) -> GridPosition {
        self.set_position(i64::from(position.col), i64::from(position.row))
    }

    /// Replace the grid layout, re-clamping the current position
    pub fn set_config(&mut self, config: GridConfig) {
        self.config = config;
        self.position = config.clamp(
            i64::from(self.position.col),
            i64::from(self.position.row),
        );
        self.apply();
    }

    /// Move the array origin
    pub fn set_base_position(&mut self, base_position: [f32; 3]) {
        self.base_position = base_position;
        self.apply();
    }

    /// Current grid layout
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Current sample index
    pub fn position(&self) -> GridPosition {
        self.position
    }

    /// Array origin
    pub fn base_position(&self) -> [f32; 3] {
        self.base_position
    }

    /// Current offset from the array origin
    pub fn offset(&self) -> [f32; 3] {
        self.config.offset(self.position)
    }

    /// World-space position of the current sample
    pub fn camera_position(&self) -> [f32; 3] {
        self.world_position(self.position)
    }

    /// World-space position of any sample
    pub fn world_position(&self, position: GridPosition) -> [f32; 3] {
        let offset = self.config.offset(position);
        [
            self.base_position[0] + offset[0],
            self.base_position[1] + offset[1],
            self.base_position[2] + offset[2],
        ]
    }

    /// Borrow the camera handle
    pub fn camera(&self) -> &C {
        &self.camera
    }

    /// Mutably borrow the camera handle
    pub fn camera_mut(&mut self) -> &mut C {
        &mut self.camera
    }

    /// Give back the camera handle
    pub fn into_camera(self) -> C {
        self.camera
    }

    fn apply(&mut self) {
        let position = self.camera_position();
        self.camera.set_position(position);
    }
}
