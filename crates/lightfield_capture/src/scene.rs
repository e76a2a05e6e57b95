// SPDX-License-Identifier: MIT OR Apache-2.0
//! Minimal scene graph for the capture rig.
//!
//! The tripod is two nested pivots (azimuth, then elevation) carrying the
//! camera. Nodes are shared handles so the camera array and the tripod can
//! write to them while the renderer reads the resulting pose.

use glam::{EulerRot, Quat, Vec3};
use lightfield_rig::{CameraHandle, PivotHandle};
use parking_lot::RwLock;
use std::sync::Arc;

/// Position and euler rotation of a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position (x, y, z)
    pub position: [f32; 3],
    /// Rotation in euler angles (degrees)
    pub rotation: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0],
        }
    }
}

impl Transform {
    /// Rotation as a quaternion (yaw, then pitch, then roll)
    pub fn quat(&self) -> Quat {
        let [x, y, z] = self.rotation;
        Quat::from_euler(EulerRot::YXZ, y.to_radians(), x.to_radians(), z.to_radians())
    }
}

/// Shared handle to a scene node
#[derive(Debug, Clone, Default)]
pub struct SceneNode(Arc<RwLock<Transform>>);

impl SceneNode {
    /// Create a node with the given transform
    pub fn new(transform: Transform) -> Self {
        Self(Arc::new(RwLock::new(transform)))
    }

    /// Copy of the node transform
    pub fn transform(&self) -> Transform {
        *self.0.read()
    }
}

impl CameraHandle for SceneNode {
    fn set_position(&mut self, position: [f32; 3]) {
        self.0.write().position = position;
    }
}

impl PivotHandle for SceneNode {
    fn set_local_euler(&mut self, euler: [f32; 3]) {
        self.0.write().rotation = euler;
    }
}

/// World-space camera pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    /// Eye position
    pub position: Vec3,
    /// Orientation; the camera looks down -Z
    pub rotation: Quat,
}

impl CameraPose {
    /// Forward direction
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

/// The tripod and camera nodes
#[derive(Debug, Clone, Default)]
pub struct TripodScene {
    azimuth_pivot: SceneNode,
    elevation_pivot: SceneNode,
    camera: SceneNode,
}

impl TripodScene {
    /// Create a scene with every node at the origin
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for the azimuth pivot
    pub fn azimuth_pivot(&self) -> SceneNode {
        self.azimuth_pivot.clone()
    }

    /// Handle for the elevation pivot
    pub fn elevation_pivot(&self) -> SceneNode {
        self.elevation_pivot.clone()
    }

    /// Handle for the camera
    pub fn camera(&self) -> SceneNode {
        self.camera.clone()
    }

    /// Camera pose after composing both pivots
    pub fn camera_pose(&self) -> CameraPose {
        let azimuth = self.azimuth_pivot.transform().quat();
        let elevation = self.elevation_pivot.transform().quat();
        let camera = self.camera.transform();

        CameraPose {
            position: Vec3::from(camera.position),
            rotation: azimuth * elevation * camera.quat(),
        }
    }
}
