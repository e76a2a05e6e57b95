// SPDX-License-Identifier: MIT OR Apache-2.0
//! Software preview renderer.
//!
//! Ray-casts a fixed test scene from the current camera pose: a checkerboard
//! backdrop and a smaller card in front of it. The two depths give visible
//! parallax between neighbouring grid samples.

use crate::scene::CameraPose;
use crate::settings::RenderSettings;
use glam::Vec3;
use image::{Rgba, RgbaImage};

const BACKDROP_LIGHT: [u8; 3] = [220, 220, 220];
const BACKDROP_DARK: [u8; 3] = [40, 40, 48];
const CARD_COLOR: [u8; 3] = [200, 60, 50];
const CARD_BORDER: [u8; 3] = [250, 210, 80];

/// Renders the test scene into RGBA frames
#[derive(Debug, Clone)]
pub struct SoftwareRenderer {
    settings: RenderSettings,
    /// World-space centre the scene is built around
    origin: Vec3,
}

impl SoftwareRenderer {
    /// Create a renderer whose scene sits in front of `origin`
    pub fn new(settings: RenderSettings, origin: [f32; 3]) -> Self {
        Self {
            settings,
            origin: Vec3::from(origin),
        }
    }

    /// Render one frame
    pub fn render(&self, pose: &CameraPose) -> RgbaImage {
        let width = self.settings.width.max(1);
        let height = self.settings.height.max(1);
        let aspect = width as f32 / height as f32;
        let half_height = (self.settings.vertical_fov.to_radians() * 0.5).tan();
        let half_width = half_height * aspect;

        RgbaImage::from_fn(width, height, |px, py| {
            let u = (2.0 * (px as f32 + 0.5) / width as f32 - 1.0) * half_width;
            let v = (1.0 - 2.0 * (py as f32 + 0.5) / height as f32) * half_height;
            let direction = (pose.rotation * Vec3::new(u, v, -1.0)).normalize();
            let [r, g, b] = self.shade(pose.position, direction);
            Rgba([r, g, b, 255])
        })
    }

    fn shade(&self, eye: Vec3, direction: Vec3) -> [u8; 3] {
        if let Some(color) = self.hit_card(eye, direction) {
            return color;
        }
        if let Some(color) = self.hit_backdrop(eye, direction) {
            return color;
        }
        sky(direction)
    }

    /// Axis-aligned square card, half as wide as it is far away
    fn hit_card(&self, eye: Vec3, direction: Vec3) -> Option<[u8; 3]> {
        let distance = self.settings.card_distance;
        let hit = intersect_plane_z(eye, direction, self.origin.z - distance)?;
        let local = hit - self.origin;
        let half = distance * 0.25;

        if local.x.abs() > half || local.y.abs() > half {
            return None;
        }
        let border = half * 0.85;
        if local.x.abs() > border || local.y.abs() > border {
            Some(CARD_BORDER)
        } else {
            Some(CARD_COLOR)
        }
    }

    fn hit_backdrop(&self, eye: Vec3, direction: Vec3) -> Option<[u8; 3]> {
        let hit = intersect_plane_z(eye, direction, self.origin.z - self.settings.backdrop_distance)?;
        let local = hit - self.origin;
        let cell = self.settings.checker_size.max(f32::EPSILON);
        let parity = ((local.x / cell).floor() as i64 + (local.y / cell).floor() as i64) & 1;

        Some(if parity == 0 {
            BACKDROP_LIGHT
        } else {
            BACKDROP_DARK
        })
    }
}

/// Intersect a ray with the plane `z = plane_z`, in front of the eye only
fn intersect_plane_z(eye: Vec3, direction: Vec3, plane_z: f32) -> Option<Vec3> {
    if direction.z.abs() < 1e-6 {
        return None;
    }
    let t = (plane_z - eye.z) / direction.z;
    (t > 0.0).then(|| eye + direction * t)
}

fn sky(direction: Vec3) -> [u8; 3] {
    let t = (direction.y * 0.5 + 0.5).clamp(0.0, 1.0);
    let lerp = |a: f32, b: f32| (a + (b - a) * t) as u8;
    [lerp(240.0, 90.0), lerp(240.0, 140.0), lerp(250.0, 220.0)]
}
