// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pan/tilt tripod.
//!
//! Two nested pivots: the azimuth pivot turns about the vertical axis and the
//! elevation pivot about the horizontal axis. Angles are in degrees.

/// A transform whose local rotation can be assigned as euler angles
pub trait PivotHandle {
    /// Set local rotation (degrees, `[x, y, z]`)
    fn set_local_euler(&mut self, euler: [f32; 3]);
}

impl<P: PivotHandle + ?Sized> PivotHandle for &mut P {
    fn set_local_euler(&mut self, euler: [f32; 3]) {
        (**self).set_local_euler(euler);
    }
}

/// Minimum elevation in degrees
pub const MIN_ELEVATION: f32 = -90.0;

/// Maximum elevation in degrees
pub const MAX_ELEVATION: f32 = 90.0;

/// Wrap an azimuth into `[0, 360)`
pub fn wrap_azimuth(degrees: f32) -> f32 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Clamp an elevation into `[-90, 90]`
pub fn clamp_elevation(degrees: f32) -> f32 {
    if degrees.is_nan() {
        return 0.0;
    }
    degrees.clamp(MIN_ELEVATION, MAX_ELEVATION)
}

/// Pan/tilt controller driving two injected pivots
#[derive(Debug)]
pub struct PanTiltRig<Y: PivotHandle, X: PivotHandle> {
    azimuth: f32,
    elevation: f32,
    azimuth_pivot: Y,
    elevation_pivot: X,
}

impl<Y: PivotHandle, X: PivotHandle> PanTiltRig<Y, X> {
    /// Create a rig at azimuth 0, elevation 0
    pub fn new(azimuth_pivot: Y, elevation_pivot: X) -> Self {
        Self {
            azimuth: 0.0,
            elevation: 0.0,
            azimuth_pivot,
            elevation_pivot,
        }
    }

    /// Write the current angles to both pivots. Safe to call repeatedly.
    pub fn initialize(&mut self) {
        self.apply();
    }

    /// Per-frame host entry point
    pub fn tick(&mut self) {
        self.apply();
    }

    /// Set both angles and apply them if they changed
    pub fn set_angles(&mut self, azimuth: f32, elevation: f32) {
        let azimuth = wrap_azimuth(azimuth);
        let elevation = clamp_elevation(elevation);
        if azimuth != self.azimuth || elevation != self.elevation {
            self.azimuth = azimuth;
            self.elevation = elevation;
            self.apply();
        }
    }

    /// Set the azimuth, keeping elevation
    pub fn set_azimuth(&mut self, azimuth: f32) {
        self.set_angles(azimuth, self.elevation);
    }

    /// Set the elevation, keeping azimuth
    pub fn set_elevation(&mut self, elevation: f32) {
        self.set_angles(self.azimuth, elevation);
    }

    /// Current azimuth in `[0, 360)`
    pub fn azimuth(&self) -> f32 {
        self.azimuth
    }

    /// Current elevation in `[-90, 90]`
    pub fn elevation(&self) -> f32 {
        self.elevation
    }

    /// Borrow the azimuth pivot
    pub fn azimuth_pivot(&self) -> &Y {
        &self.azimuth_pivot
    }

    /// Borrow the elevation pivot
    pub fn elevation_pivot(&self) -> &X {
        &self.elevation_pivot
    }

    fn apply(&mut self) {
        self.azimuth_pivot.set_local_euler([0.0, self.azimuth, 0.0]);
        self.elevation_pivot
            .set_local_euler([self.elevation, 0.0, 0.0]);
    }
}
