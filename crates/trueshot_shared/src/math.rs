//! Mathematical types shared between client and server.
//!
//! These are the canonical representations used in the network protocol.
//! Distances are in engine units, angles in the engine's fixed-point
//! rotation units (65536 per full turn).

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 3D Vector - eye position, aim origin
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Vector with every component set to `v`
    #[must_use]
    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Creates from array
    #[must_use]
    pub const fn from_array(arr: [f32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Length squared (avoids sqrt)
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Distance squared (avoids sqrt)
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        (self - other).length_squared()
    }

    /// True if every component is finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// View rotation as sent by the client.
///
/// Roll is never replicated for aim, so only yaw and pitch travel.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize)]
pub struct Rotator {
    /// Yaw in rotation units
    pub yaw: i32,
    /// Pitch in rotation units
    pub pitch: i32,
}

impl Rotator {
    /// Rotation units per full turn.
    pub const UNITS_PER_TURN: i32 = 65536;

    /// Creates a new rotator
    #[must_use]
    pub const fn new(yaw: i32, pitch: i32) -> Self {
        Self { yaw, pitch }
    }

    /// Builds a rotator from angles in degrees.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_degrees(yaw: f32, pitch: f32) -> Self {
        let scale = Self::UNITS_PER_TURN as f32 / 360.0;
        Self::new((yaw * scale).round() as i32, (pitch * scale).round() as i32)
    }

    /// Yaw and pitch in degrees.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_degrees(self) -> (f32, f32) {
        let scale = 360.0 / Self::UNITS_PER_TURN as f32;
        (self.yaw as f32 * scale, self.pitch as f32 * scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_squared() {
        let a = Vec3::new(25.0, 25.0, 0.0);
        assert_eq!(a.distance_squared(Vec3::ZERO), 1250.0);
        assert_eq!(Vec3::ZERO.distance_squared(Vec3::ZERO), 0.0);
    }

    #[test]
    fn test_rotator_degrees() {
        let r = Rotator::from_degrees(90.0, -45.0);
        assert_eq!(r, Rotator::new(16384, -8192));

        let (yaw, pitch) = r.to_degrees();
        assert!((yaw - 90.0).abs() < 0.01);
        assert!((pitch + 45.0).abs() < 0.01);
    }

    #[test]
    fn test_finite() {
        assert!(Vec3::splat(1.0).is_finite());
        assert!(!Vec3::new(f32::NAN, 0.0, 0.0).is_finite());
    }
}
