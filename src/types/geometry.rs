//! Position and orientation value types

use serde::{Deserialize, Serialize};

/// A point or offset in tracking space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// The global origin, fixed point of coordinate scaling.
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    /// Create a new vector.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Scale about the global origin.
    pub fn scaled(self, scale: f32) -> Self {
        Self { x: self.x * scale, y: self.y * scale, z: self.z * scale }
    }

    /// Euclidean length.
    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

/// Orientation quaternion, stored in the wire order `(x, y, z, w)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    /// Create a new quaternion from its components.
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn norm(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    /// Check whether the quaternion has unit norm within `tolerance`.
    ///
    /// The server streams single-precision values, so exact unit norm is rare.
    pub fn is_unit(self, tolerance: f32) -> bool {
        (self.norm() - 1.0).abs() <= tolerance
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_pivots_about_origin() {
        let p = Vec3::new(1.0, -2.0, 0.5);
        assert_eq!(p.scaled(2.0), Vec3::new(2.0, -4.0, 1.0));
        assert_eq!(Vec3::ZERO.scaled(1000.0), Vec3::ZERO);
        assert_eq!(p.scaled(1.0), p);
    }

    #[test]
    fn identity_is_unit() {
        assert!(Quat::IDENTITY.is_unit(1e-6));
        assert!(!Quat::new(1.0, 1.0, 0.0, 0.0).is_unit(1e-3));
        assert_eq!(Quat::default(), Quat::IDENTITY);
    }

    #[test]
    fn array_conversion() {
        let v: Vec3 = [3.0, 4.0, 0.0].into();
        assert_eq!(v.length(), 5.0);
        assert_eq!(v.to_array(), [3.0, 4.0, 0.0]);
    }
}
