use glam::{Quat, Vec3};

use crate::types::Transform;

/// Blend between two recorded values.
///
/// `t` is in `[0, 1]`; `0` yields `self`, `1` yields `other`. Positional and
/// scalar values blend linearly, orientations spherically.
pub trait Interpolate: Sized {
    fn interpolate(&self, other: &Self, t: f32) -> Self;
}

impl Interpolate for f32 {
    fn interpolate(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Interpolate for f64 {
    fn interpolate(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * f64::from(t)
    }
}

impl Interpolate for Vec3 {
    fn interpolate(&self, other: &Self, t: f32) -> Self {
        self.lerp(*other, t)
    }
}

impl Interpolate for Quat {
    fn interpolate(&self, other: &Self, t: f32) -> Self {
        self.slerp(*other, t)
    }
}

impl Interpolate for Transform {
    fn interpolate(&self, other: &Self, t: f32) -> Self {
        Transform {
            position: self.position.interpolate(&other.position, t),
            rotation: self.rotation.interpolate(&other.rotation, t),
            scale: self.scale.interpolate(&other.scale, t),
        }
    }
}
