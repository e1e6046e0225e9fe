use std::ops::Mul;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Rotation + translation, no scale.
///
/// Composition follows glam: `(a * b).transform_point(p)` applies `b` first.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    pub rotation: Quat,
    pub translation: Vec3,
}

impl RigidTransform {
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
    };

    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            rotation: Quat::IDENTITY,
            translation,
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            translation: Vec3::ZERO,
        }
    }

    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation * p + self.translation
    }

    #[inline]
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        self.rotation * v
    }

    #[inline]
    pub fn inverse_transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation.inverse() * (p - self.translation)
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            rotation,
            translation: -(rotation * self.translation),
        }
    }

    /// Interpolate translation linearly and rotation spherically.
    pub fn lerp(&self, other: &Self, alpha: f32) -> Self {
        Self {
            rotation: self.rotation.slerp(other.rotation, alpha),
            translation: self.translation.lerp(other.translation, alpha),
        }
    }

    /// Same transform with the translation offset by `delta`.
    pub fn translated(&self, delta: Vec3) -> Self {
        Self {
            rotation: self.rotation,
            translation: self.translation + delta,
        }
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: RigidTransform) -> RigidTransform {
        RigidTransform {
            rotation: (self.rotation * rhs.rotation).normalize(),
            translation: self.rotation * rhs.translation + self.translation,
        }
    }
}

/// A property that is either constant or driven by a per-point weight map.
///
/// The effective value at a point is `low + (high - low) * weight`, with the
/// weight clamped to `[0, 1]`. Without a weight map only `low` is used.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedValue {
    pub low: f32,
    pub high: f32,
}

impl WeightedValue {
    pub const fn new(low: f32, high: f32) -> Self {
        Self { low, high }
    }

    pub const fn constant(value: f32) -> Self {
        Self {
            low: value,
            high: value,
        }
    }

    #[inline]
    pub fn value_at(&self, weight: f32) -> f32 {
        self.low + (self.high - self.low) * weight.clamp(0.0, 1.0)
    }

    /// Same as [`value_at`](Self::value_at) but also clamps the result to `[0, 1]`.
    #[inline]
    pub fn stiffness_at(&self, weight: f32) -> f32 {
        self.value_at(weight).clamp(0.0, 1.0)
    }
}

impl Default for WeightedValue {
    fn default() -> Self {
        Self::constant(1.0)
    }
}

/// Axis-aligned bounds in solver local space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds {
    pub center: Vec3,
    pub half_extents: Vec3,
    pub radius: f32,
}

impl Bounds {
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        let half_extents = (max - min) * 0.5;
        Self {
            center: (min + max) * 0.5,
            half_extents,
            radius: half_extents.length(),
        }
    }
}

/// Running min/max accumulator, combinable for parallel reductions.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    #[inline]
    pub fn grow(mut self, p: Vec3) -> Self {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
        self
    }

    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    pub fn to_bounds(self) -> Bounds {
        if self.is_empty() {
            Bounds::default()
        } else {
            Bounds::from_min_max(self.min, self.max)
        }
    }
}

/// Map a `[0, 1]` PBD stiffness to a per-iteration factor so the converged
/// response does not depend on the iteration count.
#[inline]
pub fn iteration_stiffness(stiffness: f32, iterations: u32) -> f32 {
    let s = stiffness.clamp(0.0, 1.0);
    if s >= 1.0 {
        return 1.0;
    }
    1.0 - (1.0 - s).powf(1.0 / iterations.max(1) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_inverse_round_trip() {
        let t = RigidTransform::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_z(0.7),
        );
        let p = Vec3::new(-4.0, 0.5, 2.0);
        let back = t.inverse().transform_point(t.transform_point(p));
        assert!((back - p).length() < 1e-5);
        assert!((t.inverse_transform_point(t.transform_point(p)) - p).length() < 1e-5);
    }

    #[test]
    fn test_transform_composition_order() {
        let a = RigidTransform::from_translation(Vec3::X);
        let b = RigidTransform::from_rotation(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        // b first: X rotates to Y, then translate by X.
        let p = (a * b).transform_point(Vec3::X);
        assert!((p - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_weighted_value_clamps_weight() {
        let w = WeightedValue::new(0.2, 0.8);
        assert_eq!(w.value_at(-1.0), 0.2);
        assert_eq!(w.value_at(2.0), 0.8);
        assert!((w.value_at(0.5) - 0.5).abs() < 1e-6);
        assert_eq!(WeightedValue::new(0.0, 4.0).stiffness_at(1.0), 1.0);
    }

    #[test]
    fn test_iteration_stiffness_converges_to_same_response() {
        let one = iteration_stiffness(0.5, 1);
        let four = iteration_stiffness(0.5, 4);
        assert!((one - 0.5).abs() < 1e-6);
        // Four passes at the per-iteration factor remove the same fraction.
        let remaining = (1.0 - four).powi(4);
        assert!((remaining - 0.5).abs() < 1e-5);
        assert_eq!(iteration_stiffness(1.0, 8), 1.0);
    }

    #[test]
    fn test_empty_aabb_gives_zero_bounds() {
        let b = Aabb::EMPTY.to_bounds();
        assert_eq!(b.half_extents, Vec3::ZERO);
        assert_eq!(b.radius, 0.0);
    }
}
