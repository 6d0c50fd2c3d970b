//! Small geometric value types shared across the crate.

use serde::{Deserialize, Serialize};

use crate::core::dim::Dim;

/// Rigid placement: translation plus orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Transform<D: Dim> {
    pub linear: D::Vector,
    pub orientation: D::Rotation,
}

impl<D: Dim> Default for Transform<D> {
    fn default() -> Self {
        Self {
            linear: D::Vector::default(),
            orientation: D::no_rotation(),
        }
    }
}

impl<D: Dim> Transform<D> {
    pub fn new(linear: D::Vector, orientation: D::Rotation) -> Self {
        Self { linear, orientation }
    }

    pub fn from_translation(linear: D::Vector) -> Self {
        Self {
            linear,
            orientation: D::no_rotation(),
        }
    }

    /// Rotate-then-translate a local point into world space.
    pub fn apply(&self, point: D::Vector) -> D::Vector {
        D::apply_rotation(self.orientation, point) + self.linear
    }

    /// Rotate a direction, ignoring translation.
    pub fn apply_direction(&self, direction: D::Vector) -> D::Vector {
        D::apply_rotation(self.orientation, direction)
    }
}

/// Linear and angular motion state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Velocity<D: Dim> {
    pub linear: D::Vector,
    pub angular: D::Angular,
}

impl<D: Dim> Default for Velocity<D> {
    fn default() -> Self {
        Self {
            linear: D::Vector::default(),
            angular: D::Angular::default(),
        }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Aabb<D: Dim> {
    pub min: D::Vector,
    pub max: D::Vector,
}

impl<D: Dim> Aabb<D> {
    pub fn new(min: D::Vector, max: D::Vector) -> Self {
        Self { min, max }
    }

    /// Cube centered on the origin with the given half extent.
    pub fn from_half_extent(half: f32) -> Self {
        Self {
            min: D::splat(-half),
            max: D::splat(half),
        }
    }

    /// Degenerate box containing only `point`.
    pub fn at_point(point: D::Vector) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    pub fn include(&mut self, point: D::Vector) {
        self.min = D::vmin(self.min, point);
        self.max = D::vmax(self.max, point);
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: D::vmin(self.min, other.min),
            max: D::vmax(self.max, other.max),
        }
    }

    pub fn translated(&self, offset: D::Vector) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    pub fn intersects(&self, other: &Self) -> bool {
        let lo = D::vmax(self.min, other.min);
        let hi = D::vmin(self.max, other.max);
        let span = hi - lo;
        // All components non-negative exactly when max(min) <= min(max).
        D::vmin(span, D::Vector::default()) == D::Vector::default()
    }

    /// Product of edge lengths.
    pub fn volume(&self) -> f32 {
        D::element_product(self.max - self.min)
    }
}

/// Half-space boundary in Hessian normal form: `dot(normal, p) == distance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Plane<D: Dim> {
    pub normal: D::Vector,
    pub distance: f32,
}

impl<D: Dim> Plane<D> {
    pub fn new(normal: D::Vector, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Signed excess of `point` over the plane, positive on the normal side.
    pub fn height(&self, point: D::Vector) -> f32 {
        D::dot(self.normal, point) - self.distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dim::{Dim2, Rot2};
    use approx::assert_relative_eq;
    use glam::Vec2;

    #[test]
    fn transform_rotates_then_translates() {
        let t = Transform::<Dim2>::new(Vec2::new(1.0, 0.0), Rot2(std::f32::consts::FRAC_PI_2));
        let p = t.apply(Vec2::new(1.0, 0.0));
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn aabb_intersection_is_inclusive() {
        let a = Aabb::<Dim2>::new(Vec2::ZERO, Vec2::ONE);
        let b = Aabb::<Dim2>::new(Vec2::ONE, Vec2::splat(2.0));
        let c = Aabb::<Dim2>::new(Vec2::splat(1.1), Vec2::splat(2.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
