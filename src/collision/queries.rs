//! Ray queries against the body set.

use serde::{Deserialize, Serialize};

use crate::core::dim::Dim;
use crate::utils::allocator::EntityId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Ray<D: Dim> {
    pub origin: D::Vector,
    /// Unit direction.
    pub direction: D::Vector,
}

impl<D: Dim> Ray<D> {
    /// `None` when the direction cannot be normalized.
    pub fn new(origin: D::Vector, direction: D::Vector) -> Option<Self> {
        Some(Self {
            origin,
            direction: D::normalize(direction)?,
        })
    }

    pub fn point_at(&self, distance: f32) -> D::Vector {
        self.origin + self.direction * distance
    }
}

/// Closest hit found so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: EntityId,
    pub distance: f32,
}

impl RayHit {
    /// Fold in a candidate hit, keeping the nearer one.
    pub fn nearer(best: Option<RayHit>, candidate: RayHit) -> Option<RayHit> {
        match best {
            Some(current) if current.distance <= candidate.distance => Some(current),
            _ => Some(candidate),
        }
    }
}
