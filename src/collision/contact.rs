//! Narrow-phase result: a contact manifold.

use crate::core::dim::Dim;

/// Overlap between two shapes. The normal is a unit vector pointing from
/// the first body toward the second; contacts are world-space points.
#[derive(Debug, Clone)]
pub struct Collision<D: Dim> {
    pub normal: D::Vector,
    pub penetration: f32,
    pub contacts: Vec<D::Vector>,
}

impl<D: Dim> Collision<D> {
    pub fn new(normal: D::Vector, penetration: f32) -> Self {
        Self {
            normal,
            penetration,
            contacts: Vec::new(),
        }
    }

    /// Same overlap seen from the other body.
    pub fn inverted(mut self) -> Self {
        self.normal = -self.normal;
        self
    }
}
