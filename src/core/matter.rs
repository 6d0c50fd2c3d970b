//! Mass and rotational inertia, carried together with their inverses so the
//! solver never divides. Infinite mass inverts to zero by IEEE arithmetic,
//! which is exactly the static-body behavior the constraint math relies on.

use serde::{Deserialize, Serialize};

use crate::core::dim::Dim;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Matter<D: Dim> {
    pub mass: f32,
    pub inv_mass: f32,
    pub inertia: D::Inertia,
    pub inv_inertia: D::Inertia,
}

impl<D: Dim> Default for Matter<D> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<D: Dim> Matter<D> {
    pub fn new(mass: f32, inertia: D::Inertia) -> Self {
        let mut matter = Self {
            mass,
            inv_mass: 0.0,
            inertia,
            inv_inertia: D::inertia_zero(),
        };
        matter.compute_inverses();
        matter
    }

    /// Massless placeholder used as an accumulation seed.
    pub fn zero() -> Self {
        Self::new(0.0, D::inertia_zero())
    }

    /// The matter of an immovable body.
    pub fn immovable() -> Self {
        Self::new(f32::INFINITY, D::inertia_infinite())
    }

    fn compute_inverses(&mut self) {
        self.inv_mass = 1.0 / self.mass;
        self.inv_inertia = D::inertia_inverse(self.inertia);
    }

    pub fn is_finite(&self) -> bool {
        self.mass.is_finite() && D::inertia_is_finite(self.inertia)
    }

    /// Accumulate another piece of matter located at the same origin.
    pub fn add(&mut self, other: &Self) {
        self.mass += other.mass;
        self.inertia = self.inertia + other.inertia;
        self.compute_inverses();
    }

    pub fn subtract(&mut self, other: &Self) {
        self.mass -= other.mass;
        self.inertia = self.inertia + other.inertia * -1.0;
        self.compute_inverses();
    }

    pub fn scale(&mut self, factor: f32) {
        self.mass *= factor;
        self.inertia = self.inertia * factor;
        self.compute_inverses();
    }

    /// Inertia re-expressed after rotating the body; mass is unchanged.
    pub fn rotated(&self, orientation: D::Rotation) -> Self {
        Self::new(self.mass, D::inertia_rotate(self.inertia, orientation))
    }

    /// Parallel-axis shift: inertia about a point displaced by `offset`.
    pub fn translated(&self, offset: D::Vector) -> Self {
        Self::new(
            self.mass,
            self.inertia + D::inertia_about(self.mass, offset),
        )
    }
}
