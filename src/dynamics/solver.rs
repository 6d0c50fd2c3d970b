//! Iterative resolver: collects constraints for one solve run and sweeps
//! them repeatedly in a randomized order.
//!
//! Constraints whose partner can yield are solved before those anchored to
//! immovable bodies, so corrections propagate toward the fixed supports.

use std::marker::PhantomData;

use crate::core::dim::Dim;
use crate::core::rigidbody::RigidBody;
use crate::utils::allocator::Arena;
use crate::utils::random::XorShift;

/// Which derivative a solve sweep corrects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolvePass {
    Position,
    /// Rebuilds velocities from the positional motion of the last step, so
    /// position-level corrections carry over into velocity space.
    RecomputeVelocity,
    Velocity,
}

/// A constraint the [`Resolver`] can drive.
pub trait Resolvable<D: Dim> {
    /// Whether both constrained bodies can yield.
    fn dynamic(&self) -> bool;

    /// Remaining positional error, summed into the convergence measure.
    fn error(&self, bodies: &Arena<RigidBody<D>>) -> f32;

    fn solve(&mut self, pass: SolvePass, bodies: &mut Arena<RigidBody<D>>, dt: f32);
}

pub struct Resolver<D: Dim, C: Resolvable<D>> {
    dynamic: Vec<C>,
    fixed: Vec<C>,
    _dim: PhantomData<D>,
}

impl<D: Dim, C: Resolvable<D>> Resolver<D, C> {
    pub fn new() -> Self {
        Self {
            dynamic: Vec::new(),
            fixed: Vec::new(),
            _dim: PhantomData,
        }
    }

    pub fn add(&mut self, constraint: Option<C>) {
        if let Some(constraint) = constraint {
            if constraint.dynamic() {
                self.dynamic.push(constraint);
            } else {
                self.fixed.push(constraint);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dynamic.is_empty() && self.fixed.is_empty()
    }

    pub fn error(&self, bodies: &Arena<RigidBody<D>>) -> f32 {
        self.dynamic
            .iter()
            .chain(self.fixed.iter())
            .map(|constraint| constraint.error(bodies))
            .sum()
    }

    /// Run `count` sweeps of the given pass. Each sweep reshuffles both
    /// lists so no constraint systematically gets the last word.
    pub fn solve(
        &mut self,
        bodies: &mut Arena<RigidBody<D>>,
        rng: &mut XorShift,
        dt: f32,
        count: usize,
        pass: SolvePass,
    ) {
        for _ in 0..count {
            rng.shuffle(&mut self.dynamic);
            for constraint in &mut self.dynamic {
                constraint.solve(pass, bodies, dt);
            }
            rng.shuffle(&mut self.fixed);
            for constraint in &mut self.fixed {
                constraint.solve(pass, bodies, dt);
            }
        }
    }
}

impl<D: Dim, C: Resolvable<D>> Default for Resolver<D, C> {
    fn default() -> Self {
        Self::new()
    }
}
