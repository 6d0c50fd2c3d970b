//! Distance joints. A descriptor is the persistent, user-owned record of a
//! joint; per-step solver instances are rebuilt from it each engine run,
//! one per dynamic endpoint.

use serde::{Deserialize, Serialize};

use crate::config::{equals, EPSILON};
use crate::core::dim::Dim;
use crate::core::matter::Matter;
use crate::core::rigidbody::{Derivative, RigidBody};
use crate::dynamics::constraint::{
    apply_impulse_pair, delta_to_impulse, interaction_velocity, Interaction,
};
use crate::dynamics::solver::{Resolvable, SolvePass};
use crate::utils::allocator::{Arena, EntityId};

/// A joint endpoint: a body and a local-space attachment offset. A static
/// anchor pins its end in place even on a dynamic body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Anchor<D: Dim> {
    pub body: EntityId,
    pub offset: D::Vector,
    pub is_static: bool,
}

impl<D: Dim> Anchor<D> {
    pub fn new(body: EntityId, offset: D::Vector) -> Self {
        Self {
            body,
            offset,
            is_static: false,
        }
    }

    pub fn fixed(body: EntityId, offset: D::Vector) -> Self {
        Self {
            body,
            offset,
            is_static: true,
        }
    }

    pub(crate) fn is_dynamic(&self, bodies: &Arena<RigidBody<D>>) -> bool {
        !self.is_static && bodies.get(self.body).is_some_and(|b| b.is_dynamic())
    }

    /// World position of the attachment point.
    pub fn position(&self, bodies: &Arena<RigidBody<D>>) -> Option<D::Vector> {
        Some(bodies.get(self.body)?.position.apply(self.offset))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JointKind {
    /// Hold the anchors a fixed distance apart.
    Length(f32),
    /// Pin the anchors together (a zero-length joint).
    Position,
}

impl JointKind {
    fn target_length(&self) -> f32 {
        match self {
            JointKind::Length(length) => *length,
            JointKind::Position => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct JointDescriptor<D: Dim> {
    pub a: Anchor<D>,
    pub b: Anchor<D>,
    pub kind: JointKind,
}

impl<D: Dim> JointDescriptor<D> {
    pub fn length(a: Anchor<D>, b: Anchor<D>, length: f32) -> Self {
        Self {
            a,
            b,
            kind: JointKind::Length(length),
        }
    }

    pub fn position(a: Anchor<D>, b: Anchor<D>) -> Self {
        Self {
            a,
            b,
            kind: JointKind::Position,
        }
    }

    pub fn involves(&self, body: EntityId) -> bool {
        self.a.body == body || self.b.body == body
    }
}

/// Solver-side joint instance, oriented from the perspective of one dynamic
/// body (side `a`).
#[derive(Debug, Clone)]
pub struct JointConstraint<D: Dim> {
    pub dynamic: bool,
    a: Anchor<D>,
    b: Anchor<D>,
    length: f32,
    matter_b: Matter<D>,
    interaction: Option<(Interaction<D>, f32)>,
}

impl<D: Dim> JointConstraint<D> {
    /// Instantiate `descriptor` seen from `body`. `None` when the joint
    /// cannot push that side: the anchor is pinned, or the bodies are gone.
    pub fn try_from_descriptor(
        descriptor: &JointDescriptor<D>,
        body: EntityId,
        bodies: &Arena<RigidBody<D>>,
    ) -> Option<Self> {
        let swap = descriptor.b.body == body && descriptor.a.body != body;
        let (a, b) = if swap {
            (descriptor.b, descriptor.a)
        } else {
            (descriptor.a, descriptor.b)
        };
        if a.is_static {
            return None;
        }
        bodies.get(a.body)?;
        let dynamic = b.is_dynamic(bodies);
        let matter_b = if dynamic {
            bodies.get(b.body)?.matter
        } else {
            Matter::immovable()
        };
        Some(Self {
            dynamic,
            a,
            b,
            length: descriptor.kind.target_length(),
            matter_b,
            interaction: None,
        })
    }

    /// Residual distance error.
    pub fn error(&self, bodies: &Arena<RigidBody<D>>) -> f32 {
        let (Some(end_a), Some(end_b)) = (self.a.position(bodies), self.b.position(bodies)) else {
            return 0.0;
        };
        (D::length(end_b - end_a) - self.length).abs()
    }

    /// Rebuild the interaction row and its effective mass from current
    /// poses. Degenerate (coincident anchors) leaves it unset.
    fn generate_interaction(&mut self, bodies: &Arena<RigidBody<D>>) -> Option<()> {
        self.interaction = None;
        let end_a = self.a.position(bodies)?;
        let end_b = self.b.position(bodies)?;
        let axis = D::normalize(end_b - end_a)?;

        let body_a = bodies.get(self.a.body)?;
        let body_b = bodies.get(self.b.body)?;
        let interaction = Interaction::new(
            end_a - body_a.position.linear,
            end_b - body_b.position.linear,
            axis,
        );
        let inverse = delta_to_impulse(&body_a.matter, &self.matter_b, &interaction, 0.0)?;
        self.interaction = Some((interaction, inverse));
        Some(())
    }

    fn partners<'a>(
        &self,
        bodies: &'a mut Arena<RigidBody<D>>,
    ) -> Option<(&'a mut RigidBody<D>, Option<&'a mut RigidBody<D>>)> {
        if self.dynamic {
            let (a, b) = bodies.get2_mut(self.a.body, self.b.body)?;
            Some((a, Some(b)))
        } else {
            Some((bodies.get_mut(self.a.body)?, None))
        }
    }

    pub fn solve_position(&mut self, bodies: &mut Arena<RigidBody<D>>, _dt: f32) {
        if self.generate_interaction(bodies).is_none() {
            return;
        }
        let (Some(end_a), Some(end_b)) = (self.a.position(bodies), self.b.position(bodies)) else {
            return;
        };
        let separation_sq = D::length_squared(end_b - end_a);
        if equals(separation_sq, self.length * self.length) {
            return;
        }
        let delta = separation_sq.sqrt() - self.length;
        let Some((interaction, inverse)) = self.interaction.clone() else {
            return;
        };
        let Some((a, b)) = self.partners(bodies) else {
            return;
        };
        apply_impulse_pair(a, b, Derivative::Position, &interaction, inverse * delta);
    }

    /// Fold the position corrections back into velocity, so the velocity
    /// pass starts from what the bodies actually did.
    pub fn recompute_velocity(&mut self, bodies: &mut Arena<RigidBody<D>>, dt: f32) {
        let Some((a, b)) = self.partners(bodies) else {
            return;
        };
        a.recompute_velocity(dt);
        if let Some(b) = b {
            b.recompute_velocity(dt);
        }
    }

    pub fn solve_velocity(&mut self, bodies: &mut Arena<RigidBody<D>>, _dt: f32) {
        if self.generate_interaction(bodies).is_none() {
            return;
        }
        let Some((interaction, inverse)) = self.interaction.clone() else {
            return;
        };
        let delta = {
            let Some(body_a) = bodies.get(self.a.body) else {
                return;
            };
            let body_b = if self.dynamic {
                bodies.get(self.b.body)
            } else {
                None
            };
            D::dot(
                interaction_velocity(body_a, body_b, &interaction),
                interaction.axis,
            )
        };
        if delta.abs() <= EPSILON {
            return;
        }
        let Some((a, b)) = self.partners(bodies) else {
            return;
        };
        apply_impulse_pair(a, b, Derivative::Velocity, &interaction, inverse * delta);
    }
}

impl<D: Dim> Resolvable<D> for JointConstraint<D> {
    fn dynamic(&self) -> bool {
        self.dynamic
    }

    fn error(&self, bodies: &Arena<RigidBody<D>>) -> f32 {
        JointConstraint::error(self, bodies)
    }

    fn solve(&mut self, pass: SolvePass, bodies: &mut Arena<RigidBody<D>>, dt: f32) {
        match pass {
            SolvePass::Position => self.solve_position(bodies, dt),
            SolvePass::RecomputeVelocity => self.recompute_velocity(bodies, dt),
            SolvePass::Velocity => self.solve_velocity(bodies, dt),
        }
    }
}
