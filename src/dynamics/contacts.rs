//! Contact constraints built from narrow-phase manifolds, solved with
//! sequential impulses in blocks of two coupled contact points.

use glam::{Mat2, Vec2};

use crate::collision::contact::Collision;
use crate::config::{EPSILON, KINETIC_FRICTION_RATIO, WASTE_THRESHOLD};
use crate::core::dim::Dim;
use crate::core::matter::Matter;
use crate::core::rigidbody::{Derivative, RigidBody};
use crate::dynamics::constraint::{
    apply_impulse_pair, delta_to_impulse, delta_to_impulse_pair, interaction_velocity, Interaction,
};
use crate::dynamics::solver::{Resolvable, SolvePass};
use crate::utils::allocator::{Arena, EntityId};

const BLOCK: usize = 2;

/// Effective-mass data for one block of contact points: the coupled 2x2
/// inverse when it exists, and per-point fallbacks.
#[derive(Debug, Clone)]
struct MatrixBlock {
    full: Option<Mat2>,
    diagonal: [Option<f32>; BLOCK],
}

#[derive(Debug, Clone)]
pub struct ContactConstraint<D: Dim> {
    pub dynamic: bool,
    body_a: EntityId,
    body_b: EntityId,
    /// Partner matter frozen at construction; an immovable stand-in when
    /// the partner cannot yield.
    matter_b: Matter<D>,
    interactions: Vec<Interaction<D>>,
    blocks: Vec<MatrixBlock>,
    static_friction: f32,
    kinetic_friction: f32,
    penetration: f32,
}

impl<D: Dim> ContactConstraint<D> {
    pub fn new(
        dynamic: bool,
        a: &RigidBody<D>,
        b: &RigidBody<D>,
        collision: &Collision<D>,
    ) -> Self {
        let axis = collision.normal;
        let restitution = a.restitution.max(b.restitution);
        let matter_b = if dynamic { b.matter } else { Matter::immovable() };

        // Interleave contact points from both ends of the manifold, so each
        // block of two spans the contact patch instead of hugging one side.
        let count = collision.contacts.len();
        let mut interactions = Vec::with_capacity(count);
        for i in 0..count {
            let index = if i & 1 == 1 { count - 1 - i / 2 } else { i / 2 };
            let contact = collision.contacts[index];
            interactions.push(Interaction::new(
                contact - a.position.linear,
                contact - b.position.linear,
                axis,
            ));
        }

        let mut blocks = Vec::with_capacity(count.div_ceil(BLOCK));
        for i in (0..count).step_by(BLOCK) {
            let size = BLOCK.min(count - i);
            let full = (size == BLOCK)
                .then(|| {
                    delta_to_impulse_pair(
                        &a.matter,
                        &matter_b,
                        &interactions[i],
                        &interactions[i + 1],
                        restitution,
                    )
                })
                .flatten();
            let mut diagonal = [None; BLOCK];
            for (j, slot) in diagonal.iter_mut().enumerate().take(size) {
                *slot = delta_to_impulse(&a.matter, &matter_b, &interactions[i + j], restitution);
            }
            blocks.push(MatrixBlock { full, diagonal });
        }

        let static_friction = a.friction * b.friction;
        Self {
            dynamic,
            body_a: a.id,
            body_b: b.id,
            matter_b,
            interactions,
            blocks,
            static_friction,
            kinetic_friction: KINETIC_FRICTION_RATIO * static_friction,
            penetration: collision.penetration,
        }
    }

    fn partners<'a>(
        &self,
        bodies: &'a mut Arena<RigidBody<D>>,
    ) -> Option<(&'a mut RigidBody<D>, Option<&'a mut RigidBody<D>>)> {
        if self.dynamic {
            let (a, b) = bodies.get2_mut(self.body_a, self.body_b)?;
            Some((a, Some(b)))
        } else {
            Some((bodies.get_mut(self.body_a)?, None))
        }
    }

    /// Separate the bodies along the contact normal, splitting the push by
    /// mass when both can move.
    pub fn solve_position(&mut self, bodies: &mut Arena<RigidBody<D>>, _dt: f32) {
        if self.penetration < EPSILON {
            return;
        }
        let Some(first) = self.interactions.first() else {
            return;
        };
        let movement = first.axis * self.penetration;
        let Some((a, b)) = self.partners(bodies) else {
            return;
        };
        match b {
            Some(b) => {
                let mass_a = a.matter.mass;
                let mass_b = b.matter.mass;
                let total = mass_a + mass_b;
                a.position.linear -= movement * (mass_b / total);
                b.position.linear += movement * (mass_a / total);
                b.sync();
            }
            None => a.position.linear -= movement,
        }
        a.sync();
    }

    pub fn solve_velocity(&mut self, bodies: &mut Arena<RigidBody<D>>, _dt: f32) {
        for index in (0..self.interactions.len()).step_by(BLOCK) {
            self.solve_block(bodies, index);
        }
    }

    fn solve_block(&self, bodies: &mut Arena<RigidBody<D>>, index: usize) {
        let block = &self.blocks[index / BLOCK];
        let Some((a, mut b)) = self.partners(bodies) else {
            return;
        };

        if let Some(full) = block.full {
            if self.try_solve_pair(full, index, a, b.as_deref_mut()) {
                return;
            }
        }

        let count = BLOCK.min(self.interactions.len() - index);
        for j in 0..count {
            let Some(inverse) = block.diagonal[j] else {
                continue;
            };
            self.try_solve_single(inverse, index + j, a, b.as_deref_mut());
        }
    }

    /// Solve both contact points of a block as a coupled system. Bails out
    /// (for the per-point fallback) when any requested impulse would pull.
    fn try_solve_pair(
        &self,
        matrix: Mat2,
        index: usize,
        a: &mut RigidBody<D>,
        mut b: Option<&mut RigidBody<D>>,
    ) -> bool {
        let first = &self.interactions[index];
        let second = &self.interactions[index + 1];
        let dv0 = D::dot(interaction_velocity(a, b.as_deref(), first), first.axis);
        let dv1 = D::dot(interaction_velocity(a, b.as_deref(), second), second.axis);

        if dv0.abs() <= WASTE_THRESHOLD && dv1.abs() <= WASTE_THRESHOLD {
            return true;
        }
        if dv0 > EPSILON || dv1 > EPSILON {
            return false;
        }
        let impulses = matrix * Vec2::new(dv0, dv1);
        if impulses.x < EPSILON || impulses.y < EPSILON {
            return false;
        }

        apply_impulse_pair(a, b.as_deref_mut(), Derivative::Velocity, first, impulses.x);
        apply_impulse_pair(a, b.as_deref_mut(), Derivative::Velocity, second, impulses.y);
        self.solve_friction(first.clone(), impulses.x, a, b.as_deref_mut());
        self.solve_friction(second.clone(), impulses.y, a, b);
        true
    }

    fn try_solve_single(
        &self,
        inverse: f32,
        index: usize,
        a: &mut RigidBody<D>,
        mut b: Option<&mut RigidBody<D>>,
    ) {
        let interaction = &self.interactions[index];
        let dv = D::dot(
            interaction_velocity(a, b.as_deref(), interaction),
            interaction.axis,
        );
        if dv.abs() <= WASTE_THRESHOLD || dv > EPSILON {
            return;
        }
        let impulse = inverse * dv;
        if impulse < EPSILON {
            return;
        }
        apply_impulse_pair(a, b.as_deref_mut(), Derivative::Velocity, interaction, impulse);
        self.solve_friction(interaction.clone(), impulse, a, b);
    }

    /// Friction along the tangent of the relative motion, clamped to the
    /// friction cone of the normal impulse that was just applied.
    fn solve_friction(
        &self,
        mut interaction: Interaction<D>,
        normal_impulse: f32,
        a: &mut RigidBody<D>,
        mut b: Option<&mut RigidBody<D>>,
    ) {
        let velocity = interaction_velocity(a, b.as_deref(), &interaction);
        let tangent = D::without(velocity, interaction.axis);
        let magnitude = D::length(tangent);
        if magnitude < EPSILON {
            return;
        }
        interaction.set_axis(tangent / magnitude);

        let Some(inverse) = delta_to_impulse(&a.matter, &self.matter_b, &interaction, 0.0) else {
            return;
        };
        let delta = D::dot(velocity, interaction.axis);
        let mut impulse = inverse * delta;
        if impulse.abs() > normal_impulse * self.static_friction {
            impulse = impulse.signum() * normal_impulse * self.kinetic_friction;
        }
        apply_impulse_pair(a, b.as_deref_mut(), Derivative::Velocity, &interaction, impulse);
    }
}

impl<D: Dim> Resolvable<D> for ContactConstraint<D> {
    fn dynamic(&self) -> bool {
        self.dynamic
    }

    /// Contacts are rebuilt every substep, so they carry no persistent
    /// error into the presolve convergence measure.
    fn error(&self, _bodies: &Arena<RigidBody<D>>) -> f32 {
        0.0
    }

    fn solve(&mut self, pass: SolvePass, bodies: &mut Arena<RigidBody<D>>, dt: f32) {
        match pass {
            SolvePass::Position => self.solve_position(bodies, dt),
            SolvePass::RecomputeVelocity => {}
            SolvePass::Velocity => self.solve_velocity(bodies, dt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::narrowphase::Detector;
    use crate::collision::shapes::Shape;
    use crate::core::dim::Dim2;
    use approx::assert_relative_eq;
    use glam::Vec2;

    fn resting_box_on_ground() -> (Arena<RigidBody<Dim2>>, EntityId, EntityId) {
        let mut bodies = Arena::new();
        let mut ground = RigidBody::new(Vec2::new(0.0, -0.5), false);
        ground.add_shape(Shape::rectangle(Vec2::ZERO, 20.0, 1.0));
        let ground_id = bodies.insert(ground);
        if let Some(body) = bodies.get_mut(ground_id) {
            body.id = ground_id;
        }

        // box slightly sunk into the ground, falling
        let mut falling = RigidBody::new(Vec2::new(0.0, 0.45), true);
        falling.add_shape(Shape::rectangle(Vec2::ZERO, 1.0, 1.0));
        falling.velocity.linear = Vec2::new(0.0, -1.0);
        let box_id = bodies.insert(falling);
        if let Some(body) = bodies.get_mut(box_id) {
            body.id = box_id;
        }
        (bodies, box_id, ground_id)
    }

    #[test]
    fn position_solve_pushes_the_box_out() {
        let (mut bodies, box_id, ground_id) = resting_box_on_ground();
        let collision = Detector::new()
            .collide_bodies(&mut bodies, box_id, ground_id)
            .unwrap();
        assert_relative_eq!(collision.penetration, 0.05, epsilon = 1e-3);

        let mut constraint = {
            let a = bodies.get(box_id).unwrap();
            let b = bodies.get(ground_id).unwrap();
            ContactConstraint::new(false, a, b, &collision)
        };
        constraint.solve_position(&mut bodies, 1.0 / 60.0);
        let y = bodies.get(box_id).unwrap().position.linear.y;
        assert_relative_eq!(y, 0.5, epsilon = 1e-3);
        // the static ground never moves
        assert_relative_eq!(
            bodies.get(ground_id).unwrap().position.linear.y,
            -0.5,
            epsilon = 1e-6
        );
    }

    #[test]
    fn velocity_solve_stops_the_approach() {
        let (mut bodies, box_id, ground_id) = resting_box_on_ground();
        let collision = Detector::new()
            .collide_bodies(&mut bodies, box_id, ground_id)
            .unwrap();
        let mut constraint = {
            let a = bodies.get(box_id).unwrap();
            let b = bodies.get(ground_id).unwrap();
            ContactConstraint::new(false, a, b, &collision)
        };
        constraint.solve_velocity(&mut bodies, 1.0 / 60.0);
        let velocity = bodies.get(box_id).unwrap().velocity.linear;
        assert!(velocity.y > -0.05, "approach not cancelled: {}", velocity.y);
        assert!(velocity.y <= 0.05, "bounced without restitution: {}", velocity.y);
    }

    #[test]
    fn separating_contact_is_left_alone() {
        let (mut bodies, box_id, ground_id) = resting_box_on_ground();
        if let Some(body) = bodies.get_mut(box_id) {
            body.velocity.linear = Vec2::new(0.0, 2.0);
        }
        let collision = Detector::new()
            .collide_bodies(&mut bodies, box_id, ground_id)
            .unwrap();
        let mut constraint = {
            let a = bodies.get(box_id).unwrap();
            let b = bodies.get(ground_id).unwrap();
            ContactConstraint::new(false, a, b, &collision)
        };
        constraint.solve_velocity(&mut bodies, 1.0 / 60.0);
        assert_relative_eq!(
            bodies.get(box_id).unwrap().velocity.linear.y,
            2.0,
            epsilon = 1e-4
        );
    }

    #[test]
    fn blocked_partner_is_treated_as_immovable() {
        use crate::dynamics::constraint::propagate_dynamic;

        let mut bodies = Arena::new();
        let mut lower = RigidBody::new(Vec2::ZERO, true);
        lower.add_shape(Shape::rectangle(Vec2::ZERO, 1.0, 1.0));
        let lower_id = bodies.insert(lower);
        if let Some(body) = bodies.get_mut(lower_id) {
            body.id = lower_id;
        }

        let mut upper = RigidBody::new(Vec2::new(0.0, 0.95), true);
        upper.add_shape(Shape::rectangle(Vec2::ZERO, 1.0, 1.0));
        let upper_id = bodies.insert(upper);
        if let Some(body) = bodies.get_mut(upper_id) {
            body.id = upper_id;
        }

        let collision = Detector::new()
            .collide_bodies(&mut bodies, upper_id, lower_id)
            .unwrap();
        let normal = collision.normal;

        // the lower box already rests on something in this direction
        let dynamic = {
            let (a, b) = bodies.get2_mut(upper_id, lower_id).unwrap();
            b.prohibited.add(normal);
            propagate_dynamic(a, b, true, normal)
        };
        assert!(!dynamic, "a blocked partner must not absorb the push");
        assert!(bodies.get(upper_id).unwrap().prohibited.matching(normal).is_some());

        let mut constraint = {
            let a = bodies.get(upper_id).unwrap();
            let b = bodies.get(lower_id).unwrap();
            ContactConstraint::new(dynamic, a, b, &collision)
        };
        let lower_before = bodies.get(lower_id).unwrap().position.linear;
        constraint.solve_position(&mut bodies, 1.0 / 60.0);
        constraint.solve_velocity(&mut bodies, 1.0 / 60.0);

        // the whole separation lands on the upper box
        assert_relative_eq!(
            bodies.get(lower_id).unwrap().position.linear.y,
            lower_before.y,
            epsilon = 1e-6
        );
        assert!(bodies.get(upper_id).unwrap().position.linear.y > 0.95);
        // and no velocity is injected into the blocked box
        assert_relative_eq!(
            bodies.get(lower_id).unwrap().velocity.linear.y,
            0.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn friction_drags_sliding_to_a_halt() {
        let (mut bodies, box_id, ground_id) = resting_box_on_ground();
        if let Some(body) = bodies.get_mut(box_id) {
            body.velocity.linear = Vec2::new(3.0, -1.0);
            body.can_rotate = false;
            body.sync();
        }
        let collision = Detector::new()
            .collide_bodies(&mut bodies, box_id, ground_id)
            .unwrap();
        let mut constraint = {
            let a = bodies.get(box_id).unwrap();
            let b = bodies.get(ground_id).unwrap();
            ContactConstraint::new(false, a, b, &collision)
        };
        let before = bodies.get(box_id).unwrap().velocity.linear.x;
        constraint.solve_velocity(&mut bodies, 1.0 / 60.0);
        let after = bodies.get(box_id).unwrap().velocity.linear.x;
        assert!(after < before, "friction did not oppose sliding");
        assert!(after >= 0.0, "friction overshot and reversed the slide");
    }
}
