//! Shared sequential-impulse machinery: the per-contact interaction record
//! and the effective-mass matrices mapping velocity deltas to impulses.

use glam::{Mat2, Vec2};

use crate::core::dim::Dim;
use crate::core::matter::Matter;
use crate::core::rigidbody::{Derivative, RigidBody};

/// One scalar constraint row: a pair of attachment offsets and the axis the
/// impulse acts along. The cross terms are cached because they appear in
/// every effective-mass entry.
#[derive(Debug, Clone)]
pub struct Interaction<D: Dim> {
    pub contact_a: D::Vector,
    pub contact_b: D::Vector,
    pub axis: D::Vector,
    pub cross_a: D::Angular,
    pub cross_b: D::Angular,
}

impl<D: Dim> Interaction<D> {
    pub fn new(contact_a: D::Vector, contact_b: D::Vector, axis: D::Vector) -> Self {
        let mut interaction = Self {
            contact_a,
            contact_b,
            axis,
            cross_a: D::Angular::default(),
            cross_b: D::Angular::default(),
        };
        interaction.set_axis(axis);
        interaction
    }

    pub fn set_axis(&mut self, axis: D::Vector) {
        self.axis = axis;
        self.cross_a = D::cross(self.contact_a, axis);
        self.cross_b = D::cross(self.contact_b, axis);
    }
}

/// Relative velocity of the two attachment points, seen from `a`. A `None`
/// partner is immovable and contributes nothing.
pub fn interaction_velocity<D: Dim>(
    a: &RigidBody<D>,
    b: Option<&RigidBody<D>>,
    interaction: &Interaction<D>,
) -> D::Vector {
    let mut velocity = -a.point_velocity(interaction.contact_a);
    if let Some(b) = b {
        velocity += b.point_velocity(interaction.contact_b);
    }
    velocity
}

fn mass_entry<D: Dim>(
    matter_a: &Matter<D>,
    matter_b: &Matter<D>,
    dst: &Interaction<D>,
    src: &Interaction<D>,
    dv_factor: f32,
) -> f32 {
    dv_factor
        * (matter_a.inv_mass
            + matter_b.inv_mass
            + D::angular_dot(
                D::inertia_apply(matter_a.inv_inertia, src.cross_a),
                dst.cross_a,
            )
            + D::angular_dot(
                D::inertia_apply(matter_b.inv_inertia, src.cross_b),
                dst.cross_b,
            ))
}

/// Inverse 1x1 effective mass, or `None` when it is singular (both sides
/// immovable along this row).
pub fn delta_to_impulse<D: Dim>(
    matter_a: &Matter<D>,
    matter_b: &Matter<D>,
    interaction: &Interaction<D>,
    restitution: f32,
) -> Option<f32> {
    let dv_factor = -1.0 - restitution;
    let entry = mass_entry(matter_a, matter_b, interaction, interaction, dv_factor);
    if !entry.is_finite() || entry == 0.0 {
        return None;
    }
    Some(1.0 / entry)
}

/// Inverse 2x2 effective mass for a coupled pair of rows.
pub fn delta_to_impulse_pair<D: Dim>(
    matter_a: &Matter<D>,
    matter_b: &Matter<D>,
    first: &Interaction<D>,
    second: &Interaction<D>,
    restitution: f32,
) -> Option<Mat2> {
    let dv_factor = -1.0 - restitution;
    let m00 = mass_entry(matter_a, matter_b, first, first, dv_factor);
    let m01 = mass_entry(matter_a, matter_b, first, second, dv_factor);
    let m11 = mass_entry(matter_a, matter_b, second, second, dv_factor);
    let matrix = Mat2::from_cols(Vec2::new(m00, m01), Vec2::new(m01, m11));
    let det = matrix.determinant();
    if !det.is_finite() || det.abs() <= f32::EPSILON {
        return None;
    }
    Some(matrix.inverse())
}

/// Impulse of the given magnitude along the interaction's axis: applied
/// backward on `a`, forward on `b` when it can move.
pub fn apply_impulse_pair<D: Dim>(
    a: &mut RigidBody<D>,
    b: Option<&mut RigidBody<D>>,
    derivative: Derivative,
    interaction: &Interaction<D>,
    magnitude: f32,
) {
    let impulse = interaction.axis * -magnitude;
    a.apply_impulse(derivative, interaction.contact_a, impulse);
    if let Some(b) = b {
        b.apply_impulse(derivative, interaction.contact_b, -impulse);
    }
}

/// How a contact spreads immobility: pushing against something that cannot
/// yield (static, or itself blocked in this direction) blocks this body too,
/// and the contact resolves as if the partner were immovable.
pub fn propagate_dynamic<D: Dim>(
    a: &mut RigidBody<D>,
    b: &mut RigidBody<D>,
    b_dynamic: bool,
    normal: D::Vector,
) -> bool {
    if !b_dynamic {
        a.prohibited.add(normal);
        return false;
    }
    if let Some(blocked) = b.prohibited.matching(normal) {
        a.prohibited.add(blocked);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::{Ball, Shape};
    use crate::core::dim::Dim2;
    use approx::assert_relative_eq;
    use glam::Vec2;

    fn ball_body(mass_radius: f32) -> RigidBody<Dim2> {
        let mut body = RigidBody::new(Vec2::ZERO, true);
        body.add_shape(Shape::Ball(Ball::new(Vec2::ZERO, mass_radius)));
        body
    }

    #[test]
    fn central_impulse_cancels_relative_velocity() {
        let mut a = ball_body(1.0);
        let mut b = ball_body(1.0);
        a.velocity.linear = Vec2::new(0.0, -2.0);

        // head-on contact, axis from a toward b (downward)
        let interaction = Interaction::<Dim2>::new(-Vec2::Y, Vec2::Y, -Vec2::Y);
        let dv = Dim2::dot(
            interaction_velocity(&a, Some(&b), &interaction),
            interaction.axis,
        );
        assert!(dv < 0.0);

        let inverse = delta_to_impulse(&a.matter, &b.matter, &interaction, 0.0).unwrap();
        let impulse = inverse * dv;
        apply_impulse_pair(
            &mut a,
            Some(&mut b),
            Derivative::Velocity,
            &interaction,
            impulse,
        );

        let dv_after = Dim2::dot(
            interaction_velocity(&a, Some(&b), &interaction),
            interaction.axis,
        );
        assert_relative_eq!(dv_after, 0.0, epsilon = 1e-4);
        // momentum was conserved, split between the two equal masses
        assert_relative_eq!(a.velocity.linear.y, -1.0, epsilon = 1e-4);
        assert_relative_eq!(b.velocity.linear.y, -1.0, epsilon = 1e-4);
    }

    #[test]
    fn singular_mass_yields_none() {
        let interaction = Interaction::<Dim2>::new(Vec2::ZERO, Vec2::ZERO, Vec2::X);
        let immovable = crate::core::matter::Matter::<Dim2>::immovable();
        assert!(delta_to_impulse(&immovable, &immovable, &interaction, 0.0).is_none());
    }

    #[test]
    fn propagation_blocks_against_static_support() {
        let mut a = ball_body(1.0);
        let mut ground = RigidBody::new(Vec2::new(0.0, -2.0), false);
        ground.add_shape(Shape::rectangle(Vec2::ZERO, 10.0, 1.0));

        let normal = -Vec2::Y;
        assert!(!propagate_dynamic(&mut a, &mut ground, false, normal));
        assert!(a.prohibited.matching(normal).is_some());

        // a second body resting on `a` inherits the blocked direction and
        // treats `a` as immovable for this contact
        let mut c = ball_body(1.0);
        assert!(!propagate_dynamic(&mut c, &mut a, true, normal));
        assert!(c.prohibited.matching(normal).is_some());
    }

    #[test]
    fn pair_matrix_is_symmetric_inverse() {
        let a = ball_body(1.0);
        let b = ball_body(1.0);
        let i0 = Interaction::<Dim2>::new(Vec2::new(1.0, -1.0), Vec2::new(1.0, 1.0), Vec2::Y);
        let i1 = Interaction::<Dim2>::new(Vec2::new(-1.0, -1.0), Vec2::new(-1.0, 1.0), Vec2::Y);
        let inverse = delta_to_impulse_pair(&a.matter, &b.matter, &i0, &i1, 0.0).unwrap();
        assert_relative_eq!(inverse.col(0).y, inverse.col(1).x, epsilon = 1e-6);
    }
}
