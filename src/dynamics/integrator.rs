//! Per-substep force application and symplectic-Euler integration.

use crate::core::dim::Dim;
use crate::core::rigidbody::RigidBody;
use crate::utils::allocator::{Arena, EntityId};

/// Apply gravity and exponential drag to the dynamic bodies. The drag
/// factor is raised to `dt` so damping is independent of substep size.
pub fn apply_forces<D: Dim>(
    bodies: &mut Arena<RigidBody<D>>,
    dynamic: &[EntityId],
    gravity: D::Vector,
    drag: f32,
    dt: f32,
) {
    let drag_factor = (1.0 - drag).powf(dt);
    for &id in dynamic {
        let Some(body) = bodies.get_mut(id) else {
            continue;
        };
        if body.gravity {
            body.velocity.linear += gravity * dt;
        }
        if body.air_resistance {
            body.velocity.linear *= drag_factor;
            body.velocity.angular *= drag_factor;
        }
    }
}

pub fn integrate<D: Dim>(bodies: &mut Arena<RigidBody<D>>, dynamic: &[EntityId], dt: f32) {
    for &id in dynamic {
        if let Some(body) = bodies.get_mut(id) {
            body.integrate(dt);
        }
    }
}
