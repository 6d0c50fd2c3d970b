//! Narrow phase: exact overlap tests between shape pairs.
//!
//! Polytope pairs go through a separating-axis test. The last separating
//! axis of every pair is cached and retried first the next step, which
//! settles the common case (two nearby shapes staying apart) with a single
//! support query.

use std::collections::HashMap;

use crate::collision::clipping::{clip_edges, clip_vertices};
use crate::collision::contact::Collision;
use crate::collision::shapes::{Ball, Polytope, Shape};
use crate::core::dim::Dim;
use crate::core::rigidbody::RigidBody;
use crate::utils::allocator::{Arena, EntityId};

/// One collider of one body.
type ShapeKey = (EntityId, usize);

pub struct Detector<D: Dim> {
    separating_axes: HashMap<(ShapeKey, ShapeKey), D::Vector>,
}

impl<D: Dim> Default for Detector<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dim> Detector<D> {
    pub fn new() -> Self {
        Self {
            separating_axes: HashMap::new(),
        }
    }

    /// Drop cached axes involving a removed body.
    pub fn prune(&mut self, id: EntityId) {
        self.separating_axes
            .retain(|&((a, _), (b, _)), _| a != id && b != id);
    }

    /// Full manifold between two bodies, or `None` when they do not touch.
    /// The normal points from `a` toward `b`.
    pub fn collide_bodies(
        &mut self,
        bodies: &mut Arena<RigidBody<D>>,
        a: EntityId,
        b: EntityId,
    ) -> Option<Collision<D>> {
        let (body_a, body_b) = bodies.get2_mut(a, b)?;
        if !body_a.bounds.intersects(&body_b.bounds) {
            return None;
        }

        let transform_a = body_a.position;
        let transform_b = body_b.position;
        for collider in &mut body_a.colliders {
            collider.world_shape(&transform_a);
        }
        for collider in &mut body_b.colliders {
            collider.world_shape(&transform_b);
        }

        let mut collisions = Vec::new();
        for (i, collider_a) in body_a.colliders.iter().enumerate() {
            for (j, collider_b) in body_b.colliders.iter().enumerate() {
                let key = ((a, i), (b, j));
                if let Some(collision) = self.collide_shapes(
                    Some(key),
                    collider_a.cached_world(),
                    collider_b.cached_world(),
                ) {
                    collisions.push(collision);
                }
            }
        }

        match collisions.len() {
            0 => None,
            1 => collisions.pop(),
            _ => Self::merge(collisions),
        }
    }

    /// Combine per-collider manifolds into one: the summed normal decides
    /// the direction, sub-manifolds pushing against it are discarded, and
    /// the deepest aligned penetration is projected onto the merged normal.
    fn merge(collisions: Vec<Collision<D>>) -> Option<Collision<D>> {
        let mut direction = D::Vector::default();
        for collision in &collisions {
            direction += collision.normal;
        }
        let normal = D::normalize(direction)?;

        let mut contacts = Vec::new();
        let mut best: Option<&Collision<D>> = None;
        for collision in &collisions {
            if D::dot(collision.normal, direction) < 0.0 {
                continue;
            }
            contacts.extend(collision.contacts.iter().copied());
            if best.is_none_or(|deepest| collision.penetration > deepest.penetration) {
                best = Some(collision);
            }
        }
        let deepest = best?;
        let penetration = deepest.penetration * D::dot(deepest.normal, normal);
        Some(Collision {
            normal,
            penetration,
            contacts,
        })
    }

    /// Dispatch on the shape kinds. `key` enables the separating-axis cache
    /// for polytope pairs.
    pub fn collide_shapes(
        &mut self,
        key: Option<(ShapeKey, ShapeKey)>,
        a: &Shape<D>,
        b: &Shape<D>,
    ) -> Option<Collision<D>> {
        match (a, b) {
            (Shape::Ball(a), Shape::Ball(b)) => ball_ball(a, b),
            (Shape::Ball(a), Shape::Polytope(b)) => ball_polytope(a, b),
            (Shape::Polytope(a), Shape::Ball(b)) => ball_polytope(b, a).map(Collision::inverted),
            (Shape::Polytope(a), Shape::Polytope(b)) => self.polytope_polytope(key, a, b),
        }
    }

    fn polytope_polytope(
        &mut self,
        key: Option<(ShapeKey, ShapeKey)>,
        a: &Polytope<D>,
        b: &Polytope<D>,
    ) -> Option<Collision<D>> {
        let to_b = b.position - a.position;

        // Last known separating axis still separates: done.
        if let Some(key) = key {
            if let Some(&axis) = self.separating_axes.get(&key) {
                if overlap::<D>(a, b, axis) < 0.0 {
                    return None;
                }
            }
        }

        let toward_b = |normal: D::Vector| {
            if D::dot(normal, to_b) < 0.0 {
                -normal
            } else {
                normal
            }
        };

        let axes_a: Vec<D::Vector> = a.planes.iter().map(|p| toward_b(p.normal)).collect();
        let axes_b: Vec<D::Vector> = b.planes.iter().map(|p| toward_b(p.normal)).collect();

        let mut candidates = Vec::with_capacity(axes_a.len() + axes_b.len());
        candidates.extend_from_slice(&axes_a);
        candidates.extend_from_slice(&axes_b);
        // In 3D, edge-edge contact needs the pairwise cross products too.
        for &na in &axes_a {
            for &nb in &axes_b {
                if let Some(axis) = D::axis_cross(na, nb) {
                    candidates.push(toward_b(axis));
                }
            }
        }

        let mut best: Option<(D::Vector, f32)> = None;
        for axis in candidates {
            let depth = overlap::<D>(a, b, axis);
            if depth < 0.0 {
                if let Some(key) = key {
                    self.separating_axes.insert(key, axis);
                }
                return None;
            }
            if best.is_none_or(|(_, least)| depth < least) {
                best = Some((axis, depth));
            }
        }
        let (normal, penetration) = best?;

        let mut contacts = clip_vertices::<D>(&a.vertices, &b.planes);
        if contacts.is_empty() {
            contacts = clip_vertices::<D>(&b.vertices, &a.planes);
        }
        if contacts.is_empty() {
            contacts = clip_edges::<D>(&a.edges, &a.vertices, &b.planes);
        }
        if contacts.is_empty() {
            contacts = clip_edges::<D>(&b.edges, &b.vertices, &a.planes);
        }
        if contacts.is_empty() {
            return None;
        }

        Some(Collision {
            normal,
            penetration,
            contacts,
        })
    }
}

/// Interval overlap of the two polytopes along `axis` (which points from
/// `a` toward `b`). Negative means separated.
fn overlap<D: Dim>(a: &Polytope<D>, b: &Polytope<D>, axis: D::Vector) -> f32 {
    max_extent::<D>(a, axis) + max_extent::<D>(b, -axis)
}

fn max_extent<D: Dim>(poly: &Polytope<D>, axis: D::Vector) -> f32 {
    poly.vertices
        .iter()
        .map(|&v| D::dot(v, axis))
        .fold(f32::NEG_INFINITY, f32::max)
}

fn ball_ball<D: Dim>(a: &Ball<D>, b: &Ball<D>) -> Option<Collision<D>> {
    let delta = b.position - a.position;
    let distance = D::length(delta);
    let penetration = a.radius + b.radius - distance;
    if penetration <= 0.0 {
        return None;
    }
    let normal = D::normalize(delta)?;
    let contact = a.position + normal * (a.radius - penetration * 0.5);
    let mut collision = Collision::new(normal, penetration);
    collision.contacts.push(contact);
    Some(collision)
}

fn ball_polytope<D: Dim>(ball: &Ball<D>, poly: &Polytope<D>) -> Option<Collision<D>> {
    let mut closest: Option<(D::Vector, f32)> = None;
    for face in &poly.faces {
        let point = D::face_closest_point(face.as_ref(), &poly.vertices, ball.position);
        let distance = D::length(point - ball.position);
        if closest.is_none_or(|(_, best)| distance < best) {
            closest = Some((point, distance));
        }
    }
    let (point, distance) = closest?;
    let mut axis = D::normalize(point - ball.position)?;

    // Center inside the volume: the surface direction agrees with the
    // centroid-to-center direction, and the full radius plus the interior
    // depth must be pushed out.
    let inside = D::dot(ball.position - poly.position, axis) > 0.0;
    let penetration = if inside {
        axis = -axis;
        distance + ball.radius
    } else {
        ball.radius - distance
    };
    if penetration <= 0.0 {
        return None;
    }
    let mut collision = Collision::new(axis, penetration);
    collision.contacts.push(point);
    Some(collision)
}
