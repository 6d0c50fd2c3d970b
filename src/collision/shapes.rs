//! Collision geometry. Shapes come in two kinds, balls and convex
//! polytopes, and exist in two copies per collider: an immutable local-space
//! shape and a lazily synced world-space one.
//!
//! Polytope faces are canonicalized to outward winding at construction, so
//! the signed simplex decomposition yields correct matter regardless of the
//! winding the caller supplied. Stored planes face *inward*; the clipping
//! code depends on that orientation.

use serde::{Deserialize, Serialize};

use crate::config::{equals, EPSILON};
use crate::core::dim::{Dim, Dim2, Dim3};
use crate::core::matter::Matter;
use crate::core::types::{Aabb, Plane, Transform};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Ball<D: Dim> {
    pub position: D::Vector,
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Polytope<D: Dim> {
    pub vertices: Vec<D::Vector>,
    pub faces: Vec<D::FaceIndex>,
    pub planes: Vec<Plane<D>>,
    pub edges: Vec<[usize; 2]>,
    /// Vertex centroid, used as the shape's reference point.
    pub position: D::Vector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub enum Shape<D: Dim> {
    Ball(Ball<D>),
    Polytope(Polytope<D>),
}

impl<D: Dim> Ball<D> {
    pub fn new(position: D::Vector, radius: f32) -> Self {
        Self { position, radius }
    }
}

impl<D: Dim> Polytope<D> {
    pub fn new(vertices: Vec<D::Vector>, faces: Vec<D::FaceIndex>) -> Self {
        let mut centroid = D::Vector::default();
        for &v in &vertices {
            centroid += v;
        }
        if !vertices.is_empty() {
            centroid = centroid / vertices.len() as f32;
        }

        let faces = orient_faces::<D>(faces, &vertices, centroid);

        let mut planes: Vec<Plane<D>> = Vec::with_capacity(faces.len());
        for face in &faces {
            let outward = D::face_normal(face.as_ref(), &vertices);
            if outward == D::Vector::default() {
                continue;
            }
            // Stored inward: every vertex of the polytope then satisfies
            // dot(normal, v) >= distance.
            let normal = -outward;
            let distance = D::dot(normal, vertices[face.as_ref()[0]]);
            let duplicate = planes.iter().any(|p| {
                equals(p.distance, distance) && D::length_squared(p.normal - normal) < EPSILON
            });
            if !duplicate {
                planes.push(Plane::new(normal, distance));
            }
        }

        let edges = D::polytope_edges(&faces, &vertices);

        Self {
            vertices,
            faces,
            planes,
            edges,
            position: centroid,
        }
    }
}

/// Flip faces whose normal points toward the centroid, so every face winds
/// outward.
fn orient_faces<D: Dim>(
    faces: Vec<D::FaceIndex>,
    vertices: &[D::Vector],
    centroid: D::Vector,
) -> Vec<D::FaceIndex> {
    faces
        .into_iter()
        .map(|face| {
            let indices = face.as_ref();
            let normal = D::face_normal(indices, vertices);
            if D::dot(normal, vertices[indices[0]] - centroid) < 0.0 {
                D::flip_face(face)
            } else {
                face
            }
        })
        .collect()
}

impl Shape<Dim2> {
    /// Convex polygon from vertices in boundary order (either winding).
    pub fn polygon(vertices: Vec<glam::Vec2>) -> Self {
        let n = vertices.len();
        let faces = (0..n).map(|i| [i, (i + 1) % n]).collect();
        Shape::Polytope(Polytope::new(vertices, faces))
    }

    pub fn rectangle(center: glam::Vec2, width: f32, height: f32) -> Self {
        let (hw, hh) = (width * 0.5, height * 0.5);
        Self::polygon(vec![
            center + glam::Vec2::new(-hw, -hh),
            center + glam::Vec2::new(hw, -hh),
            center + glam::Vec2::new(hw, hh),
            center + glam::Vec2::new(-hw, hh),
        ])
    }
}

impl Shape<Dim3> {
    /// Convex polyhedron from a triangle soup. Duplicate vertices are merged
    /// first so edge adjacency works on shared indices.
    pub fn polyhedron(vertices: Vec<glam::Vec3>, faces: Vec<[usize; 3]>) -> Self {
        let mut merged: Vec<glam::Vec3> = Vec::with_capacity(vertices.len());
        let mut remap = Vec::with_capacity(vertices.len());
        for v in vertices {
            match merged.iter().position(|m| m.abs_diff_eq(v, EPSILON)) {
                Some(i) => remap.push(i),
                None => {
                    remap.push(merged.len());
                    merged.push(v);
                }
            }
        }
        let faces = faces
            .into_iter()
            .map(|[a, b, c]| [remap[a], remap[b], remap[c]])
            .collect();
        Shape::Polytope(Polytope::new(merged, faces))
    }

    pub fn cuboid(center: glam::Vec3, half_extents: glam::Vec3) -> Self {
        let h = half_extents;
        let verts: Vec<glam::Vec3> = (0..8)
            .map(|i| {
                center
                    + glam::Vec3::new(
                        if i & 1 == 0 { -h.x } else { h.x },
                        if i & 2 == 0 { -h.y } else { h.y },
                        if i & 4 == 0 { -h.z } else { h.z },
                    )
            })
            .collect();
        let faces = vec![
            [0, 2, 3], [0, 3, 1], // -z
            [4, 5, 7], [4, 7, 6], // +z
            [0, 1, 5], [0, 5, 4], // -y
            [2, 6, 7], [2, 7, 3], // +y
            [0, 4, 6], [0, 6, 2], // -x
            [1, 3, 7], [1, 7, 5], // +x
        ];
        Self::polyhedron(verts, faces)
    }
}

impl<D: Dim> Shape<D> {
    /// Reference point of the shape: ball center or vertex centroid.
    pub fn center(&self) -> D::Vector {
        match self {
            Shape::Ball(ball) => ball.position,
            Shape::Polytope(poly) => poly.position,
        }
    }

    /// Unit-density matter about the body origin.
    pub fn matter(&self) -> Matter<D> {
        match self {
            Shape::Ball(ball) => {
                let mass = D::ball_volume(ball.radius);
                Matter::new(mass, D::ball_inertia(mass, ball.radius))
                    .translated(ball.position)
            }
            Shape::Polytope(poly) => {
                let mut mass = 0.0;
                let mut inertia = D::inertia_zero();
                for face in &poly.faces {
                    let (m, i) = D::simplex_matter(face.as_ref(), &poly.vertices);
                    mass += m;
                    inertia = inertia + i;
                }
                if mass < 0.0 {
                    // Consistent inward winding flips every signed term.
                    mass = -mass;
                    inertia = inertia * -1.0;
                }
                Matter::new(mass, inertia)
            }
        }
    }

    pub fn bounds(&self) -> Aabb<D> {
        match self {
            Shape::Ball(ball) => Aabb::new(
                ball.position - D::splat(ball.radius),
                ball.position + D::splat(ball.radius),
            ),
            Shape::Polytope(poly) => {
                let mut bounds = Aabb::at_point(poly.position);
                for &v in &poly.vertices {
                    bounds.include(v);
                }
                bounds
            }
        }
    }

    /// Orientation-independent bounds: a cube large enough to contain the
    /// shape under any rotation about the body origin.
    pub fn ball_bounds(&self) -> Aabb<D> {
        let reach = match self {
            Shape::Ball(ball) => D::length(ball.position) + ball.radius,
            Shape::Polytope(poly) => poly
                .vertices
                .iter()
                .map(|&v| D::length(v))
                .fold(0.0, f32::max),
        };
        Aabb::from_half_extent(reach)
    }

    /// Support value: furthest reach of the shape along `axis`.
    pub fn max_extent(&self, axis: D::Vector) -> f32 {
        match self {
            Shape::Ball(ball) => D::dot(ball.position, axis) + ball.radius,
            Shape::Polytope(poly) => poly
                .vertices
                .iter()
                .map(|&v| D::dot(v, axis))
                .fold(f32::NEG_INFINITY, f32::max),
        }
    }

    pub fn transformed(&self, transform: &Transform<D>) -> Shape<D> {
        let mut world = self.clone();
        world.sync_from(self, transform);
        world
    }

    /// Refresh this world-space copy from `local` under `transform`,
    /// reusing existing allocations.
    pub fn sync_from(&mut self, local: &Shape<D>, transform: &Transform<D>) {
        match (self, local) {
            (Shape::Ball(world), Shape::Ball(local)) => {
                world.position = transform.apply(local.position);
                world.radius = local.radius;
            }
            (Shape::Polytope(world), Shape::Polytope(local)) => {
                world.vertices.resize(local.vertices.len(), D::Vector::default());
                for (w, &l) in world.vertices.iter_mut().zip(&local.vertices) {
                    *w = transform.apply(l);
                }
                world.position = transform.apply(local.position);
                world.planes.resize(local.planes.len(), Plane::new(D::Vector::default(), 0.0));
                for (w, l) in world.planes.iter_mut().zip(&local.planes) {
                    let normal = transform.apply_direction(l.normal);
                    w.normal = normal;
                    w.distance = D::dot(transform.linear, normal) + l.distance;
                }
            }
            (world, local) => *world = local.transformed(transform),
        }
    }

    /// Distance along the unit `direction` to the shape's surface.
    pub fn raycast(&self, origin: D::Vector, direction: D::Vector) -> Option<f32> {
        match self {
            Shape::Ball(ball) => {
                let to_origin = origin - ball.position;
                let b = D::dot(to_origin, direction);
                let c = D::length_squared(to_origin) - ball.radius * ball.radius;
                let discriminant = b * b - c;
                if discriminant < 0.0 {
                    return None;
                }
                let root = discriminant.sqrt();
                let near = -b - root;
                if near > EPSILON {
                    Some(near)
                } else {
                    let far = -b + root;
                    (far > EPSILON).then_some(far)
                }
            }
            Shape::Polytope(poly) => poly
                .faces
                .iter()
                .filter_map(|face| {
                    D::face_raycast(face.as_ref(), &poly.vertices, origin, direction)
                })
                .fold(None, |best: Option<f32>, t| {
                    Some(best.map_or(t, |b| b.min(t)))
                }),
        }
    }
}
