//! Dimension abstraction: every simulation type is generic over [`Dim`],
//! instantiated by the [`Dim2`] and [`Dim3`] markers. The trait fixes what
//! actually changes between the two worlds — the *kind* of angular state
//! (scalar vs. vector), of rotation (angle vs. quaternion) and of inertia
//! (scalar vs. tensor) — and supplies the face-level geometry kit the
//! polytope code needs.

use std::fmt::Debug;
use std::hash::Hash;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use glam::{IVec2, IVec3, Mat2, Mat3, Quat, Vec2, Vec3};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::EPSILON;

/// 2D rotation as a plain angle. glam has no 2D rotor type; the angle is
/// applied through [`Vec2::from_angle`]/[`Vec2::rotate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rot2(pub f32);

pub trait Dim:
    Copy + Clone + Debug + Default + PartialEq + Eq + Hash + Send + Sync + 'static
{
    const DIM: usize;
    /// Grid cells each collider is expected to straddle (2^DIM).
    const CELLS_PER_ITEM: usize = 1 << Self::DIM;

    type Vector: Copy
        + Debug
        + Default
        + PartialEq
        + Add<Output = Self::Vector>
        + Sub<Output = Self::Vector>
        + Neg<Output = Self::Vector>
        + Mul<f32, Output = Self::Vector>
        + Div<f32, Output = Self::Vector>
        + AddAssign
        + SubAssign
        + MulAssign<f32>
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    type Angular: Copy
        + Debug
        + Default
        + PartialEq
        + Add<Output = Self::Angular>
        + Neg<Output = Self::Angular>
        + Mul<f32, Output = Self::Angular>
        + AddAssign
        + MulAssign<f32>
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    type Rotation: Copy + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    type Inertia: Copy
        + Debug
        + PartialEq
        + Add<Output = Self::Inertia>
        + Mul<f32, Output = Self::Inertia>
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    type Cell: Copy + Eq + Hash + Debug;

    /// Per-face vertex indices: an edge in 2D, a triangle in 3D.
    type FaceIndex: Copy
        + Debug
        + PartialEq
        + AsRef<[usize]>
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    // vectors
    fn dot(a: Self::Vector, b: Self::Vector) -> f32;
    fn vmin(a: Self::Vector, b: Self::Vector) -> Self::Vector;
    fn vmax(a: Self::Vector, b: Self::Vector) -> Self::Vector;
    fn splat(value: f32) -> Self::Vector;
    fn is_finite(v: Self::Vector) -> bool;
    fn element_product(v: Self::Vector) -> f32;

    fn length_squared(v: Self::Vector) -> f32 {
        Self::dot(v, v)
    }

    fn length(v: Self::Vector) -> f32 {
        Self::length_squared(v).sqrt()
    }

    /// Unit vector, or `None` for degenerate input. Callers substitute a
    /// no-op instead of propagating NaN.
    fn normalize(v: Self::Vector) -> Option<Self::Vector> {
        let mag = Self::length(v);
        if mag > EPSILON {
            Some(v / mag)
        } else {
            None
        }
    }

    /// Component of `v` orthogonal to the unit `axis`.
    fn without(v: Self::Vector, axis: Self::Vector) -> Self::Vector {
        v - axis * Self::dot(v, axis)
    }

    // angular algebra
    fn cross(a: Self::Vector, b: Self::Vector) -> Self::Angular;
    fn angular_cross(w: Self::Angular, r: Self::Vector) -> Self::Vector;
    fn angular_dot(a: Self::Angular, b: Self::Angular) -> f32;
    /// Candidate SAT axis from two face normals; `None` in 2D or when the
    /// normals are parallel.
    fn axis_cross(a: Self::Vector, b: Self::Vector) -> Option<Self::Vector>;

    // rotations
    fn no_rotation() -> Self::Rotation;
    fn apply_rotation(r: Self::Rotation, v: Self::Vector) -> Self::Vector;
    fn advance_rotation(r: Self::Rotation, w: Self::Angular, dt: f32) -> Self::Rotation;
    /// Angular displacement taking `previous` to `current`.
    fn rotation_delta(current: Self::Rotation, previous: Self::Rotation) -> Self::Angular;

    // inertia
    fn inertia_zero() -> Self::Inertia;
    fn inertia_infinite() -> Self::Inertia;
    fn inertia_inverse(inertia: Self::Inertia) -> Self::Inertia;
    fn inertia_apply(inertia: Self::Inertia, w: Self::Angular) -> Self::Angular;
    fn inertia_rotate(inertia: Self::Inertia, r: Self::Rotation) -> Self::Inertia;
    /// Angular velocity after the orientation change from `previous` to
    /// `next`, keeping the world angular momentum fixed. Identity where
    /// inertia is rotation-invariant.
    fn precess(
        _inertia: Self::Inertia,
        _inv_inertia: Self::Inertia,
        _previous: Self::Rotation,
        _next: Self::Rotation,
        w: Self::Angular,
    ) -> Self::Angular {
        w
    }
    /// Parallel-axis contribution of `mass` displaced by `offset`.
    fn inertia_about(mass: f32, offset: Self::Vector) -> Self::Inertia;
    fn inertia_is_finite(inertia: Self::Inertia) -> bool;

    // broad-phase grid
    fn visit_cells(
        min: Self::Vector,
        max: Self::Vector,
        cell_size: f32,
        visit: &mut dyn FnMut(Self::Cell),
    );

    // face geometry
    fn face_normal(face: &[usize], vertices: &[Self::Vector]) -> Self::Vector;
    fn face_closest_point(
        face: &[usize],
        vertices: &[Self::Vector],
        point: Self::Vector,
    ) -> Self::Vector;
    fn face_raycast(
        face: &[usize],
        vertices: &[Self::Vector],
        origin: Self::Vector,
        direction: Self::Vector,
    ) -> Option<f32>;
    /// Signed mass and raw inertia of the cone spanned by the face and the
    /// origin (canonical-simplex decomposition, summed over all faces).
    fn simplex_matter(face: &[usize], vertices: &[Self::Vector]) -> (f32, Self::Inertia);

    /// Same face with reversed winding.
    fn flip_face(face: Self::FaceIndex) -> Self::FaceIndex;

    /// Unit-density ball volume.
    fn ball_volume(radius: f32) -> f32;
    /// Ball inertia about its own center.
    fn ball_inertia(mass: f32, radius: f32) -> Self::Inertia;

    /// Distinct edges used by the clipping fallback. 2D faces already are
    /// edges; 3D drops edges shared by coplanar face pairs.
    fn polytope_edges(
        faces: &[Self::FaceIndex],
        vertices: &[Self::Vector],
    ) -> Vec<[usize; 2]>;
}

/// Two-dimensional instantiation: `Vec2`, scalar spin, angle rotation,
/// scalar inertia.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dim2;

/// Three-dimensional instantiation: `Vec3`, vector spin, quaternion
/// rotation, tensor inertia.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dim3;

impl Dim for Dim2 {
    const DIM: usize = 2;

    type Vector = Vec2;
    type Angular = f32;
    type Rotation = Rot2;
    type Inertia = f32;
    type Cell = IVec2;
    type FaceIndex = [usize; 2];

    fn dot(a: Vec2, b: Vec2) -> f32 {
        a.dot(b)
    }

    fn vmin(a: Vec2, b: Vec2) -> Vec2 {
        a.min(b)
    }

    fn vmax(a: Vec2, b: Vec2) -> Vec2 {
        a.max(b)
    }

    fn splat(value: f32) -> Vec2 {
        Vec2::splat(value)
    }

    fn is_finite(v: Vec2) -> bool {
        v.is_finite()
    }

    fn element_product(v: Vec2) -> f32 {
        v.element_product()
    }

    fn cross(a: Vec2, b: Vec2) -> f32 {
        a.perp_dot(b)
    }

    fn angular_cross(w: f32, r: Vec2) -> Vec2 {
        r.perp() * w
    }

    fn angular_dot(a: f32, b: f32) -> f32 {
        a * b
    }

    fn axis_cross(_a: Vec2, _b: Vec2) -> Option<Vec2> {
        None
    }

    fn no_rotation() -> Rot2 {
        Rot2(0.0)
    }

    fn apply_rotation(r: Rot2, v: Vec2) -> Vec2 {
        Vec2::from_angle(r.0).rotate(v)
    }

    fn advance_rotation(r: Rot2, w: f32, dt: f32) -> Rot2 {
        Rot2(r.0 + w * dt)
    }

    fn rotation_delta(current: Rot2, previous: Rot2) -> f32 {
        current.0 - previous.0
    }

    fn inertia_zero() -> f32 {
        0.0
    }

    fn inertia_infinite() -> f32 {
        f32::INFINITY
    }

    fn inertia_inverse(inertia: f32) -> f32 {
        // IEEE does the flooring: 1/inf == 0.
        1.0 / inertia
    }

    fn inertia_apply(inertia: f32, w: f32) -> f32 {
        inertia * w
    }

    fn inertia_rotate(inertia: f32, _r: Rot2) -> f32 {
        inertia
    }

    fn inertia_about(mass: f32, offset: Vec2) -> f32 {
        mass * offset.length_squared()
    }

    fn inertia_is_finite(inertia: f32) -> bool {
        inertia.is_finite()
    }

    fn visit_cells(min: Vec2, max: Vec2, cell_size: f32, visit: &mut dyn FnMut(IVec2)) {
        let lo = (min / cell_size).floor().as_ivec2();
        let hi = (max / cell_size).floor().as_ivec2();
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                visit(IVec2::new(x, y));
            }
        }
    }

    fn face_normal(face: &[usize], vertices: &[Vec2]) -> Vec2 {
        let edge = vertices[face[1]] - vertices[face[0]];
        edge.perp().normalize_or_zero()
    }

    fn face_closest_point(face: &[usize], vertices: &[Vec2], point: Vec2) -> Vec2 {
        let a = vertices[face[0]];
        let b = vertices[face[1]];
        let edge = b - a;
        let len_sq = edge.length_squared();
        if len_sq <= EPSILON {
            return a;
        }
        let t = ((point - a).dot(edge) / len_sq).clamp(0.0, 1.0);
        a + edge * t
    }

    fn face_raycast(face: &[usize], vertices: &[Vec2], origin: Vec2, direction: Vec2) -> Option<f32> {
        let a = vertices[face[0]];
        let b = vertices[face[1]];
        let edge = b - a;
        let denom = direction.perp_dot(edge);
        if denom.abs() <= EPSILON {
            return None;
        }
        let to_a = a - origin;
        let t = to_a.perp_dot(edge) / denom;
        let s = to_a.perp_dot(direction) / denom;
        if t > EPSILON && (0.0..=1.0).contains(&s) {
            Some(t)
        } else {
            None
        }
    }

    fn simplex_matter(face: &[usize], vertices: &[Vec2]) -> (f32, f32) {
        let a = vertices[face[0]];
        let b = vertices[face[1]];
        // Columns are the vertices; rows collect one coordinate across them.
        let det = a.perp_dot(b);
        let mass = det / 2.0;

        let rows = [Vec2::new(a.x, b.x), Vec2::new(a.y, b.y)];
        let product =
            |i: usize, j: usize| rows[i].element_sum() * rows[j].element_sum() + rows[i].dot(rows[j]);

        let raw = product(0, 0) + product(1, 1);
        (mass, raw * (det / 24.0))
    }

    fn flip_face(face: [usize; 2]) -> [usize; 2] {
        [face[1], face[0]]
    }

    fn ball_volume(radius: f32) -> f32 {
        std::f32::consts::PI * radius * radius
    }

    fn ball_inertia(mass: f32, radius: f32) -> f32 {
        0.5 * mass * radius * radius
    }

    fn polytope_edges(faces: &[[usize; 2]], _vertices: &[Vec2]) -> Vec<[usize; 2]> {
        faces.to_vec()
    }
}

impl Dim for Dim3 {
    const DIM: usize = 3;

    type Vector = Vec3;
    type Angular = Vec3;
    type Rotation = Quat;
    type Inertia = Mat3;
    type Cell = IVec3;
    type FaceIndex = [usize; 3];

    fn dot(a: Vec3, b: Vec3) -> f32 {
        a.dot(b)
    }

    fn vmin(a: Vec3, b: Vec3) -> Vec3 {
        a.min(b)
    }

    fn vmax(a: Vec3, b: Vec3) -> Vec3 {
        a.max(b)
    }

    fn splat(value: f32) -> Vec3 {
        Vec3::splat(value)
    }

    fn is_finite(v: Vec3) -> bool {
        v.is_finite()
    }

    fn element_product(v: Vec3) -> f32 {
        v.element_product()
    }

    fn cross(a: Vec3, b: Vec3) -> Vec3 {
        a.cross(b)
    }

    fn angular_cross(w: Vec3, r: Vec3) -> Vec3 {
        w.cross(r)
    }

    fn angular_dot(a: Vec3, b: Vec3) -> f32 {
        a.dot(b)
    }

    fn axis_cross(a: Vec3, b: Vec3) -> Option<Vec3> {
        let axis = a.cross(b);
        if axis.length_squared() > EPSILON * EPSILON {
            Some(axis.normalize())
        } else {
            None
        }
    }

    fn no_rotation() -> Quat {
        Quat::IDENTITY
    }

    fn apply_rotation(r: Quat, v: Vec3) -> Vec3 {
        r * v
    }

    fn advance_rotation(r: Quat, w: Vec3, dt: f32) -> Quat {
        let scaled = w * dt;
        if scaled.length_squared() <= EPSILON * EPSILON {
            return r;
        }
        (Quat::from_scaled_axis(scaled) * r).normalize()
    }

    fn rotation_delta(current: Quat, previous: Quat) -> Vec3 {
        (current * previous.inverse()).normalize().to_scaled_axis()
    }

    fn inertia_zero() -> Mat3 {
        Mat3::ZERO
    }

    fn inertia_infinite() -> Mat3 {
        Mat3::from_diagonal(Vec3::splat(f32::INFINITY))
    }

    fn inertia_inverse(inertia: Mat3) -> Mat3 {
        if !inertia.is_finite() {
            return Mat3::ZERO;
        }
        let det = inertia.determinant();
        if det.abs() <= EPSILON {
            return Mat3::ZERO;
        }
        inertia.inverse()
    }

    fn inertia_apply(inertia: Mat3, w: Vec3) -> Vec3 {
        inertia * w
    }

    fn inertia_rotate(inertia: Mat3, r: Quat) -> Mat3 {
        let rot = Mat3::from_quat(r);
        rot * inertia * rot.transpose()
    }

    fn precess(inertia: Mat3, inv_inertia: Mat3, previous: Quat, next: Quat, w: Vec3) -> Vec3 {
        let momentum = Self::inertia_apply(Self::inertia_rotate(inertia, previous), w);
        Self::inertia_apply(Self::inertia_rotate(inv_inertia, next), momentum)
    }

    fn inertia_about(mass: f32, offset: Vec3) -> Mat3 {
        let Vec3 { x, y, z } = offset;
        Mat3::from_cols(
            Vec3::new(y * y + z * z, -y * x, -z * x),
            Vec3::new(-x * y, x * x + z * z, -z * y),
            Vec3::new(-x * z, -y * z, x * x + y * y),
        ) * mass
    }

    fn inertia_is_finite(inertia: Mat3) -> bool {
        inertia.is_finite()
    }

    fn visit_cells(min: Vec3, max: Vec3, cell_size: f32, visit: &mut dyn FnMut(IVec3)) {
        let lo = (min / cell_size).floor().as_ivec3();
        let hi = (max / cell_size).floor().as_ivec3();
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                for z in lo.z..=hi.z {
                    visit(IVec3::new(x, y, z));
                }
            }
        }
    }

    fn face_normal(face: &[usize], vertices: &[Vec3]) -> Vec3 {
        let a = vertices[face[0]];
        let b = vertices[face[1]];
        let c = vertices[face[2]];
        (b - a).cross(c - a).normalize_or_zero()
    }

    fn face_closest_point(face: &[usize], vertices: &[Vec3], point: Vec3) -> Vec3 {
        closest_point_on_triangle(
            vertices[face[0]],
            vertices[face[1]],
            vertices[face[2]],
            point,
        )
    }

    fn face_raycast(face: &[usize], vertices: &[Vec3], origin: Vec3, direction: Vec3) -> Option<f32> {
        // Möller–Trumbore, both windings accepted.
        let a = vertices[face[0]];
        let ab = vertices[face[1]] - a;
        let ac = vertices[face[2]] - a;
        let p = direction.cross(ac);
        let det = ab.dot(p);
        if det.abs() <= EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;
        let to_origin = origin - a;
        let u = to_origin.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = to_origin.cross(ab);
        let v = direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = ac.dot(q) * inv_det;
        if t > EPSILON {
            Some(t)
        } else {
            None
        }
    }

    fn simplex_matter(face: &[usize], vertices: &[Vec3]) -> (f32, Mat3) {
        let a = vertices[face[0]];
        let b = vertices[face[1]];
        let c = vertices[face[2]];
        let det = Mat3::from_cols(a, b, c).determinant();
        let mass = det / 6.0;

        let rows = [
            Vec3::new(a.x, b.x, c.x),
            Vec3::new(a.y, b.y, c.y),
            Vec3::new(a.z, b.z, c.z),
        ];
        let product =
            |i: usize, j: usize| rows[i].element_sum() * rows[j].element_sum() + rows[i].dot(rows[j]);

        let raw = Mat3::from_cols(
            Vec3::new(
                product(1, 1) + product(2, 2),
                -product(0, 1),
                -product(0, 2),
            ),
            Vec3::new(
                -product(0, 1),
                product(0, 0) + product(2, 2),
                -product(1, 2),
            ),
            Vec3::new(
                -product(0, 2),
                -product(1, 2),
                product(0, 0) + product(1, 1),
            ),
        );
        (mass, raw * (det / 120.0))
    }

    fn flip_face(face: [usize; 3]) -> [usize; 3] {
        [face[1], face[0], face[2]]
    }

    fn ball_volume(radius: f32) -> f32 {
        4.0 / 3.0 * std::f32::consts::PI * radius.powi(3)
    }

    fn ball_inertia(mass: f32, radius: f32) -> Mat3 {
        Mat3::from_diagonal(Vec3::splat(0.4 * mass * radius * radius))
    }

    fn polytope_edges(faces: &[[usize; 3]], vertices: &[Vec3]) -> Vec<[usize; 2]> {
        // Edges shared by two coplanar faces are interior and dropped.
        // Linear scan keeps the order deterministic.
        let mut found: Vec<([usize; 2], Vec3, bool)> = Vec::new();
        for face in faces {
            let normal = Self::face_normal(face, vertices);
            for (i, j) in [(0, 1), (1, 2), (0, 2)] {
                let key = if face[i] < face[j] {
                    [face[i], face[j]]
                } else {
                    [face[j], face[i]]
                };
                match found.iter_mut().find(|(k, _, _)| *k == key) {
                    Some(entry) => {
                        if entry.1.abs_diff_eq(normal, EPSILON)
                            || entry.1.abs_diff_eq(-normal, EPSILON)
                        {
                            entry.2 = false;
                        }
                    }
                    None => found.push((key, normal, true)),
                }
            }
        }
        found
            .into_iter()
            .filter_map(|(key, _, keep)| keep.then_some(key))
            .collect()
    }
}

fn closest_point_on_triangle(a: Vec3, b: Vec3, c: Vec3, p: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let t = d1 / (d1 - d3);
        return a + ab * t;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let t = d2 / (d2 - d6);
        return a + ac * t;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let t = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * t;
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}
