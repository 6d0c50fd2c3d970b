//! Contact-point generation by clipping one polytope's features against the
//! other's (inward-facing) planes.

use crate::config::equals;
use crate::core::dim::Dim;
use crate::core::types::Plane;

/// Slack applied when testing containment, so surfaces in exact contact
/// still produce points.
const TOLERANCE: f32 = 1e-4;

/// Vertices of one shape lying inside all of the other's planes.
pub fn clip_vertices<D: Dim>(vertices: &[D::Vector], planes: &[Plane<D>]) -> Vec<D::Vector> {
    vertices
        .iter()
        .copied()
        .filter(|&v| {
            planes
                .iter()
                .all(|plane| D::dot(plane.normal, v) >= plane.distance - TOLERANCE)
        })
        .collect()
}

/// Midpoints of one shape's edges clipped to the other's volume. Used when
/// no vertex of either shape is contained, as with crossed boxes.
pub fn clip_edges<D: Dim>(
    edges: &[[usize; 2]],
    vertices: &[D::Vector],
    planes: &[Plane<D>],
) -> Vec<D::Vector> {
    let mut contacts = Vec::new();
    'edges: for &[i, j] in edges {
        let mut a = vertices[i];
        let mut b = vertices[j];
        for plane in planes {
            let height_a = D::dot(plane.normal, a) - plane.distance;
            let height_b = D::dot(plane.normal, b) - plane.distance;
            let keep_a = height_a > -TOLERANCE;
            let keep_b = height_b > -TOLERANCE;
            if keep_a == keep_b || equals(height_a, height_b) {
                if !keep_a {
                    continue 'edges;
                }
                continue;
            }
            let t = height_a / (height_a - height_b);
            let crossing = a + (b - a) * t;
            if keep_a {
                b = crossing;
            } else {
                a = crossing;
            }
        }
        contacts.push((a + b) * 0.5);
    }
    contacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::Shape;
    use crate::core::dim::Dim2;
    use glam::Vec2;

    fn square_planes(shape: &Shape<Dim2>) -> Vec<Plane<Dim2>> {
        match shape {
            Shape::Polytope(poly) => poly.planes.clone(),
            Shape::Ball(_) => unreachable!(),
        }
    }

    #[test]
    fn contained_vertices_survive_clipping() {
        let big = Shape::rectangle(Vec2::ZERO, 4.0, 4.0);
        let small = Shape::rectangle(Vec2::new(1.5, 0.0), 2.0, 2.0);
        let planes = square_planes(&big);
        if let Shape::Polytope(poly) = &small {
            let kept = clip_vertices::<Dim2>(&poly.vertices, &planes);
            // the two left vertices of the small square are inside
            assert_eq!(kept.len(), 2);
            for v in kept {
                assert!(v.x <= 2.0 + 1e-4);
            }
        }
    }

    #[test]
    fn crossed_boxes_clip_by_edges() {
        // A tall and a wide box overlapping in a plus sign: no vertex of
        // either lies inside the other.
        let tall = Shape::rectangle(Vec2::ZERO, 1.0, 6.0);
        let wide = Shape::rectangle(Vec2::ZERO, 6.0, 1.0);
        let wide_planes = square_planes(&wide);
        if let Shape::Polytope(tall_poly) = &tall {
            let vertex_contacts = clip_vertices::<Dim2>(&tall_poly.vertices, &wide_planes);
            assert!(vertex_contacts.is_empty());
            let edge_contacts =
                clip_edges::<Dim2>(&tall_poly.edges, &tall_poly.vertices, &wide_planes);
            assert!(!edge_contacts.is_empty());
            for contact in &edge_contacts {
                assert!(contact.x.abs() <= 0.5 + 1e-4);
                assert!(contact.y.abs() <= 0.5 + 1e-4);
            }
        }
    }
}
