//! Broad phase: a uniform spatial hash rebuilt every step.
//!
//! The cell size is derived from the population itself, targeting 2^DIM
//! cells per collider, so the grid adapts to the scene's scale without
//! tuning. Insertion stretches each collider's bounds forward by one frame
//! of velocity, which keeps fast movers paired with what they are about to
//! hit.

use std::collections::HashMap;

use log::trace;

use crate::core::dim::Dim;
use crate::core::rigidbody::RigidBody;
use crate::utils::allocator::{Arena, EntityId};

pub struct SpatialHash<D: Dim> {
    cells: HashMap<D::Cell, Vec<EntityId>>,
    cell_size: f32,
    dt: f32,
    /// Query stamp; bumping it invalidates all `visited` entries at once.
    wave: u64,
    visited: HashMap<EntityId, u64>,
}

impl<D: Dim> Default for SpatialHash<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dim> SpatialHash<D> {
    pub fn new() -> Self {
        Self {
            cells: HashMap::new(),
            cell_size: 1.0,
            dt: 0.0,
            wave: 0,
            visited: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Rebuild the grid from the simulated population.
    pub fn build(&mut self, bodies: &Arena<RigidBody<D>>, simulated: &[EntityId], dt: f32) {
        self.cells.clear();
        self.visited.clear();
        self.wave = 0;
        self.dt = dt;
        self.cell_size = Self::derive_cell_size(bodies, simulated);
        trace!("spatial hash cell size {}", self.cell_size);

        for &id in simulated {
            let Some(body) = bodies.get(id) else { continue };
            if !body.can_collide || body.colliders.is_empty() {
                continue;
            }
            let offset = body.position.linear + body.velocity.linear * dt;
            for collider in &body.colliders {
                let bounds = collider.bounds.translated(offset);
                D::visit_cells(bounds.min, bounds.max, self.cell_size, &mut |cell| {
                    self.cells.entry(cell).or_default().push(id);
                });
            }
        }
    }

    /// Cell size targeting `CELLS_PER_ITEM` cells per body, derived from the
    /// total volume of matter in the scene. Body-space matter is used so
    /// static bodies contribute their real volume rather than infinity.
    fn derive_cell_size(bodies: &Arena<RigidBody<D>>, simulated: &[EntityId]) -> f32 {
        let mut total_volume = 0.0;
        for &id in simulated {
            let Some(body) = bodies.get(id) else { continue };
            let volume = body.local_matter.mass / body.density;
            if volume.is_finite() && volume > 0.0 {
                total_volume += volume;
            }
        }
        if simulated.is_empty() || total_volume <= 0.0 {
            return 1.0;
        }
        let per_cell = total_volume / (simulated.len() * D::CELLS_PER_ITEM) as f32;
        per_cell.powf(1.0 / D::DIM as f32)
    }

    /// Bodies sharing at least one cell with `id` and passing `can_collide`,
    /// each reported once and never including `id` itself. Candidate order
    /// follows cell traversal order and is deterministic for a given build.
    pub fn query<F>(
        &mut self,
        bodies: &Arena<RigidBody<D>>,
        id: EntityId,
        can_collide: F,
    ) -> Vec<EntityId>
    where
        F: Fn(&RigidBody<D>, &RigidBody<D>) -> bool,
    {
        let Some(body) = bodies.get(id) else {
            return Vec::new();
        };
        self.wave += 1;
        self.visited.insert(id, self.wave);

        let offset = body.position.linear + body.velocity.linear * self.dt;
        let mut found = Vec::new();
        for collider in &body.colliders {
            let bounds = collider.bounds.translated(offset);
            D::visit_cells(bounds.min, bounds.max, self.cell_size, &mut |cell| {
                let Some(occupants) = self.cells.get(&cell) else {
                    return;
                };
                for &other in occupants {
                    if self.visited.get(&other) == Some(&self.wave) {
                        continue;
                    }
                    self.visited.insert(other, self.wave);
                    let passes = bodies
                        .get(other)
                        .is_some_and(|candidate| can_collide(body, candidate));
                    if passes {
                        found.push(other);
                    }
                }
            });
        }
        found
    }
}
