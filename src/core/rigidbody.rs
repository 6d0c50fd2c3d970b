//! Rigid bodies and their colliders.
//!
//! Each collider keeps a local-space shape and a world-space copy guarded by
//! a clean/dirty flag; any motion invalidates the copy and the next reader
//! pays for the resync. Body-level bounds are rotation-invariant for dynamic
//! bodies (so spinning never stales them) and exact for static ones.

use serde::{Deserialize, Serialize};

use crate::config::PROHIBITED_ALIGNMENT;
use crate::core::dim::Dim;
use crate::core::matter::Matter;
use crate::core::types::{Aabb, Transform, Velocity};
use crate::collision::shapes::Shape;
use crate::utils::allocator::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheState {
    Clean,
    Dirty,
}

/// One shape attached to a body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Collider<D: Dim> {
    pub local: Shape<D>,
    world: Shape<D>,
    state: CacheState,
    /// Local-space bounds valid for the body's current mobility: a rotation
    /// proof cube for dynamic bodies, the exact rotated extent for static.
    pub bounds: Aabb<D>,
}

impl<D: Dim> Collider<D> {
    pub fn new(local: Shape<D>, dynamic: bool, orientation: D::Rotation) -> Self {
        let world = local.clone();
        let mut collider = Self {
            local,
            world,
            state: CacheState::Dirty,
            bounds: Aabb::from_half_extent(0.0),
        };
        collider.update_bounds(dynamic, orientation);
        collider
    }

    pub fn invalidate(&mut self) {
        self.state = CacheState::Dirty;
    }

    pub fn update_bounds(&mut self, dynamic: bool, orientation: D::Rotation) {
        self.bounds = if dynamic {
            self.local.ball_bounds()
        } else {
            self.local
                .transformed(&Transform::new(D::Vector::default(), orientation))
                .bounds()
        };
        self.state = CacheState::Dirty;
    }

    /// World-space shape, resynced on demand.
    pub fn world_shape(&mut self, transform: &Transform<D>) -> &Shape<D> {
        if self.state == CacheState::Dirty {
            self.world.sync_from(&self.local, transform);
            self.state = CacheState::Clean;
        }
        &self.world
    }

    /// World-space shape as last synced. Callers are responsible for having
    /// called [`Collider::world_shape`] since the last invalidation.
    pub(crate) fn cached_world(&self) -> &Shape<D> {
        debug_assert_eq!(self.state, CacheState::Clean);
        &self.world
    }
}

/// Directions a body learned it cannot move in this step, each backed by a
/// static contact somewhere in its support chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Prohibited<D: Dim> {
    directions: Vec<D::Vector>,
}

impl<D: Dim> Prohibited<D> {
    pub fn clear(&mut self) {
        self.directions.clear();
    }

    pub fn add(&mut self, direction: D::Vector) {
        self.directions.push(direction);
    }

    pub fn directions(&self) -> &[D::Vector] {
        &self.directions
    }

    /// Stored direction sufficiently aligned with `direction`, if any.
    pub fn matching(&self, direction: D::Vector) -> Option<D::Vector> {
        self.directions
            .iter()
            .copied()
            .find(|&stored| D::dot(stored, direction) > PROHIBITED_ALIGNMENT)
    }
}

/// Which time derivative an impulse acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivative {
    Position,
    Velocity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct RigidBody<D: Dim> {
    pub id: EntityId,
    pub dynamic: bool,
    pub position: Transform<D>,
    pub last_position: Transform<D>,
    pub velocity: Velocity<D>,
    pub colliders: Vec<Collider<D>>,
    /// Mass properties in body space, already scaled by `density`.
    pub local_matter: Matter<D>,
    /// Mass properties the solver sees: world-rotated for free dynamic
    /// bodies, infinite where motion is forbidden.
    pub matter: Matter<D>,
    local_bounds: Aabb<D>,
    pub bounds: Aabb<D>,
    last_bounded_orientation: D::Rotation,
    #[serde(skip)]
    pub prohibited: Prohibited<D>,
    /// Joints attached to this body, maintained by the engine.
    pub constraints: Vec<EntityId>,
    pub density: f32,
    pub restitution: f32,
    pub friction: f32,
    pub simulated: bool,
    pub gravity: bool,
    pub air_resistance: bool,
    pub can_rotate: bool,
    pub can_collide: bool,
    pub is_trigger: bool,
    /// When false the host's trigger rule is consulted per pair.
    pub trivial_trigger_rule: bool,
    /// When false the host's collision rule is consulted per pair.
    pub trivial_collision_rule: bool,
}

impl<D: Dim> RigidBody<D> {
    pub fn new(position: D::Vector, dynamic: bool) -> Self {
        let transform = Transform::from_translation(position);
        Self {
            id: EntityId::default(),
            dynamic,
            position: transform,
            last_position: transform,
            velocity: Velocity::default(),
            colliders: Vec::new(),
            local_matter: Matter::zero(),
            matter: if dynamic {
                Matter::zero()
            } else {
                Matter::immovable()
            },
            local_bounds: Aabb::at_point(D::Vector::default()),
            bounds: Aabb::at_point(position),
            last_bounded_orientation: D::no_rotation(),
            prohibited: Prohibited::default(),
            constraints: Vec::new(),
            density: 1.0,
            restitution: 0.0,
            friction: 0.5,
            simulated: true,
            gravity: true,
            air_resistance: true,
            can_rotate: true,
            can_collide: true,
            is_trigger: false,
            trivial_trigger_rule: true,
            trivial_collision_rule: true,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn add_shape(&mut self, shape: Shape<D>) {
        let mut matter = shape.matter();
        matter.scale(self.density);
        self.local_matter.add(&matter);
        self.colliders.push(Collider::new(
            shape,
            self.dynamic,
            self.position.orientation,
        ));
        self.refresh_local_bounds();
        self.sync();
    }

    pub fn remove_shape(&mut self, index: usize) {
        if index >= self.colliders.len() {
            return;
        }
        let collider = self.colliders.remove(index);
        let mut matter = collider.local.matter();
        matter.scale(self.density);
        self.local_matter.subtract(&matter);
        self.refresh_local_bounds();
        self.sync();
    }

    pub fn remove_all_shapes(&mut self) {
        self.colliders.clear();
        self.local_matter = Matter::zero();
        self.refresh_local_bounds();
        self.sync();
    }

    pub fn set_density(&mut self, density: f32) {
        if density <= 0.0 {
            return;
        }
        self.local_matter.scale(density / self.density);
        self.density = density;
        self.sync();
    }

    pub fn set_dynamic(&mut self, dynamic: bool) {
        if self.dynamic == dynamic {
            return;
        }
        self.dynamic = dynamic;
        for collider in &mut self.colliders {
            collider.update_bounds(dynamic, self.position.orientation);
        }
        self.refresh_local_bounds();
        self.sync();
    }

    fn refresh_local_bounds(&mut self) {
        let mut bounds: Option<Aabb<D>> = None;
        for collider in &self.colliders {
            bounds = Some(match bounds {
                Some(b) => b.union(&collider.bounds),
                None => collider.bounds,
            });
        }
        self.local_bounds = bounds.unwrap_or(Aabb::at_point(D::Vector::default()));
        self.last_bounded_orientation = self.position.orientation;
    }

    fn sync_matter(&mut self) {
        self.matter = if self.dynamic && self.can_rotate {
            self.local_matter.rotated(self.position.orientation)
        } else {
            let mass = if self.dynamic {
                self.local_matter.mass
            } else {
                f32::INFINITY
            };
            Matter::new(mass, D::inertia_infinite())
        };
    }

    /// Bring matter, bounds and collider caches in line with the current
    /// transform. Call after any change to position or orientation.
    pub fn sync(&mut self) {
        self.sync_matter();
        for collider in &mut self.colliders {
            collider.invalidate();
        }
        self.bounds = self.local_bounds.translated(self.position.linear);
    }

    /// Per-step refresh. Static bodies that were rotated since the last step
    /// get their exact bounds re-derived here.
    pub fn cache(&mut self) {
        if !self.dynamic && self.position.orientation != self.last_bounded_orientation {
            for collider in &mut self.colliders {
                collider.update_bounds(false, self.position.orientation);
            }
            self.refresh_local_bounds();
        }
        self.sync();
    }

    pub fn integrate(&mut self, dt: f32) {
        self.last_position = self.position;
        if !self.can_rotate {
            self.velocity.angular = D::Angular::default();
        }
        self.position.linear += self.velocity.linear * dt;
        self.position.orientation =
            D::advance_rotation(self.position.orientation, self.velocity.angular, dt);
        // the rotated inertia tensor carries the angular momentum, not the
        // angular velocity, so tumbling bodies precess
        if self.dynamic && self.can_rotate {
            self.velocity.angular = D::precess(
                self.local_matter.inertia,
                self.local_matter.inv_inertia,
                self.last_position.orientation,
                self.position.orientation,
                self.velocity.angular,
            );
        }
        self.sync();
    }

    /// Velocity implied by the last positional update.
    pub fn recompute_velocity(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        self.velocity.linear = (self.position.linear - self.last_position.linear) / dt;
        self.velocity.angular =
            D::rotation_delta(self.position.orientation, self.last_position.orientation)
                * (1.0 / dt);
    }

    /// Impulse applied at `offset` from the center, acting on the chosen
    /// derivative. Ignored on non-dynamic bodies.
    pub fn apply_impulse(&mut self, derivative: Derivative, offset: D::Vector, impulse: D::Vector) {
        if !self.dynamic {
            return;
        }
        let linear = impulse * self.matter.inv_mass;
        let angular = if self.can_rotate {
            Some(D::inertia_apply(
                self.matter.inv_inertia,
                D::cross(offset, impulse),
            ))
        } else {
            None
        };
        match derivative {
            Derivative::Position => {
                self.position.linear += linear;
                if let Some(delta) = angular {
                    self.position.orientation =
                        D::advance_rotation(self.position.orientation, delta, 1.0);
                }
            }
            Derivative::Velocity => {
                self.velocity.linear += linear;
                if let Some(delta) = angular {
                    self.velocity.angular += delta;
                }
            }
        }
    }

    /// Velocity of the material point at `offset` from the center.
    pub fn point_velocity(&self, offset: D::Vector) -> D::Vector {
        self.velocity.linear + D::angular_cross(self.velocity.angular, offset)
    }

    pub fn mass(&self) -> f32 {
        self.local_matter.mass
    }

    /// World-space inertia regardless of mobility flags.
    pub fn inertia(&self) -> D::Inertia {
        self.local_matter.rotated(self.position.orientation).inertia
    }

    pub fn kinetic_energy(&self) -> f32 {
        let mut energy =
            0.5 * self.local_matter.mass * D::length_squared(self.velocity.linear);
        if self.can_rotate {
            let inertia = self.inertia();
            energy += 0.5
                * D::angular_dot(
                    D::inertia_apply(inertia, self.velocity.angular),
                    self.velocity.angular,
                );
        }
        energy
    }

    /// Nearest surface hit along the unit `direction`, if any.
    pub fn raycast(&mut self, origin: D::Vector, direction: D::Vector) -> Option<f32> {
        let transform = self.position;
        let mut best: Option<f32> = None;
        for collider in &mut self.colliders {
            if let Some(t) = collider.world_shape(&transform).raycast(origin, direction) {
                best = Some(best.map_or(t, |b| b.min(t)));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dim::{Dim2, Rot2};
    use approx::assert_relative_eq;
    use glam::Vec2;

    fn unit_square_body(dynamic: bool) -> RigidBody<Dim2> {
        let mut body = RigidBody::new(Vec2::ZERO, dynamic);
        body.add_shape(Shape::rectangle(Vec2::ZERO, 1.0, 1.0));
        body
    }

    #[test]
    fn static_matter_is_immovable_regardless_of_shapes() {
        let body = unit_square_body(false);
        assert_eq!(body.matter.inv_mass, 0.0);
        assert_eq!(body.matter.inv_inertia, 0.0);
        assert_relative_eq!(body.mass(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn density_scales_matter_linearly() {
        let mut body = unit_square_body(true);
        let base = body.mass();
        body.set_density(3.0);
        assert_relative_eq!(body.mass(), base * 3.0, epsilon = 1e-5);
        body.set_density(1.0);
        assert_relative_eq!(body.mass(), base, epsilon = 1e-5);
    }

    #[test]
    fn integrate_moves_and_remembers() {
        let mut body = unit_square_body(true);
        body.velocity.linear = Vec2::new(2.0, 0.0);
        body.integrate(0.5);
        assert_relative_eq!(body.position.linear.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(body.last_position.linear.x, 0.0, epsilon = 1e-6);
        let half = (body.bounds.max.x - body.bounds.min.x) * 0.5;
        assert_relative_eq!(body.bounds.min.x, 1.0 - half, epsilon = 1e-4);
    }

    #[test]
    fn recompute_velocity_inverts_integration() {
        let mut body = unit_square_body(true);
        body.velocity.linear = Vec2::new(1.5, -0.5);
        body.velocity.angular = 0.3;
        body.integrate(0.1);
        body.velocity = Velocity::default();
        body.recompute_velocity(0.1);
        assert_relative_eq!(body.velocity.linear.x, 1.5, epsilon = 1e-4);
        assert_relative_eq!(body.velocity.angular, 0.3, epsilon = 1e-4);
    }

    #[test]
    fn impulses_ignore_static_bodies() {
        let mut body = unit_square_body(false);
        body.apply_impulse(Derivative::Velocity, Vec2::ZERO, Vec2::new(10.0, 0.0));
        assert_eq!(body.velocity.linear, Vec2::ZERO);
    }

    #[test]
    fn rotation_lock_zeroes_spin_and_hardens_inertia() {
        let mut body = unit_square_body(true);
        body.can_rotate = false;
        body.velocity.angular = 5.0;
        body.sync();
        assert_eq!(body.matter.inv_inertia, 0.0);
        body.integrate(0.1);
        assert_eq!(body.velocity.angular, 0.0);
    }

    #[test]
    fn a_tumbling_cuboid_conserves_angular_momentum() {
        use crate::core::dim::Dim3;
        use glam::Vec3;

        let mut body = RigidBody::<Dim3>::new(Vec3::ZERO, true);
        body.add_shape(Shape::cuboid(Vec3::ZERO, Vec3::new(1.0, 0.5, 0.25)));
        // spin off every principal axis so the tumble actually precesses
        body.velocity.angular = Vec3::new(3.0, 1.0, 2.0);

        let momentum = |body: &RigidBody<Dim3>| {
            Dim3::inertia_apply(
                Dim3::inertia_rotate(body.local_matter.inertia, body.position.orientation),
                body.velocity.angular,
            )
        };
        let initial = momentum(&body);
        for _ in 0..200 {
            body.integrate(1.0 / 240.0);
            let current = momentum(&body);
            assert!(
                current.normalize().dot(initial.normalize()) > 0.999,
                "momentum drifted to {current:?}"
            );
            assert_relative_eq!(current.length(), initial.length(), epsilon = 1e-2);
        }
        // the spin itself must have wandered for the check to mean anything
        assert!(
            body.velocity
                .angular
                .normalize()
                .dot(Vec3::new(3.0, 1.0, 2.0).normalize())
                < 0.9999
        );
    }

    #[test]
    fn prohibited_matching_uses_alignment_threshold() {
        let mut prohibited = Prohibited::<Dim2>::default();
        prohibited.add(Vec2::Y);
        assert!(prohibited.matching(Vec2::Y).is_some());
        // 45 degrees off: dot = 0.707 < 0.8
        assert!(prohibited
            .matching(Vec2::new(1.0, 1.0).normalize())
            .is_none());
        // 30 degrees off: dot ~ 0.866 > 0.8
        let near = Vec2::new(0.5, 3f32.sqrt() * 0.5);
        assert!(prohibited.matching(near).is_some());
    }

    #[test]
    fn static_rotation_rederives_bounds() {
        let mut body = RigidBody::<Dim2>::new(Vec2::ZERO, false);
        body.add_shape(Shape::rectangle(Vec2::ZERO, 4.0, 1.0));
        body.cache();
        let wide = body.bounds;
        body.position.orientation = Rot2(std::f32::consts::FRAC_PI_2);
        body.cache();
        assert_relative_eq!(body.bounds.max.y, wide.max.x, epsilon = 1e-4);
        assert_relative_eq!(body.bounds.max.x, wide.max.y, epsilon = 1e-4);
    }
}
