//! The engine: owns the bodies and joints, and advances the whole
//! simulation one frame at a time.
//!
//! A [`Engine::run`] call caches body state, relaxes joints against the full
//! frame interval, gathers collision candidates, and then runs the substep
//! loop: forces, integration, joint solving, contact solving. All solve
//! ordering is drawn from a seeded generator, so identical setups replay
//! identically.

use std::collections::HashMap;

use crate::collision::broadphase::SpatialHash;
use crate::collision::contact::Collision;
use crate::collision::narrowphase::Detector;
use crate::collision::queries::{Ray, RayHit};
use crate::config::{
    CONFUSION_LIMIT, DEFAULT_CONSTRAINT_ITERATIONS, DEFAULT_CONTACT_ITERATIONS, DEFAULT_DRAG,
    DEFAULT_ITERATIONS, DEFAULT_SEED, ERROR_PER_ISLAND, IMPROVEMENT_THRESHOLD, PRESOLVE_BATCH,
    PRESOLVE_ITERATIONS,
};
use crate::core::dim::Dim;
use crate::core::rigidbody::RigidBody;
use crate::dynamics::constraint::propagate_dynamic;
use crate::dynamics::contacts::ContactConstraint;
use crate::dynamics::integrator::{apply_forces, integrate};
use crate::dynamics::island::count_islands;
use crate::dynamics::joints::{JointConstraint, JointDescriptor};
use crate::dynamics::solver::{Resolver, SolvePass};
use crate::utils::allocator::{Arena, EntityId};
use crate::utils::logging::{warn_if_budget_exceeded, ScopedTimer};
use crate::utils::profiling::StepProfile;
use crate::utils::random::XorShift;

/// Host hooks for collision filtering and notification.
///
/// The rule methods are only consulted for bodies whose corresponding
/// `trivial_*_rule` flag is cleared; leaving the flags set keeps the hot
/// path free of dynamic dispatch.
pub trait EventHandler<D: Dim> {
    /// Whether these two bodies may collide at all. Checked in both orders;
    /// either side can veto the pair.
    fn collision_rule(&self, _a: &RigidBody<D>, _b: &RigidBody<D>) -> bool {
        true
    }

    /// Whether `a` should treat contact with `b` as a trigger (reported but
    /// not resolved).
    fn trigger_rule(&self, _a: &RigidBody<D>, _b: &RigidBody<D>) -> bool {
        false
    }

    /// Called once per touching pair per [`Engine::run`], before any contact
    /// impulses for that pair are applied.
    fn on_collide(
        &mut self,
        _a: EntityId,
        _b: EntityId,
        _normal: D::Vector,
        _contacts: &[D::Vector],
        _trigger_a: bool,
        _trigger_b: bool,
    ) {
    }
}

/// Default handler: no filtering, no triggers, no notifications.
pub struct SilentEvents;

impl<D: Dim> EventHandler<D> for SilentEvents {}

/// Tracks whether presolve iterations are still making progress. A single
/// poor iteration is forgiven; only several stalls in a row give up.
struct Confusion {
    last_error: f32,
    stalls: usize,
}

impl Confusion {
    fn new() -> Self {
        Self {
            last_error: f32::INFINITY,
            stalls: 0,
        }
    }

    fn stalled(&mut self, error: f32) -> bool {
        if error > self.last_error - IMPROVEMENT_THRESHOLD {
            self.stalls += 1;
        } else {
            self.stalls = 0;
        }
        self.last_error = error;
        self.stalls > CONFUSION_LIMIT
    }
}

pub struct Engine<D: Dim> {
    bodies: Arena<RigidBody<D>>,
    descriptors: Arena<JointDescriptor<D>>,
    sim_bodies: Vec<EntityId>,
    dyn_bodies: Vec<EntityId>,
    /// Pairs already reported this run, with whether they resolved to a
    /// trigger. Keyed on the ordered handle pair.
    trigger_cache: HashMap<(EntityId, EntityId), bool>,
    detector: Detector<D>,
    hash: SpatialHash<D>,
    rng: XorShift,
    handler: Box<dyn EventHandler<D>>,
    profile: StepProfile,
    pub gravity: D::Vector,
    pub drag: f32,
    pub iterations: usize,
    pub constraint_iterations: usize,
    pub contact_iterations: usize,
}

impl<D: Dim> Engine<D> {
    pub fn new(gravity: D::Vector) -> Self {
        Self {
            bodies: Arena::new(),
            descriptors: Arena::new(),
            sim_bodies: Vec::new(),
            dyn_bodies: Vec::new(),
            trigger_cache: HashMap::new(),
            detector: Detector::new(),
            hash: SpatialHash::new(),
            rng: XorShift::new(DEFAULT_SEED),
            handler: Box::new(SilentEvents),
            profile: StepProfile::default(),
            gravity,
            drag: DEFAULT_DRAG,
            iterations: DEFAULT_ITERATIONS,
            constraint_iterations: DEFAULT_CONSTRAINT_ITERATIONS,
            contact_iterations: DEFAULT_CONTACT_ITERATIONS,
        }
    }

    /// Reseed the solve-order generator. Simulations with the same seed and
    /// the same sequence of calls evolve bit-for-bit identically.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = XorShift::new(seed);
    }

    pub fn set_handler(&mut self, handler: Box<dyn EventHandler<D>>) {
        self.handler = handler;
    }

    pub fn profile(&self) -> &StepProfile {
        &self.profile
    }

    pub fn bodies(&self) -> &Arena<RigidBody<D>> {
        &self.bodies
    }

    pub fn body(&self, id: EntityId) -> Option<&RigidBody<D>> {
        self.bodies.get(id)
    }

    pub fn body_mut(&mut self, id: EntityId) -> Option<&mut RigidBody<D>> {
        self.bodies.get_mut(id)
    }

    pub fn add_body(&mut self, body: RigidBody<D>) -> EntityId {
        let id = self.bodies.insert(body);
        if let Some(body) = self.bodies.get_mut(id) {
            body.id = id;
        }
        id
    }

    /// Remove a body along with every joint attached to it.
    pub fn remove_body(&mut self, id: EntityId) -> Option<RigidBody<D>> {
        let body = self.bodies.remove(id)?;
        for &descriptor_id in &body.constraints {
            let Some(descriptor) = self.descriptors.remove(descriptor_id) else {
                continue;
            };
            for anchor in [descriptor.a, descriptor.b] {
                if anchor.body == id {
                    continue;
                }
                if let Some(other) = self.bodies.get_mut(anchor.body) {
                    other.constraints.retain(|&c| c != descriptor_id);
                }
            }
        }
        self.detector.prune(id);
        Some(body)
    }

    pub fn add_joint(&mut self, descriptor: JointDescriptor<D>) -> EntityId {
        let (a, b) = (descriptor.a.body, descriptor.b.body);
        let id = self.descriptors.insert(descriptor);
        if let Some(body) = self.bodies.get_mut(a) {
            body.constraints.push(id);
        }
        if b != a {
            if let Some(body) = self.bodies.get_mut(b) {
                body.constraints.push(id);
            }
        }
        id
    }

    pub fn remove_joint(&mut self, id: EntityId) -> Option<JointDescriptor<D>> {
        let descriptor = self.descriptors.remove(id)?;
        for anchor in [descriptor.a, descriptor.b] {
            if let Some(body) = self.bodies.get_mut(anchor.body) {
                body.constraints.retain(|&c| c != id);
            }
        }
        Some(descriptor)
    }

    pub fn joint(&self, id: EntityId) -> Option<&JointDescriptor<D>> {
        self.descriptors.get(id)
    }

    pub fn joints(&self) -> &Arena<JointDescriptor<D>> {
        &self.descriptors
    }

    /// Total kinetic energy of the dynamic, simulated bodies.
    pub fn kinetic_energy(&self) -> f32 {
        self.bodies
            .iter()
            .filter(|(_, body)| body.simulated && body.is_dynamic())
            .map(|(_, body)| body.kinetic_energy())
            .sum()
    }

    /// Nearest body hit by the ray, ignoring nothing: even non-colliding
    /// bodies are candidates.
    pub fn raycast(&mut self, origin: D::Vector, direction: D::Vector) -> Option<RayHit> {
        let ray = Ray::<D>::new(origin, direction)?;
        let mut best = None;
        for (id, body) in self.bodies.iter_mut() {
            if let Some(distance) = body.raycast(ray.origin, ray.direction) {
                best = RayHit::nearer(best, RayHit { body: id, distance });
            }
        }
        best
    }

    /// Advance the simulation by `delta_time` seconds.
    pub fn run(&mut self, delta_time: f32) {
        let timer = ScopedTimer::new("engine run");
        self.profile.reset();

        self.cache_bodies();
        self.trigger_cache.clear();
        self.presolve(delta_time);

        let pairs = self.collision_pairs(delta_time);
        self.profile.candidate_pairs = pairs.iter().map(|(_, found)| found.len()).sum();

        let substeps = self.iterations.max(1);
        let dt = delta_time / substeps as f32;
        for _ in 0..substeps {
            apply_forces(&mut self.bodies, &self.dyn_bodies, self.gravity, self.drag, dt);
            integrate(&mut self.bodies, &self.dyn_bodies, dt);
            self.solve_constraints(dt);
            self.solve_collisions(&pairs, dt);
        }

        self.profile.total = timer.elapsed();
        self.profile.report();
        warn_if_budget_exceeded(self.profile.total, delta_time * 1000.0);
    }

    /// Refresh cached matter and bounds, and collect this run's simulated
    /// and dynamic body lists.
    fn cache_bodies(&mut self) {
        self.sim_bodies.clear();
        self.dyn_bodies.clear();
        for (id, body) in self.bodies.iter_mut() {
            if !body.simulated {
                continue;
            }
            body.cache();
            self.sim_bodies.push(id);
            if body.is_dynamic() {
                self.dyn_bodies.push(id);
            }
        }
        self.profile.simulated_bodies = self.sim_bodies.len();
        self.profile.dynamic_bodies = self.dyn_bodies.len();
    }

    /// Order the body lists along gravity. Joint relaxation walks from the
    /// top of each hanging chain down; collision gathering walks the other
    /// way so stacks settle onto their supports.
    fn sort_bodies(&mut self, along_gravity: bool) {
        let bodies = &self.bodies;
        let gravity = self.gravity;
        let key = move |id: &EntityId| {
            bodies
                .get(*id)
                .map(|body| D::dot(body.position.linear, gravity))
                .unwrap_or(0.0)
        };
        let compare = move |a: &EntityId, b: &EntityId| {
            let ordering = key(a)
                .partial_cmp(&key(b))
                .unwrap_or(std::cmp::Ordering::Equal);
            if along_gravity {
                ordering
            } else {
                ordering.reverse()
            }
        };
        self.sim_bodies.sort_by(compare);
        self.dyn_bodies.sort_by(compare);
    }

    /// One solver instance per joint endpoint whose near side can move.
    fn build_joint_resolver(&self) -> Resolver<D, JointConstraint<D>> {
        let mut resolver = Resolver::new();
        for &id in &self.sim_bodies {
            let Some(body) = self.bodies.get(id) else {
                continue;
            };
            for &descriptor_id in &body.constraints {
                let Some(descriptor) = self.descriptors.get(descriptor_id) else {
                    continue;
                };
                resolver.add(JointConstraint::try_from_descriptor(
                    descriptor,
                    id,
                    &self.bodies,
                ));
            }
        }
        resolver
    }

    /// Relax joints positionally against the whole frame before any substep
    /// runs, so chains start the frame near their rest configuration. Stops
    /// early once the total error is small per island or stops improving.
    fn presolve(&mut self, delta_time: f32) {
        self.sort_bodies(true);
        let mut resolver = self.build_joint_resolver();
        if resolver.is_empty() {
            return;
        }

        let islands = count_islands(&self.bodies, &self.descriptors, &self.sim_bodies);
        self.profile.islands = islands;
        let target = ERROR_PER_ISLAND * islands as f32;

        let mut confusion = Confusion::new();
        for iteration in 0..PRESOLVE_ITERATIONS {
            let error = resolver.error(&self.bodies);
            if error < target || confusion.stalled(error) {
                break;
            }
            resolver.solve(
                &mut self.bodies,
                &mut self.rng,
                delta_time,
                PRESOLVE_BATCH,
                SolvePass::Position,
            );
            self.profile.presolve_iterations = iteration + 1;
        }
    }

    fn solve_constraints(&mut self, dt: f32) {
        let mut resolver = self.build_joint_resolver();
        if resolver.is_empty() {
            return;
        }
        resolver.solve(
            &mut self.bodies,
            &mut self.rng,
            dt,
            self.constraint_iterations,
            SolvePass::Position,
        );
        resolver.solve(&mut self.bodies, &mut self.rng, dt, 1, SolvePass::RecomputeVelocity);
        resolver.solve(&mut self.bodies, &mut self.rng, dt, 1, SolvePass::Velocity);
    }

    /// Broad-phase candidates for every dynamic body, gathered once per
    /// frame against velocity-stretched bounds.
    fn collision_pairs(&mut self, dt: f32) -> Vec<(EntityId, Vec<EntityId>)> {
        self.sort_bodies(false);
        self.hash.build(&self.bodies, &self.sim_bodies, dt);

        let mut pairs = Vec::new();
        for &id in &self.dyn_bodies {
            let can_collide = self
                .bodies
                .get(id)
                .is_some_and(|body| body.can_collide);
            if !can_collide {
                continue;
            }
            let handler = self.handler.as_ref();
            let found = self.hash.query(&self.bodies, id, |a, b| {
                collides_with(handler, a, b) && collides_with(handler, b, a)
            });
            if !found.is_empty() {
                pairs.push((id, found));
            }
        }
        pairs
    }

    fn solve_collisions(&mut self, pairs: &[(EntityId, Vec<EntityId>)], dt: f32) {
        for &id in &self.dyn_bodies {
            if let Some(body) = self.bodies.get_mut(id) {
                body.prohibited.clear();
            }
        }

        let mut resolver = Resolver::new();
        let mut contacts = 0;
        for (id, candidates) in pairs {
            for &other in candidates {
                let constraint = self.try_collision(*id, other, dt);
                if constraint.is_some() {
                    contacts += 1;
                }
                resolver.add(constraint);
            }
        }
        self.profile.contact_constraints += contacts;

        resolver.solve(
            &mut self.bodies,
            &mut self.rng,
            dt,
            self.contact_iterations,
            SolvePass::Velocity,
        );
    }

    /// Narrow-phase one candidate pair. A successful contact is separated
    /// positionally right away; the returned constraint handles velocities.
    fn try_collision(
        &mut self,
        a_id: EntityId,
        b_id: EntityId,
        dt: f32,
    ) -> Option<ContactConstraint<D>> {
        if a_id == b_id {
            return None;
        }
        let collision = self.detector.collide_bodies(&mut self.bodies, a_id, b_id)?;
        if self.trigger_collision(a_id, b_id, &collision) {
            return None;
        }

        let (a, b) = self.bodies.get2_mut(a_id, b_id)?;
        let b_dynamic = b.is_dynamic();
        let dynamic = propagate_dynamic(a, b, b_dynamic, collision.normal);
        let mut constraint = ContactConstraint::new(dynamic, a, b, &collision);
        constraint.solve_position(&mut self.bodies, dt);
        Some(constraint)
    }

    /// Report the pair to the handler (once per run) and decide whether the
    /// contact is trigger-only.
    fn trigger_collision(&mut self, a_id: EntityId, b_id: EntityId, collision: &Collision<D>) -> bool {
        let key = if a_id <= b_id { (a_id, b_id) } else { (b_id, a_id) };
        if let Some(&cached) = self.trigger_cache.get(&key) {
            return cached;
        }
        let (Some(a), Some(b)) = (self.bodies.get(a_id), self.bodies.get(b_id)) else {
            return false;
        };
        let trigger_a = triggers_on(self.handler.as_ref(), a, b);
        let trigger_b = triggers_on(self.handler.as_ref(), b, a);
        self.handler.on_collide(
            a_id,
            b_id,
            collision.normal,
            &collision.contacts,
            trigger_a,
            trigger_b,
        );
        let result = trigger_a || trigger_b;
        self.trigger_cache.insert(key, result);
        result
    }
}

fn collides_with<D: Dim>(
    handler: &dyn EventHandler<D>,
    a: &RigidBody<D>,
    b: &RigidBody<D>,
) -> bool {
    a.trivial_collision_rule || handler.collision_rule(a, b)
}

fn triggers_on<D: Dim>(
    handler: &dyn EventHandler<D>,
    a: &RigidBody<D>,
    b: &RigidBody<D>,
) -> bool {
    a.is_trigger || (!a.trivial_trigger_rule && handler.trigger_rule(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::{Ball, Shape};
    use crate::core::dim::Dim2;
    use glam::Vec2;
    use std::cell::RefCell;
    use std::rc::Rc;

    const FRAME: f32 = 1.0 / 60.0;

    fn ground(engine: &mut Engine<Dim2>) -> EntityId {
        let mut body = RigidBody::new(Vec2::new(0.0, -0.5), false);
        body.add_shape(Shape::rectangle(Vec2::ZERO, 40.0, 1.0));
        engine.add_body(body)
    }

    fn ball(engine: &mut Engine<Dim2>, at: Vec2) -> EntityId {
        let mut body = RigidBody::new(at, true);
        body.add_shape(Shape::Ball(Ball::new(Vec2::ZERO, 0.5)));
        engine.add_body(body)
    }

    #[test]
    fn scattered_poor_iterations_do_not_abort_the_presolve() {
        let mut confusion = Confusion::new();
        // alternate a stall with a clear improvement, many times over
        let mut error = 100.0;
        for _ in 0..(CONFUSION_LIMIT * 10) {
            assert!(!confusion.stalled(error));
            error -= 1.0;
            assert!(!confusion.stalled(error));
        }
    }

    #[test]
    fn consecutive_stalls_give_up() {
        let mut confusion = Confusion::new();
        assert!(!confusion.stalled(50.0));
        for _ in 0..CONFUSION_LIMIT {
            assert!(!confusion.stalled(50.0));
        }
        assert!(confusion.stalled(50.0));
    }

    #[test]
    fn an_improvement_resets_the_stall_count() {
        let mut confusion = Confusion::new();
        assert!(!confusion.stalled(50.0));
        for _ in 0..CONFUSION_LIMIT {
            assert!(!confusion.stalled(50.0));
        }
        // a real improvement wipes the slate clean
        assert!(!confusion.stalled(40.0));
        for _ in 0..CONFUSION_LIMIT {
            assert!(!confusion.stalled(40.0));
        }
        assert!(confusion.stalled(40.0));
    }

    #[test]
    fn a_dropped_ball_settles_on_the_ground() {
        let mut engine = Engine::new(Vec2::new(0.0, -10.0));
        ground(&mut engine);
        let id = ball(&mut engine, Vec2::new(0.0, 2.0));
        for _ in 0..180 {
            engine.run(FRAME);
        }
        let body = engine.body(id).unwrap();
        let y = body.position.linear.y;
        assert!((y - 0.5).abs() < 0.15, "ball rests at y = {y}");
        assert!(
            body.velocity.linear.length() < 0.2,
            "residual velocity {:?}",
            body.velocity.linear
        );
    }

    #[test]
    fn identical_seeds_replay_identically() {
        let build = || {
            let mut engine = Engine::new(Vec2::new(0.0, -10.0));
            engine.set_seed(42);
            ground(&mut engine);
            let ids: Vec<EntityId> = (0..4)
                .map(|i| ball(&mut engine, Vec2::new(0.1 * i as f32, 1.0 + 1.1 * i as f32)))
                .collect();
            (engine, ids)
        };
        let (mut left, ids) = build();
        let (mut right, _) = build();
        for _ in 0..90 {
            left.run(FRAME);
            right.run(FRAME);
        }
        for id in ids {
            let a = left.body(id).unwrap().position.linear;
            let b = right.body(id).unwrap().position.linear;
            assert_eq!(a, b, "divergence on body {id:?}");
        }
    }

    struct CountingEvents {
        hits: Rc<RefCell<usize>>,
    }

    impl EventHandler<Dim2> for CountingEvents {
        fn on_collide(
            &mut self,
            _a: EntityId,
            _b: EntityId,
            _normal: Vec2,
            _contacts: &[Vec2],
            _trigger_a: bool,
            _trigger_b: bool,
        ) {
            *self.hits.borrow_mut() += 1;
        }
    }

    #[test]
    fn triggers_report_but_do_not_block() {
        let mut engine = Engine::new(Vec2::new(0.0, -10.0));
        let hits = Rc::new(RefCell::new(0));
        engine.set_handler(Box::new(CountingEvents { hits: hits.clone() }));

        let mut platform = RigidBody::new(Vec2::ZERO, false);
        platform.add_shape(Shape::rectangle(Vec2::ZERO, 10.0, 0.5));
        platform.is_trigger = true;
        engine.add_body(platform);

        // released already overlapping: the memo must report the pair once
        // per run, not once per substep
        let id = ball(&mut engine, Vec2::new(0.0, 0.5));
        engine.run(FRAME);
        assert_eq!(*hits.borrow(), 1, "pair reported more than once per run");

        for _ in 0..240 {
            engine.run(FRAME);
        }
        assert!(*hits.borrow() > 1, "trigger overlap never reported again");
        assert!(
            engine.body(id).unwrap().position.linear.y < -1.0,
            "ball was blocked by a trigger"
        );
    }

    #[test]
    fn removing_a_body_detaches_its_joints() {
        use crate::dynamics::joints::{Anchor, JointDescriptor};

        let mut engine = Engine::new(Vec2::new(0.0, -10.0));
        let a = ball(&mut engine, Vec2::ZERO);
        let b = ball(&mut engine, Vec2::new(2.0, 0.0));
        let joint = engine.add_joint(JointDescriptor::length(
            Anchor::new(a, Vec2::ZERO),
            Anchor::new(b, Vec2::ZERO),
            2.0,
        ));
        engine.remove_body(a);
        assert!(engine.joint(joint).is_none());
        assert!(engine.body(b).unwrap().constraints.is_empty());
        engine.run(FRAME);
    }
}
