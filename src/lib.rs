//! Rigid Impulse – a deterministic rigid-body physics engine for 2D and 3D.
//!
//! Bodies live in a generational [`Arena`] and are advanced by an
//! [`Engine`], which runs a spatial-hash broad phase, SAT manifolds, and a
//! randomized sequential-impulse solver. The same code drives both worlds
//! through the [`Dim`] dimension trait; [`Engine2`] and [`Engine3`] are the
//! two instantiations.
//!
//! ```
//! use glam::Vec2;
//! use rigid_impulse::{Ball, Engine2, RigidBody, Shape};
//!
//! let mut engine = Engine2::new(Vec2::new(0.0, -10.0));
//! let mut floor = RigidBody::new(Vec2::new(0.0, -0.5), false);
//! floor.add_shape(Shape::rectangle(Vec2::ZERO, 20.0, 1.0));
//! engine.add_body(floor);
//!
//! let mut ball = RigidBody::new(Vec2::new(0.0, 3.0), true);
//! ball.add_shape(Shape::Ball(Ball::new(Vec2::ZERO, 0.5)));
//! let id = engine.add_body(ball);
//!
//! for _ in 0..60 {
//!     engine.run(1.0 / 60.0);
//! }
//! assert!(engine.body(id).unwrap().position.linear.y > 0.0);
//! ```

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod engine;
pub mod utils;

pub use glam::{IVec2, IVec3, Mat3, Quat, Vec2, Vec3};

pub use collision::broadphase::SpatialHash;
pub use collision::contact::Collision;
pub use collision::narrowphase::Detector;
pub use collision::queries::{Ray, RayHit};
pub use collision::shapes::{Ball, Polytope, Shape};
pub use crate::core::dim::{Dim, Dim2, Dim3, Rot2};
pub use crate::core::matter::Matter;
pub use crate::core::rigidbody::{Derivative, RigidBody};
pub use crate::core::types::{Aabb, Plane, Transform, Velocity};
pub use dynamics::joints::{Anchor, JointDescriptor, JointKind};
pub use engine::{Engine, EventHandler, SilentEvents};
pub use utils::allocator::{Arena, EntityId};
pub use utils::random::XorShift;

/// The planar engine.
pub type Engine2 = Engine<Dim2>;
/// The spatial engine.
pub type Engine3 = Engine<Dim3>;
