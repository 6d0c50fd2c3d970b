//! Core simulation state: dimension abstraction, geometric value types,
//! mass properties and rigid bodies.

pub mod dim;
pub mod matter;
pub mod rigidbody;
pub mod types;
