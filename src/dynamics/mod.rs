//! Constraint generation and the sequential-impulse solver.

pub mod constraint;
pub mod contacts;
pub mod integrator;
pub mod island;
pub mod joints;
pub mod solver;
