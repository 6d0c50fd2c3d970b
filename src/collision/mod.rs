//! Collision pipeline: shapes, broad-phase candidate search, narrow-phase
//! manifolds and ray queries.

pub mod broadphase;
pub mod clipping;
pub mod contact;
pub mod narrowphase;
pub mod queries;
pub mod shapes;
