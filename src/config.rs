//! Simulation-wide tuning constants. Values are load-bearing: solvers,
//! heuristics and tests all assume them, so change with care.

/// Fraction of velocity bled off per unit time by default.
pub const DEFAULT_DRAG: f32 = 0.005;

/// Integration substeps per `Engine::run` call.
pub const DEFAULT_ITERATIONS: usize = 10;

/// Joint-constraint passes per substep.
pub const DEFAULT_CONSTRAINT_ITERATIONS: usize = 4;

/// Contact velocity passes per substep.
pub const DEFAULT_CONTACT_ITERATIONS: usize = 4;

/// Seed of the solver's shuffling generator when none is supplied.
pub const DEFAULT_SEED: u64 = 123456;

/// General comparison tolerance for f32 quantities.
pub const EPSILON: f32 = 1e-5;

/// Impulses below this magnitude are skipped as already-resolved.
pub const WASTE_THRESHOLD: f32 = 1e-3;

/// Kinetic friction as a fraction of static friction.
pub const KINETIC_FRICTION_RATIO: f32 = 0.9;

/// Minimum normal alignment for a contact to inherit a blocked direction.
pub const PROHIBITED_ALIGNMENT: f32 = 0.8;

/// Joint presolve: minimum error decrease counted as progress.
pub const IMPROVEMENT_THRESHOLD: f32 = 0.1;

/// Joint presolve: non-improving iterations tolerated before giving up.
pub const CONFUSION_LIMIT: usize = 4;

/// Joint presolve: position passes per outer iteration.
pub const PRESOLVE_BATCH: usize = 30;

/// Joint presolve: hard cap on outer iterations.
pub const PRESOLVE_ITERATIONS: usize = 100;

/// Joint presolve: acceptable residual error per constraint island.
pub const ERROR_PER_ISLAND: f32 = 1.0;

/// Two scalars compare equal within [`EPSILON`].
#[inline]
pub fn equals(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}
