use std::time::Duration;

/// Counters gathered over one `run` call and reported at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct StepProfile {
    pub simulated_bodies: usize,
    pub dynamic_bodies: usize,
    pub islands: usize,
    pub presolve_iterations: usize,
    pub candidate_pairs: usize,
    pub contact_constraints: usize,
    pub total: Duration,
}

impl StepProfile {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn report(&self) {
        log::debug!(
            "step: {} bodies ({} dynamic), {} islands, {} presolve iters, {} pairs, {} contacts, {:.2} ms",
            self.simulated_bodies,
            self.dynamic_bodies,
            self.islands,
            self.presolve_iterations,
            self.candidate_pairs,
            self.contact_constraints,
            self.total.as_secs_f32() * 1000.0
        );
    }
}
