//! Optimizer trait for parameter optimization.

use brainreg_core::transform::NUM_RIGID_PARAMETERS;

/// Optimizer over a host-side rigid parameter vector.
///
/// Parameters and gradients are ordered `[rx, ry, rz, tx, ty, tz]`. The
/// optimizer minimizes, so a step moves against the gradient.
pub trait ParameterOptimizer {
    /// Perform a single optimization step and return the new parameters.
    fn step(
        &mut self,
        parameters: &[f64; NUM_RIGID_PARAMETERS],
        gradient: &[f64; NUM_RIGID_PARAMETERS],
    ) -> [f64; NUM_RIGID_PARAMETERS];

    /// Get the current learning rate.
    fn learning_rate(&self) -> f64;
}
