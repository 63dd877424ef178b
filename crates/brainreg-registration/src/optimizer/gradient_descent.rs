//! Scaled gradient descent with learning rate estimation.

use brainreg_core::transform::NUM_RIGID_PARAMETERS;

use super::scales::ParameterScales;
use super::trait_::ParameterOptimizer;
use crate::config::{GradientDescentConfig, LearningRateEstimation};

/// Gradient descent on scaled rigid parameters.
///
/// A step is `p - lr * g / s` where `s` are the parameter scales. When
/// learning rate estimation is enabled, the learning rate is chosen so that
/// the step moves the probe points by exactly `max_step` physical units.
/// Every step is also capped at `max_step`.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f64,
    estimation: LearningRateEstimation,
    max_step: f64,
    scales: ParameterScales,
    estimated: bool,
}

impl GradientDescent {
    /// Create a new optimizer.
    ///
    /// # Arguments
    /// * `config` - Gradient descent settings
    /// * `scales` - Parameter scales and probe points
    /// * `max_step` - Largest physical shift of a single step
    pub fn new(config: &GradientDescentConfig, scales: ParameterScales, max_step: f64) -> Self {
        Self {
            learning_rate: config.learning_rate,
            estimation: config.estimate_learning_rate,
            max_step,
            scales,
            estimated: false,
        }
    }

    pub fn scales(&self) -> &ParameterScales {
        &self.scales
    }

    fn should_estimate(&self) -> bool {
        match self.estimation {
            LearningRateEstimation::Never => false,
            LearningRateEstimation::Once => !self.estimated,
            LearningRateEstimation::EachIteration => true,
        }
    }
}

impl ParameterOptimizer for GradientDescent {
    fn step(
        &mut self,
        parameters: &[f64; NUM_RIGID_PARAMETERS],
        gradient: &[f64; NUM_RIGID_PARAMETERS],
    ) -> [f64; NUM_RIGID_PARAMETERS] {
        let scales = self.scales.scales();
        let mut direction = [0.0; NUM_RIGID_PARAMETERS];
        for i in 0..NUM_RIGID_PARAMETERS {
            direction[i] = gradient[i] / scales[i];
        }

        if self.should_estimate() {
            let shift = self.scales.step_shift(parameters, &direction);
            if shift.is_finite() && shift > 0.0 {
                self.learning_rate = self.max_step / shift;
                tracing::debug!(learning_rate = self.learning_rate, "estimated learning rate");
            }
            self.estimated = true;
        }

        let mut step = direction.map(|d| -self.learning_rate * d);
        let shift = self.scales.step_shift(parameters, &step);
        if shift > self.max_step {
            let factor = self.max_step / shift;
            step = step.map(|s| s * factor);
        }

        let mut next = *parameters;
        for (p, s) in next.iter_mut().zip(step.iter()) {
            *p += s;
        }
        next
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainreg_core::spatial::Point3;

    fn probe_scales() -> ParameterScales {
        let points = vec![Point3::new(-10.0, -10.0, -10.0), Point3::new(10.0, 10.0, 10.0)];
        ParameterScales::from_points(points, &[0.0; 6], Point3::origin())
    }

    #[test]
    fn test_fixed_learning_rate_step() {
        let config = GradientDescentConfig {
            learning_rate: 0.5,
            estimate_learning_rate: LearningRateEstimation::Never,
            ..Default::default()
        };
        let mut optimizer = GradientDescent::new(&config, probe_scales(), 100.0);

        let next = optimizer.step(&[0.0; 6], &[0.0, 0.0, 0.0, 1.0, -2.0, 0.0]);
        assert!((next[3] + 0.5).abs() < 1e-12);
        assert!((next[4] - 1.0).abs() < 1e-12);
        assert_eq!(optimizer.learning_rate(), 0.5);
    }

    #[test]
    fn test_estimated_first_step_has_max_shift() {
        let config = GradientDescentConfig::default();
        let mut optimizer = GradientDescent::new(&config, probe_scales(), 1.0);

        let start = [0.0; 6];
        let next = optimizer.step(&start, &[0.0, 0.0, 0.0, 30.0, 40.0, 0.0]);
        // moves against the gradient by one unit
        assert!((next[3] + 0.6).abs() < 1e-9);
        assert!((next[4] + 0.8).abs() < 1e-9);
        assert!((optimizer.learning_rate() - 0.02).abs() < 1e-12);

        // the learning rate is kept for the next step
        let after = optimizer.step(&next, &[0.0, 0.0, 0.0, 10.0, 0.0, 0.0]);
        assert!((after[3] - (next[3] - 0.2)).abs() < 1e-9);
    }

    #[test]
    fn test_step_is_clamped() {
        let config = GradientDescentConfig {
            learning_rate: 10.0,
            estimate_learning_rate: LearningRateEstimation::Never,
            ..Default::default()
        };
        let mut optimizer = GradientDescent::new(&config, probe_scales(), 2.0);

        let next = optimizer.step(&[0.0; 6], &[0.0, 0.0, 0.0, 0.0, 0.0, 5.0]);
        assert!((next[5] + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_gradient_keeps_parameters() {
        let mut optimizer = GradientDescent::new(&GradientDescentConfig::default(), probe_scales(), 1.0);
        let start = [0.1, 0.0, 0.0, 1.0, 2.0, 3.0];
        assert_eq!(optimizer.step(&start, &[0.0; 6]), start);
    }
}
