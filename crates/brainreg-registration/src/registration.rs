//! Rigid registration engine.
//!
//! Drives the optimization of the six rigid parameters: every iteration
//! builds a fresh transform from the current parameter vector, evaluates the
//! metric on newly drawn samples, back-propagates to get the parameter
//! gradient, and hands it to the optimizer. All terminations are reported in
//! the [`OptimizationReport`]; none of them is an error.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use burn::tensor::backend::AutodiffBackend;
use brainreg_core::image::Image;
use brainreg_core::spatial::{min_spacing, Point3};
use brainreg_core::tensor::to_scalar;
use brainreg_core::transform::{RigidParameters, RigidTransform, NUM_RIGID_PARAMETERS};
use serde::Serialize;

use crate::config::RegistrationConfig;
use crate::error::Result;
use crate::metric::{Metric, MetricSamples, MutualInformation, VoxelSampler};
use crate::optimizer::{GradientDescent, ParameterOptimizer, ParameterScales};
use crate::observer::{IterationObserver, IterationRecord};
use crate::validation::ConvergenceMonitor;

/// Why the optimizer stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StopCondition {
    /// The windowed metric slope dropped below the threshold.
    Converged { slope: f64 },
    /// The iteration cap was reached.
    MaximumIterations,
    /// No sample mapped inside the moving image.
    InsufficientOverlap { iteration: usize },
    /// The metric or its gradient was not finite.
    NumericalInstability { iteration: usize },
}

impl StopCondition {
    pub fn description(&self) -> String {
        match self {
            Self::Converged { slope } => {
                format!("Convergence checker passed at normalized slope {:.3e}", slope)
            }
            Self::MaximumIterations => "Maximum number of iterations reached".to_string(),
            Self::InsufficientOverlap { iteration } => {
                format!("Too many samples map outside the moving image at iteration {}", iteration)
            }
            Self::NumericalInstability { iteration } => {
                format!("Non-finite metric or gradient at iteration {}", iteration)
            }
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

impl fmt::Display for StopCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// Non-fatal notice that the optimization did not converge cleanly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceWarning {
    pub message: String,
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of an optimization run.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub stop_condition: StopCondition,
    /// Metric evaluations performed.
    pub iterations: usize,
    /// Metric (negative mutual information) at the initial parameters.
    pub initial_metric: f64,
    /// Metric at the returned parameters, on the same samples as
    /// `initial_metric`.
    pub final_metric: f64,
    pub final_parameters: RigidParameters,
    /// Learning rate at the end of the run.
    pub learning_rate: f64,
    pub scales: [f64; NUM_RIGID_PARAMETERS],
    /// Metric value of every iteration.
    pub metric_history: Vec<f64>,
    pub warnings: Vec<ConvergenceWarning>,
}

impl OptimizationReport {
    /// Whether the final metric is better (lower) than the initial one.
    pub fn improved(&self) -> bool {
        self.final_metric < self.initial_metric
    }
}

/// Rigid mutual-information registration.
pub struct Registration<B: AutodiffBackend> {
    config: RegistrationConfig,
    observers: Vec<Arc<dyn IterationObserver>>,
    _backend: std::marker::PhantomData<B>,
}

impl<B: AutodiffBackend> Registration<B> {
    pub fn new(config: RegistrationConfig) -> Self {
        Self {
            config,
            observers: Vec::new(),
            _backend: std::marker::PhantomData,
        }
    }

    /// Attach an observer that sees every iteration and the final report.
    pub fn with_observer(mut self, observer: Arc<dyn IterationObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Optimize the rigid parameters mapping `fixed` onto `moving`.
    ///
    /// Both images should already be normalized. The returned parameters use
    /// the rotation center of `initial`.
    pub fn optimize(
        &mut self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        initial: RigidParameters,
    ) -> Result<OptimizationReport> {
        self.config.validate()?;

        let device = fixed.data().device();
        let center = initial.center;
        let optimizer_config = &self.config.optimizer;
        let max_iterations = optimizer_config.number_of_iterations;
        let log_interval = self.config.log_interval.max(1);

        let metric = MutualInformation::from_images(
            fixed,
            moving,
            self.config.num_histogram_bins,
            self.config.parzen_sigma,
        );
        let mut sampler = VoxelSampler::new(fixed, self.config.sampling, self.config.seed);

        let mut parameters = initial.to_array();
        let max_step = optimizer_config
            .maximum_step_size_in_physical_units
            .unwrap_or_else(|| min_spacing(fixed.spacing()));
        let scales = ParameterScales::from_physical_shift(fixed, &parameters, center);
        let mut optimizer = GradientDescent::new(optimizer_config, scales, max_step);
        let mut monitor = ConvergenceMonitor::new(
            optimizer_config.convergence_window_size,
            optimizer_config.convergence_minimum_value,
        );

        // fixed sample set for comparing the start and end of the run
        let evaluation = sampler.sample();
        let initial_metric = evaluate(&metric, &evaluation, moving, &parameters, &center, &device);

        tracing::debug!(
            samples = sampler.sample_count(),
            scales = ?optimizer.scales().scales(),
            max_step,
            initial_metric,
            "starting optimization"
        );

        let mut best_metric = f64::INFINITY;
        let mut best_parameters = parameters;
        let mut history = Vec::with_capacity(max_iterations);
        let mut stop_condition = StopCondition::MaximumIterations;
        let mut iterations = 0;

        let started = Instant::now();
        for iteration in 0..max_iterations {
            let transform = RigidTransform::<B>::from_parameters(&parameters, &center, &device);
            let samples = sampler.sample();
            let value = metric.forward(&samples, moving, &transform);
            iterations = iteration + 1;

            if value.valid_samples == 0 {
                stop_condition = StopCondition::InsufficientOverlap { iteration };
                break;
            }

            let current = to_scalar(value.loss.clone());
            if !current.is_finite() {
                stop_condition = StopCondition::NumericalInstability { iteration };
                break;
            }

            if current < best_metric {
                best_metric = current;
                best_parameters = parameters;
            }
            history.push(current);

            let record = IterationRecord {
                iteration,
                metric: current,
                parameters,
                learning_rate: optimizer.learning_rate(),
            };
            for observer in &self.observers {
                observer.on_iteration(&record);
            }
            if iteration % log_interval == 0 {
                tracing::debug!(
                    iteration,
                    max_iterations,
                    metric = current,
                    learning_rate = record.learning_rate,
                    elapsed_s = started.elapsed().as_secs_f64(),
                    "optimizer iteration"
                );
            }

            monitor.push(current);
            if monitor.has_converged() {
                stop_condition = StopCondition::Converged {
                    slope: monitor.convergence_value().unwrap_or(0.0),
                };
                break;
            }

            let grads = value.loss.backward();
            let gradient = match transform.parameter_gradient(&grads) {
                Some(gradient) if gradient.iter().all(|g| g.is_finite()) => gradient,
                _ => {
                    stop_condition = StopCondition::NumericalInstability { iteration };
                    break;
                }
            };

            parameters = optimizer.step(&parameters, &gradient);
        }

        let final_array = if self.config.return_best_parameters && best_metric.is_finite() {
            best_parameters
        } else {
            parameters
        };
        let final_metric = evaluate(&metric, &evaluation, moving, &final_array, &center, &device);

        let mut warnings = Vec::new();
        if !stop_condition.is_converged() {
            let warning = ConvergenceWarning {
                message: format!("Optimizer did not converge: {}", stop_condition.description()),
            };
            tracing::warn!("{}", warning);
            warnings.push(warning);
        }

        tracing::info!(
            final_metric,
            iterations,
            elapsed_s = started.elapsed().as_secs_f64(),
            stop_condition = %stop_condition,
            "registration finished"
        );

        let report = OptimizationReport {
            stop_condition,
            iterations,
            initial_metric,
            final_metric,
            final_parameters: RigidParameters::new(&final_array, center),
            learning_rate: optimizer.learning_rate(),
            scales: optimizer.scales().scales(),
            metric_history: history,
            warnings,
        };
        for observer in &self.observers {
            observer.on_finish(&report);
        }
        Ok(report)
    }
}

/// Metric value for a parameter vector, without a backward pass.
fn evaluate<B: AutodiffBackend>(
    metric: &MutualInformation,
    samples: &MetricSamples<B>,
    moving: &Image<B, 3>,
    parameters: &[f64; NUM_RIGID_PARAMETERS],
    center: &Point3,
    device: &B::Device,
) -> f64 {
    let transform = RigidTransform::<B>::from_parameters(parameters, center, device);
    to_scalar(metric.forward(samples, moving, &transform).loss)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_condition_description() {
        assert_eq!(
            StopCondition::MaximumIterations.description(),
            "Maximum number of iterations reached"
        );
        assert!(StopCondition::Converged { slope: 1e-7 }.is_converged());
        assert!(!StopCondition::InsufficientOverlap { iteration: 3 }.is_converged());
        assert!(StopCondition::NumericalInstability { iteration: 4 }.to_string().contains('4'));
    }
}
