//! Registration configuration.

use brainreg_core::spatial::Spacing3;
use brainreg_io::SpatialUnit;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::validation::{
    validate_histogram_bins, validate_iterations, validate_learning_rate,
    validate_positive, validate_sampling_percentage, validate_window_size,
};

/// Which fixed-image voxels the metric is evaluated on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SamplingStrategy {
    /// Every voxel of the fixed image.
    Full,
    /// A random subset of `percentage` (in `(0, 1]`) of the fixed voxels,
    /// redrawn every iteration.
    Random { percentage: f64 },
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self::Random { percentage: 0.03 }
    }
}

/// When the gradient descent learning rate is re-estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LearningRateEstimation {
    /// Keep the configured learning rate.
    Never,
    /// Estimate from the first step only.
    #[default]
    Once,
    /// Estimate at every iteration.
    EachIteration,
}

/// Gradient descent settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientDescentConfig {
    pub learning_rate: f64,
    pub number_of_iterations: usize,
    pub convergence_minimum_value: f64,
    pub convergence_window_size: usize,
    pub estimate_learning_rate: LearningRateEstimation,
    /// Largest physical shift a single step may cause. `None` uses the
    /// smallest fixed-image spacing.
    pub maximum_step_size_in_physical_units: Option<f64>,
}

impl Default for GradientDescentConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1.0,
            number_of_iterations: 300,
            convergence_minimum_value: 1e-6,
            convergence_window_size: 10,
            estimate_learning_rate: LearningRateEstimation::Once,
            maximum_step_size_in_physical_units: None,
        }
    }
}

/// Configuration for a pairwise rigid registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Histogram bins of the mutual information estimate.
    pub num_histogram_bins: usize,
    pub sampling: SamplingStrategy,
    /// Seed for the voxel sampler. `None` draws from entropy.
    pub seed: Option<u64>,
    pub optimizer: GradientDescentConfig,
    /// Voxel spacing of the saved volume.
    pub output_spacing: Spacing3,
    pub output_unit: SpatialUnit,
    /// Iterations between progress log lines.
    pub log_interval: usize,
    /// Return the parameters with the lowest metric value seen rather than
    /// the last ones.
    pub return_best_parameters: bool,
    /// Parzen kernel width in bins.
    pub parzen_sigma: f64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            num_histogram_bins: 50,
            sampling: SamplingStrategy::default(),
            seed: None,
            optimizer: GradientDescentConfig::default(),
            output_spacing: Spacing3::new(1.0, 1.0, 1.0),
            output_unit: SpatialUnit::Millimeter,
            log_interval: 50,
            return_best_parameters: true,
            parzen_sigma: 1.0,
        }
    }
}

impl RegistrationConfig {
    /// Create a new registration config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of histogram bins.
    pub fn with_histogram_bins(mut self, bins: usize) -> Self {
        self.num_histogram_bins = bins;
        self
    }

    /// Set the sampling strategy.
    pub fn with_sampling(mut self, sampling: SamplingStrategy) -> Self {
        self.sampling = sampling;
        self
    }

    /// Sample a random fraction of the fixed voxels.
    pub fn with_sampling_percentage(mut self, percentage: f64) -> Self {
        self.sampling = SamplingStrategy::Random { percentage };
        self
    }

    /// Fix the sampler seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the maximum number of iterations.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.optimizer.number_of_iterations = iterations;
        self
    }

    /// Set the initial learning rate.
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.optimizer.learning_rate = lr;
        self
    }

    /// Set the convergence criterion.
    pub fn with_convergence(mut self, minimum_value: f64, window_size: usize) -> Self {
        self.optimizer.convergence_minimum_value = minimum_value;
        self.optimizer.convergence_window_size = window_size;
        self
    }

    /// Set the learning rate estimation policy.
    pub fn with_learning_rate_estimation(mut self, estimation: LearningRateEstimation) -> Self {
        self.optimizer.estimate_learning_rate = estimation;
        self
    }

    /// Set the maximum physical step size.
    pub fn with_maximum_step_size(mut self, step: f64) -> Self {
        self.optimizer.maximum_step_size_in_physical_units = Some(step);
        self
    }

    /// Set the voxel spacing of the saved volume.
    pub fn with_output_spacing(mut self, spacing: Spacing3) -> Self {
        self.output_spacing = spacing;
        self
    }

    /// Set the spatial unit of the saved volume.
    pub fn with_output_unit(mut self, unit: SpatialUnit) -> Self {
        self.output_unit = unit;
        self
    }

    /// Set log interval.
    pub fn with_log_interval(mut self, interval: usize) -> Self {
        self.log_interval = interval;
        self
    }

    /// Return the best parameters seen, or the last ones.
    pub fn with_return_best_parameters(mut self, enabled: bool) -> Self {
        self.return_best_parameters = enabled;
        self
    }

    /// Set the Parzen kernel width in bins.
    pub fn with_parzen_sigma(mut self, sigma: f64) -> Self {
        self.parzen_sigma = sigma;
        self
    }

    /// Check every value for consistency.
    pub fn validate(&self) -> Result<()> {
        validate_histogram_bins(self.num_histogram_bins)?;
        if let SamplingStrategy::Random { percentage } = self.sampling {
            validate_sampling_percentage(percentage)?;
        }
        validate_learning_rate(self.optimizer.learning_rate)?;
        validate_iterations(self.optimizer.number_of_iterations)?;
        validate_window_size(self.optimizer.convergence_window_size)?;
        if let Some(step) = self.optimizer.maximum_step_size_in_physical_units {
            validate_positive("Maximum step size", step)?;
        }
        for i in 0..3 {
            validate_positive("Output spacing", self.output_spacing[i])?;
        }
        validate_positive("Parzen sigma", self.parzen_sigma)?;
        Ok(())
    }
}
