//! Validation utilities for registration operations.
//!
//! Configuration validators and the windowed convergence monitor used by the
//! optimizer loop.

use std::collections::VecDeque;
use crate::error::{RegistrationError, Result};

/// Validate learning rate.
pub fn validate_learning_rate(lr: f64) -> Result<()> {
    if !lr.is_finite() || lr <= 0.0 {
        return Err(RegistrationError::invalid_configuration(
            format!("Learning rate must be positive, got {}", lr),
        ));
    }

    Ok(())
}

/// Validate iteration count.
pub fn validate_iterations(iterations: usize) -> Result<()> {
    if iterations == 0 {
        return Err(RegistrationError::invalid_configuration(
            "Iterations must be positive",
        ));
    }

    if iterations > 1_000_000 {
        return Err(RegistrationError::invalid_configuration(
            format!("Iterations too large: {}", iterations),
        ));
    }

    Ok(())
}

/// Validate the number of histogram bins for mutual information.
pub fn validate_histogram_bins(num_bins: usize) -> Result<()> {
    if num_bins < 2 {
        return Err(RegistrationError::invalid_configuration(
            format!("Number of bins must be at least 2, got {}", num_bins),
        ));
    }

    if num_bins > 1024 {
        return Err(RegistrationError::invalid_configuration(
            format!("Number of bins too large: {}", num_bins),
        ));
    }

    Ok(())
}

/// Validate a sampling fraction, which must lie in `(0, 1]`.
pub fn validate_sampling_percentage(percentage: f64) -> Result<()> {
    if !(percentage > 0.0 && percentage <= 1.0) {
        return Err(RegistrationError::invalid_configuration(
            format!("Sampling percentage must be in (0, 1], got {}", percentage),
        ));
    }

    Ok(())
}

/// Validate the convergence window size.
pub fn validate_window_size(window: usize) -> Result<()> {
    if window == 0 {
        return Err(RegistrationError::invalid_configuration(
            "Convergence window size must be positive",
        ));
    }

    Ok(())
}

/// Validate a strictly positive, finite quantity.
pub fn validate_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(RegistrationError::invalid_configuration(
            format!("{} must be positive, got {}", name, value),
        ));
    }

    Ok(())
}

/// Windowed convergence monitor.
///
/// Keeps the last `window_size` metric values. Once the window is full, the
/// values are rescaled to `[0, 1]` by their range and a least-squares line is
/// fitted over the window mapped onto `[0, 1]`. The optimization has converged
/// when the absolute slope drops below `minimum_value`, or when the window
/// values are all equal.
#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    window_size: usize,
    minimum_value: f64,
    values: VecDeque<f64>,
}

impl ConvergenceMonitor {
    /// Create a new convergence monitor.
    pub fn new(window_size: usize, minimum_value: f64) -> Self {
        Self {
            window_size: window_size.max(1),
            minimum_value,
            values: VecDeque::with_capacity(window_size.max(1)),
        }
    }

    /// Record a metric value.
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.window_size {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Normalized slope over the window, or `None` until the window is full.
    pub fn convergence_value(&self) -> Option<f64> {
        if self.values.len() < self.window_size {
            return None;
        }
        if self.window_size < 2 {
            return Some(0.0);
        }

        let min = self.values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = self.values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        if !(range > 0.0) {
            return Some(0.0);
        }

        let n = self.values.len() as f64;
        let xs = (0..self.values.len()).map(|i| i as f64 / (n - 1.0));
        let ys = self.values.iter().map(|v| (v - min) / range);

        let x_mean = 0.5;
        let y_mean = self.values.iter().map(|v| (v - min) / range).sum::<f64>() / n;

        let mut covariance = 0.0;
        let mut variance = 0.0;
        for (x, y) in xs.zip(ys) {
            covariance += (x - x_mean) * (y - y_mean);
            variance += (x - x_mean) * (x - x_mean);
        }

        Some(covariance / variance)
    }

    /// Whether the recorded values have converged.
    pub fn has_converged(&self) -> bool {
        self.convergence_value()
            .map(|slope| slope.abs() < self.minimum_value)
            .unwrap_or(false)
    }
}
