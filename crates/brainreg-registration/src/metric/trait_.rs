//! Metric trait for image similarity measurement.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use brainreg_core::image::Image;
use brainreg_core::transform::Transform;

use super::sampling::MetricSamples;

/// Value of a metric evaluation.
#[derive(Debug, Clone)]
pub struct MetricValue<B: Backend> {
    /// Scalar loss `[1]`; lower means better alignment.
    pub loss: Tensor<B, 1>,
    /// Number of samples that mapped inside the moving image.
    pub valid_samples: usize,
}

/// Metric trait for measuring similarity between images.
///
/// A metric is evaluated on a set of fixed-image samples: their physical
/// positions are mapped through `transform` into the moving image and
/// compared with the fixed intensities.
pub trait Metric<B: Backend> {
    /// Calculate the loss (dissimilarity) for the given samples.
    ///
    /// # Arguments
    /// * `samples` - Fixed-image sample positions and values
    /// * `moving` - The moving image
    /// * `transform` - Maps fixed physical space to moving physical space
    fn forward(
        &self,
        samples: &MetricSamples<B>,
        moving: &Image<B, 3>,
        transform: &impl Transform<B, 3>,
    ) -> MetricValue<B>;
}
