//! Mutual Information metric implementation.

use burn::tensor::{Tensor, Int};
use burn::tensor::backend::Backend;
use brainreg_core::image::Image;
use brainreg_core::tensor::{to_host_vec, to_scalar};
use brainreg_core::transform::Transform;
use brainreg_core::interpolation::{Interpolator, LinearInterpolator, inside_mask};

use super::sampling::MetricSamples;
use super::trait_::{Metric, MetricValue};

const EPSILON: f64 = 1e-10;

/// Intensity range covered by a histogram axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityRange {
    pub min: f64,
    pub max: f64,
}

impl IntensityRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Range of all values of an image.
    pub fn of_image<B: Backend>(image: &Image<B, 3>) -> Self {
        let (min, max) = to_host_vec(image.data().clone())
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v as f64), hi.max(v as f64))
            });
        if min > max {
            Self::new(0.0, 0.0)
        } else {
            Self::new(min, max)
        }
    }

    /// Bin width for `num_bins` centers spanning the range.
    fn bin_width(&self, num_bins: usize) -> f64 {
        let width = (self.max - self.min) / (num_bins.max(2) - 1) as f64;
        if width > 0.0 { width } else { 1.0 }
    }
}

/// Mutual Information Metric using Parzen Window estimation.
///
/// Computes the mutual information between the fixed samples and the moving
/// image values at their mapped positions:
/// MI(F, M) = H(F) + H(M) - H(F, M)
///
/// Both intensity axes get `num_bins` evenly spaced bin centers spanning the
/// image ranges given at construction. Each sample contributes a Gaussian
/// kernel of width `sigma` (in bins) to every bin, normalized so the sample
/// adds unit mass. Samples that map outside the moving image contribute
/// nothing. The loss is `-MI`, so lower is better.
#[derive(Debug, Clone)]
pub struct MutualInformation {
    interpolator: LinearInterpolator,
    num_bins: usize,
    sigma: f64,
    fixed_range: IntensityRange,
    moving_range: IntensityRange,
}

impl MutualInformation {
    /// Create a new Mutual Information metric.
    ///
    /// # Arguments
    /// * `num_bins` - Number of histogram bins per axis
    /// * `sigma` - Parzen kernel width, in bins
    /// * `fixed_range` - Intensity range of the fixed image
    /// * `moving_range` - Intensity range of the moving image
    pub fn new(
        num_bins: usize,
        sigma: f64,
        fixed_range: IntensityRange,
        moving_range: IntensityRange,
    ) -> Self {
        Self {
            interpolator: LinearInterpolator::new(),
            num_bins,
            sigma,
            fixed_range,
            moving_range,
        }
    }

    /// Create a metric whose ranges span the full fixed and moving images.
    pub fn from_images<B: Backend>(
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        num_bins: usize,
        sigma: f64,
    ) -> Self {
        Self::new(num_bins, sigma, IntensityRange::of_image(fixed), IntensityRange::of_image(moving))
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Per-sample Parzen weights `[N, num_bins]`, each row summing to one.
    fn parzen_weights<B: Backend>(&self, values: Tensor<B, 1>, range: IntensityRange) -> Tensor<B, 2> {
        let n = values.dims()[0];
        let device = values.device();
        let width = range.bin_width(self.num_bins);

        // position of each value in bin units
        let u = ((values - range.min) / width).reshape([n, 1]);
        let centers = Tensor::<B, 1, Int>::arange(0..self.num_bins as i64, &device)
            .float()
            .reshape([1, self.num_bins]);

        let diff = u - centers;
        let weights = (diff.powf_scalar(2.0) * (-0.5 / (self.sigma * self.sigma))).exp();
        let row_sum = weights.clone().sum_dim(1) + EPSILON;
        weights / row_sum
    }

    /// Shannon entropy of a probability table.
    fn compute_entropy<B: Backend, const D: usize>(probs: Tensor<B, D>) -> Tensor<B, 1> {
        let log_probs = (probs.clone() + EPSILON).log();
        (probs * log_probs).sum().neg()
    }
}

impl<B: Backend> Metric<B> for MutualInformation {
    fn forward(
        &self,
        samples: &MetricSamples<B>,
        moving: &Image<B, 3>,
        transform: &impl Transform<B, 3>,
    ) -> MetricValue<B> {
        let n = samples.len();

        let moving_points = transform.transform_points(samples.fixed_points.clone());
        let moving_indices = moving.world_to_index_tensor(moving_points);

        let mask = inside_mask::<B>(moving.shape(), moving_indices.clone());
        let valid_samples = to_scalar(mask.clone().sum()).round().max(0.0) as usize;

        let moving_values = self.interpolator.interpolate(moving.data(), moving_indices);

        let fixed_weights = self.parzen_weights(samples.fixed_values.clone(), self.fixed_range)
            * mask.reshape([n, 1]);
        let moving_weights = self.parzen_weights(moving_values, self.moving_range);

        // joint[i, j] = sum_k wf[k, i] * wm[k, j]
        let joint = fixed_weights.transpose().matmul(moving_weights);
        let total = joint.clone().sum().reshape([1, 1]) + EPSILON;
        let p_fm = joint / total;

        let p_f = p_fm.clone().sum_dim(1);
        let p_m = p_fm.clone().sum_dim(0);

        let h_fm = Self::compute_entropy(p_fm);
        let h_f = Self::compute_entropy(p_f);
        let h_m = Self::compute_entropy(p_m);

        // Loss = -MI = H(F, M) - H(F) - H(M)
        MetricValue {
            loss: h_fm - h_f - h_m,
            valid_samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplingStrategy;
    use crate::metric::VoxelSampler;
    use brainreg_core::spatial::Point3;
    use brainreg_core::tensor::volume_from_vec;
    use brainreg_core::transform::RigidTransform;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn blob(size: usize, cx: f64) -> Image<TestBackend, 3> {
        let device = Default::default();
        let mut values = Vec::with_capacity(size * size * size);
        let c = (size as f64 - 1.0) / 2.0;
        for z in 0..size {
            for y in 0..size {
                for x in 0..size {
                    let d2 = (x as f64 - cx).powi(2) + (y as f64 - c).powi(2) + (z as f64 - c).powi(2);
                    values.push((-d2 / 18.0).exp() as f32);
                }
            }
        }
        Image::from_tensor(volume_from_vec::<TestBackend>(values, [size, size, size], &device))
    }

    fn evaluate(fixed: &Image<TestBackend, 3>, moving: &Image<TestBackend, 3>, shift: f64) -> (f64, usize) {
        let device = Default::default();
        let metric = MutualInformation::from_images(fixed, moving, 16, 1.0);
        let samples = VoxelSampler::new(fixed, SamplingStrategy::Full, None).sample();
        let transform = RigidTransform::<TestBackend>::from_parameters(
            &[0.0, 0.0, 0.0, shift, 0.0, 0.0],
            &Point3::origin(),
            &device,
        );
        let value = metric.forward(&samples, moving, &transform);
        (to_scalar(value.loss), value.valid_samples)
    }

    #[test]
    fn test_aligned_is_better_than_shifted() {
        let fixed = blob(16, 7.5);
        let moving = blob(16, 7.5);

        let (aligned, valid) = evaluate(&fixed, &moving, 0.0);
        let (shifted, _) = evaluate(&fixed, &moving, 3.0);

        assert_eq!(valid, 16 * 16 * 16);
        assert!(aligned.is_finite());
        assert!(aligned < 0.0);
        assert!(aligned < shifted);
    }

    #[test]
    fn test_no_overlap_reports_zero_valid_samples() {
        let fixed = blob(8, 3.5);
        let moving = blob(8, 3.5);

        let (loss, valid) = evaluate(&fixed, &moving, 100.0);
        assert_eq!(valid, 0);
        assert!(loss.is_finite());
    }

    #[test]
    fn test_partial_overlap_counts_inside_samples() {
        let fixed = blob(8, 3.5);
        let moving = blob(8, 3.5);

        // x in 0..4 maps to 4..8, x in 4..8 maps past the edge
        let (_, valid) = evaluate(&fixed, &moving, 4.0);
        assert_eq!(valid, 4 * 8 * 8);
    }

    #[test]
    fn test_constant_images_have_zero_information() {
        let device = Default::default();
        let fixed = Image::from_tensor(Tensor::<TestBackend, 3>::ones([6, 6, 6], &device));
        let (loss, _) = evaluate(&fixed, &fixed, 0.0);
        assert!(loss.abs() < 1e-4);
    }

    #[test]
    fn test_gradient_points_towards_alignment() {
        type AD = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let host_fixed = blob(16, 7.5);
        let host_moving = blob(16, 9.5);
        let fixed = Image::<AD, 3>::from_tensor(Tensor::from_inner(host_fixed.data().clone()));
        let moving = Image::<AD, 3>::from_tensor(Tensor::from_inner(host_moving.data().clone()));

        let metric = MutualInformation::from_images(&fixed, &moving, 16, 1.0);
        let samples = VoxelSampler::new(&fixed, SamplingStrategy::Full, None).sample();
        let transform = RigidTransform::<AD>::from_parameters(&[0.0; 6], &Point3::origin(), &device);

        let value = metric.forward(&samples, &moving, &transform);
        let grads = value.loss.backward();
        let gradient = transform.parameter_gradient(&grads).unwrap();

        // moving blob sits 2 voxels further along x: increasing tx lowers the loss
        assert!(gradient[3] < 0.0);
    }
}
