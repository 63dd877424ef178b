//! Fixed-image voxel sampling.

use burn::tensor::{Tensor, TensorData, Shape};
use burn::tensor::backend::Backend;
use brainreg_core::image::Image;
use brainreg_core::tensor::to_host_vec;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::config::SamplingStrategy;

/// Fixed-image samples a metric is evaluated on.
#[derive(Debug, Clone)]
pub struct MetricSamples<B: Backend> {
    /// Physical positions `[N, 3]`.
    pub fixed_points: Tensor<B, 2>,
    /// Fixed intensities `[N]`.
    pub fixed_values: Tensor<B, 1>,
}

impl<B: Backend> MetricSamples<B> {
    pub fn len(&self) -> usize {
        self.fixed_values.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Draws voxel samples from a fixed image.
///
/// With [`SamplingStrategy::Random`], `max(1, round(total * percentage))`
/// distinct voxels are drawn uniformly on every call to [`sample`](Self::sample).
pub struct VoxelSampler<B: Backend> {
    fixed: Image<B, 3>,
    values: Vec<f32>,
    strategy: SamplingStrategy,
    rng: StdRng,
}

impl<B: Backend> VoxelSampler<B> {
    /// Create a sampler over `fixed`. A `seed` makes the draws reproducible.
    pub fn new(fixed: &Image<B, 3>, strategy: SamplingStrategy, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            fixed: fixed.clone(),
            values: to_host_vec(fixed.data().clone()),
            strategy,
            rng,
        }
    }

    /// Number of samples drawn per call.
    pub fn sample_count(&self) -> usize {
        let total = self.values.len();
        match self.strategy {
            SamplingStrategy::Full => total,
            SamplingStrategy::Random { percentage } => {
                let count = (total as f64 * percentage).round() as usize;
                count.clamp(1, total.max(1))
            }
        }
    }

    /// Draw a sample set.
    pub fn sample(&mut self) -> MetricSamples<B> {
        let total = self.values.len();
        let voxels: Vec<usize> = match self.strategy {
            SamplingStrategy::Full => (0..total).collect(),
            SamplingStrategy::Random { .. } => {
                let count = self.sample_count().min(total);
                let mut voxels = index::sample(&mut self.rng, total, count).into_vec();
                voxels.sort_unstable();
                voxels
            }
        };

        self.gather(&voxels)
    }

    fn gather(&self, voxels: &[usize]) -> MetricSamples<B> {
        let device = self.fixed.data().device();
        let [nx, ny, _] = self.fixed.size();
        let n = voxels.len();

        let mut coords = Vec::with_capacity(n * 3);
        let mut values = Vec::with_capacity(n);
        for &voxel in voxels {
            coords.push((voxel % nx) as f32);
            coords.push(((voxel / nx) % ny) as f32);
            coords.push((voxel / (nx * ny)) as f32);
            values.push(self.values[voxel]);
        }

        let indices = Tensor::<B, 2>::from_data(TensorData::new(coords, Shape::new([n, 3])), &device);
        let fixed_values = Tensor::<B, 1>::from_data(TensorData::new(values, Shape::new([n])), &device);

        MetricSamples {
            fixed_points: self.fixed.index_to_world_tensor(indices),
            fixed_values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainreg_core::spatial::{Direction3, Point3, Spacing3};
    use brainreg_core::tensor::volume_from_vec;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn ramp_image() -> Image<TestBackend, 3> {
        let device = Default::default();
        let values: Vec<f32> = (0..4 * 5 * 6).map(|v| v as f32).collect();
        Image::new(
            volume_from_vec::<TestBackend>(values, [4, 5, 6], &device),
            Point3::new(10.0, 0.0, 0.0),
            Spacing3::new(2.0, 1.0, 1.0),
            Direction3::identity(),
        )
    }

    #[test]
    fn test_full_sampling_covers_every_voxel() {
        let image = ramp_image();
        let mut sampler = VoxelSampler::new(&image, SamplingStrategy::Full, None);
        let samples = sampler.sample();

        assert_eq!(samples.len(), 120);
        let points = to_host_vec(samples.fixed_points);
        let values = to_host_vec(samples.fixed_values);

        // voxel 7 -> index (1, 1, 0) -> physical (12, 1, 0)
        assert_eq!(values[7], 7.0);
        assert_eq!(&points[21..24], &[12.0, 1.0, 0.0]);
    }

    #[test]
    fn test_random_sample_count() {
        let image = ramp_image();
        let sampler = VoxelSampler::new(&image, SamplingStrategy::Random { percentage: 0.1 }, Some(1));
        assert_eq!(sampler.sample_count(), 12);

        let tiny = VoxelSampler::new(&image, SamplingStrategy::Random { percentage: 1e-6 }, Some(1));
        assert_eq!(tiny.sample_count(), 1);
    }

    #[test]
    fn test_random_samples_are_distinct_and_consistent() {
        let image = ramp_image();
        let mut sampler = VoxelSampler::new(&image, SamplingStrategy::Random { percentage: 0.5 }, Some(3));
        let samples = sampler.sample();

        let mut values = to_host_vec(samples.fixed_values.clone());
        let points = to_host_vec(samples.fixed_points);
        for (i, value) in values.iter().enumerate() {
            // value = x + 6 y + 30 z, with physical x = 10 + 2 * index x
            let x = (points[i * 3] - 10.0) / 2.0;
            let y = points[i * 3 + 1];
            let z = points[i * 3 + 2];
            assert_eq!(*value, x + 6.0 * y + 30.0 * z);
        }

        values.dedup();
        assert_eq!(values.len(), 60);
    }

    #[test]
    fn test_seed_reproducible() {
        let image = ramp_image();
        let strategy = SamplingStrategy::Random { percentage: 0.2 };
        let mut a = VoxelSampler::new(&image, strategy, Some(42));
        let mut b = VoxelSampler::new(&image, strategy, Some(42));

        assert_eq!(to_host_vec(a.sample().fixed_values), to_host_vec(b.sample().fixed_values));
        assert_eq!(to_host_vec(a.sample().fixed_values), to_host_vec(b.sample().fixed_values));
    }
}
