//! Resample image filter.
//!
//! This module provides ResampleImageFilter which resamples an image
//! onto a new grid using a transform and an interpolator.

use std::marker::PhantomData;
use burn::tensor::{Tensor, Shape, TensorData};
use burn::tensor::backend::Backend;
use crate::image::{Image, generate_slab_grid};
use crate::spatial::{Point3, Spacing3, Direction3};
use crate::transform::{Transform, RigidTransform};
use crate::interpolation::{Interpolator, LinearInterpolator, inside_mask};

/// Upper bound on voxels evaluated per chunk.
const CHUNK_VOXELS: usize = 1 << 20;

/// Resample image filter.
///
/// Resamples an image by applying a transform to map points from the
/// output image space to the input image space, and then interpolating values.
///
/// The transform maps Output Physical Space -> Input Physical Space, which
/// is the direction a registration transform already has (Fixed -> Moving).
/// Output voxels that map outside the input buffer receive the default
/// pixel value.
///
/// # Type Parameters
/// * `B` - The Burn backend
/// * `T` - The transform type
/// * `I` - The interpolator type
pub struct ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B, 3>,
    I: Interpolator<B>,
{
    shape: [usize; 3],
    origin: Point3,
    spacing: Spacing3,
    direction: Direction3,
    transform: T,
    interpolator: I,
    default_pixel_value: f64,
    _phantom: PhantomData<B>,
}

impl<B, T, I> ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B, 3>,
    I: Interpolator<B>,
{
    /// Create a new resample filter.
    ///
    /// # Arguments
    /// * `shape` - Output image shape `[Z, Y, X]`
    /// * `origin` - Output image origin (physical)
    /// * `spacing` - Output image spacing (physical)
    /// * `direction` - Output image direction (matrix)
    /// * `transform` - Transform from output space to input space
    /// * `interpolator` - Interpolator for input image sampling
    pub fn new(
        shape: [usize; 3],
        origin: Point3,
        spacing: Spacing3,
        direction: Direction3,
        transform: T,
        interpolator: I,
    ) -> Self {
        Self {
            shape,
            origin,
            spacing,
            direction,
            transform,
            interpolator,
            default_pixel_value: 0.0,
            _phantom: PhantomData,
        }
    }

    /// Set default pixel value for outside the field of view.
    pub fn with_default_pixel_value(mut self, value: f64) -> Self {
        self.default_pixel_value = value;
        self
    }

    /// Create from a reference image.
    ///
    /// Uses metadata (shape, origin, spacing, direction) from the reference image.
    pub fn new_from_reference(reference: &Image<B, 3>, transform: T, interpolator: I) -> Self {
        Self::new(
            reference.shape(),
            *reference.origin(),
            *reference.spacing(),
            *reference.direction(),
            transform,
            interpolator,
        )
    }

    /// Apply filter to an input image.
    ///
    /// The output grid is processed in z-slabs to bound memory use.
    pub fn apply(&self, input: &Image<B, 3>) -> Image<B, 3> {
        let device = input.data().device();
        let [depth, height, width] = self.shape;
        let slab = (CHUNK_VOXELS / (height * width).max(1)).max(1);

        let mut chunks = Vec::with_capacity(depth.div_ceil(slab));
        let mut start = 0;
        while start < depth {
            let end = (start + slab).min(depth);
            let output_indices = generate_slab_grid::<B>(self.shape, start..end, &device);
            chunks.push(self.sample_chunk(input, output_indices, &device));
            start = end;
        }

        let output_data = if chunks.is_empty() {
            Tensor::<B, 3>::zeros(self.shape, &device)
        } else {
            Tensor::cat(chunks, 0).reshape(Shape::new(self.shape))
        };

        Image::new(output_data, self.origin, self.spacing, self.direction)
    }

    fn sample_chunk(&self, input: &Image<B, 3>, output_indices: Tensor<B, 2>, device: &B::Device) -> Tensor<B, 1> {
        let output_points = self.indices_to_physical(output_indices, device);
        let input_points = self.transform.transform_points(output_points);
        let input_indices = input.world_to_index_tensor(input_points);

        let mask = inside_mask::<B>(input.shape(), input_indices.clone());
        let values = self.interpolator.interpolate(input.data(), input_indices);

        let background = (mask.clone().neg() + 1.0) * self.default_pixel_value;
        values * mask + background
    }

    fn indices_to_physical(&self, indices: Tensor<B, 2>, device: &B::Device) -> Tensor<B, 2> {
        // point = origin + Direction * (index * spacing)
        let origin_vec: Vec<f32> = (0..3).map(|i| self.origin[i] as f32).collect();
        let origin_tensor = Tensor::<B, 1>::from_data(
            TensorData::new(origin_vec, Shape::new([3])),
            device,
        ).reshape([1, 3]);

        let spacing_vec: Vec<f32> = (0..3).map(|i| self.spacing[i] as f32).collect();
        let spacing_tensor = Tensor::<B, 1>::from_data(
            TensorData::new(spacing_vec, Shape::new([3])),
            device,
        ).reshape([1, 3]);

        let scaled_indices = indices * spacing_tensor;

        // Row vectors, so multiply by Direction^T
        let mut dir_data = Vec::with_capacity(9);
        for c in 0..3 {
            for r in 0..3 {
                dir_data.push(self.direction[(r, c)] as f32);
            }
        }

        let dir_t_tensor = Tensor::<B, 2>::from_data(
            TensorData::new(dir_data, Shape::new([3, 3])),
            device,
        );

        origin_tensor + scaled_indices.matmul(dir_t_tensor)
    }
}

/// Resample an image onto an axis-aligned grid with the given voxel spacing.
///
/// The output grid covers the physical bounding box of the input voxel
/// centers: origin at the minimum corner, identity direction, and
/// `ceil(extent / spacing) + 1` voxels per axis. Voxels outside the input
/// receive `0.0`.
pub fn resample_to_output<B: Backend>(image: &Image<B, 3>, spacing: Spacing3) -> Image<B, 3> {
    let corners = image.corners();
    let mut mins = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
    let mut maxs = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for corner in &corners {
        for i in 0..3 {
            mins[i] = mins[i].min(corner[i]);
            maxs[i] = maxs[i].max(corner[i]);
        }
    }

    let mut size = [1usize; 3];
    for i in 0..3 {
        let steps = ((maxs[i] - mins[i]) / spacing[i] - 1e-6).ceil().max(0.0);
        size[i] = steps as usize + 1;
    }

    let device = image.data().device();
    let shape = [size[2], size[1], size[0]];
    let identity = RigidTransform::<B>::identity(&Point3::origin(), &device);

    ResampleImageFilter::new(shape, mins, spacing, Direction3::identity(), identity, LinearInterpolator::new())
        .apply(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use crate::tensor::{to_host_vec, volume_from_vec};

    type TestBackend = NdArray<f32>;

    fn cube_image(device: &<TestBackend as Backend>::Device) -> Image<TestBackend, 3> {
        // 10^3 volume with a 2^3 cube of ones at x, y, z in 4..6
        let mut data = vec![0.0f32; 1000];
        for z in 4..6 {
            for y in 4..6 {
                for x in 4..6 {
                    data[z * 100 + y * 10 + x] = 1.0;
                }
            }
        }
        Image::from_tensor(volume_from_vec::<TestBackend>(data, [10, 10, 10], device))
    }

    #[test]
    fn test_resample_translation() {
        let device = Default::default();
        let image = cube_image(&device);

        // Output point p samples input at p + (-2, -1, 0): content moves by (+2, +1, 0)
        let transform = RigidTransform::<TestBackend>::from_parameters(
            &[0.0, 0.0, 0.0, -2.0, -1.0, 0.0],
            &Point3::origin(),
            &device,
        );
        let filter = ResampleImageFilter::new_from_reference(&image, transform, LinearInterpolator::new());
        let result = filter.apply(&image);
        assert_eq!(result.shape(), [10, 10, 10]);

        let values = to_host_vec(result.data().clone());
        assert!(values[4 * 100 + 5 * 10 + 6] > 0.9);
        assert!(values[5 * 100 + 6 * 10 + 7] > 0.9);
        assert!(values[4 * 100 + 4 * 10 + 4] < 0.1);
    }

    #[test]
    fn test_default_pixel_value_outside() {
        let device = Default::default();
        let image = cube_image(&device).with_data(Tensor::<TestBackend, 3>::ones([10, 10, 10], &device));

        let transform = RigidTransform::<TestBackend>::from_parameters(
            &[0.0, 0.0, 0.0, 5.0, 0.0, 0.0],
            &Point3::origin(),
            &device,
        );
        let filter = ResampleImageFilter::new_from_reference(&image, transform, LinearInterpolator::new())
            .with_default_pixel_value(-3.0);
        let values = to_host_vec(filter.apply(&image).into_data());

        // x in 0..5 maps inside, x >= 5 maps past the edge
        assert_eq!(values[0], 1.0);
        assert_eq!(values[4], 1.0);
        assert_eq!(values[5], -3.0);
        assert_eq!(values[9], -3.0);
    }

    #[test]
    fn test_resample_to_output_grid() {
        let device = Default::default();
        let data = Tensor::<TestBackend, 3>::ones([5, 4, 11], &device);
        let image = Image::new(data, Point3::new(1.0, 2.0, 3.0), Spacing3::new(0.5, 2.0, 1.0), Direction3::identity());

        let output = resample_to_output(&image, Spacing3::new(1.0, 1.0, 1.0));

        // extents: x 10 * 0.5 = 5, y 3 * 2 = 6, z 4 * 1 = 4
        assert_eq!(output.size(), [6, 7, 5]);
        assert_eq!(output.origin(), &Point3::new(1.0, 2.0, 3.0));
        assert_eq!(output.spacing(), &Spacing3::new(1.0, 1.0, 1.0));

        let values = to_host_vec(output.into_data());
        assert!(values.iter().all(|v| (v - 1.0).abs() < 1e-5));
    }
}
