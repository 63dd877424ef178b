//! Intensity normalization and grid harmonization applied before
//! registration.

use burn::tensor::{Tensor, TensorData, Shape};
use burn::tensor::backend::Backend;
use brainreg_core::image::{Image, generate_slab_grid};
use brainreg_core::interpolation::{Interpolator, LinearInterpolator};
use brainreg_core::spatial::Spacing3;
use brainreg_core::tensor::to_host_vec;

use crate::error::{RegistrationError, Result};

/// Upper bound on output voxels interpolated per chunk.
const CHUNK_VOXELS: usize = 1 << 20;

/// Z-score normalization: `(x - mean) / std` over all voxels.
///
/// Uses the population standard deviation. A constant volume, or one whose
/// statistics are not finite, is rejected as degenerate.
pub fn normalize<B: Backend>(image: &Image<B, 3>) -> Result<Image<B, 3>> {
    let values = to_host_vec(image.data().clone());
    if values.is_empty() {
        return Err(RegistrationError::degenerate_volume("volume has no voxels"));
    }

    let n = values.len() as f64;
    let mean = values.iter().map(|v| *v as f64).sum::<f64>() / n;
    let variance = values.iter().map(|v| (*v as f64 - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();

    if !mean.is_finite() || !std.is_finite() {
        return Err(RegistrationError::degenerate_volume("non-finite intensity statistics"));
    }
    if std == 0.0 {
        return Err(RegistrationError::degenerate_volume(
            format!("zero intensity variance (constant value {})", mean),
        ));
    }

    let data = image.data().clone().sub_scalar(mean).div_scalar(std);
    Ok(image.with_data(data))
}

/// Resample `moving` to exactly `fixed_shape` (`[Z, Y, X]`) by trilinear
/// interpolation.
///
/// Pixel centers are aligned: output index `i` samples the input at
/// `(i + 0.5) * in / out - 0.5`, clamped to the edge voxels. This matches
/// grid resolution only; the returned spacing is scaled so the grid spans
/// the same extent, but the image is treated as intensity data afterwards.
pub fn resize<B: Backend>(fixed_shape: [usize; 3], moving: &Image<B, 3>) -> Result<Image<B, 3>> {
    let moving_shape = moving.shape();
    if fixed_shape.contains(&0) || moving_shape.contains(&0) {
        return Err(RegistrationError::shape_mismatch(&fixed_shape, &moving_shape));
    }
    if fixed_shape == moving_shape {
        return Ok(moving.clone());
    }

    let device = moving.data().device();

    // per (x, y, z) column: input size / output size
    let ratios: Vec<f64> = (0..3)
        .map(|axis| moving_shape[2 - axis] as f64 / fixed_shape[2 - axis] as f64)
        .collect();
    let ratio_tensor = Tensor::<B, 1>::from_data(
        TensorData::new(ratios.iter().map(|r| *r as f32).collect::<Vec<f32>>(), Shape::new([3])),
        &device,
    ).reshape([1, 3]);

    let interpolator = LinearInterpolator::new();
    let [depth, height, width] = fixed_shape;
    let slab = (CHUNK_VOXELS / (height * width)).max(1);

    let mut chunks = Vec::with_capacity(depth.div_ceil(slab));
    let mut start = 0;
    while start < depth {
        let end = (start + slab).min(depth);
        let output_indices = generate_slab_grid::<B>(fixed_shape, start..end, &device);
        let source_indices = (output_indices + 0.5) * ratio_tensor.clone() - 0.5;
        chunks.push(interpolator.interpolate(moving.data(), source_indices));
        start = end;
    }

    let data = Tensor::cat(chunks, 0).reshape(Shape::new(fixed_shape));

    let spacing = moving.spacing();
    let new_spacing = Spacing3::new(spacing[0] * ratios[0], spacing[1] * ratios[1], spacing[2] * ratios[2]);

    tracing::debug!(from = ?moving_shape, to = ?fixed_shape, "resized moving volume");
    Ok(Image::new(data, *moving.origin(), new_spacing, *moving.direction()))
}
