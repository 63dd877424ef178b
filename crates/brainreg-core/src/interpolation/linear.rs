//! Trilinear interpolation.

use burn::tensor::{Tensor, Int};
use burn::tensor::backend::Backend;
use serde::{Serialize, Deserialize};
use super::trait_::Interpolator;

/// Linear Interpolator.
///
/// Trilinear interpolation on a `[Z, Y, X]` volume. Neighbour indices are
/// clamped to the volume, so points slightly outside the grid take the edge
/// value. Use [`inside_mask`] to tell which points actually fall inside.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    /// Create a new linear interpolator.
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn gather_3d<B: Backend>(
        flat_data: &Tensor<B, 1>,
        xi: &Tensor<B, 1, Int>,
        yi: &Tensor<B, 1, Int>,
        zi: &Tensor<B, 1, Int>,
        stride_y: i32,
        stride_z: i32,
    ) -> Tensor<B, 1> {
        let idx = zi.clone() * stride_z + yi.clone() * stride_y + xi.clone();
        flat_data.clone().gather(0, idx)
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [d0, d1, d2] = data.dims(); // Z, Y, X
        let batch_size = indices.dims()[0];
        let device = indices.device();

        let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let y = indices.clone().narrow(1, 1, 1).squeeze::<1>(1);
        let z = indices.narrow(1, 2, 1).squeeze::<1>(1);

        let x0 = x.clone().floor();
        let y0 = y.clone().floor();
        let z0 = z.clone().floor();

        // floor() carries no gradient, so the weights keep d/dx
        let wx = x - x0.clone();
        let wy = y - y0.clone();
        let wz = z - z0.clone();

        let x1 = x0.clone() + 1.0;
        let y1 = y0.clone() + 1.0;
        let z1 = z0.clone() + 1.0;

        let x0_i = x0.clamp(0.0, (d2 - 1) as f64).int();
        let y0_i = y0.clamp(0.0, (d1 - 1) as f64).int();
        let z0_i = z0.clamp(0.0, (d0 - 1) as f64).int();

        let x1_i = x1.clamp(0.0, (d2 - 1) as f64).int();
        let y1_i = y1.clamp(0.0, (d1 - 1) as f64).int();
        let z1_i = z1.clamp(0.0, (d0 - 1) as f64).int();

        let stride_z = (d1 * d2) as i32;
        let stride_y = d2 as i32;

        let flat_data = data.clone().reshape([d0 * d1 * d2]);

        let v000 = Self::gather_3d(&flat_data, &x0_i, &y0_i, &z0_i, stride_y, stride_z);
        let v001 = Self::gather_3d(&flat_data, &x0_i, &y0_i, &z1_i, stride_y, stride_z);
        let v010 = Self::gather_3d(&flat_data, &x0_i, &y1_i, &z0_i, stride_y, stride_z);
        let v011 = Self::gather_3d(&flat_data, &x0_i, &y1_i, &z1_i, stride_y, stride_z);
        let v100 = Self::gather_3d(&flat_data, &x1_i, &y0_i, &z0_i, stride_y, stride_z);
        let v101 = Self::gather_3d(&flat_data, &x1_i, &y0_i, &z1_i, stride_y, stride_z);
        let v110 = Self::gather_3d(&flat_data, &x1_i, &y1_i, &z0_i, stride_y, stride_z);
        let v111 = Self::gather_3d(&flat_data, &x1_i, &y1_i, &z1_i, stride_y, stride_z);

        let one = Tensor::<B, 1>::ones([batch_size], &device);
        let one_minus_wx = one.clone() - wx.clone();
        let one_minus_wy = one.clone() - wy.clone();
        let one_minus_wz = one - wz.clone();

        // Along X
        let c00 = v000 * one_minus_wx.clone() + v100 * wx.clone();
        let c01 = v001 * one_minus_wx.clone() + v101 * wx.clone();
        let c10 = v010 * one_minus_wx.clone() + v110 * wx.clone();
        let c11 = v011 * one_minus_wx + v111 * wx;

        // Along Y
        let c0 = c00 * one_minus_wy.clone() + c10 * wy.clone();
        let c1 = c01 * one_minus_wy + c11 * wy;

        // Along Z
        c0 * one_minus_wz + c1 * wz
    }
}

/// Mask of points whose continuous index lies inside the buffer.
///
/// A point is inside when every coordinate is within half a voxel of the
/// grid, `[-0.5, size - 0.5)`. Returns `1.0` for inside points and `0.0`
/// otherwise (including NaN coordinates). The mask carries no gradient.
///
/// # Arguments
/// * `shape` - Volume shape `[Z, Y, X]`
/// * `indices` - Continuous indices `[Batch, 3]` ordered `(x, y, z)`
pub fn inside_mask<B: Backend>(shape: [usize; 3], indices: Tensor<B, 2>) -> Tensor<B, 1> {
    let [batch_size, _] = indices.dims();
    let indices = indices.detach();
    let mut mask = Tensor::<B, 1>::ones([batch_size], &indices.device());

    for axis in 0..3 {
        let size = shape[2 - axis] as f64;
        let coord = indices.clone().narrow(1, axis, 1).squeeze::<1>(1);
        let lower = coord.clone().greater_equal_elem(-0.5).float();
        let upper = coord.lower_elem(size - 0.5).float();
        mask = mask * lower * upper;
    }

    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::volume_from_vec;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn ramp_volume(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 3> {
        // value = x + 10 y + 100 z on a [3, 3, 3] grid
        let mut values = Vec::new();
        for z in 0..3 {
            for y in 0..3 {
                for x in 0..3 {
                    values.push((x + 10 * y + 100 * z) as f32);
                }
            }
        }
        volume_from_vec::<TestBackend>(values, [3, 3, 3], device)
    }

    #[test]
    fn test_interpolate_at_grid_points() {
        let device = Default::default();
        let data = ramp_volume(&device);
        let indices = Tensor::<TestBackend, 2>::from_floats([[0.0, 0.0, 0.0], [2.0, 1.0, 2.0]], &device);

        let values = LinearInterpolator::new().interpolate(&data, indices).into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0.0, 212.0]);
    }

    #[test]
    fn test_interpolate_between_points_is_linear() {
        let device = Default::default();
        let data = ramp_volume(&device);
        let indices = Tensor::<TestBackend, 2>::from_floats([[0.5, 1.25, 0.75]], &device);

        let values = LinearInterpolator::new().interpolate(&data, indices).into_data().to_vec::<f32>().unwrap();
        assert!((values[0] - (0.5 + 12.5 + 75.0)).abs() < 1e-4);
    }

    #[test]
    fn test_outside_points_clamp_to_edge() {
        let device = Default::default();
        let data = ramp_volume(&device);
        let indices = Tensor::<TestBackend, 2>::from_floats([[5.0, 0.0, 0.0]], &device);

        let values = LinearInterpolator::new().interpolate(&data, indices).into_data().to_vec::<f32>().unwrap();
        assert_eq!(values[0], 2.0);
    }

    #[test]
    fn test_inside_mask() {
        let device = Default::default();
        let indices = Tensor::<TestBackend, 2>::from_floats(
            [
                [0.0, 0.0, 0.0],
                [-0.4, 1.0, 1.0],
                [-0.6, 1.0, 1.0],
                [1.0, 2.4, 1.0],
                [1.0, 1.0, 2.6],
                [f32::NAN, 1.0, 1.0],
            ],
            &device,
        );

        let mask = inside_mask::<TestBackend>([3, 3, 3], indices).into_data().to_vec::<f32>().unwrap();
        assert_eq!(mask, vec![1.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_inside_mask_uses_axis_order() {
        let device = Default::default();
        // shape [Z=2, Y=3, X=10]: x = 8 is inside, z = 8 is not
        let indices = Tensor::<TestBackend, 2>::from_floats([[8.0, 0.0, 0.0], [0.0, 0.0, 8.0]], &device);
        let mask = inside_mask::<TestBackend>([2, 3, 10], indices).into_data().to_vec::<f32>().unwrap();
        assert_eq!(mask, vec![1.0, 0.0]);
    }
}
