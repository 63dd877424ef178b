//! Host transfer helpers for tensors.

use burn::tensor::{Tensor, TensorData, Shape};
use burn::tensor::backend::Backend;

/// Copy a tensor's values to the host in row-major order.
pub fn to_host_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    let data = tensor.into_data().convert::<f32>();
    data.to_vec::<f32>().unwrap_or_default()
}

/// Read a single-element tensor as `f64`.
pub fn to_scalar<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> f64 {
    to_host_vec(tensor).first().copied().map(f64::from).unwrap_or(f64::NAN)
}

/// Build a 3D tensor from row-major host values.
pub fn volume_from_vec<B: Backend>(values: Vec<f32>, shape: [usize; 3], device: &B::Device) -> Tensor<B, 3> {
    Tensor::<B, 3>::from_data(TensorData::new(values, Shape::new(shape)), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_roundtrip_volume() {
        let device = Default::default();
        let values: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let tensor = volume_from_vec::<TestBackend>(values.clone(), [2, 3, 4], &device);
        assert_eq!(tensor.dims(), [2, 3, 4]);
        assert_eq!(to_host_vec(tensor), values);
    }

    #[test]
    fn test_scalar() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 1>::from_floats([2.5], &device);
        assert_eq!(to_scalar(tensor), 2.5);
    }
}
