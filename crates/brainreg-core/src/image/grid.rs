use burn::tensor::{Tensor, TensorData, Shape};
use burn::tensor::backend::Backend;

/// Generate the continuous-index grid for the z-slices in `slices` of a
/// volume with shape `[D, H, W]`.
///
/// Returns a tensor of shape `[N, 3]`. Each row is `(x, y, z)`; rows are
/// ordered with x varying fastest, matching the row-major `[Z, Y, X]` data
/// layout. Used to process large volumes in bounded-memory chunks.
pub fn generate_slab_grid<B: Backend>(
    shape: [usize; 3],
    slices: std::ops::Range<usize>,
    device: &B::Device,
) -> Tensor<B, 2> {
    let h = shape[1];
    let w = shape[2];
    let depth = slices.end.saturating_sub(slices.start);
    let total = depth * h * w;

    let mut grid = Vec::with_capacity(total * 3);
    for z in slices {
        for y in 0..h {
            for x in 0..w {
                grid.push(x as f32);
                grid.push(y as f32);
                grid.push(z as f32);
            }
        }
    }

    Tensor::<B, 1>::from_data(TensorData::new(grid, Shape::new([total * 3])), device)
        .reshape([total, 3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_grid_ordering() {
        let device = Default::default();
        let grid = generate_slab_grid::<TestBackend>([2, 2, 3], 0..2, &device);
        assert_eq!(grid.dims(), [12, 3]);

        let values = grid.into_data().to_vec::<f32>().unwrap();
        // Row 1 is (x=1, y=0, z=0)
        assert_eq!(&values[3..6], &[1.0, 0.0, 0.0]);
        // Row 3 is (x=0, y=1, z=0)
        assert_eq!(&values[9..12], &[0.0, 1.0, 0.0]);
        // Last row is (x=2, y=1, z=1)
        assert_eq!(&values[33..36], &[2.0, 1.0, 1.0]);
    }

    #[test]
    fn test_slab_grid() {
        let device = Default::default();
        let grid = generate_slab_grid::<TestBackend>([4, 2, 2], 2..3, &device);
        assert_eq!(grid.dims(), [4, 3]);
        let values = grid.into_data().to_vec::<f32>().unwrap();
        assert!(values.chunks(3).all(|row| row[2] == 2.0));
    }
}
