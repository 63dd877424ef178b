//! Image type with physical metadata and coordinate transformations.
//!
//! This module provides the Image struct which represents MRI volumes
//! with tensor data and physical space metadata (origin, spacing, direction).

use burn::tensor::{Tensor, TensorData};
use burn::tensor::backend::Backend;
use crate::spatial::{Point, Spacing, Direction, Vector};

/// Volume with physical metadata.
///
/// The Image type combines tensor data with physical space metadata that
/// describes how image indices map to physical coordinates.
///
/// # Type Parameters
/// * `B` - The backend for tensor operations
/// * `D` - The dimensionality of the image
///
/// # Coordinate Systems
/// * **Index Space**: Continuous voxel indices ordered `(x, y, z)`
/// * **Physical Space**: Continuous coordinates in mm or other units
///
/// The tensor itself is stored with the axes reversed (`[Z, Y, X]` for 3D).
///
/// # Examples
/// ```rust
/// use brainreg_core::Image;
/// use brainreg_core::spatial::{Point3, Spacing3, Direction3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
/// let image = Image::new(data, Point3::origin(), Spacing3::new(1.0, 1.0, 1.0), Direction3::identity());
/// assert_eq!(image.shape(), [10, 10, 10]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    /// The voxel data.
    data: Tensor<B, D>,
    /// Physical coordinate of the first voxel (index 0,0,0).
    origin: Point<D>,
    /// Physical distance between voxels along each index axis.
    spacing: Spacing<D>,
    /// Orientation of the image axes (column i is index axis i).
    direction: Direction<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    /// Create a new image with the given data and metadata.
    pub fn new(
        data: Tensor<B, D>,
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
    ) -> Self {
        Self {
            data,
            origin,
            spacing,
            direction,
        }
    }

    /// Create an image on the unit grid: zero origin, unit spacing, identity direction.
    pub fn from_tensor(data: Tensor<B, D>) -> Self {
        Self::new(data, Point::origin(), Spacing::from_element(1.0), Direction::identity())
    }

    /// Get the image data tensor.
    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    /// Consume the image and return its data tensor.
    pub fn into_data(self) -> Tensor<B, D> {
        self.data
    }

    /// Replace the data while keeping the spatial metadata.
    pub fn with_data(&self, data: Tensor<B, D>) -> Self {
        Self::new(data, self.origin, self.spacing, self.direction)
    }

    /// Same data, placed on the unit grid (zero origin, unit spacing, identity direction).
    pub fn on_unit_grid(&self) -> Self {
        Self::from_tensor(self.data.clone())
    }

    /// Get the origin (physical coordinate of first voxel).
    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    /// Get the spacing (physical distance between voxels).
    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    /// Get the direction (orientation matrix).
    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// Get the tensor shape (`[Z, Y, X]` for 3D).
    pub fn shape(&self) -> [usize; D] {
        self.data.dims()
    }

    /// Get the number of voxels along each index axis, ordered `(x, y, z)`.
    pub fn size(&self) -> [usize; D] {
        let mut size = self.shape();
        size.reverse();
        size
    }

    /// Total number of voxels.
    pub fn num_voxels(&self) -> usize {
        self.shape().iter().product()
    }

    fn inverse_direction(&self) -> Direction<D> {
        // Direction matrices are orthonormal in practice; fall back to the transpose
        // if the stored matrix is numerically singular.
        self.direction
            .try_inverse()
            .unwrap_or_else(|| self.direction.transpose())
    }

    /// Convert a continuous physical point to a continuous index.
    ///
    /// `index = (Direction^-1 * (point - origin)) / spacing`
    pub fn transform_physical_point_to_continuous_index(&self, point: &Point<D>) -> Point<D> {
        let diff = point - self.origin;
        let rotated = self.inverse_direction() * diff;

        let mut index = Point::<D>::origin();
        for i in 0..D {
            index[i] = rotated[i] / self.spacing[i];
        }
        index
    }

    /// Convert a continuous index to a physical point.
    ///
    /// `point = origin + Direction * (index * spacing)`
    pub fn transform_continuous_index_to_physical_point(&self, index: &Point<D>) -> Point<D> {
        let mut scaled_index = Vector::<D>::zeros();
        for i in 0..D {
            scaled_index[i] = index[i] * self.spacing[i];
        }

        let rotated = self.direction * scaled_index;
        self.origin + rotated
    }

    /// Physical position of the geometric center of the voxel grid.
    pub fn geometric_center(&self) -> Point<D> {
        let size = self.size();
        let mut index = Point::<D>::origin();
        for i in 0..D {
            index[i] = (size[i].max(1) - 1) as f64 / 2.0;
        }
        self.transform_continuous_index_to_physical_point(&index)
    }

    /// Physical positions of the `2^D` corners of the voxel grid.
    pub fn corners(&self) -> Vec<Point<D>> {
        let size = self.size();
        (0..(1usize << D))
            .map(|mask| {
                let mut index = Point::<D>::origin();
                for i in 0..D {
                    if mask & (1 << i) != 0 {
                        index[i] = (size[i].max(1) - 1) as f64;
                    }
                }
                self.transform_continuous_index_to_physical_point(&index)
            })
            .collect()
    }

    /// Batch transform physical points to continuous indices using tensors.
    ///
    /// # Arguments
    /// * `points` - A tensor of shape `[Batch, D]` containing physical points
    ///
    /// # Returns
    /// A tensor of shape `[Batch, D]` containing continuous indices
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();

        let origin_vec: Vec<f32> = (0..D).map(|i| self.origin[i] as f32).collect();
        let origin_tensor = Tensor::<B, 1>::from_data(
            TensorData::new(origin_vec, burn::tensor::Shape::new([D])),
            &device,
        ).reshape([1, D]);

        // I = (P - O) @ T with T_rc = (D^-1)_cr / S_c
        let inv_dir = self.inverse_direction();

        let mut t_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                t_data.push((inv_dir[(c, r)] / self.spacing[c]) as f32);
            }
        }

        let t_tensor = Tensor::<B, 2>::from_data(
            TensorData::new(t_data, burn::tensor::Shape::new([D, D])),
            &device,
        );

        let diff = points - origin_tensor;
        diff.matmul(t_tensor)
    }

    /// Batch transform continuous indices to physical points using tensors.
    ///
    /// # Arguments
    /// * `indices` - A tensor of shape `[Batch, D]` containing continuous indices
    ///
    /// # Returns
    /// A tensor of shape `[Batch, D]` containing physical points
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = indices.device();

        let origin_vec: Vec<f32> = (0..D).map(|i| self.origin[i] as f32).collect();
        let origin_tensor = Tensor::<B, 1>::from_data(
            TensorData::new(origin_vec, burn::tensor::Shape::new([D])),
            &device,
        ).reshape([1, D]);

        // P = O + I @ M with M_rc = S_r * D_cr
        let mut m_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                m_data.push((self.spacing[r] * self.direction[(c, r)]) as f32);
            }
        }

        let m_tensor = Tensor::<B, 2>::from_data(
            TensorData::new(m_data, burn::tensor::Shape::new([D, D])),
            &device,
        );

        let rotated = indices.matmul(m_tensor);
        rotated + origin_tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use crate::spatial::{Point3, Spacing3, Direction3};

    type Backend = NdArray<f32>;

    fn make_image(shape: [usize; 3], origin: Point3, spacing: Spacing3) -> Image<Backend, 3> {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::zeros(shape, &device);
        Image::new(data, origin, spacing, Direction3::identity())
    }

    #[test]
    fn test_image_creation() {
        let image = make_image([10, 12, 14], Point3::origin(), Spacing3::new(1.0, 1.0, 1.0));

        assert_eq!(image.shape(), [10, 12, 14]);
        assert_eq!(image.size(), [14, 12, 10]);
        assert_eq!(image.num_voxels(), 10 * 12 * 14);
        assert_eq!(image.direction(), &Direction3::identity());
    }

    #[test]
    fn test_physical_to_index_transform() {
        let image = make_image([10, 10, 10], Point3::origin(), Spacing3::new(2.0, 2.0, 2.0));

        let point = Point3::new(10.0, 10.0, 10.0);
        let index = image.transform_physical_point_to_continuous_index(&point);

        assert!((index[0] - 5.0).abs() < 1e-6);
        assert!((index[1] - 5.0).abs() < 1e-6);
        assert!((index[2] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_transform_roundtrip() {
        let image = make_image([10, 10, 10], Point3::new(10.0, 20.0, 30.0), Spacing3::new(1.0, 1.5, 2.0));

        let original_point = Point3::new(3.5, 4.5, 5.5);
        let index = image.transform_physical_point_to_continuous_index(&original_point);
        let transformed_point = image.transform_continuous_index_to_physical_point(&index);

        assert!((original_point - transformed_point).norm() < 1e-9);
    }

    #[test]
    fn test_geometric_center() {
        let image = make_image([11, 21, 5], Point3::new(1.0, 0.0, 0.0), Spacing3::new(2.0, 1.0, 1.0));
        let center = image.geometric_center();

        // size (x, y, z) = (5, 21, 11)
        assert!((center[0] - (1.0 + 2.0 * 2.0)).abs() < 1e-9);
        assert!((center[1] - 10.0).abs() < 1e-9);
        assert!((center[2] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_corners() {
        let image = make_image([3, 4, 5], Point3::origin(), Spacing3::new(1.0, 1.0, 1.0));
        let corners = image.corners();

        assert_eq!(corners.len(), 8);
        assert!(corners.contains(&Point3::new(4.0, 3.0, 2.0)));
        assert!(corners.contains(&Point3::origin()));
    }

    #[test]
    fn test_tensor_mapping_matches_host() {
        let device = Default::default();
        let image = make_image([4, 4, 4], Point3::new(-5.0, 2.0, 1.0), Spacing3::new(0.5, 2.0, 1.0));

        let indices = Tensor::<Backend, 2>::from_floats([[1.0, 2.0, 3.0]], &device);
        let world = image.index_to_world_tensor(indices.clone());
        let values = world.clone().into_data().to_vec::<f32>().unwrap();
        let expected = image.transform_continuous_index_to_physical_point(&Point3::new(1.0, 2.0, 3.0));
        for i in 0..3 {
            assert!((values[i] as f64 - expected[i]).abs() < 1e-5);
        }

        let back = image.world_to_index_tensor(world).into_data().to_vec::<f32>().unwrap();
        assert!((back[0] - 1.0).abs() < 1e-5);
        assert!((back[1] - 2.0).abs() < 1e-5);
        assert!((back[2] - 3.0).abs() < 1e-5);
    }
}
