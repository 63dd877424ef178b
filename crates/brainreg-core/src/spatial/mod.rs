//! Spatial types for representing points, vectors, spacing, and direction matrices.
//!
//! All types are nalgebra aliases over `f64`. Components are ordered by index
//! axis `(x, y, z)`, which is the reverse of the `[Z, Y, X]` tensor layout used
//! for image data.

use nalgebra::{Point as NaPoint, SMatrix, SVector};

pub type Point<const D: usize> = NaPoint<f64, D>;
pub type Vector<const D: usize> = SVector<f64, D>;
pub type Spacing<const D: usize> = SVector<f64, D>;
pub type Direction<const D: usize> = SMatrix<f64, D, D>;

// Common type aliases for 3D
pub type Point3 = Point<3>;
pub type Vector3 = Vector<3>;
pub type Spacing3 = Spacing<3>;
pub type Direction3 = Direction<3>;

/// Smallest spacing component.
pub fn min_spacing<const D: usize>(spacing: &Spacing<D>) -> f64 {
    spacing.iter().cloned().fold(f64::INFINITY, f64::min)
}

/// Component-wise comparison within `tolerance`.
pub fn spacing_approx_eq<const D: usize>(a: &Spacing<D>, b: &Spacing<D>, tolerance: f64) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_spacing() {
        let s = Spacing3::new(2.0, 0.5, 3.0);
        assert_eq!(min_spacing(&s), 0.5);
    }

    #[test]
    fn test_spacing_approx_eq() {
        let a = Spacing3::new(1.0, 1.0, 1.0);
        let b = Spacing3::new(1.0, 1.0 + 1e-7, 1.0);
        assert!(spacing_approx_eq(&a, &b, 1e-6));
        assert!(!spacing_approx_eq(&a, &Spacing3::new(1.0, 2.0, 1.0), 1e-6));
    }
}
