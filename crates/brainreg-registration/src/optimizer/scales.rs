//! Parameter scales from physical shift.
//!
//! Rotation angles and translations live on very different scales: a small
//! rotation moves the corners of a large volume much further than the same
//! change in translation. Each parameter is perturbed by a small `delta` and
//! the largest resulting shift of a set of probe points is measured; the
//! scale is `(shift / delta)^2`. Gradient components are divided by their
//! scale before a step.

use burn::tensor::backend::Backend;
use brainreg_core::image::Image;
use brainreg_core::spatial::Point3;
use brainreg_core::transform::{RigidParameters, NUM_RIGID_PARAMETERS};

/// Perturbation applied to each parameter when estimating scales.
pub const SCALES_DELTA: f64 = 0.01;

/// Per-parameter scales and the probe points used to measure physical shift.
#[derive(Debug, Clone)]
pub struct ParameterScales {
    scales: [f64; NUM_RIGID_PARAMETERS],
    center: Point3,
    points: Vec<Point3>,
}

impl ParameterScales {
    /// Estimate scales at `parameters`, probing the corners of the fixed grid.
    pub fn from_physical_shift<B: Backend>(
        fixed: &Image<B, 3>,
        parameters: &[f64; NUM_RIGID_PARAMETERS],
        center: Point3,
    ) -> Self {
        Self::from_points(fixed.corners(), parameters, center)
    }

    /// Estimate scales at `parameters` from explicit probe points.
    pub fn from_points(
        points: Vec<Point3>,
        parameters: &[f64; NUM_RIGID_PARAMETERS],
        center: Point3,
    ) -> Self {
        let mut this = Self {
            scales: [1.0; NUM_RIGID_PARAMETERS],
            center,
            points,
        };

        for i in 0..NUM_RIGID_PARAMETERS {
            let mut step = [0.0; NUM_RIGID_PARAMETERS];
            step[i] = SCALES_DELTA;
            let shift = this.step_shift(parameters, &step);
            let scale = (shift / SCALES_DELTA).powi(2);
            this.scales[i] = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
        }

        this
    }

    pub fn scales(&self) -> [f64; NUM_RIGID_PARAMETERS] {
        self.scales
    }

    /// Largest probe-point displacement caused by moving from `parameters`
    /// to `parameters + step`.
    pub fn step_shift(
        &self,
        parameters: &[f64; NUM_RIGID_PARAMETERS],
        step: &[f64; NUM_RIGID_PARAMETERS],
    ) -> f64 {
        let mut moved = *parameters;
        for (p, s) in moved.iter_mut().zip(step.iter()) {
            *p += s;
        }

        let before = RigidParameters::new(parameters, self.center);
        let after = RigidParameters::new(&moved, self.center);

        self.points
            .iter()
            .map(|point| (after.transform_point(point) - before.transform_point(point)).norm())
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_corners(half: f64) -> Vec<Point3> {
        let mut corners = Vec::new();
        for &x in &[-half, half] {
            for &y in &[-half, half] {
                for &z in &[-half, half] {
                    corners.push(Point3::new(x, y, z));
                }
            }
        }
        corners
    }

    #[test]
    fn test_translation_scales_are_one() {
        let scales = ParameterScales::from_points(cube_corners(10.0), &[0.0; 6], Point3::origin());
        let s = scales.scales();
        for value in &s[3..] {
            assert!((value - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rotation_scales_grow_with_extent() {
        let small = ParameterScales::from_points(cube_corners(10.0), &[0.0; 6], Point3::origin()).scales();
        let large = ParameterScales::from_points(cube_corners(100.0), &[0.0; 6], Point3::origin()).scales();

        // corner distance from the rotation axis is half * sqrt(2)
        let expected = 200.0;
        assert!((small[0] - expected).abs() / expected < 1e-3);
        assert!(large[2] > 90.0 * small[2]);
    }

    #[test]
    fn test_step_shift() {
        let scales = ParameterScales::from_points(cube_corners(5.0), &[0.0; 6], Point3::origin());
        let shift = scales.step_shift(&[0.0; 6], &[0.0, 0.0, 0.0, 3.0, 4.0, 0.0]);
        assert!((shift - 5.0).abs() < 1e-9);
    }
}
