//! Transform initialization.

use burn::tensor::backend::Backend;
use brainreg_core::image::Image;
use brainreg_core::transform::RigidParameters;

/// Centers the moving image on the fixed image.
pub struct CenteredTransformInitializer;

impl CenteredTransformInitializer {
    /// Initial rigid parameters from image geometry.
    ///
    /// The rotation center is the geometric center of the fixed grid and the
    /// translation maps it onto the geometric center of the moving grid.
    /// Rotation starts at zero.
    pub fn geometry<B: Backend>(fixed: &Image<B, 3>, moving: &Image<B, 3>) -> RigidParameters {
        let fixed_center = fixed.geometric_center();
        let moving_center = moving.geometric_center();

        RigidParameters {
            rotation: [0.0; 3],
            translation: moving_center - fixed_center,
            center: fixed_center,
        }
    }
}
