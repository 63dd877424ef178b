//! Optimizers for rigid registration parameters.

pub mod trait_;
pub mod scales;
pub mod gradient_descent;

pub use trait_::ParameterOptimizer;
pub use scales::{ParameterScales, SCALES_DELTA};
pub use gradient_descent::GradientDescent;
