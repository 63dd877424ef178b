pub mod image;
pub mod spatial;
pub mod transform;
pub mod interpolation;
pub mod filter;
pub mod tensor;

pub use image::Image;
pub use spatial::{Point, Vector, Spacing, Direction};
