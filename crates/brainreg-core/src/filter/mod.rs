//! Image filters.

pub mod resample;

pub use resample::{ResampleImageFilter, resample_to_output};
