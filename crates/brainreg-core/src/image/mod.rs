//! Image types and operations.
//!
//! This module provides the Image type and related functionality
//! for representing MRI volumes with physical metadata.

pub mod image;
pub mod grid;

pub use image::Image;
pub use grid::generate_slab_grid;
