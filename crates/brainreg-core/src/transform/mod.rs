//! Transform types and operations.
//!
//! This module provides the transform trait and the rigid transform
//! used to map fixed-image points into moving-image space.

pub mod trait_;
pub mod rigid;

pub use trait_::Transform;
pub use rigid::{RigidTransform, RigidParameters, NUM_RIGID_PARAMETERS};
