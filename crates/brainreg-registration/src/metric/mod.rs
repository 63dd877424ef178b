//! Similarity metrics and the voxel sampling they are evaluated on.

pub mod trait_;
pub mod sampling;
pub mod mutual_information;

pub use trait_::{Metric, MetricValue};
pub use sampling::{MetricSamples, VoxelSampler};
pub use mutual_information::{IntensityRange, MutualInformation};
