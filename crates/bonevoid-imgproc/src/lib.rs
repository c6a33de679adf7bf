#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// connected component labeling and size pruning.
pub mod connected_components;

/// voxelwise logical operations on binary volumes.
pub mod core;

/// signed euclidean distance maps.
pub mod distance_transform;

/// Error types for the imgproc module.
pub mod error;

/// volume filtering module.
pub mod filter;

/// compute volume histogram module.
pub mod histogram;

/// intensity statistics and contrast normalization.
pub mod intensity;

/// binary morphology with ball structuring elements.
pub mod morphology;

/// voxel neighbourhoods.
pub mod neighborhood;

/// module containing parallization utilities.
pub mod parallel;

/// seeded region growing.
pub mod region_growing;

/// operations to threshold volumes.
pub mod threshold;

pub use crate::error::ImgprocError;
