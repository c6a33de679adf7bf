#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for the volume module.
pub mod error;

/// Physical placement of a voxel grid.
pub mod geometry;

/// volume representation for bone analysis purposes.
pub mod volume;

pub use crate::error::VolumeError;
pub use crate::geometry::{VolumeGeometry, VolumeSize, VoxelIndex};
pub use crate::volume::Volume;

/// A binary volume, 1 for foreground and 0 for background.
pub type BinaryVolume = Volume<u8>;

/// A label volume, 0 for background and positive integers for components.
pub type LabelVolume = Volume<u32>;
