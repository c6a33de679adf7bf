use crate::geometry::{VolumeSize, VoxelIndex};

/// An error type for the volume module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum VolumeError {
    /// Error when the data length does not match the volume size.
    #[error("Data length ({0}) does not match the volume size ({1})")]
    InvalidDataLength(usize, usize),

    /// Error when two volumes do not occupy the same physical space.
    #[error("Volumes do not share the same geometry: {0} vs {1}")]
    GeometryMismatch(VolumeSize, VolumeSize),

    /// Error when a voxel index lies outside the volume.
    #[error("Voxel index {0} is out of bounds for volume of size {1}")]
    IndexOutOfBounds(VoxelIndex, VolumeSize),

    /// Error when two geometries cannot be aligned by a pure translation.
    #[error("Cannot align volumes with different spacing or direction")]
    IncompatibleSpacing,

    /// Error when a voxel value cannot be represented in the target type.
    #[error("Failed to cast voxel value to {0}")]
    CastError(String),
}
