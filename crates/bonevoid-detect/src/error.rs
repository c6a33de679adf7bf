use bonevoid_imgproc::ImgprocError;
use bonevoid_volume::{VolumeError, VolumeSize, VoxelIndex};

/// An error type for the detectors.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DetectError {
    /// Error when a lower threshold is above the upper threshold.
    #[error("Lower threshold ({0}) is greater than upper threshold ({1})")]
    InvalidThresholds(f32, f32),

    /// Error when a configuration value is out of range.
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// The parameter name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Error when the input volumes do not share a grid.
    #[error("Input volumes are not in the same physical space: {0}")]
    Geometry(#[from] VolumeError),

    /// Error when a seed lies outside the volume.
    #[error("Seed {0} lies outside the volume of size {1}")]
    SeedOutOfBounds(VoxelIndex, VolumeSize),

    /// Error raised by a pipeline step; the pipeline is reset.
    #[error("Step {step} failed: {source}")]
    Execution {
        /// The 1-based index of the failing step.
        step: usize,
        /// The underlying error.
        #[source]
        source: ImgprocError,
    },

    /// Error when results are fetched before the pipeline completed.
    #[error("Pipeline incomplete: {step} of {total} steps done")]
    Incomplete {
        /// Number of completed steps.
        step: usize,
        /// Total number of steps.
        total: usize,
    },
}

impl DetectError {
    /// Whether the error was raised while configuring a detector.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            DetectError::InvalidThresholds(..)
                | DetectError::InvalidParameter { .. }
                | DetectError::Geometry(_)
                | DetectError::SeedOutOfBounds(..)
        )
    }
}
