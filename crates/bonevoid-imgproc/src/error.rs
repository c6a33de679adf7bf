use bonevoid_volume::VolumeError;

use crate::parallel::ParallelError;

/// An error type for the imgproc module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ImgprocError {
    /// Error raised by the underlying volume.
    #[error(transparent)]
    Volume(#[from] VolumeError),

    /// Error raised while dispatching work to the thread pool.
    #[error(transparent)]
    Parallel(#[from] ParallelError),

    /// Error when a distance map is requested for a volume without object voxels.
    #[error("Distance map requires at least one voxel different from the background value {0}")]
    EmptyObject(u8),

    /// Error when the smoothing sigma is not a positive finite number.
    #[error("Invalid sigma ({0}), must be positive and finite")]
    InvalidSigma(f64),

    /// Error when a lower threshold is above the upper threshold.
    #[error("Lower threshold ({0}) is greater than upper threshold ({1})")]
    InvalidThresholds(f32, f32),

    /// Error when a histogram is requested with an unusable number of bins.
    #[error("Invalid number of histogram bins ({0})")]
    InvalidBins(usize),

    /// Error when percentiles are outside [0, 100] or not increasing.
    #[error("Invalid percentile window ({0}, {1})")]
    InvalidPercentiles(f32, f32),
}
