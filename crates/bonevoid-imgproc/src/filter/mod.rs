//! Gaussian smoothing of volumes.

/// Sampled filter kernels.
pub mod kernels;

mod separable_filter;
pub use separable_filter::*;
