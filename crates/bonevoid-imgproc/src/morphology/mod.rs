/// Ball structuring element.
pub mod kernel;
pub use kernel::{BallKernel, KernelRun};

/// Binary erosion and dilation.
pub mod ops;
pub use ops::{dilate, dilate_with_kernel, erode, erode_with_kernel};
