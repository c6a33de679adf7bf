#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Detector configurations.
pub mod config;

/// Cortical break detection.
pub mod cortical_break;

/// Error types for the detect module.
pub mod error;

/// Step-wise execution contract shared by the detectors.
pub mod pipeline;

/// Seeded void volume (erosion) detection.
pub mod void_volume;

pub use crate::config::{CorticalBreakConfig, VoidVolumeConfig};
pub use crate::cortical_break::{CorticalBreakDetector, CorticalBreakInputs, CorticalBreakVariant};
pub use crate::error::DetectError;
pub use crate::pipeline::{run_to_completion, StepPipeline};
pub use crate::void_volume::{VoidVolumeDetector, VoidVolumeStep};
