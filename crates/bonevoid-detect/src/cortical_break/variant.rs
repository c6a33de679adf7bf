use std::fmt;

use serde::{Deserialize, Serialize};

use bonevoid_imgproc::intensity::{is_hounsfield_calibrated, normalize_contrast};
use bonevoid_imgproc::ImgprocError;
use bonevoid_volume::Volume;

use crate::config::CorticalBreakConfig;

/// The scanner family a [`crate::CorticalBreakDetector`] is tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorticalBreakVariant {
    /// Calibrated HR-pQCT scans, segmented as they are.
    #[default]
    Peters,
    /// Uncalibrated cone-beam CT scans, contrast-normalized before segmentation.
    Cbct,
}

impl CorticalBreakVariant {
    /// Pick the variant from the intensity statistics of a scan.
    pub fn for_scan(greyscale: &Volume<f32>) -> Self {
        if is_hounsfield_calibrated(greyscale) {
            CorticalBreakVariant::Peters
        } else {
            CorticalBreakVariant::Cbct
        }
    }

    pub(crate) fn build(self) -> Box<dyn BreakVariant> {
        match self {
            CorticalBreakVariant::Peters => Box::new(Peters),
            CorticalBreakVariant::Cbct => Box::new(Cbct),
        }
    }
}

impl fmt::Display for CorticalBreakVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorticalBreakVariant::Peters => write!(f, "peters"),
            CorticalBreakVariant::Cbct => write!(f, "cbct"),
        }
    }
}

/// The variant-specific part of the cortical break pipeline.
pub(crate) trait BreakVariant: fmt::Debug + Send + Sync {
    /// The variant tag.
    fn kind(&self) -> CorticalBreakVariant;

    /// Number of steps run before segmentation.
    fn preparation_steps(&self) -> usize;

    /// The greyscale volume to segment, `None` to segment the scan as is.
    fn prepare(
        &self,
        greyscale: &Volume<f32>,
        config: &CorticalBreakConfig,
    ) -> Result<Option<Volume<f32>>, ImgprocError>;
}

#[derive(Debug)]
struct Peters;

impl BreakVariant for Peters {
    fn kind(&self) -> CorticalBreakVariant {
        CorticalBreakVariant::Peters
    }

    fn preparation_steps(&self) -> usize {
        0
    }

    fn prepare(
        &self,
        _greyscale: &Volume<f32>,
        _config: &CorticalBreakConfig,
    ) -> Result<Option<Volume<f32>>, ImgprocError> {
        Ok(None)
    }
}

#[derive(Debug)]
struct Cbct;

impl BreakVariant for Cbct {
    fn kind(&self) -> CorticalBreakVariant {
        CorticalBreakVariant::Cbct
    }

    fn preparation_steps(&self) -> usize {
        1
    }

    fn prepare(
        &self,
        greyscale: &Volume<f32>,
        config: &CorticalBreakConfig,
    ) -> Result<Option<Volume<f32>>, ImgprocError> {
        let normalized = normalize_contrast(greyscale, &config.contrast_window)?;
        Ok(Some(normalized))
    }
}
