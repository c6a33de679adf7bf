use serde::{Deserialize, Serialize};

use bonevoid_imgproc::intensity::ContrastWindow;
use bonevoid_imgproc::neighborhood::Connectivity;
use bonevoid_imgproc::threshold::AutoThresholdMethod;

use crate::error::DetectError;

/// Configuration of the [`crate::VoidVolumeDetector`].
///
/// Radii are in voxels; `sigma` is in physical units and defaults to one
/// voxel along x.
///
/// # Example
///
/// ```
/// use bonevoid_detect::VoidVolumeConfig;
///
/// let config: VoidVolumeConfig =
///     serde_json::from_str(r#"{"lower_threshold": 850, "upper_threshold": 9999}"#).unwrap();
/// assert_eq!(config.morphological_radius, 5);
/// assert_eq!(config.combine_radius(), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoidVolumeConfig {
    /// Lowest bone intensity, inclusive.
    pub lower_threshold: f32,
    /// Highest bone intensity, inclusive.
    pub upper_threshold: f32,
    /// Gaussian denoise width in physical units.
    pub sigma: Option<f64>,
    /// Smallest void radius kept by the distance pass.
    pub minimal_radius: usize,
    /// Radius of the erode and dilate passes.
    pub morphological_radius: usize,
    /// Radius used to combine the fine and coarse candidates.
    ///
    /// Defaults to 3 when `morphological_radius > 5`, else 5.
    pub combine_radius: Option<usize>,
    /// Bone components smaller than this are dropped after binarization.
    pub min_bone_voxels: usize,
    /// Erosions smaller than this are dropped from the output.
    pub min_erosion_voxels: usize,
    /// Seeds are inflated by this distance, in voxels, before growing.
    pub seed_inflation_radius: f32,
    /// Connectivity of bone pruning, labeling and region growing, 26
    /// neighbours by default.
    pub connectivity: Connectivity,
}

impl Default for VoidVolumeConfig {
    fn default() -> Self {
        Self {
            lower_threshold: 3000.0,
            upper_threshold: 10000.0,
            sigma: None,
            minimal_radius: 3,
            morphological_radius: 5,
            combine_radius: None,
            min_bone_voxels: 420,
            min_erosion_voxels: 927,
            seed_inflation_radius: 5.0,
            connectivity: Connectivity::Full,
        }
    }
}

impl VoidVolumeConfig {
    /// The radius used by the combine step.
    pub fn combine_radius(&self) -> usize {
        self.combine_radius
            .unwrap_or(if self.morphological_radius > 5 { 3 } else { 5 })
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the thresholds are inverted or a radius or sigma
    /// is out of range.
    pub fn validate(&self) -> Result<(), DetectError> {
        validate_thresholds(self.lower_threshold, self.upper_threshold)?;
        validate_sigma(self.sigma)?;
        validate_at_least_one("minimal_radius", self.minimal_radius)?;
        validate_at_least_one("morphological_radius", self.morphological_radius)?;
        if !(self.seed_inflation_radius.is_finite() && self.seed_inflation_radius >= 0.0) {
            return Err(DetectError::InvalidParameter {
                name: "seed_inflation_radius",
                reason: format!("must be finite and >= 0, got {}", self.seed_inflation_radius),
            });
        }
        Ok(())
    }
}

/// Configuration of the [`crate::CorticalBreakDetector`].
///
/// The bone thresholds are in the units of the volume that is segmented.
/// For [`crate::CorticalBreakVariant::Peters`] that is the scan itself. For
/// [`crate::CorticalBreakVariant::Cbct`] it is the contrast-normalized scan,
/// whose values lie in `[contrast_window.out_min, contrast_window.out_max]`.
/// The erosion pass under the breaks reuses the same thresholds on the same
/// volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorticalBreakConfig {
    /// Lowest bone intensity, inclusive. Scan units for Peters, normalized
    /// units for Cbct.
    pub lower_threshold: f32,
    /// Highest bone intensity, inclusive. Scan units for Peters, normalized
    /// units for Cbct.
    pub upper_threshold: f32,
    /// Automatic threshold method, overrides the explicit thresholds.
    pub auto_threshold: Option<AutoThresholdMethod>,
    /// Gaussian denoise width in physical units.
    pub sigma: Option<f64>,
    /// Thickness of the cortical band in voxels.
    pub cortical_thickness: usize,
    /// Morphological radius of the erosion pass under each break.
    pub dilate_erode_distance: usize,
    /// Voxel size in microns.
    pub voxel_size_microns: f64,
    /// Smallest void radius kept by the erosion distance pass.
    pub minimal_radius: usize,
    /// Breaks narrower than this diameter are ignored.
    pub min_break_diameter_microns: f64,
    /// Bone components smaller than this are dropped after binarization.
    pub min_bone_voxels: usize,
    /// Erosions smaller than this are dropped from the output.
    pub min_erosion_voxels: usize,
    /// Percentile window of the cone-beam contrast stage.
    pub contrast_window: ContrastWindow,
    /// Connectivity of labeling and region growing.
    pub connectivity: Connectivity,
}

impl Default for CorticalBreakConfig {
    fn default() -> Self {
        let erosion = VoidVolumeConfig::default();
        Self {
            lower_threshold: erosion.lower_threshold,
            upper_threshold: erosion.upper_threshold,
            auto_threshold: None,
            sigma: None,
            cortical_thickness: 4,
            dilate_erode_distance: 1,
            voxel_size_microns: 82.0,
            minimal_radius: erosion.minimal_radius,
            min_break_diameter_microns: 330.0,
            min_bone_voxels: erosion.min_bone_voxels,
            min_erosion_voxels: erosion.min_erosion_voxels,
            contrast_window: ContrastWindow::default(),
            connectivity: erosion.connectivity,
        }
    }
}

impl CorticalBreakConfig {
    /// Minimum number of voxels of a break, the volume of a sphere with
    /// diameter `min_break_diameter_microns`.
    pub fn min_break_voxels(&self) -> usize {
        let radius = 0.5 * self.min_break_diameter_microns / self.voxel_size_microns;
        let volume = 4.0 / 3.0 * std::f64::consts::PI * radius.powi(3);
        (volume.ceil() as usize).max(1)
    }

    /// Configuration of the erosion pass seeded at the breaks.
    pub fn erosion_config(&self, lower_threshold: f32, upper_threshold: f32) -> VoidVolumeConfig {
        VoidVolumeConfig {
            lower_threshold,
            upper_threshold,
            sigma: self.sigma,
            minimal_radius: self.minimal_radius,
            morphological_radius: self.dilate_erode_distance,
            min_bone_voxels: self.min_bone_voxels,
            min_erosion_voxels: self.min_erosion_voxels,
            connectivity: self.connectivity,
            ..Default::default()
        }
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range. Thresholds are only
    /// checked when no automatic method is set.
    pub fn validate(&self) -> Result<(), DetectError> {
        if self.auto_threshold.is_none() {
            validate_thresholds(self.lower_threshold, self.upper_threshold)?;
        }
        validate_sigma(self.sigma)?;
        validate_at_least_one("cortical_thickness", self.cortical_thickness)?;
        validate_at_least_one("dilate_erode_distance", self.dilate_erode_distance)?;
        validate_at_least_one("minimal_radius", self.minimal_radius)?;
        validate_positive("voxel_size_microns", self.voxel_size_microns)?;
        if !(self.min_break_diameter_microns.is_finite() && self.min_break_diameter_microns >= 0.0)
        {
            return Err(DetectError::InvalidParameter {
                name: "min_break_diameter_microns",
                reason: format!("must be finite and >= 0, got {}", self.min_break_diameter_microns),
            });
        }
        let window = &self.contrast_window;
        if !(0.0..=100.0).contains(&window.low_percentile)
            || !(0.0..=100.0).contains(&window.high_percentile)
            || window.low_percentile >= window.high_percentile
        {
            return Err(DetectError::InvalidParameter {
                name: "contrast_window",
                reason: format!(
                    "percentiles must increase within [0, 100], got {} and {}",
                    window.low_percentile, window.high_percentile
                ),
            });
        }
        Ok(())
    }
}

fn validate_thresholds(lower: f32, upper: f32) -> Result<(), DetectError> {
    if !(lower <= upper) {
        return Err(DetectError::InvalidThresholds(lower, upper));
    }
    Ok(())
}

fn validate_sigma(sigma: Option<f64>) -> Result<(), DetectError> {
    match sigma {
        Some(s) => validate_positive("sigma", s),
        None => Ok(()),
    }
}

fn validate_positive(name: &'static str, value: f64) -> Result<(), DetectError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(DetectError::InvalidParameter {
            name,
            reason: format!("must be positive and finite, got {value}"),
        });
    }
    Ok(())
}

fn validate_at_least_one(name: &'static str, value: usize) -> Result<(), DetectError> {
    if value < 1 {
        return Err(DetectError::InvalidParameter {
            name,
            reason: "must be >= 1".to_string(),
        });
    }
    Ok(())
}
