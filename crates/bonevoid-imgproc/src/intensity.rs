use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use bonevoid_volume::Volume;

use crate::error::ImgprocError;
use crate::parallel::{self, ExecutionStrategy};

/// Compute percentiles of the finite voxel values.
///
/// Percentiles are in `[0, 100]` and linearly interpolated between the
/// sorted samples.
///
/// # Errors
///
/// Returns an error if a percentile lies outside `[0, 100]`.
pub fn percentiles(src: &Volume<f32>, pcts: &[f32]) -> Result<Vec<f32>, ImgprocError> {
    if let Some(&p) = pcts.iter().find(|p| !(0.0..=100.0).contains(*p)) {
        return Err(ImgprocError::InvalidPercentiles(p, p));
    }

    let mut values: Vec<f32> = src
        .as_slice()
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    if values.is_empty() {
        return Ok(vec![0.0; pcts.len()]);
    }
    values.par_sort_unstable_by(f32::total_cmp);

    let last = (values.len() - 1) as f32;
    Ok(pcts
        .iter()
        .map(|&p| {
            let rank = p / 100.0 * last;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let t = rank - lo as f32;
            values[lo] + (values[hi] - values[lo]) * t
        })
        .collect())
}

/// Percentile window used to stretch the contrast of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastWindow {
    /// Percentile mapped to `out_min`.
    pub low_percentile: f32,
    /// Percentile mapped to `out_max`.
    pub high_percentile: f32,
    /// Output value of the low end.
    pub out_min: f32,
    /// Output value of the high end.
    pub out_max: f32,
}

impl Default for ContrastWindow {
    fn default() -> Self {
        Self {
            low_percentile: 0.5,
            high_percentile: 99.5,
            out_min: 0.0,
            out_max: 1000.0,
        }
    }
}

/// Linearly rescale a volume so a percentile window spans an output range.
///
/// Values below the low percentile map to `out_min`, values above the high
/// percentile to `out_max`. Non-finite voxels map to `out_min`.
///
/// # Errors
///
/// Returns an error if the percentiles are outside `[0, 100]` or not
/// increasing.
///
/// # Examples
///
/// ```
/// use bonevoid_volume::{Volume, VolumeGeometry};
/// use bonevoid_imgproc::intensity::{normalize_contrast, ContrastWindow};
///
/// let scan = Volume::new(VolumeGeometry::new([3, 1, 1]), vec![-50.0f32, 25.0, 100.0]).unwrap();
/// let window = ContrastWindow { low_percentile: 0.0, high_percentile: 100.0, ..Default::default() };
/// let stretched = normalize_contrast(&scan, &window).unwrap();
///
/// assert_eq!(stretched.as_slice(), &[0.0, 500.0, 1000.0]);
/// ```
pub fn normalize_contrast(
    src: &Volume<f32>,
    window: &ContrastWindow,
) -> Result<Volume<f32>, ImgprocError> {
    if window.low_percentile >= window.high_percentile {
        return Err(ImgprocError::InvalidPercentiles(
            window.low_percentile,
            window.high_percentile,
        ));
    }

    let bounds = percentiles(src, &[window.low_percentile, window.high_percentile])?;
    let (lo, hi) = (bounds[0], bounds[1]);
    let (out_min, out_max) = (window.out_min, window.out_max);
    log::debug!("contrast window [{lo}, {hi}] -> [{out_min}, {out_max}]");

    let mut dst = Volume::from_geometry_val(*src.geometry(), out_min);
    if hi <= lo {
        return Ok(dst);
    }

    let scale = (out_max - out_min) / (hi - lo);
    parallel::par_iter_voxels(src, &mut dst, ExecutionStrategy::default(), |s, d| {
        *d = if s.is_finite() {
            out_min + (s.clamp(lo, hi) - lo) * scale
        } else {
            out_min
        };
    })?;

    Ok(dst)
}

#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    n: u64,
    sum: f64,
    sum_sq: f64,
    outliers: u64,
}

impl Moments {
    fn add_value(mut self, &v: &f32) -> Self {
        if v.is_finite() {
            let v = v as f64;
            self.n += 1;
            self.sum += v;
            self.sum_sq += v * v;
            self.outliers += u64::from(v > 4000.0 || v < -1000.0);
        }
        self
    }

    fn merge(self, other: Self) -> Self {
        Self {
            n: self.n + other.n,
            sum: self.sum + other.sum,
            sum_sq: self.sum_sq + other.sum_sq,
            outliers: self.outliers + other.outliers,
        }
    }
}

/// Summary statistics of the finite voxel values of a volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityStats {
    /// Mean value.
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    /// Fraction of voxels above 4000 or below -1000.
    pub outlier_fraction: f64,
}

impl IntensityStats {
    /// Compute the statistics of a volume.
    ///
    /// Partial sums are taken per z slice and added in slice order, so the
    /// result does not depend on the thread count.
    pub fn compute(src: &Volume<f32>) -> Self {
        let slice_len = src.size().slice_len().max(1);
        let partials: Vec<Moments> = src
            .as_slice()
            .par_chunks(slice_len)
            .map(|slice| slice.iter().fold(Moments::default(), Moments::add_value))
            .collect();
        let Moments {
            n,
            sum,
            sum_sq,
            outliers,
        } = partials.into_iter().fold(Moments::default(), Moments::merge);

        if n == 0 {
            return Self {
                mean: 0.0,
                std: 0.0,
                outlier_fraction: 0.0,
            };
        }

        let n_f = n as f64;
        let mean = sum / n_f;
        let var = (sum_sq / n_f - mean * mean).max(0.0);
        Self {
            mean,
            std: var.sqrt(),
            outlier_fraction: outliers as f64 / n_f,
        }
    }

    /// Whether the statistics look like a scan calibrated in Hounsfield units.
    pub fn is_hounsfield(&self) -> bool {
        self.mean > -1000.0
            && self.mean < 1000.0
            && self.std > 500.0
            && self.std < 1000.0
            && self.outlier_fraction < 0.1
    }
}

/// Whether a greyscale volume looks calibrated in Hounsfield units.
///
/// Scans that fail the check are typically cone-beam CT with arbitrary
/// intensity units.
pub fn is_hounsfield_calibrated(src: &Volume<f32>) -> bool {
    let stats = IntensityStats::compute(src);
    log::debug!(
        "intensity mean {:.1} std {:.1} outliers {:.3}",
        stats.mean,
        stats.std,
        stats.outlier_fraction
    );
    stats.is_hounsfield()
}
