use bonevoid_volume::Volume;
use rayon::prelude::*;

use crate::error::ImgprocError;

/// Intensity histogram of a greyscale volume over its value range.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Voxel count per bin.
    pub counts: Vec<u64>,
    /// Lower edge of the first bin.
    pub min: f32,
    /// Upper edge of the last bin.
    pub max: f32,
}

impl Histogram {
    /// Number of bins.
    pub fn num_bins(&self) -> usize {
        self.counts.len()
    }

    /// Width of one bin.
    pub fn bin_width(&self) -> f32 {
        (self.max - self.min) / self.counts.len() as f32
    }

    /// Lower edge of bin `i`.
    pub fn bin_lower(&self, i: usize) -> f32 {
        self.min + i as f32 * self.bin_width()
    }

    /// Total number of counted voxels.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Compute the intensity histogram of a volume.
///
/// The range spans the minimum to the maximum finite voxel value; the maximum
/// falls in the last bin. Non-finite voxels are ignored.
///
/// # Arguments
///
/// * `src` - The input volume.
/// * `num_bins` - The number of bins to use for the histogram.
///
/// # Errors
///
/// Returns an error if the number of bins is zero.
///
/// # Example
///
/// ```
/// use bonevoid_volume::{Volume, VolumeGeometry};
/// use bonevoid_imgproc::histogram::compute_histogram;
///
/// let volume = Volume::new(
///     VolumeGeometry::new([3, 3, 1]),
///     vec![0.0f32, 2.0, 4.0, 128.0, 130.0, 132.0, 254.0, 255.0, 255.0],
/// ).unwrap();
///
/// let hist = compute_histogram(&volume, 3).unwrap();
/// assert_eq!(hist.counts, vec![3, 3, 3]);
/// ```
pub fn compute_histogram(src: &Volume<f32>, num_bins: usize) -> Result<Histogram, ImgprocError> {
    if num_bins == 0 {
        return Err(ImgprocError::InvalidBins(num_bins));
    }

    let (min, max) = src
        .as_slice()
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    if min > max {
        // no finite voxel
        return Ok(Histogram {
            counts: vec![0; num_bins],
            min: 0.0,
            max: 0.0,
        });
    }

    let range = max - min;
    let bin_of = |v: f32| -> usize {
        if range <= 0.0 {
            return 0;
        }
        let bin = ((v - min) / range * num_bins as f32) as usize;
        bin.min(num_bins - 1)
    };

    let counts = src
        .as_slice()
        .par_chunks(4096)
        .fold(
            || vec![0u64; num_bins],
            |mut local, chunk| {
                for &v in chunk.iter().filter(|v| v.is_finite()) {
                    local[bin_of(v)] += 1;
                }
                local
            },
        )
        .reduce(
            || vec![0u64; num_bins],
            |mut a, b| {
                for (i, val) in b.iter().enumerate() {
                    a[i] += val;
                }
                a
            },
        );

    Ok(Histogram { counts, min, max })
}
