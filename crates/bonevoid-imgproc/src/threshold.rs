use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use bonevoid_volume::{BinaryVolume, Volume};

use crate::error::ImgprocError;
use crate::histogram::{compute_histogram, Histogram};
use crate::parallel::{self, ExecutionStrategy};

/// Apply an inclusive range threshold to a volume.
///
/// # Arguments
///
/// * `src` - The input volume.
/// * `dst` - The output binary volume, 1 where `lower <= x <= upper`, else 0.
/// * `lower` - The lower threshold, inclusive.
/// * `upper` - The upper threshold, inclusive.
/// * `strategy` - How to schedule the sweep.
///
/// # Errors
///
/// Returns an error if `lower > upper` or the volumes differ in size.
pub fn threshold_in_range<T>(
    src: &Volume<T>,
    dst: &mut BinaryVolume,
    lower: T,
    upper: T,
    strategy: ExecutionStrategy,
) -> Result<(), ImgprocError>
where
    T: Copy + PartialOrd + ToPrimitive + Send + Sync,
{
    if lower > upper {
        return Err(ImgprocError::InvalidThresholds(
            lower.to_f32().unwrap_or(f32::NAN),
            upper.to_f32().unwrap_or(f32::NAN),
        ));
    }

    parallel::par_iter_voxels(src, dst, strategy, |s, d| {
        *d = u8::from(*s >= lower && *s <= upper);
    })?;

    Ok(())
}

/// Binarize a volume: 1 where `lower <= x <= upper`, else 0.
///
/// # Examples
///
/// ```
/// use bonevoid_volume::{Volume, VolumeGeometry};
/// use bonevoid_imgproc::threshold::binarize;
///
/// let scan = Volume::new(VolumeGeometry::new([4, 1, 1]), vec![100.0f32, 900.0, 1200.0, 20000.0]).unwrap();
/// let bone = binarize(&scan, 850.0, 9999.0).unwrap();
///
/// assert_eq!(bone.as_slice(), &[0, 1, 1, 0]);
/// ```
pub fn binarize<T>(src: &Volume<T>, lower: T, upper: T) -> Result<BinaryVolume, ImgprocError>
where
    T: Copy + PartialOrd + ToPrimitive + Send + Sync,
{
    let mut dst = Volume::from_geometry_val(*src.geometry(), 0u8);
    threshold_in_range(src, &mut dst, lower, upper, ExecutionStrategy::default())?;
    Ok(dst)
}

/// Histogram based methods to pick a global threshold automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoThresholdMethod {
    /// Maximise the between-class variance.
    Otsu,
    /// Maximise the sum of the entropies of both classes (Kapur).
    MaxEntropy,
    /// Maximise the distance to the line from the histogram peak to its far end.
    Triangle,
}

/// Default number of bins used by [`auto_threshold`].
pub const AUTO_THRESHOLD_BINS: usize = 256;

/// Compute a global threshold with a histogram based method.
///
/// Voxels with a value `>=` the returned threshold are foreground.
///
/// # Errors
///
/// Returns an error if `num_bins < 2`.
pub fn auto_threshold(
    src: &Volume<f32>,
    method: AutoThresholdMethod,
    num_bins: usize,
) -> Result<f32, ImgprocError> {
    if num_bins < 2 {
        return Err(ImgprocError::InvalidBins(num_bins));
    }

    let hist = compute_histogram(src, num_bins)?;
    if hist.total() == 0 || hist.max <= hist.min {
        return Ok(hist.max);
    }

    // index of the last background bin
    let split = match method {
        AutoThresholdMethod::Otsu => otsu_split(&hist),
        AutoThresholdMethod::MaxEntropy => max_entropy_split(&hist),
        AutoThresholdMethod::Triangle => triangle_split(&hist),
    };

    let threshold = hist.bin_lower(split + 1);
    log::debug!("{method:?} threshold: {threshold}");
    Ok(threshold)
}

fn otsu_split(hist: &Histogram) -> usize {
    let total = hist.total() as f64;
    let sum_all: f64 = hist
        .counts
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut best = (0, f64::MIN);
    let mut w0 = 0.0;
    let mut sum0 = 0.0;
    for (i, &c) in hist.counts.iter().enumerate().take(hist.num_bins() - 1) {
        w0 += c as f64;
        sum0 += i as f64 * c as f64;
        let w1 = total - w0;
        if w0 == 0.0 || w1 == 0.0 {
            continue;
        }
        let mu0 = sum0 / w0;
        let mu1 = (sum_all - sum0) / w1;
        let between = w0 * w1 * (mu0 - mu1).powi(2);
        if between > best.1 {
            best = (i, between);
        }
    }
    best.0
}

fn max_entropy_split(hist: &Histogram) -> usize {
    let total = hist.total() as f64;
    let p: Vec<f64> = hist.counts.iter().map(|&c| c as f64 / total).collect();

    let entropy = |probs: &[f64], mass: f64| -> f64 {
        probs
            .iter()
            .filter(|&&q| q > 0.0)
            .map(|&q| {
                let r = q / mass;
                -r * r.ln()
            })
            .sum()
    };

    let mut best = (0, f64::MIN);
    let mut mass0 = 0.0;
    for i in 0..p.len() - 1 {
        mass0 += p[i];
        let mass1 = 1.0 - mass0;
        if mass0 <= 0.0 || mass1 <= 0.0 {
            continue;
        }
        let h = entropy(&p[..=i], mass0) + entropy(&p[i + 1..], mass1);
        if h > best.1 {
            best = (i, h);
        }
    }
    best.0
}

fn triangle_split(hist: &Histogram) -> usize {
    let counts = &hist.counts;
    let n = counts.len();

    let mut peak = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[peak] {
            peak = i;
        }
    }
    let first = counts.iter().position(|&c| c > 0).unwrap_or(0);
    let last = counts.iter().rposition(|&c| c > 0).unwrap_or(n - 1);

    // walk along the longer tail
    let (end, step): (usize, isize) = if last - peak >= peak - first {
        (last, 1)
    } else {
        (first, -1)
    };
    if end == peak {
        return peak.min(n - 2);
    }

    let (x0, y0) = (peak as f64, counts[peak] as f64);
    let (x1, y1) = (end as f64, counts[end] as f64);
    let (dx, dy) = (x1 - x0, y1 - y0);
    let norm = (dx * dx + dy * dy).sqrt();

    let mut best = (peak, f64::MIN);
    let mut i = peak as isize;
    while i != end as isize {
        let x = i as f64;
        let y = counts[i as usize] as f64;
        // distance of the histogram point below the line
        let d = (dy * x - dx * y + x1 * y0 - y1 * x0).abs() / norm;
        if d > best.1 {
            best = (i as usize, d);
        }
        i += step;
    }

    let split = if step > 0 { best.0 } else { best.0.saturating_sub(1) };
    split.min(n - 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bonevoid_volume::VolumeGeometry;

    fn bimodal() -> Volume<f32> {
        Volume::from_fn(VolumeGeometry::new([10, 10, 10]), |i| {
            if i.x < 5 {
                100.0 + i.y as f32
            } else {
                1000.0 + i.z as f32
            }
        })
    }

    #[test]
    fn binarize_inclusive_bounds() -> Result<(), ImgprocError> {
        let scan = Volume::new(VolumeGeometry::new([3, 1, 1]), vec![850.0f32, 9999.0, 849.9])?;
        let bone = binarize(&scan, 850.0, 9999.0)?;
        assert_eq!(bone.as_slice(), &[1, 1, 0]);
        Ok(())
    }

    #[test]
    fn binarize_rejects_inverted_thresholds() {
        let scan = Volume::from_geometry_val(VolumeGeometry::new([1, 1, 1]), 0.0f32);
        assert_eq!(
            binarize(&scan, 10.0, 1.0),
            Err(ImgprocError::InvalidThresholds(10.0, 1.0))
        );
    }

    #[test]
    fn binarize_is_a_fixed_point() -> Result<(), ImgprocError> {
        let scan = bimodal();
        let once = binarize(&scan, 500.0, 2000.0)?;
        let twice = binarize(&once, 1, 1)?;
        assert_eq!(once, twice);
        Ok(())
    }

    #[test]
    fn serial_matches_parallel() -> Result<(), ImgprocError> {
        let scan = bimodal();
        let mut serial = Volume::from_geometry_val(*scan.geometry(), 0u8);
        let mut parallel = serial.clone();
        threshold_in_range(&scan, &mut serial, 500.0, 2000.0, ExecutionStrategy::Serial)?;
        threshold_in_range(
            &scan,
            &mut parallel,
            500.0,
            2000.0,
            ExecutionStrategy::Fixed(3),
        )?;
        assert_eq!(serial, parallel);
        Ok(())
    }

    #[test]
    fn auto_thresholds_split_bimodal() -> Result<(), ImgprocError> {
        let scan = bimodal();
        for method in [AutoThresholdMethod::Otsu, AutoThresholdMethod::MaxEntropy] {
            let t = auto_threshold(&scan, method, AUTO_THRESHOLD_BINS)?;
            assert!(t > 109.0 && t <= 1000.0, "{method:?} gave {t}");
            let bone = binarize(&scan, t, f32::MAX)?;
            assert_eq!(bone.count_nonzero(), 500);
        }
        Ok(())
    }

    #[test]
    fn triangle_separates_peak_from_tail() -> Result<(), ImgprocError> {
        let scan = Volume::from_fn(VolumeGeometry::new([20, 10, 10]), |i| {
            if i.x < 10 {
                0.0
            } else {
                500.0 + 50.0 * i.y as f32 + i.z as f32
            }
        });
        let t = auto_threshold(&scan, AutoThresholdMethod::Triangle, AUTO_THRESHOLD_BINS)?;
        assert!(t > 0.0 && t <= 500.0, "triangle gave {t}");
        Ok(())
    }

    #[test]
    fn method_names_deserialize() {
        let method: AutoThresholdMethod = serde_json::from_str("\"max_entropy\"").unwrap();
        assert_eq!(method, AutoThresholdMethod::MaxEntropy);
    }
}
