use bonevoid_volume::Volume;

use crate::error::ImgprocError;
use crate::parallel::{self, Axis, ExecutionStrategy};

use super::kernels::gaussian_kernel;

// 1D correlation with a centred kernel; taps outside the line are skipped and
// the remaining weights renormalized, so constant regions stay constant up to
// the border.
fn filter_line(kernel: &[f32], line: &[f32], out: &mut [f32]) {
    let half = (kernel.len() / 2) as isize;
    let len = line.len() as isize;
    for (i, o) in out.iter_mut().enumerate() {
        let mut acc = 0.0f32;
        let mut weight = 0.0f32;
        for (k, &w) in kernel.iter().enumerate() {
            let j = i as isize + k as isize - half;
            if j >= 0 && j < len {
                acc += line[j as usize] * w;
                weight += w;
            }
        }
        *o = if weight > 0.0 { acc / weight } else { 0.0 };
    }
}

/// Apply a separable filter, one 1D kernel per axis.
///
/// # Arguments
///
/// * `src` - The source volume.
/// * `dst` - The destination volume, same geometry as `src`.
/// * `kernels` - The x, y and z kernels. An empty kernel skips that axis.
/// * `strategy` - How to schedule the line passes.
pub fn separable_filter(
    src: &Volume<f32>,
    dst: &mut Volume<f32>,
    kernels: [&[f32]; 3],
    strategy: ExecutionStrategy,
) -> Result<(), ImgprocError> {
    src.check_same_space(dst)?;

    let size = src.size();
    let mut current = src.as_slice().to_vec();
    let mut next = vec![0.0f32; current.len()];

    for axis in Axis::ALL {
        let kernel = kernels[axis.position()];
        if kernel.is_empty() {
            continue;
        }
        parallel::par_iter_lines(&current, &mut next, size, axis, strategy, |line, out| {
            filter_line(kernel, line, out)
        })?;
        std::mem::swap(&mut current, &mut next);
    }

    dst.as_slice_mut().copy_from_slice(&current);
    Ok(())
}

/// Blur a volume with a gaussian kernel.
///
/// # Arguments
///
/// * `src` - The source volume.
/// * `dst` - The destination volume, same geometry as `src`.
/// * `sigma` - The standard deviation per axis, in voxels.
/// * `strategy` - How to schedule the line passes.
///
/// # Errors
///
/// Returns an error if a sigma is not positive and finite.
pub fn gaussian_blur(
    src: &Volume<f32>,
    dst: &mut Volume<f32>,
    sigma: [f32; 3],
    strategy: ExecutionStrategy,
) -> Result<(), ImgprocError> {
    if let Some(&bad) = sigma.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
        return Err(ImgprocError::InvalidSigma(bad as f64));
    }

    let kernels: Vec<Vec<f32>> = sigma
        .iter()
        .map(|&s| gaussian_kernel(s))
        .collect();

    separable_filter(
        src,
        dst,
        [&kernels[0], &kernels[1], &kernels[2]],
        strategy,
    )
}

/// Smooth a greyscale volume with a gaussian of physical width `sigma`.
///
/// The per-axis sigma in voxels is `sigma / spacing[axis]`, so anisotropic
/// grids are smoothed isotropically in physical space.
///
/// # Examples
///
/// ```
/// use bonevoid_volume::{Volume, VolumeGeometry};
/// use bonevoid_imgproc::filter::smooth;
///
/// let scan = Volume::from_geometry_val(VolumeGeometry::new([5, 5, 5]), 1200.0f32);
/// let smoothed = smooth(&scan, 1.0).unwrap();
///
/// assert!((smoothed.as_slice()[0] - 1200.0).abs() < 1e-2);
/// ```
pub fn smooth(src: &Volume<f32>, sigma: f64) -> Result<Volume<f32>, ImgprocError> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(ImgprocError::InvalidSigma(sigma));
    }

    let spacing = src.spacing();
    let sigma_voxels = [
        (sigma / spacing[0]) as f32,
        (sigma / spacing[1]) as f32,
        (sigma / spacing[2]) as f32,
    ];

    let mut dst = Volume::from_geometry_val(*src.geometry(), 0.0f32);
    gaussian_blur(src, &mut dst, sigma_voxels, ExecutionStrategy::default())?;
    Ok(dst)
}
