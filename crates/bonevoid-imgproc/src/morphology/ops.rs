use bonevoid_volume::{BinaryVolume, Volume, VolumeSize};

use super::kernel::BallKernel;
use crate::error::ImgprocError;
use crate::parallel::{self, ExecutionStrategy};

// Per-row prefix sums of the foreground voxels; row `r` occupies
// `[r * (width + 1), (r + 1) * (width + 1))` and starts with a 0.
struct RowSums {
    sums: Vec<u32>,
    size: VolumeSize,
}

impl RowSums {
    fn new(src: &BinaryVolume) -> Self {
        let size = src.size();
        let stride = size.width + 1;
        let mut sums = vec![0u32; stride * size.height * size.depth];
        for (line, acc) in src
            .as_slice()
            .chunks(size.width.max(1))
            .zip(sums.chunks_mut(stride))
        {
            for (x, &v) in line.iter().enumerate() {
                acc[x + 1] = acc[x] + u32::from(v != 0);
            }
        }
        Self { sums, size }
    }

    // row index of (y + dy, z + dz), if inside the volume
    fn row(&self, y: usize, z: usize, dy: isize, dz: isize) -> Option<usize> {
        let ny = y as isize + dy;
        let nz = z as isize + dz;
        if ny < 0 || nz < 0 || ny >= self.size.height as isize || nz >= self.size.depth as isize {
            return None;
        }
        Some(ny as usize + self.size.height * nz as usize)
    }

    // foreground count in [lo, hi] of a row, both inclusive
    fn count(&self, row: usize, lo: usize, hi: usize) -> u32 {
        let base = row * (self.size.width + 1);
        self.sums[base + hi + 1] - self.sums[base + lo]
    }
}

/// Dilate a binary volume with a [`BallKernel`].
///
/// A voxel is set when the ball centred on it hits any foreground voxel.
/// Voxels outside the volume are background.
///
/// # Arguments
///
/// * `src` - The source binary volume.
/// * `dst` - The destination volume, same geometry as `src`.
/// * `kernel` - The structuring element.
/// * `strategy` - How to schedule the z slices.
pub fn dilate_with_kernel(
    src: &BinaryVolume,
    dst: &mut BinaryVolume,
    kernel: &BallKernel,
    strategy: ExecutionStrategy,
) -> Result<(), ImgprocError> {
    src.check_same_space(dst)?;
    if src.is_empty() {
        return Ok(());
    }

    let sums = RowSums::new(src);
    let width = src.size().width;
    let runs = kernel.runs();

    parallel::par_iter_slices(dst, strategy, |z, slice| {
        for (i, out) in slice.iter_mut().enumerate() {
            let (x, y) = (i % width, i / width);
            let hit = runs.iter().any(|run| {
                sums.row(y, z, run.dy, run.dz).is_some_and(|row| {
                    let lo = x.saturating_sub(run.half_width);
                    let hi = (x + run.half_width).min(width - 1);
                    sums.count(row, lo, hi) > 0
                })
            });
            *out = u8::from(hit);
        }
    })?;

    Ok(())
}

/// Erode a binary volume with a [`BallKernel`].
///
/// A voxel is kept when every voxel of the ball centred on it is foreground.
/// Voxels outside the volume count as foreground, so objects touching the
/// border are not eroded from outside.
///
/// # Arguments
///
/// * `src` - The source binary volume.
/// * `dst` - The destination volume, same geometry as `src`.
/// * `kernel` - The structuring element.
/// * `strategy` - How to schedule the z slices.
pub fn erode_with_kernel(
    src: &BinaryVolume,
    dst: &mut BinaryVolume,
    kernel: &BallKernel,
    strategy: ExecutionStrategy,
) -> Result<(), ImgprocError> {
    src.check_same_space(dst)?;
    if src.is_empty() {
        return Ok(());
    }

    let sums = RowSums::new(src);
    let width = src.size().width;
    let runs = kernel.runs();

    parallel::par_iter_slices(dst, strategy, |z, slice| {
        for (i, out) in slice.iter_mut().enumerate() {
            let (x, y) = (i % width, i / width);
            let fits = runs.iter().all(|run| match sums.row(y, z, run.dy, run.dz) {
                None => true,
                Some(row) => {
                    let lo = x.saturating_sub(run.half_width);
                    let hi = (x + run.half_width).min(width - 1);
                    sums.count(row, lo, hi) as usize == hi - lo + 1
                }
            });
            *out = u8::from(fits);
        }
    })?;

    Ok(())
}

/// Dilate a binary volume with a ball of `radius` voxels.
///
/// # Examples
///
/// ```
/// use bonevoid_volume::{Volume, VolumeGeometry, VoxelIndex};
/// use bonevoid_imgproc::morphology::dilate;
///
/// let mut seed = Volume::from_geometry_val(VolumeGeometry::new([7, 7, 7]), 0u8);
/// seed.set(VoxelIndex::new(3, 3, 3), 1).unwrap();
///
/// let ball = dilate(&seed, 1).unwrap();
/// assert_eq!(ball.count_nonzero(), 7);
/// ```
pub fn dilate(src: &BinaryVolume, radius: usize) -> Result<BinaryVolume, ImgprocError> {
    let mut dst = Volume::from_geometry_val(*src.geometry(), 0u8);
    dilate_with_kernel(
        src,
        &mut dst,
        &BallKernel::new(radius),
        ExecutionStrategy::default(),
    )?;
    Ok(dst)
}

/// Erode a binary volume with a ball of `radius` voxels.
pub fn erode(src: &BinaryVolume, radius: usize) -> Result<BinaryVolume, ImgprocError> {
    let mut dst = Volume::from_geometry_val(*src.geometry(), 0u8);
    erode_with_kernel(
        src,
        &mut dst,
        &BallKernel::new(radius),
        ExecutionStrategy::default(),
    )?;
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bonevoid_volume::{VolumeGeometry, VoxelIndex};

    fn noisy() -> BinaryVolume {
        Volume::from_fn(VolumeGeometry::new([16, 12, 10]), |i| {
            let blob = (i.x as i64 - 8).pow(2) + (i.y as i64 - 6).pow(2) + (i.z as i64 - 5).pow(2)
                <= 16;
            let speckle = (i.x * 7 + i.y * 13 + i.z * 3) % 11 == 0;
            u8::from(blob || speckle)
        })
    }

    fn is_subset(a: &BinaryVolume, b: &BinaryVolume) -> bool {
        a.as_slice()
            .iter()
            .zip(b.as_slice())
            .all(|(&x, &y)| x == 0 || y != 0)
    }

    #[test]
    fn erode_dilate_bracket_the_source() -> Result<(), ImgprocError> {
        let src = noisy();
        for radius in 0..4 {
            let eroded = erode(&src, radius)?;
            let dilated = dilate(&src, radius)?;
            assert!(is_subset(&eroded, &src));
            assert!(is_subset(&src, &dilated));
        }
        Ok(())
    }

    #[test]
    fn radius_zero_is_identity() -> Result<(), ImgprocError> {
        let src = noisy();
        assert_eq!(erode(&src, 0)?, src);
        assert_eq!(dilate(&src, 0)?, src);
        Ok(())
    }

    #[test]
    fn dilate_point_gives_ball() -> Result<(), ImgprocError> {
        let mut src = Volume::from_geometry_val(VolumeGeometry::new([9, 9, 9]), 0u8);
        src.set(VoxelIndex::new(4, 4, 4), 1)?;
        let ball = dilate(&src, 2)?;
        assert_eq!(ball.count_nonzero(), 33);
        assert_eq!(erode(&ball, 2)?.count_nonzero(), 1);
        Ok(())
    }

    #[test]
    fn erode_ignores_volume_border() -> Result<(), ImgprocError> {
        let full = Volume::from_geometry_val(VolumeGeometry::new([5, 5, 5]), 1u8);
        assert_eq!(erode(&full, 2)?, full);

        let empty = Volume::from_geometry_val(VolumeGeometry::new([5, 5, 5]), 0u8);
        assert_eq!(dilate(&empty, 2)?, empty);
        Ok(())
    }

    #[test]
    fn opening_preserves_opened_shapes() -> Result<(), ImgprocError> {
        let core = Volume::from_fn(VolumeGeometry::new([20, 20, 20]), |i| {
            u8::from((8..12).contains(&i.x) && (9..11).contains(&i.y) && (8..11).contains(&i.z))
        });
        let shape = dilate(&core, 3)?;
        let opened = dilate(&erode(&shape, 3)?, 3)?;
        assert_eq!(opened, shape);
        Ok(())
    }

    #[test]
    fn opening_removes_thin_structures() -> Result<(), ImgprocError> {
        let line = Volume::from_fn(VolumeGeometry::new([12, 7, 7]), |i| {
            u8::from(i.y == 3 && i.z == 3 && (2..10).contains(&i.x))
        });
        let opened = dilate(&erode(&line, 1)?, 1)?;
        assert_eq!(opened.count_nonzero(), 0);
        Ok(())
    }

    #[test]
    fn serial_matches_parallel() -> Result<(), ImgprocError> {
        let src = noisy();
        let kernel = BallKernel::new(2);
        let mut serial = Volume::from_geometry_val(*src.geometry(), 0u8);
        let mut parallel = serial.clone();

        dilate_with_kernel(&src, &mut serial, &kernel, ExecutionStrategy::Serial)?;
        dilate_with_kernel(&src, &mut parallel, &kernel, ExecutionStrategy::Fixed(4))?;
        assert_eq!(serial, parallel);

        erode_with_kernel(&src, &mut serial, &kernel, ExecutionStrategy::Serial)?;
        erode_with_kernel(&src, &mut parallel, &kernel, ExecutionStrategy::ParallelSlices)?;
        assert_eq!(serial, parallel);
        Ok(())
    }
}
