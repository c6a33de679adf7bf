use bonevoid_volume::{BinaryVolume, Volume};

use crate::error::ImgprocError;
use crate::parallel::{self, ExecutionStrategy};

/// Invert a binary volume: 1 becomes 0 and everything else becomes 1.
///
/// # Examples
///
/// ```
/// use bonevoid_volume::{Volume, VolumeGeometry};
/// use bonevoid_imgproc::core::invert;
///
/// let bone = Volume::new(VolumeGeometry::new([3, 1, 1]), vec![1u8, 0, 1]).unwrap();
/// let voids = invert(&bone).unwrap();
///
/// assert_eq!(voids.as_slice(), &[0, 1, 0]);
/// ```
pub fn invert(src: &BinaryVolume) -> Result<BinaryVolume, ImgprocError> {
    let mut dst = Volume::from_geometry_val(*src.geometry(), 0u8);
    parallel::par_iter_voxels(src, &mut dst, ExecutionStrategy::default(), |s, d| {
        *d = u8::from(*s == 0)
    })?;
    Ok(dst)
}

fn combine(
    src1: &BinaryVolume,
    src2: &BinaryVolume,
    f: impl Fn(bool, bool) -> bool + Send + Sync,
) -> Result<BinaryVolume, ImgprocError> {
    src1.check_same_space(src2)?;
    let mut dst = Volume::from_geometry_val(*src1.geometry(), 0u8);
    parallel::par_iter_voxels_two(src1, src2, &mut dst, ExecutionStrategy::default(), |a, b, d| {
        *d = u8::from(f(*a != 0, *b != 0))
    })?;
    Ok(dst)
}

/// Voxelwise intersection (mask multiply) of two binary volumes.
pub fn and(src1: &BinaryVolume, src2: &BinaryVolume) -> Result<BinaryVolume, ImgprocError> {
    combine(src1, src2, |a, b| a && b)
}

/// Voxelwise union of two binary volumes.
pub fn or(src1: &BinaryVolume, src2: &BinaryVolume) -> Result<BinaryVolume, ImgprocError> {
    combine(src1, src2, |a, b| a || b)
}

/// Voxels set in `src1` but not in `src2`.
pub fn and_not(src1: &BinaryVolume, src2: &BinaryVolume) -> Result<BinaryVolume, ImgprocError> {
    combine(src1, src2, |a, b| a && !b)
}

/// Whether a binary volume has no foreground voxel.
pub fn is_empty(src: &BinaryVolume) -> bool {
    src.as_slice().iter().all(|&v| v == 0)
}

/// Binarize a label or mask volume: every nonzero voxel becomes 1.
pub fn to_binary<T>(src: &Volume<T>) -> BinaryVolume
where
    T: Copy + PartialEq + Default,
{
    let zero = T::default();
    src.map(|&v| u8::from(v != zero))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bonevoid_volume::{VolumeError, VolumeGeometry, VolumeSize};

    fn binary(data: Vec<u8>) -> BinaryVolume {
        Volume::new(VolumeGeometry::new([4, 1, 1]), data).unwrap()
    }

    #[test]
    fn logic_ops() -> Result<(), ImgprocError> {
        let a = binary(vec![1, 1, 0, 0]);
        let b = binary(vec![1, 0, 1, 0]);
        assert_eq!(and(&a, &b)?.as_slice(), &[1, 0, 0, 0]);
        assert_eq!(or(&a, &b)?.as_slice(), &[1, 1, 1, 0]);
        assert_eq!(and_not(&a, &b)?.as_slice(), &[0, 1, 0, 0]);
        assert_eq!(invert(&a)?.as_slice(), &[0, 0, 1, 1]);
        Ok(())
    }

    #[test]
    fn logic_ops_reject_other_space() {
        let a = binary(vec![1, 1, 0, 0]);
        let b = Volume::from_geometry_val(VolumeGeometry::new([2, 2, 1]), 0u8);
        assert_eq!(
            and(&a, &b),
            Err(ImgprocError::Volume(VolumeError::GeometryMismatch(
                VolumeSize::from([4, 1, 1]),
                VolumeSize::from([2, 2, 1])
            )))
        );
    }

    #[test]
    fn labels_to_binary() {
        let labels = Volume::new(VolumeGeometry::new([3, 1, 1]), vec![0u32, 2, 7]).unwrap();
        let mask = to_binary(&labels);
        assert_eq!(mask.as_slice(), &[0, 1, 1]);
        assert!(!is_empty(&mask));
        assert!(is_empty(&Volume::from_geometry_val(*mask.geometry(), 0u8)));
    }
}
