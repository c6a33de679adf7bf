use std::collections::VecDeque;

use bonevoid_volume::{BinaryVolume, Volume, VolumeError, VoxelIndex};

use crate::error::ImgprocError;
use crate::neighborhood::Connectivity;

/// Grow regions from seed voxels through the foreground of a candidate mask.
///
/// Every foreground voxel connected to a seed is set in the output, which is
/// the union of the components reached by the seeds. A seed on a background
/// voxel reaches nothing.
///
/// # Arguments
///
/// * `candidate` - The binary mask to grow through, foreground is 1.
/// * `seeds` - The seed voxels.
/// * `connectivity` - Which neighbours are connected.
///
/// # Errors
///
/// Returns an error if a seed lies outside the volume.
///
/// # Examples
///
/// ```
/// use bonevoid_volume::{Volume, VolumeGeometry, VoxelIndex};
/// use bonevoid_imgproc::neighborhood::Connectivity;
/// use bonevoid_imgproc::region_growing::seeded_region_grow;
///
/// let mask = Volume::new(VolumeGeometry::new([6, 1, 1]), vec![1u8, 1, 0, 1, 1, 1]).unwrap();
/// let grown = seeded_region_grow(&mask, &[VoxelIndex::new(4, 0, 0)], Connectivity::Full).unwrap();
///
/// assert_eq!(grown.as_slice(), &[0, 0, 0, 1, 1, 1]);
/// ```
pub fn seeded_region_grow(
    candidate: &BinaryVolume,
    seeds: &[VoxelIndex],
    connectivity: Connectivity,
) -> Result<BinaryVolume, ImgprocError> {
    let size = candidate.size();
    if let Some(&seed) = seeds.iter().find(|&&s| !size.contains(s)) {
        return Err(VolumeError::IndexOutOfBounds(seed, size).into());
    }

    let offsets = connectivity.offsets();
    let data = candidate.as_slice();
    let mut grown = Volume::from_geometry_val(*candidate.geometry(), 0u8);
    let mut queue = VecDeque::new();

    for &seed in seeds {
        let linear = candidate.linear_index(seed);
        if data[linear] != 1 {
            log::trace!("seed {seed} is outside the candidate mask");
            continue;
        }
        if grown.as_slice()[linear] != 0 {
            continue;
        }
        grown.as_slice_mut()[linear] = 1;
        queue.push_back(seed);

        while let Some(index) = queue.pop_front() {
            for &[dx, dy, dz] in offsets.iter() {
                let Some(neighbour) = index.offset(dx, dy, dz, size) else {
                    continue;
                };
                let n = candidate.linear_index(neighbour);
                if data[n] == 1 && grown.as_slice()[n] == 0 {
                    grown.as_slice_mut()[n] = 1;
                    queue.push_back(neighbour);
                }
            }
        }
    }

    Ok(grown)
}

/// Paint the seed voxels into an empty binary volume.
///
/// # Errors
///
/// Returns an error if a seed lies outside the volume.
pub fn seed_volume(
    like: &BinaryVolume,
    seeds: &[VoxelIndex],
) -> Result<BinaryVolume, ImgprocError> {
    let mut dst = Volume::from_geometry_val(*like.geometry(), 0u8);
    for &seed in seeds {
        dst.set(seed, 1)?;
    }
    Ok(dst)
}
