use std::collections::VecDeque;

use bonevoid_volume::{BinaryVolume, LabelVolume, Volume};

use crate::error::ImgprocError;
use crate::neighborhood::Connectivity;
use crate::parallel::{self, ExecutionStrategy};

/// Label the connected foreground components of a binary volume.
///
/// Components are numbered from 1 in the order of their first voxel in memory
/// (x-fastest); background voxels keep the label 0.
///
/// # Arguments
///
/// * `src` - The binary volume, foreground is any nonzero voxel.
/// * `connectivity` - Which neighbours are connected.
///
/// # Returns
///
/// The label volume and the number of components.
///
/// # Examples
///
/// ```
/// use bonevoid_volume::{Volume, VolumeGeometry};
/// use bonevoid_imgproc::connected_components::label;
/// use bonevoid_imgproc::neighborhood::Connectivity;
///
/// let mask = Volume::new(VolumeGeometry::new([5, 1, 1]), vec![1u8, 1, 0, 1, 0]).unwrap();
/// let (labels, count) = label(&mask, Connectivity::Full);
///
/// assert_eq!(count, 2);
/// assert_eq!(labels.as_slice(), &[1, 1, 0, 2, 0]);
/// ```
pub fn label(src: &BinaryVolume, connectivity: Connectivity) -> (LabelVolume, usize) {
    let size = src.size();
    let offsets = connectivity.offsets();
    let data = src.as_slice();

    let mut labels = Volume::from_geometry_val(*src.geometry(), 0u32);
    let mut queue = VecDeque::new();
    let mut count = 0u32;

    for start in 0..data.len() {
        if data[start] == 0 || labels.as_slice()[start] != 0 {
            continue;
        }
        count += 1;
        labels.as_slice_mut()[start] = count;
        queue.push_back(start);

        while let Some(linear) = queue.pop_front() {
            let index = labels.voxel_index(linear);
            for &[dx, dy, dz] in offsets.iter() {
                let Some(neighbour) = index.offset(dx, dy, dz, size) else {
                    continue;
                };
                let n = labels.linear_index(neighbour);
                if data[n] != 0 && labels.as_slice()[n] == 0 {
                    labels.as_slice_mut()[n] = count;
                    queue.push_back(n);
                }
            }
        }
    }

    (labels, count as usize)
}

/// Drop small components and renumber the rest by decreasing size.
///
/// The largest component becomes label 1; components of equal size keep the
/// order of their first voxel in memory.
///
/// # Arguments
///
/// * `src` - The label volume, 0 is background.
/// * `min_voxels` - Components with fewer voxels are set to 0.
///
/// # Returns
///
/// The relabeled volume and the number of remaining components.
pub fn relabel_components(
    src: &LabelVolume,
    min_voxels: usize,
) -> Result<(LabelVolume, usize), ImgprocError> {
    let max_label = src.as_slice().iter().copied().max().unwrap_or(0) as usize;

    // (size, first occurrence) per input label
    let mut stats = vec![(0usize, usize::MAX); max_label + 1];
    for (linear, &l) in src.as_slice().iter().enumerate() {
        if l == 0 {
            continue;
        }
        let entry = &mut stats[l as usize];
        entry.0 += 1;
        entry.1 = entry.1.min(linear);
    }

    let mut kept: Vec<usize> = (1..=max_label)
        .filter(|&l| stats[l].0 > 0 && stats[l].0 >= min_voxels)
        .collect();
    kept.sort_by(|&a, &b| stats[b].0.cmp(&stats[a].0).then(stats[a].1.cmp(&stats[b].1)));

    let mut mapping = vec![0u32; max_label + 1];
    for (new_label, &old) in kept.iter().enumerate() {
        mapping[old] = new_label as u32 + 1;
    }

    let mut dst = Volume::from_geometry_val(*src.geometry(), 0u32);
    parallel::par_iter_voxels(src, &mut dst, ExecutionStrategy::default(), |s, d| {
        *d = mapping[*s as usize];
    })?;

    log::debug!(
        "relabel: kept {} of {} components (min {} voxels)",
        kept.len(),
        max_label,
        min_voxels
    );

    Ok((dst, kept.len()))
}

/// Remove the foreground components smaller than `min_voxels`.
///
/// # Examples
///
/// ```
/// use bonevoid_volume::{Volume, VolumeGeometry};
/// use bonevoid_imgproc::connected_components::remove_small_components;
/// use bonevoid_imgproc::neighborhood::Connectivity;
///
/// let mask = Volume::new(VolumeGeometry::new([6, 1, 1]), vec![1u8, 1, 1, 0, 1, 0]).unwrap();
/// let pruned = remove_small_components(&mask, 2, Connectivity::Full).unwrap();
///
/// assert_eq!(pruned.as_slice(), &[1, 1, 1, 0, 0, 0]);
/// ```
pub fn remove_small_components(
    src: &BinaryVolume,
    min_voxels: usize,
    connectivity: Connectivity,
) -> Result<BinaryVolume, ImgprocError> {
    let (labels, _) = label(src, connectivity);
    let (kept, _) = relabel_components(&labels, min_voxels)?;
    Ok(kept.map(|&l| u8::from(l != 0)))
}

/// Size in voxels of every component, indexed by `label - 1`.
pub fn component_sizes(labels: &LabelVolume) -> Vec<usize> {
    let max_label = labels.as_slice().iter().copied().max().unwrap_or(0) as usize;
    let mut sizes = vec![0usize; max_label];
    for &l in labels.as_slice().iter().filter(|&&l| l != 0) {
        sizes[l as usize - 1] += 1;
    }
    sizes
}
