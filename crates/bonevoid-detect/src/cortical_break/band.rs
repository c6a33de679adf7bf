use bonevoid_imgproc::connected_components::{label, relabel_components, remove_small_components};
use bonevoid_imgproc::core::{and_not, to_binary};
use bonevoid_imgproc::morphology::erode;
use bonevoid_imgproc::neighborhood::Connectivity;
use bonevoid_imgproc::ImgprocError;
use bonevoid_volume::{BinaryVolume, LabelVolume, Volume, VoxelIndex};

/// The cortical band of a contour mask and its two boundary surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct CorticalBand {
    /// Contour voxels within the cortical thickness of the contour boundary.
    pub band: BinaryVolume,
    /// Band voxels on the outer boundary of the contour.
    pub periosteal: BinaryVolume,
    /// Band voxels next to the inside of the band.
    pub endosteal: BinaryVolume,
}

/// Split a contour mask into its cortical band and the band surfaces.
///
/// The inside of the band is the contour eroded by `thickness` voxels. The
/// periosteal surface holds the band voxels sharing a face with a voxel
/// outside the contour or with the volume edge; the endosteal surface holds
/// the band voxels sharing a face with the inside.
pub fn cortical_band(
    contour: &BinaryVolume,
    thickness: usize,
) -> Result<CorticalBand, ImgprocError> {
    let contour = to_binary(contour);
    let inner = erode(&contour, thickness)?;
    let band = and_not(&contour, &inner)?;

    let size = band.size();
    let faces = Connectivity::Face.offsets();
    let on_band = |i: VoxelIndex| band.get(i) == Some(&1);

    let periosteal = Volume::from_fn(*band.geometry(), |i| {
        let touches_outside = faces.iter().any(|&[dx, dy, dz]| {
            i.offset(dx, dy, dz, size)
                .map_or(true, |n| contour.get(n) == Some(&0))
        });
        u8::from(on_band(i) && touches_outside)
    });

    let endosteal = Volume::from_fn(*band.geometry(), |i| {
        let touches_inside = faces.iter().any(|&[dx, dy, dz]| {
            i.offset(dx, dy, dz, size)
                .is_some_and(|n| inner.get(n) == Some(&1))
        });
        u8::from(on_band(i) && touches_inside)
    });

    log::debug!(
        "cortical band: {} voxels, periosteal {}, endosteal {}",
        band.count_nonzero(),
        periosteal.count_nonzero(),
        endosteal.count_nonzero()
    );

    Ok(CorticalBand {
        band,
        periosteal,
        endosteal,
    })
}

/// Band voxels without bone, minus the components smaller than `min_voxels`.
pub fn break_candidates(
    band: &CorticalBand,
    bone: &BinaryVolume,
    min_voxels: usize,
    connectivity: Connectivity,
) -> Result<BinaryVolume, ImgprocError> {
    let gaps = and_not(&band.band, bone)?;
    remove_small_components(&gaps, min_voxels, connectivity)
}

/// Keep the candidates that cross the whole band.
///
/// A candidate component is a break when it touches both the periosteal and
/// the endosteal surface. Breaks are labeled by decreasing size.
pub fn filter_breaks(
    candidates: &BinaryVolume,
    band: &CorticalBand,
    connectivity: Connectivity,
) -> Result<(LabelVolume, usize), ImgprocError> {
    candidates.check_same_space(&band.band)?;
    let (labels, count) = label(candidates, connectivity);

    // (periosteal, endosteal) contact per label
    let mut touches = vec![(false, false); count + 1];
    for (linear, &l) in labels.as_slice().iter().enumerate() {
        if l == 0 {
            continue;
        }
        let contact = &mut touches[l as usize];
        contact.0 |= band.periosteal.as_slice()[linear] != 0;
        contact.1 |= band.endosteal.as_slice()[linear] != 0;
    }

    let crossing = labels.map(|&l| if touches[l as usize] == (true, true) { l } else { 0 });
    relabel_components(&crossing, 0)
}

/// One seed per break: the break voxel nearest to the break centroid.
///
/// Ties go to the voxel first in memory order. Seeds are returned in label
/// order.
pub fn break_seeds(labels: &LabelVolume, count: usize) -> Vec<VoxelIndex> {
    let mut sums = vec![([0.0f64; 3], 0usize); count + 1];
    for (linear, &l) in labels.as_slice().iter().enumerate() {
        if l == 0 || l as usize > count {
            continue;
        }
        let i = labels.voxel_index(linear);
        let entry = &mut sums[l as usize];
        entry.0[0] += i.x as f64;
        entry.0[1] += i.y as f64;
        entry.0[2] += i.z as f64;
        entry.1 += 1;
    }

    let centroids: Vec<[f64; 3]> = sums
        .iter()
        .map(|(s, n)| {
            let n = (*n).max(1) as f64;
            [s[0] / n, s[1] / n, s[2] / n]
        })
        .collect();

    let mut best: Vec<Option<(f64, VoxelIndex)>> = vec![None; count + 1];
    for (linear, &l) in labels.as_slice().iter().enumerate() {
        if l == 0 || l as usize > count {
            continue;
        }
        let i = labels.voxel_index(linear);
        let c = centroids[l as usize];
        let d2 = (i.x as f64 - c[0]).powi(2) + (i.y as f64 - c[1]).powi(2) + (i.z as f64 - c[2]).powi(2);
        let slot = &mut best[l as usize];
        if slot.map_or(true, |(b, _)| d2 < b) {
            *slot = Some((d2, i));
        }
    }

    best.into_iter().skip(1).flatten().map(|(_, i)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bonevoid_volume::{VolumeError, VolumeGeometry};

    // a slab contour filling z in [2, 8) of a 10^3 volume
    fn slab() -> BinaryVolume {
        Volume::from_fn(VolumeGeometry::new([10, 10, 10]), |i| {
            u8::from((2..8).contains(&i.z))
        })
    }

    #[test]
    fn band_and_surfaces() -> Result<(), ImgprocError> {
        let band = cortical_band(&slab(), 1)?;

        // the slab touches the volume edge in x and y, so only its z faces erode
        assert_eq!(band.band.count_nonzero(), 2 * 100);
        assert_eq!(band.band.get(VoxelIndex::new(5, 5, 2)), Some(&1));
        assert_eq!(band.band.get(VoxelIndex::new(5, 5, 7)), Some(&1));

        // every band voxel is either facing outside or facing the inside
        assert_eq!(band.periosteal, band.band);
        assert_eq!(band.endosteal, band.band);
        Ok(())
    }

    #[test]
    fn band_of_thick_cortex() -> Result<(), ImgprocError> {
        let band = cortical_band(&slab(), 2)?;
        assert_eq!(band.band.count_nonzero(), 4 * 100);
        assert_eq!(band.periosteal.get(VoxelIndex::new(5, 5, 2)), Some(&1));
        assert_eq!(band.periosteal.get(VoxelIndex::new(5, 5, 3)), Some(&0));
        assert_eq!(band.endosteal.get(VoxelIndex::new(5, 5, 3)), Some(&1));
        assert_eq!(band.endosteal.get(VoxelIndex::new(5, 5, 2)), Some(&0));
        Ok(())
    }

    #[test]
    fn only_crossing_gaps_are_breaks() -> Result<(), ImgprocError> {
        let contour = slab();
        let band = cortical_band(&contour, 2)?;

        // bone everywhere in the contour except a full-depth hole through the
        // lower cortex and a shallow pit in the upper one
        let bone = Volume::from_fn(*contour.geometry(), |i| {
            let hole = (2..5).contains(&i.x) && (2..5).contains(&i.y) && i.z < 4;
            let pit = (6..9).contains(&i.x) && (6..9).contains(&i.y) && i.z == 7;
            u8::from(contour.get(i) == Some(&1) && !hole && !pit)
        });

        let candidates = break_candidates(&band, &bone, 1, Connectivity::Face)?;
        assert_eq!(candidates.count_nonzero(), 18 + 9);

        let (breaks, count) = filter_breaks(&candidates, &band, Connectivity::Face)?;
        assert_eq!(count, 1);
        assert_eq!(breaks.count_nonzero(), 18);
        assert_eq!(breaks.get(VoxelIndex::new(3, 3, 2)), Some(&1));

        let seeds = break_seeds(&breaks, count);
        assert_eq!(seeds, vec![VoxelIndex::new(3, 3, 2)]);
        Ok(())
    }

    #[test]
    fn small_candidates_are_pruned() -> Result<(), ImgprocError> {
        let contour = slab();
        let band = cortical_band(&contour, 2)?;
        let bone = Volume::from_fn(*contour.geometry(), |i| {
            u8::from(contour.get(i) == Some(&1) && i != VoxelIndex::new(5, 5, 2))
        });
        let candidates = break_candidates(&band, &bone, 2, Connectivity::Face)?;
        assert_eq!(candidates.count_nonzero(), 0);
        Ok(())
    }

    #[test]
    fn seed_ties_take_first_voxel() -> Result<(), VolumeError> {
        // centroid at x = 1.5 is equidistant from x = 1 and x = 2
        let labels = Volume::new(VolumeGeometry::new([4, 1, 1]), vec![1u32, 1, 1, 1])?;
        assert_eq!(break_seeds(&labels, 1), vec![VoxelIndex::new(1, 0, 0)]);
        Ok(())
    }
}
