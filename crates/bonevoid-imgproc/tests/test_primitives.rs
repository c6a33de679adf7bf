use bonevoid_imgproc::connected_components::{label, relabel_components};
use bonevoid_imgproc::core::{and, and_not, invert};
use bonevoid_imgproc::distance_transform::signed_distance_map;
use bonevoid_imgproc::morphology::{dilate, erode};
use bonevoid_imgproc::neighborhood::Connectivity;
use bonevoid_imgproc::region_growing::seeded_region_grow;
use bonevoid_imgproc::threshold::binarize;
use bonevoid_imgproc::ImgprocError;
use bonevoid_volume::{BinaryVolume, Volume, VolumeGeometry, VoxelIndex};

// a 10^3 cube centred in a 14^3 volume
fn cube() -> BinaryVolume {
    Volume::from_fn(VolumeGeometry::new([14, 14, 14]), |i| {
        u8::from([i.x, i.y, i.z].iter().all(|c| (2..12).contains(c)))
    })
}

#[test]
fn test_distance_band_selects_rim() -> Result<(), ImgprocError> {
    let candidate = cube();

    // measured from outside the candidate, voxels of the candidate are positive
    let dist = signed_distance_map(&candidate, 1)?;
    let rim = binarize(&dist, 1.0, 2.0)?;
    assert_eq!(rim.count_nonzero(), 1000 - 216);

    let core = and_not(&candidate, &rim)?;
    assert_eq!(core.count_nonzero(), 216);
    assert_eq!(and(&core, &rim)?.count_nonzero(), 0);
    Ok(())
}

#[test]
fn test_outer_band_grows_back() -> Result<(), ImgprocError> {
    let candidate = cube();
    let dist = signed_distance_map(&candidate, 0)?;
    let shell = binarize(&dist, 1.0, 1.0)?;

    // the outer band at distance one is the face-neighbour shell of the cube
    assert_eq!(shell.count_nonzero(), 6 * 100);
    assert_eq!(and(&shell, &candidate)?.count_nonzero(), 0);
    Ok(())
}

#[test]
fn test_grow_then_label() -> Result<(), ImgprocError> {
    let candidate = cube();
    let hole = erode(&candidate, 2)?;
    let walls = and_not(&candidate, &hole)?;

    let grown = seeded_region_grow(&walls, &[VoxelIndex::new(2, 2, 2)], Connectivity::Full)?;
    assert_eq!(grown, walls);

    let (labels, count) = label(&grown, Connectivity::Full);
    assert_eq!(count, 1);
    let (_, kept) = relabel_components(&labels, grown.count_nonzero() + 1)?;
    assert_eq!(kept, 0);
    Ok(())
}

#[test]
fn test_pipeline_is_deterministic() -> Result<(), ImgprocError> {
    let run = || -> Result<BinaryVolume, ImgprocError> {
        let candidate = invert(&cube())?;
        let opened = dilate(&erode(&candidate, 1)?, 1)?;
        let dist = signed_distance_map(&opened, 0)?;
        binarize(&dist, -3.0, 3.0)
    };
    assert_eq!(run()?, run()?);
    Ok(())
}
