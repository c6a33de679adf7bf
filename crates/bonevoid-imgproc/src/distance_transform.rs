use bonevoid_volume::{BinaryVolume, Volume, VolumeSize};

use crate::error::ImgprocError;
use crate::neighborhood::FACE_OFFSETS;
use crate::parallel::{self, Axis, ExecutionStrategy};

// Squared distance transform of one line (Felzenszwalb & Huttenlocher).
//
// `f` holds the squared distances found so far along the previous axes, or
// infinity; `weight` is the squared spacing along the line.
fn edt_line(f: &[f64], out: &mut [f64], weight: f64) {
    let mut sites: Vec<usize> = Vec::with_capacity(f.len());
    let mut bounds: Vec<f64> = Vec::with_capacity(f.len());

    let intersect = |p: usize, q: usize| -> f64 {
        let (pf, qf) = (p as f64, q as f64);
        ((f[q] + weight * qf * qf) - (f[p] + weight * pf * pf)) / (2.0 * weight * (qf - pf))
    };

    for q in 0..f.len() {
        if !f[q].is_finite() {
            continue;
        }
        while let Some(&p) = sites.last() {
            let s = intersect(p, q);
            match bounds.last() {
                Some(&b) if s <= b => {
                    sites.pop();
                    bounds.pop();
                }
                _ => {
                    sites.push(q);
                    bounds.push(s);
                    break;
                }
            }
        }
        if sites.is_empty() {
            sites.push(q);
            bounds.push(f64::NEG_INFINITY);
        }
    }

    if sites.is_empty() {
        out.fill(f64::INFINITY);
        return;
    }

    let mut k = 0;
    for (q, o) in out.iter_mut().enumerate() {
        let qf = q as f64;
        while k + 1 < sites.len() && bounds[k + 1] < qf {
            k += 1;
        }
        let d = qf - sites[k] as f64;
        *o = weight * d * d + f[sites[k]];
    }
}

// Object voxels with at least one in-volume face neighbour outside the object.
fn is_contour(object: &[bool], size: VolumeSize, x: usize, y: usize, z: usize) -> bool {
    let linear = x + size.width * (y + size.height * z);
    if !object[linear] {
        return false;
    }
    FACE_OFFSETS.iter().any(|&[dx, dy, dz]| {
        let (nx, ny, nz) = (x as isize + dx, y as isize + dy, z as isize + dz);
        if nx < 0
            || ny < 0
            || nz < 0
            || nx >= size.width as isize
            || ny >= size.height as isize
            || nz >= size.depth as isize
        {
            return false;
        }
        let n = nx as usize + size.width * (ny as usize + size.height * nz as usize);
        !object[n]
    })
}

/// Compute the signed euclidean distance map of a binary volume.
///
/// The object is the set of voxels whose value differs from
/// `background_value`, and its contour the object voxels that share a face
/// with a non-object voxel. Every voxel receives the distance to the nearest
/// contour voxel, negative inside the object (zero on the contour) and
/// positive outside. Voxels of the volume border are not contour voxels
/// unless they touch the background inside the volume.
///
/// # Arguments
///
/// * `src` - The binary volume.
/// * `dst` - The output distance map, same geometry as `src`.
/// * `background_value` - The voxel value that is not part of the object.
/// * `spacing` - The per-axis distance unit; `[1.0; 3]` yields voxel units.
/// * `strategy` - How to schedule the line passes.
///
/// # Errors
///
/// Returns [`ImgprocError::EmptyObject`] if every voxel equals
/// `background_value`.
pub fn signed_distance_transform(
    src: &BinaryVolume,
    dst: &mut Volume<f32>,
    background_value: u8,
    spacing: [f64; 3],
    strategy: ExecutionStrategy,
) -> Result<(), ImgprocError> {
    src.check_same_space(dst)?;

    let object: Vec<bool> = src.as_slice().iter().map(|&v| v != background_value).collect();
    if !object.iter().any(|&o| o) {
        return Err(ImgprocError::EmptyObject(background_value));
    }

    let size = src.size();
    let mut current = vec![0.0f64; src.len()];
    {
        let mut seeds = Volume::from_geometry_val(*src.geometry(), f64::INFINITY);
        parallel::par_iter_slices(&mut seeds, strategy, |z, slice| {
            for (i, v) in slice.iter_mut().enumerate() {
                let (x, y) = (i % size.width, i / size.width);
                if is_contour(&object, size, x, y, z) {
                    *v = 0.0;
                }
            }
        })?;
        current.copy_from_slice(seeds.as_slice());
    }

    let mut next = vec![0.0f64; current.len()];
    for axis in Axis::ALL {
        let step = spacing[axis.position()];
        let weight = step * step;
        parallel::par_iter_lines(&current, &mut next, size, axis, strategy, |line, out| {
            edt_line(line, out, weight)
        })?;
        std::mem::swap(&mut current, &mut next);
    }

    for ((d, &sq), &inside) in dst
        .as_slice_mut()
        .iter_mut()
        .zip(current.iter())
        .zip(object.iter())
    {
        let dist = sq.sqrt() as f32;
        *d = if dist == 0.0 {
            0.0
        } else if inside {
            -dist
        } else {
            dist
        };
    }

    Ok(())
}

/// Signed distance map in voxel units.
///
/// See [`signed_distance_transform`] for the sign convention. Toggling
/// `background_value` between 0 and 1 swaps which side of a mask is measured
/// from its boundary.
///
/// # Examples
///
/// ```
/// use bonevoid_volume::{Volume, VolumeGeometry};
/// use bonevoid_imgproc::distance_transform::signed_distance_map;
///
/// let mask = Volume::new(VolumeGeometry::new([5, 1, 1]), vec![0u8, 1, 1, 1, 0]).unwrap();
/// let dist = signed_distance_map(&mask, 0).unwrap();
///
/// assert_eq!(dist.as_slice(), &[1.0, 0.0, -1.0, 0.0, 1.0]);
/// ```
pub fn signed_distance_map(
    src: &BinaryVolume,
    background_value: u8,
) -> Result<Volume<f32>, ImgprocError> {
    let mut dst = Volume::from_geometry_val(*src.geometry(), 0.0f32);
    signed_distance_transform(
        src,
        &mut dst,
        background_value,
        [1.0; 3],
        ExecutionStrategy::default(),
    )?;
    Ok(dst)
}

/// Signed distance map in physical units, using the volume spacing.
pub fn signed_distance_map_physical(
    src: &BinaryVolume,
    background_value: u8,
) -> Result<Volume<f32>, ImgprocError> {
    let mut dst = Volume::from_geometry_val(*src.geometry(), 0.0f32);
    signed_distance_transform(
        src,
        &mut dst,
        background_value,
        src.spacing(),
        ExecutionStrategy::default(),
    )?;
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bonevoid_volume::VolumeGeometry;

    // reference: distance to the nearest contour voxel by exhaustive search
    fn brute_force(src: &BinaryVolume, background_value: u8, spacing: [f64; 3]) -> Vec<f32> {
        let size = src.size();
        let object: Vec<bool> = src.as_slice().iter().map(|&v| v != background_value).collect();
        let mut contour = Vec::new();
        for z in 0..size.depth {
            for y in 0..size.height {
                for x in 0..size.width {
                    if is_contour(&object, size, x, y, z) {
                        contour.push([x as f64, y as f64, z as f64]);
                    }
                }
            }
        }
        (0..src.len())
            .map(|linear| {
                let i = src.voxel_index(linear);
                let p = [i.x as f64, i.y as f64, i.z as f64];
                let d = contour
                    .iter()
                    .map(|c| {
                        (0..3)
                            .map(|a| ((p[a] - c[a]) * spacing[a]).powi(2))
                            .sum::<f64>()
                    })
                    .fold(f64::INFINITY, f64::min)
                    .sqrt() as f32;
                if object[linear] {
                    -d
                } else {
                    d
                }
            })
            .collect()
    }

    fn blob() -> BinaryVolume {
        Volume::from_fn(VolumeGeometry::new([9, 7, 6]), |i| {
            let (x, y, z) = (i.x as i64 - 4, i.y as i64 - 3, i.z as i64 - 2);
            u8::from(x * x + 2 * y * y + z * z <= 9 || (i.x == 8 && i.z == 5))
        })
    }

    #[test]
    fn distance_line() -> Result<(), ImgprocError> {
        let mask = Volume::new(VolumeGeometry::new([5, 1, 1]), vec![0u8, 1, 1, 1, 0])?;
        assert_eq!(signed_distance_map(&mask, 0)?.as_slice(), &[1.0, 0.0, -1.0, 0.0, 1.0]);
        // the other side of the same mask
        assert_eq!(signed_distance_map(&mask, 1)?.as_slice(), &[0.0, 1.0, 2.0, 1.0, 0.0]);
        Ok(())
    }

    #[test]
    fn distance_matches_brute_force() -> Result<(), ImgprocError> {
        let mask = blob();
        for bg in [0u8, 1] {
            let dist = signed_distance_map(&mask, bg)?;
            let expected = brute_force(&mask, bg, [1.0; 3]);
            for (a, b) in dist.as_slice().iter().zip(expected.iter()) {
                assert_relative_eq!(a, b, epsilon = 1e-4);
            }
        }
        Ok(())
    }

    #[test]
    fn distance_physical_spacing() -> Result<(), ImgprocError> {
        let spacing = [0.5, 1.0, 2.0];
        let mask = blob();
        let geometry = mask.geometry().with_spacing(spacing);
        let mask = Volume::new(geometry, mask.into_vec())?;

        let dist = signed_distance_map_physical(&mask, 0)?;
        let expected = brute_force(&mask, 0, spacing);
        for (a, b) in dist.as_slice().iter().zip(expected.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-4);
        }
        Ok(())
    }

    #[test]
    fn distance_serial_matches_parallel() -> Result<(), ImgprocError> {
        let mask = blob();
        let mut serial = Volume::from_geometry_val(*mask.geometry(), 0.0f32);
        let mut parallel = serial.clone();
        signed_distance_transform(&mask, &mut serial, 0, [1.0; 3], ExecutionStrategy::Serial)?;
        signed_distance_transform(
            &mask,
            &mut parallel,
            0,
            [1.0; 3],
            ExecutionStrategy::ParallelSlices,
        )?;
        assert_eq!(serial, parallel);
        Ok(())
    }

    #[test]
    fn distance_without_contour() -> Result<(), ImgprocError> {
        let mask = Volume::from_geometry_val(VolumeGeometry::new([3, 3, 3]), 1u8);
        let dist = signed_distance_map(&mask, 0)?;
        assert!(dist.as_slice().iter().all(|&d| d == f32::NEG_INFINITY));
        Ok(())
    }

    #[test]
    fn distance_empty_object() {
        let mask = Volume::from_geometry_val(VolumeGeometry::new([3, 3, 3]), 0u8);
        assert_eq!(
            signed_distance_map(&mask, 0),
            Err(ImgprocError::EmptyObject(0))
        );
    }
}
