use crate::error::VolumeError;
use crate::geometry::{VolumeGeometry, VolumeSize, VoxelIndex};

/// Represents a 3D scalar volume on a regular grid.
///
/// The samples are stored x-fastest, i.e. the linear index of voxel
/// `(x, y, z)` is `x + width * (y + height * z)`, so each z slice is a
/// contiguous chunk of `width * height` samples.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume<T> {
    geometry: VolumeGeometry,
    data: Vec<T>,
}

impl<T> Volume<T> {
    /// Create a new volume from voxel data.
    ///
    /// # Arguments
    ///
    /// * `geometry` - The grid geometry of the volume.
    /// * `data` - The voxel data, x-fastest.
    ///
    /// # Errors
    ///
    /// If the length of the data does not match the volume size, an error is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use bonevoid_volume::{Volume, VolumeGeometry};
    ///
    /// let volume = Volume::new(VolumeGeometry::new([2, 3, 4]), vec![0u8; 24]).unwrap();
    ///
    /// assert_eq!(volume.size().width, 2);
    /// assert_eq!(volume.size().depth, 4);
    /// ```
    pub fn new(geometry: VolumeGeometry, data: Vec<T>) -> Result<Self, VolumeError> {
        let expected = geometry.size.num_voxels();
        if data.len() != expected {
            return Err(VolumeError::InvalidDataLength(data.len(), expected));
        }
        Ok(Self { geometry, data })
    }

    /// Create a volume filled with a single value.
    pub fn from_geometry_val(geometry: VolumeGeometry, val: T) -> Self
    where
        T: Clone,
    {
        let data = vec![val; geometry.size.num_voxels()];
        Self { geometry, data }
    }

    /// Create a volume by evaluating `f` at every voxel index.
    pub fn from_fn(geometry: VolumeGeometry, mut f: impl FnMut(VoxelIndex) -> T) -> Self {
        let size = geometry.size;
        let mut data = Vec::with_capacity(size.num_voxels());
        for z in 0..size.depth {
            for y in 0..size.height {
                for x in 0..size.width {
                    data.push(f(VoxelIndex::new(x, y, z)));
                }
            }
        }
        Self { geometry, data }
    }

    /// The geometry of the volume.
    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    /// The size of the volume in voxels.
    pub fn size(&self) -> VolumeSize {
        self.geometry.size
    }

    /// The physical voxel spacing.
    pub fn spacing(&self) -> [f64; 3] {
        self.geometry.spacing
    }

    /// Number of voxels.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the volume holds no voxels at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The voxel data as a slice.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The voxel data as a mutable slice.
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consume the volume and return its voxel data.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Linear offset of a voxel index. The index is not checked.
    #[inline]
    pub fn linear_index(&self, index: VoxelIndex) -> usize {
        let size = self.geometry.size;
        index.x + size.width * (index.y + size.height * index.z)
    }

    /// Voxel index of a linear offset. The offset is not checked.
    #[inline]
    pub fn voxel_index(&self, linear: usize) -> VoxelIndex {
        let size = self.geometry.size;
        let x = linear % size.width;
        let y = (linear / size.width) % size.height;
        let z = linear / size.slice_len();
        VoxelIndex::new(x, y, z)
    }

    /// Whether the index lies inside the volume.
    pub fn contains(&self, index: VoxelIndex) -> bool {
        self.geometry.size.contains(index)
    }

    /// Get a reference to the voxel at `index`, if inside the volume.
    pub fn get(&self, index: VoxelIndex) -> Option<&T> {
        self.contains(index)
            .then(|| &self.data[self.linear_index(index)])
    }

    /// Get a mutable reference to the voxel at `index`, if inside the volume.
    pub fn get_mut(&mut self, index: VoxelIndex) -> Option<&mut T> {
        if !self.contains(index) {
            return None;
        }
        let linear = self.linear_index(index);
        Some(&mut self.data[linear])
    }

    /// Set the voxel at `index`.
    ///
    /// # Errors
    ///
    /// If the index is outside the volume, an error is returned.
    pub fn set(&mut self, index: VoxelIndex, val: T) -> Result<(), VolumeError> {
        let size = self.size();
        match self.get_mut(index) {
            Some(v) => {
                *v = val;
                Ok(())
            }
            None => Err(VolumeError::IndexOutOfBounds(index, size)),
        }
    }

    /// Check that `other` lies in the same physical space as `self`.
    pub fn check_same_space<U>(&self, other: &Volume<U>) -> Result<(), VolumeError> {
        if self.geometry.same_space(&other.geometry) {
            Ok(())
        } else {
            Err(VolumeError::GeometryMismatch(self.size(), other.size()))
        }
    }

    /// Apply `f` to every voxel, producing a volume with the same geometry.
    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> Volume<U> {
        Volume {
            geometry: self.geometry,
            data: self.data.iter().map(f).collect(),
        }
    }
}

impl<T> Volume<T>
where
    T: Copy + PartialEq + Default,
{
    /// Number of voxels that differ from the default value (zero).
    pub fn count_nonzero(&self) -> usize {
        let zero = T::default();
        self.data.iter().filter(|&&v| v != zero).count()
    }

    /// Cast the voxel data to a different type.
    ///
    /// # Errors
    ///
    /// If a voxel value cannot be represented in `U`, an error is returned.
    pub fn cast<U>(&self) -> Result<Volume<U>, VolumeError>
    where
        T: num_traits::NumCast,
        U: num_traits::NumCast,
    {
        let data = self
            .data
            .iter()
            .map(|&x| {
                U::from(x).ok_or_else(|| VolumeError::CastError(std::any::type_name::<U>().into()))
            })
            .collect::<Result<Vec<U>, VolumeError>>()?;
        Ok(Volume {
            geometry: self.geometry,
            data,
        })
    }

    /// Paste this volume onto a grid with geometry `target`.
    ///
    /// Both grids must share spacing and direction. The position of the paste
    /// is derived from the origin difference rounded to whole voxels. Voxels
    /// that fall outside `target` are dropped and target voxels not covered by
    /// `self` are set to `fill`.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::IncompatibleSpacing`] if the grids are not
    /// translations of each other.
    pub fn pasted_onto(&self, target: &VolumeGeometry, fill: T) -> Result<Volume<T>, VolumeError> {
        if !self.geometry.is_translation_of(target) {
            return Err(VolumeError::IncompatibleSpacing);
        }

        let mut offset = [0isize; 3];
        for (axis, o) in offset.iter_mut().enumerate() {
            let delta = self.geometry.origin[axis] - target.origin[axis];
            *o = (delta / target.spacing[axis]).round() as isize;
        }

        let src_size = self.size();
        let mut out = Volume::from_geometry_val(*target, fill);
        for z in 0..src_size.depth {
            for y in 0..src_size.height {
                for x in 0..src_size.width {
                    let src_index = VoxelIndex::new(x, y, z);
                    let Some(dst_index) =
                        src_index.offset(offset[0], offset[1], offset[2], target.size)
                    else {
                        continue;
                    };
                    let dst = out.linear_index(dst_index);
                    out.data[dst] = self.data[self.linear_index(src_index)];
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_smoke() -> Result<(), VolumeError> {
        let volume = Volume::new(VolumeGeometry::new([2, 3, 4]), vec![0u8; 24])?;
        assert_eq!(volume.size(), VolumeSize::from([2, 3, 4]));
        assert_eq!(volume.len(), 24);
        assert_eq!(volume.count_nonzero(), 0);
        Ok(())
    }

    #[test]
    fn volume_invalid_length() {
        let res = Volume::new(VolumeGeometry::new([2, 2, 2]), vec![0u8; 7]);
        assert_eq!(res, Err(VolumeError::InvalidDataLength(7, 8)));
    }

    #[test]
    fn linear_and_voxel_index_agree() {
        let volume = Volume::from_geometry_val(VolumeGeometry::new([3, 4, 5]), 0u8);
        for linear in 0..volume.len() {
            let index = volume.voxel_index(linear);
            assert_eq!(volume.linear_index(index), linear);
        }
        assert_eq!(volume.linear_index(VoxelIndex::new(1, 2, 3)), 1 + 3 * (2 + 4 * 3));
    }

    #[test]
    fn from_fn_is_x_fastest() {
        let volume = Volume::from_fn(VolumeGeometry::new([2, 2, 2]), |i| i.x + 10 * i.y + 100 * i.z);
        assert_eq!(volume.as_slice(), &[0, 1, 10, 11, 100, 101, 110, 111]);
    }

    #[test]
    fn set_out_of_bounds() -> Result<(), VolumeError> {
        let mut volume = Volume::from_geometry_val(VolumeGeometry::new([2, 2, 2]), 0u8);
        volume.set(VoxelIndex::new(1, 1, 1), 7)?;
        assert_eq!(volume.get(VoxelIndex::new(1, 1, 1)), Some(&7));
        assert!(volume.set(VoxelIndex::new(2, 0, 0), 1).is_err());
        Ok(())
    }

    #[test]
    fn cast_volume() -> Result<(), VolumeError> {
        let volume = Volume::new(VolumeGeometry::new([2, 1, 1]), vec![3u8, 250])?;
        let cast: Volume<f32> = volume.cast()?;
        assert_eq!(cast.as_slice(), &[3.0, 250.0]);

        let negative = Volume::new(VolumeGeometry::new([1, 1, 1]), vec![-1.0f32])?;
        assert!(negative.cast::<u8>().is_err());
        Ok(())
    }

    #[test]
    fn paste_cropped_mask() -> Result<(), VolumeError> {
        let target = VolumeGeometry::new([4, 4, 4]).with_spacing([0.5; 3]);
        let crop = VolumeGeometry::new([2, 2, 2])
            .with_spacing([0.5; 3])
            .with_origin([0.5, 1.0, 1.0]);
        let mask = Volume::from_geometry_val(crop, 1u8);

        let pasted = mask.pasted_onto(&target, 0)?;
        assert_eq!(pasted.count_nonzero(), 8);
        assert_eq!(pasted.get(VoxelIndex::new(1, 2, 3)), Some(&1));
        assert_eq!(pasted.get(VoxelIndex::new(2, 3, 3)), Some(&1));
        assert_eq!(pasted.get(VoxelIndex::new(0, 2, 3)), Some(&0));
        Ok(())
    }

    #[test]
    fn paste_clips_outside() -> Result<(), VolumeError> {
        let target = VolumeGeometry::new([3, 3, 3]);
        let shifted = VolumeGeometry::new([3, 3, 3]).with_origin([2.0, 0.0, 0.0]);
        let mask = Volume::from_geometry_val(shifted, 1u8);
        let pasted = mask.pasted_onto(&target, 0)?;
        assert_eq!(pasted.count_nonzero(), 9);
        Ok(())
    }

    #[test]
    fn paste_rejects_other_spacing() {
        let target = VolumeGeometry::new([3, 3, 3]);
        let other = VolumeGeometry::new([3, 3, 3]).with_spacing([2.0, 1.0, 1.0]);
        let mask = Volume::from_geometry_val(other, 1u8);
        assert_eq!(
            mask.pasted_onto(&target, 0),
            Err(VolumeError::IncompatibleSpacing)
        );
    }
}
