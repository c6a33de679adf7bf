/// Volume size in voxels
///
/// # Examples
///
/// ```
/// use bonevoid_volume::VolumeSize;
///
/// let size = VolumeSize { width: 10, height: 20, depth: 5 };
///
/// assert_eq!(size.num_voxels(), 1000);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VolumeSize {
    /// Number of voxels along the x axis
    pub width: usize,
    /// Number of voxels along the y axis
    pub height: usize,
    /// Number of voxels along the z axis
    pub depth: usize,
}

impl VolumeSize {
    /// Total number of voxels.
    pub fn num_voxels(&self) -> usize {
        self.width * self.height * self.depth
    }

    /// Number of voxels in one z slice.
    pub fn slice_len(&self) -> usize {
        self.width * self.height
    }

    /// Whether the index lies inside `[0, size)` on every axis.
    pub fn contains(&self, index: VoxelIndex) -> bool {
        index.x < self.width && index.y < self.height && index.z < self.depth
    }
}

impl std::fmt::Display for VolumeSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "VolumeSize {{ width: {}, height: {}, depth: {} }}",
            self.width, self.height, self.depth
        )
    }
}

impl From<[usize; 3]> for VolumeSize {
    fn from(size: [usize; 3]) -> Self {
        VolumeSize {
            width: size[0],
            height: size[1],
            depth: size[2],
        }
    }
}

/// Integer coordinates of a grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoxelIndex {
    /// Column
    pub x: usize,
    /// Row
    pub y: usize,
    /// Slice
    pub z: usize,
}

impl VoxelIndex {
    /// Create a new voxel index.
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Offset the index, returning `None` when it would leave `size`.
    pub fn offset(&self, dx: isize, dy: isize, dz: isize, size: VolumeSize) -> Option<Self> {
        let x = self.x.checked_add_signed(dx)?;
        let y = self.y.checked_add_signed(dy)?;
        let z = self.z.checked_add_signed(dz)?;
        let index = Self { x, y, z };
        size.contains(index).then_some(index)
    }
}

impl std::fmt::Display for VoxelIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl From<[usize; 3]> for VoxelIndex {
    fn from(index: [usize; 3]) -> Self {
        VoxelIndex::new(index[0], index[1], index[2])
    }
}

impl From<(usize, usize, usize)> for VoxelIndex {
    fn from((x, y, z): (usize, usize, usize)) -> Self {
        VoxelIndex::new(x, y, z)
    }
}

// tolerance used when comparing physical placement of two grids
const GEOMETRY_TOLERANCE: f64 = 1e-6;

/// Placement of a regular voxel grid in physical space.
///
/// Two volumes take part in the same computation only if their geometries are
/// equal up to a small tolerance, see [`VolumeGeometry::same_space`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeGeometry {
    /// Number of voxels per axis.
    pub size: VolumeSize,
    /// Physical size of one voxel per axis.
    pub spacing: [f64; 3],
    /// Physical position of voxel (0, 0, 0).
    pub origin: [f64; 3],
    /// Axis orientation as a row-major 3x3 matrix.
    pub direction: [f64; 9],
}

impl VolumeGeometry {
    /// Identity direction matrix.
    pub const IDENTITY_DIRECTION: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

    /// Create a geometry with unit spacing, zero origin and identity direction.
    pub fn new(size: impl Into<VolumeSize>) -> Self {
        Self {
            size: size.into(),
            spacing: [1.0; 3],
            origin: [0.0; 3],
            direction: Self::IDENTITY_DIRECTION,
        }
    }

    /// Replace the voxel spacing.
    pub fn with_spacing(mut self, spacing: [f64; 3]) -> Self {
        self.spacing = spacing;
        self
    }

    /// Replace the origin.
    pub fn with_origin(mut self, origin: [f64; 3]) -> Self {
        self.origin = origin;
        self
    }

    /// Whether both grids share spacing and direction, so that one can be
    /// pasted onto the other by an integer translation.
    pub fn is_translation_of(&self, other: &VolumeGeometry) -> bool {
        close(&self.spacing, &other.spacing) && close(&self.direction, &other.direction)
    }

    /// Whether both grids occupy the same physical space.
    pub fn same_space(&self, other: &VolumeGeometry) -> bool {
        self.size == other.size
            && self.is_translation_of(other)
            && close(&self.origin, &other.origin)
    }
}

fn close(a: &[f64], b: &[f64]) -> bool {
    a.iter()
        .zip(b.iter())
        .all(|(x, y)| (x - y).abs() <= GEOMETRY_TOLERANCE * x.abs().max(y.abs()).max(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voxel_offset_stays_in_bounds() {
        let size = VolumeSize::from([3, 3, 3]);
        let index = VoxelIndex::new(0, 1, 2);
        assert_eq!(index.offset(1, 1, -2, size), Some(VoxelIndex::new(1, 2, 0)));
        assert_eq!(index.offset(-1, 0, 0, size), None);
        assert_eq!(index.offset(0, 0, 1, size), None);
    }

    #[test]
    fn same_space_tolerates_rounding() {
        let a = VolumeGeometry::new([4, 4, 4]).with_spacing([0.082, 0.082, 0.082]);
        let b = a.with_spacing([0.082 + 1e-12, 0.082, 0.082]);
        assert!(a.same_space(&b));

        let c = a.with_origin([0.082, 0.0, 0.0]);
        assert!(!a.same_space(&c));
        assert!(a.is_translation_of(&c));
    }
}
