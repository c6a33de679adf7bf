use serde::{Deserialize, Serialize};

/// Voxel connectivity used by labeling and region growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// 6-connectivity: voxels sharing a face.
    Face,
    /// 18-connectivity: voxels sharing a face or an edge.
    Edge,
    /// 26-connectivity: voxels sharing a face, an edge or a corner.
    #[default]
    Full,
}

impl Connectivity {
    /// Neighbour offsets `(dx, dy, dz)`, excluding the centre voxel.
    pub fn offsets(&self) -> Vec<[isize; 3]> {
        let max_nonzero = match self {
            Connectivity::Face => 1,
            Connectivity::Edge => 2,
            Connectivity::Full => 3,
        };

        let mut offsets = Vec::with_capacity(26);
        for dz in -1isize..=1 {
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    let nonzero = [dx, dy, dz].iter().filter(|&&d| d != 0).count();
                    if nonzero > 0 && nonzero <= max_nonzero {
                        offsets.push([dx, dy, dz]);
                    }
                }
            }
        }
        offsets
    }
}

/// The six face neighbours.
pub(crate) const FACE_OFFSETS: [[isize; 3]; 6] = [
    [-1, 0, 0],
    [1, 0, 0],
    [0, -1, 0],
    [0, 1, 0],
    [0, 0, -1],
    [0, 0, 1],
];
