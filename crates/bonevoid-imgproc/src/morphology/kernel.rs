/// A contiguous x-run of a structuring element.
///
/// The run covers the offsets `(-half_width..=half_width, dy, dz)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelRun {
    /// Row offset along y.
    pub dy: isize,
    /// Slice offset along z.
    pub dz: isize,
    /// Half width of the run along x.
    pub half_width: usize,
}

/// An isotropic ball structuring element of integer radius.
///
/// The ball holds every offset with `dx² + dy² + dz² <= radius²`. Each
/// `(dy, dz)` row of the ball is symmetric in x, so it is stored as a list of
/// runs which lets erosion and dilation work on per-row prefix sums.
///
/// # Example
///
/// ```rust
/// use bonevoid_imgproc::morphology::BallKernel;
///
/// let kernel = BallKernel::new(1);
/// assert_eq!(kernel.num_voxels(), 7);
/// assert!(kernel.contains(0, 0, 1));
/// assert!(!kernel.contains(1, 1, 0));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BallKernel {
    radius: usize,
    runs: Vec<KernelRun>,
}

impl BallKernel {
    /// Create a ball kernel.
    ///
    /// # Arguments
    ///
    /// * `radius` - The radius in voxels, 0 is the single centre voxel.
    pub fn new(radius: usize) -> Self {
        let r = radius as isize;
        let r2 = r * r;
        let mut runs = Vec::new();
        for dz in -r..=r {
            for dy in -r..=r {
                let rest = r2 - dy * dy - dz * dz;
                if rest < 0 {
                    continue;
                }
                let mut half_width = (rest as f64).sqrt() as usize;
                // guard the float sqrt at perfect squares
                while (half_width + 1) * (half_width + 1) <= rest as usize {
                    half_width += 1;
                }
                while half_width * half_width > rest as usize {
                    half_width -= 1;
                }
                runs.push(KernelRun { dy, dz, half_width });
            }
        }
        Self { radius, runs }
    }

    /// The radius of the ball.
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// The x-runs of the ball.
    pub fn runs(&self) -> &[KernelRun] {
        &self.runs
    }

    /// Number of voxels in the ball.
    pub fn num_voxels(&self) -> usize {
        self.runs.iter().map(|r| 2 * r.half_width + 1).sum()
    }

    /// Whether the offset `(dx, dy, dz)` is inside the ball.
    pub fn contains(&self, dx: isize, dy: isize, dz: isize) -> bool {
        self.runs
            .iter()
            .any(|r| r.dy == dy && r.dz == dz && dx.unsigned_abs() <= r.half_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ball_voxel_counts() {
        assert_eq!(BallKernel::new(0).num_voxels(), 1);
        assert_eq!(BallKernel::new(1).num_voxels(), 7);
        assert_eq!(BallKernel::new(2).num_voxels(), 33);
    }

    #[test]
    fn ball_matches_definition() {
        let radius = 3isize;
        let kernel = BallKernel::new(radius as usize);
        for dz in -4isize..=4 {
            for dy in -4isize..=4 {
                for dx in -4isize..=4 {
                    let inside = dx * dx + dy * dy + dz * dz <= radius * radius;
                    assert_eq!(kernel.contains(dx, dy, dz), inside, "({dx}, {dy}, {dz})");
                }
            }
        }
    }
}
