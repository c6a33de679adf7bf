use rayon::prelude::*;
use thiserror::Error;

use bonevoid_volume::{Volume, VolumeSize};

/// Failures of the thread pool dispatch.
#[derive(Error, Debug, PartialEq)]
pub enum ParallelError {
    /// Rayon could not start the local pool.
    #[error("could not start a local pool: {0}")]
    BuildError(String),

    /// A fixed pool was requested with zero threads.
    #[error("a fixed pool needs at least one thread, got {0}")]
    InvalidThreadCount(usize),

    /// Source and destination volumes hold a different number of voxels.
    #[error("source and destination volumes differ in voxel count")]
    SizeMismatch,
}

/// Controls how full-volume sweeps are executed.
///
/// Every strategy produces bit-identical results; only the scheduling differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// Use the global Rayon thread pool, splitting the work by z slices or
    /// by axis lines.
    #[default]
    ParallelSlices,

    /// Run on the calling thread.
    Serial,

    /// Run on a local pool of `n` threads, built anew for each sweep.
    Fixed(usize),
}

impl ExecutionStrategy {
    /// Whether the strategy dispatches to a thread pool.
    pub fn is_parallel(&self) -> bool {
        !matches!(self, ExecutionStrategy::Serial)
    }

    /// Run `op` under this strategy.
    ///
    /// For [`ExecutionStrategy::Fixed`] the closure is installed on a local
    /// pool so that nested rayon iterators use `n` threads.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> Result<R, ParallelError> {
        match *self {
            ExecutionStrategy::Fixed(0) => Err(ParallelError::InvalidThreadCount(0)),
            ExecutionStrategy::Fixed(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| ParallelError::BuildError(e.to_string()))?;
                Ok(pool.install(op))
            }
            _ => Ok(op()),
        }
    }
}

/// Apply a function to each voxel of `src`, writing into `dst`.
pub fn par_iter_voxels<T1, T2>(
    src: &Volume<T1>,
    dst: &mut Volume<T2>,
    strategy: ExecutionStrategy,
    f: impl Fn(&T1, &mut T2) + Send + Sync,
) -> Result<(), ParallelError>
where
    T1: Send + Sync,
    T2: Send + Sync,
{
    if src.len() != dst.len() {
        return Err(ParallelError::SizeMismatch);
    }

    let slice_len = src.size().slice_len().max(1);
    if strategy.is_parallel() {
        strategy.install(|| {
            src.as_slice()
                .par_chunks(slice_len)
                .zip(dst.as_slice_mut().par_chunks_mut(slice_len))
                .for_each(|(src_chunk, dst_chunk)| {
                    src_chunk
                        .iter()
                        .zip(dst_chunk.iter_mut())
                        .for_each(|(s, d)| f(s, d));
                });
        })?;
    } else {
        src.as_slice()
            .iter()
            .zip(dst.as_slice_mut().iter_mut())
            .for_each(|(s, d)| f(s, d));
    }

    Ok(())
}

/// Apply a function to each voxel pair of `src1` and `src2`, writing into `dst`.
pub fn par_iter_voxels_two<T1, T2, T3>(
    src1: &Volume<T1>,
    src2: &Volume<T2>,
    dst: &mut Volume<T3>,
    strategy: ExecutionStrategy,
    f: impl Fn(&T1, &T2, &mut T3) + Send + Sync,
) -> Result<(), ParallelError>
where
    T1: Send + Sync,
    T2: Send + Sync,
    T3: Send + Sync,
{
    if src1.len() != dst.len() || src2.len() != dst.len() {
        return Err(ParallelError::SizeMismatch);
    }

    let slice_len = src1.size().slice_len().max(1);
    if strategy.is_parallel() {
        strategy.install(|| {
            src1.as_slice()
                .par_chunks(slice_len)
                .zip(src2.as_slice().par_chunks(slice_len))
                .zip(dst.as_slice_mut().par_chunks_mut(slice_len))
                .for_each(|((a_chunk, b_chunk), dst_chunk)| {
                    a_chunk
                        .iter()
                        .zip(b_chunk.iter())
                        .zip(dst_chunk.iter_mut())
                        .for_each(|((a, b), d)| f(a, b, d));
                });
        })?;
    } else {
        src1.as_slice()
            .iter()
            .zip(src2.as_slice().iter())
            .zip(dst.as_slice_mut().iter_mut())
            .for_each(|((a, b), d)| f(a, b, d));
    }

    Ok(())
}

/// Apply a function to every z slice of `dst`, passing the slice index.
pub fn par_iter_slices<T>(
    dst: &mut Volume<T>,
    strategy: ExecutionStrategy,
    f: impl Fn(usize, &mut [T]) + Send + Sync,
) -> Result<(), ParallelError>
where
    T: Send + Sync,
{
    let slice_len = dst.size().slice_len().max(1);
    if strategy.is_parallel() {
        strategy.install(|| {
            dst.as_slice_mut()
                .par_chunks_mut(slice_len)
                .enumerate()
                .for_each(|(z, slice)| f(z, slice));
        })?;
    } else {
        dst.as_slice_mut()
            .chunks_mut(slice_len)
            .enumerate()
            .for_each(|(z, slice)| f(z, slice));
    }
    Ok(())
}

/// A volume axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// The x axis, contiguous in memory.
    X,
    /// The y axis.
    Y,
    /// The z axis.
    Z,
}

impl Axis {
    /// All axes in processing order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Position of the axis in `[x, y, z]` arrays.
    pub fn position(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Memory layout of the 1D lines of a volume along one axis.
#[derive(Debug, Clone, Copy)]
struct LineLayout {
    len: usize,
    stride: usize,
    width: usize,
    slice_len: usize,
}

impl LineLayout {
    fn new(size: VolumeSize, axis: Axis) -> Self {
        let (len, stride) = match axis {
            Axis::X => (size.width, 1),
            Axis::Y => (size.height, size.width),
            Axis::Z => (size.depth, size.slice_len()),
        };
        Self {
            len,
            stride,
            width: size.width,
            slice_len: size.slice_len(),
        }
    }

    // linear offset of the first voxel of a line
    fn base(&self, line: usize, axis: Axis) -> usize {
        match axis {
            Axis::X => line * self.len,
            Axis::Y => {
                let x = line % self.width;
                let z = line / self.width;
                x + z * self.slice_len
            }
            Axis::Z => line,
        }
    }

    // (line, position in line) of a linear voxel offset
    fn locate(&self, linear: usize, axis: Axis) -> (usize, usize) {
        match axis {
            Axis::X => (linear / self.len, linear % self.len),
            Axis::Y => {
                let x = linear % self.width;
                let y = (linear / self.width) % self.len;
                let z = linear / self.slice_len;
                (x + z * self.width, y)
            }
            Axis::Z => (linear % self.slice_len, linear / self.slice_len),
        }
    }
}

/// Transform every 1D line of `src` along `axis` with `f`, writing into `dst`.
///
/// `f` receives the input line and an output buffer of the same length. The
/// lines are processed independently, so the result does not depend on the
/// strategy.
pub fn par_iter_lines<T, U>(
    src: &[T],
    dst: &mut [U],
    size: VolumeSize,
    axis: Axis,
    strategy: ExecutionStrategy,
    f: impl Fn(&[T], &mut [U]) + Send + Sync,
) -> Result<(), ParallelError>
where
    T: Copy + Send + Sync,
    U: Copy + Default + Send + Sync,
{
    if src.len() != dst.len() || src.len() != size.num_voxels() {
        return Err(ParallelError::SizeMismatch);
    }
    if src.is_empty() {
        return Ok(());
    }

    let layout = LineLayout::new(size, axis);
    let mut lines = vec![U::default(); src.len()];

    let transform = |(line, out): (usize, &mut [U])| {
        let base = layout.base(line, axis);
        let input: Vec<T> = (0..layout.len)
            .map(|i| src[base + i * layout.stride])
            .collect();
        f(&input, out);
    };
    if strategy.is_parallel() {
        strategy.install(|| {
            lines
                .par_chunks_mut(layout.len)
                .enumerate()
                .for_each(&transform)
        })?;
    } else {
        lines.chunks_mut(layout.len).enumerate().for_each(&transform);
    }

    let lines = lines.as_slice();
    let scatter = |(linear, out): (usize, &mut U)| {
        let (line, i) = layout.locate(linear, axis);
        *out = lines[line * layout.len + i];
    };

    if strategy.is_parallel() {
        strategy.install(|| dst.par_iter_mut().enumerate().for_each(&scatter))?;
    } else {
        dst.iter_mut().enumerate().for_each(&scatter);
    }

    Ok(())
}
