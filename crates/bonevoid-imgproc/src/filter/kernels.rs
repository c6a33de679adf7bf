/// Half width of a gaussian kernel covering three standard deviations.
///
/// The half width is at least one voxel.
pub fn gaussian_half_width(sigma: f32) -> usize {
    (3.0 * sigma).ceil().max(1.0) as usize
}

/// Sampled gaussian of standard deviation `sigma`, in voxels.
///
/// The kernel has `2 * gaussian_half_width(sigma) + 1` taps centred on the
/// middle one, and its weights sum to one.
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let half = gaussian_half_width(sigma) as isize;
    let denom = 2.0 * sigma * sigma;

    let mut taps: Vec<f32> = (-half..=half)
        .map(|x| (-((x * x) as f32) / denom).exp())
        .collect();

    let sum: f32 = taps.iter().sum();
    taps.iter_mut().for_each(|t| *t /= sum);
    taps
}
