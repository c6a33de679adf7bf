use std::fmt;

use bonevoid_imgproc::connected_components::{
    component_sizes, label, relabel_components, remove_small_components,
};
use bonevoid_imgproc::core::{and, and_not, invert, is_empty, or, to_binary};
use bonevoid_imgproc::distance_transform::signed_distance_map;
use bonevoid_imgproc::filter::smooth;
use bonevoid_imgproc::morphology::{dilate, erode};
use bonevoid_imgproc::neighborhood::Connectivity;
use bonevoid_imgproc::region_growing::{seed_volume, seeded_region_grow};
use bonevoid_imgproc::threshold::binarize;
use bonevoid_imgproc::ImgprocError;
use bonevoid_volume::{BinaryVolume, LabelVolume, Volume, VolumeGeometry, VolumeSize, VoxelIndex};

use crate::config::VoidVolumeConfig;
use crate::error::DetectError;
use crate::pipeline::StepPipeline;

/// The steps of the void volume pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoidVolumeStep {
    /// Denoise, binarize and prune the bone.
    Preprocess,
    /// Intersect the non-bone voxels with the contour: the coarse candidate.
    ExtractRoi,
    /// Drop voids narrower than the minimal radius: the fine candidate.
    DistancePass,
    /// Erode the fine candidate to cut thin connections.
    Erode,
    /// Keep the eroded voids reached from the seeds.
    Grow,
    /// Dilate the grown voids back inside the contour.
    Dilate,
    /// Merge the grown voids with the coarse candidate.
    Combine,
    /// Label the erosions and drop the small ones.
    Label,
    /// Every step has run.
    Done,
}

impl VoidVolumeStep {
    /// Number of executable steps.
    pub const COUNT: usize = 8;

    /// Number of steps completed when this step is next.
    pub fn index(&self) -> usize {
        match self {
            VoidVolumeStep::Preprocess => 0,
            VoidVolumeStep::ExtractRoi => 1,
            VoidVolumeStep::DistancePass => 2,
            VoidVolumeStep::Erode => 3,
            VoidVolumeStep::Grow => 4,
            VoidVolumeStep::Dilate => 5,
            VoidVolumeStep::Combine => 6,
            VoidVolumeStep::Label => 7,
            VoidVolumeStep::Done => 8,
        }
    }
}

impl fmt::Display for VoidVolumeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VoidVolumeStep::Preprocess => "preprocess",
            VoidVolumeStep::ExtractRoi => "extract roi",
            VoidVolumeStep::DistancePass => "distance pass",
            VoidVolumeStep::Erode => "erode",
            VoidVolumeStep::Grow => "grow",
            VoidVolumeStep::Dilate => "dilate",
            VoidVolumeStep::Combine => "combine",
            VoidVolumeStep::Label => "label",
            VoidVolumeStep::Done => "done",
        };
        write!(f, "{name}")
    }
}

// Each variant holds exactly the volumes its step consumes.
enum State {
    Preprocess,
    ExtractRoi {
        bone: BinaryVolume,
    },
    DistancePass {
        coarse: BinaryVolume,
    },
    Erode {
        coarse: BinaryVolume,
        fine: BinaryVolume,
    },
    Grow {
        coarse: BinaryVolume,
        eroded: BinaryVolume,
    },
    Dilate {
        coarse: BinaryVolume,
        grown: BinaryVolume,
    },
    Combine {
        coarse: BinaryVolume,
        dilated: BinaryVolume,
    },
    Label {
        combined: BinaryVolume,
    },
    Done {
        labels: LabelVolume,
        num_erosions: usize,
    },
}

impl State {
    fn step(&self) -> VoidVolumeStep {
        match self {
            State::Preprocess => VoidVolumeStep::Preprocess,
            State::ExtractRoi { .. } => VoidVolumeStep::ExtractRoi,
            State::DistancePass { .. } => VoidVolumeStep::DistancePass,
            State::Erode { .. } => VoidVolumeStep::Erode,
            State::Grow { .. } => VoidVolumeStep::Grow,
            State::Dilate { .. } => VoidVolumeStep::Dilate,
            State::Combine { .. } => VoidVolumeStep::Combine,
            State::Label { .. } => VoidVolumeStep::Label,
            State::Done { .. } => VoidVolumeStep::Done,
        }
    }
}

/// Seeded detection of void volumes (erosions) inside a bone contour.
///
/// The detector runs eight steps, see [`VoidVolumeStep`]. It owns the
/// greyscale scan, the contour mask realigned onto the scan grid and the
/// seeds; the intermediate volumes live in the step state and are dropped as
/// soon as no later step needs them.
///
/// # Example
///
/// ```
/// use bonevoid_detect::{run_to_completion, VoidVolumeConfig, VoidVolumeDetector};
/// use bonevoid_volume::{Volume, VolumeGeometry, VoxelIndex};
/// use std::ops::ControlFlow;
///
/// let geometry = VolumeGeometry::new([8, 8, 8]);
/// let scan = Volume::from_geometry_val(geometry, 1200.0f32);
/// let contour = Volume::from_geometry_val(geometry, 1u8);
/// let config = VoidVolumeConfig { lower_threshold: 850.0, upper_threshold: 9999.0, ..Default::default() };
///
/// let mut detector =
///     VoidVolumeDetector::new(scan, &contour, vec![VoxelIndex::new(4, 4, 4)], config).unwrap();
/// run_to_completion(&mut detector, |_, _| ControlFlow::Continue(())).unwrap();
///
/// // solid bone, nothing to find
/// assert_eq!(detector.num_erosions().unwrap(), 0);
/// ```
pub struct VoidVolumeDetector {
    config: VoidVolumeConfig,
    greyscale: Volume<f32>,
    contour: BinaryVolume,
    seeds: Vec<VoxelIndex>,
    state: State,
}

impl VoidVolumeDetector {
    /// Create a detector.
    ///
    /// # Arguments
    ///
    /// * `greyscale` - The scan.
    /// * `contour` - The periosteal/endosteal contour mask, any nonzero voxel
    ///   is inside. A mask on a translated grid with the same spacing is
    ///   pasted onto the scan grid.
    /// * `seeds` - Voxels inside known erosions. No seeds yields an empty
    ///   result.
    /// * `config` - The detector configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the config is invalid, the contour
    /// cannot be aligned with the scan or a seed lies outside the scan.
    pub fn new(
        greyscale: Volume<f32>,
        contour: &BinaryVolume,
        seeds: Vec<VoxelIndex>,
        config: VoidVolumeConfig,
    ) -> Result<Self, DetectError> {
        config.validate()?;
        let contour = align_contour(contour, greyscale.geometry())?;
        check_seeds(&seeds, greyscale.size())?;
        Ok(Self::from_aligned(greyscale, contour, seeds, config))
    }

    // Inputs are already validated and on the same grid.
    pub(crate) fn from_aligned(
        greyscale: Volume<f32>,
        contour: BinaryVolume,
        seeds: Vec<VoxelIndex>,
        config: VoidVolumeConfig,
    ) -> Self {
        log::info!(
            "void volume detector: {} volume, {} seeds, thresholds [{}, {}], radii {}/{}",
            greyscale.size(),
            seeds.len(),
            config.lower_threshold,
            config.upper_threshold,
            config.minimal_radius,
            config.morphological_radius
        );

        Self {
            config,
            greyscale,
            contour,
            seeds,
            state: State::Preprocess,
        }
    }

    /// The next step to run.
    pub fn step(&self) -> VoidVolumeStep {
        self.state.step()
    }

    /// The configuration.
    pub fn config(&self) -> &VoidVolumeConfig {
        &self.config
    }

    /// The contour mask on the scan grid.
    pub fn contour(&self) -> &BinaryVolume {
        &self.contour
    }

    /// The seeds.
    pub fn seeds(&self) -> &[VoxelIndex] {
        &self.seeds
    }

    /// The labeled erosions: 0 is background, the largest erosion is 1.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Incomplete`] until every step has run.
    pub fn fetch_labeled_erosions(&self) -> Result<&LabelVolume, DetectError> {
        match &self.state {
            State::Done { labels, .. } => Ok(labels),
            _ => Err(self.incomplete()),
        }
    }

    /// Number of labeled erosions.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Incomplete`] until every step has run.
    pub fn num_erosions(&self) -> Result<usize, DetectError> {
        match &self.state {
            State::Done { num_erosions, .. } => Ok(*num_erosions),
            _ => Err(self.incomplete()),
        }
    }

    fn incomplete(&self) -> DetectError {
        DetectError::Incomplete {
            step: self.current_step(),
            total: self.step_count(),
        }
    }

    fn advance(&self, state: State) -> Result<State, ImgprocError> {
        let config = &self.config;
        let next = match state {
            State::Preprocess => {
                let sigma = config.sigma.unwrap_or(self.greyscale.spacing()[0]);
                let bone = preprocess_bone(
                    &self.greyscale,
                    config.lower_threshold,
                    config.upper_threshold,
                    sigma,
                    config.min_bone_voxels,
                    config.connectivity,
                )?;
                log::debug!("bone: {} voxels", bone.count_nonzero());
                State::ExtractRoi { bone }
            }
            State::ExtractRoi { bone } => {
                let coarse = and(&invert(&bone)?, &self.contour)?;
                log::debug!("coarse candidate: {} voxels", coarse.count_nonzero());
                State::DistancePass { coarse }
            }
            State::DistancePass { coarse } => {
                let fine = distance_pass(&coarse, config.minimal_radius)?;
                log::debug!("fine candidate: {} voxels", fine.count_nonzero());
                State::Erode { coarse, fine }
            }
            State::Erode { coarse, fine } => {
                let eroded = erode(&fine, config.morphological_radius)?;
                log::debug!("eroded candidate: {} voxels", eroded.count_nonzero());
                State::Grow { coarse, eroded }
            }
            State::Grow { coarse, eroded } => {
                let grown = self.grow_from_seeds(&eroded)?;
                log::debug!("grown voids: {} voxels", grown.count_nonzero());
                State::Dilate { coarse, grown }
            }
            State::Dilate { coarse, grown } => {
                let dilated = and(&dilate(&grown, config.morphological_radius)?, &self.contour)?;
                log::debug!("dilated voids: {} voxels", dilated.count_nonzero());
                State::Combine { coarse, dilated }
            }
            State::Combine { coarse, dilated } => {
                let radius = config.combine_radius();
                let masked = and(&dilate(&dilated, radius)?, &coarse)?;
                for seed in self.seeds.iter().filter(|&&s| masked.get(s) != Some(&1)) {
                    log::warn!("seed {seed} is not on a candidate voxel");
                }
                let combined = seeded_region_grow(&masked, &self.seeds, config.connectivity)?;
                log::debug!(
                    "combined voids (radius {radius}): {} voxels",
                    combined.count_nonzero()
                );
                State::Label { combined }
            }
            State::Label { combined } => {
                let (labels, _) = label(&combined, config.connectivity);
                let (labels, num_erosions) = relabel_components(&labels, config.min_erosion_voxels)?;
                log::info!("void volume detector found {num_erosions} erosions");
                log::debug!("erosion sizes: {:?}", component_sizes(&labels));
                State::Done {
                    labels,
                    num_erosions,
                }
            }
            done @ State::Done { .. } => done,
        };
        Ok(next)
    }

    fn grow_from_seeds(&self, eroded: &BinaryVolume) -> Result<BinaryVolume, ImgprocError> {
        if self.seeds.is_empty() {
            return Ok(Volume::from_geometry_val(*eroded.geometry(), 0u8));
        }

        // every voxel within the inflation radius of a seed, seeds included
        let seeds = seed_volume(eroded, &self.seeds)?;
        let distance = signed_distance_map(&seeds, 0)?;
        let inflated = binarize(&distance, f32::NEG_INFINITY, self.config.seed_inflation_radius)?;

        let union = or(&inflated, eroded)?;
        let grown = seeded_region_grow(&union, &self.seeds, self.config.connectivity)?;

        // drop the halo that is not part of the candidate
        and(&grown, eroded)
    }
}

impl StepPipeline for VoidVolumeDetector {
    fn step_count(&self) -> usize {
        VoidVolumeStep::COUNT
    }

    fn current_step(&self) -> usize {
        self.state.step().index()
    }

    fn execute_next_step(&mut self) -> Result<bool, DetectError> {
        if self.is_complete() {
            return Ok(false);
        }

        let state = std::mem::replace(&mut self.state, State::Preprocess);
        let step = state.step();
        log::debug!("void volume step {}: {step}", step.index() + 1);

        match self.advance(state) {
            Ok(next) => {
                self.state = next;
                Ok(true)
            }
            Err(source) => {
                log::warn!("void volume step {step} failed, pipeline reset: {source}");
                Err(DetectError::Execution {
                    step: step.index() + 1,
                    source,
                })
            }
        }
    }
}

/// Denoise, binarize and prune a greyscale scan into a bone mask.
///
/// # Arguments
///
/// * `greyscale` - The scan.
/// * `lower` - The lowest bone intensity, inclusive.
/// * `upper` - The highest bone intensity, inclusive.
/// * `sigma` - The gaussian width in physical units.
/// * `min_voxels` - Bone components smaller than this are dropped.
/// * `connectivity` - Connectivity of the components.
pub fn preprocess_bone(
    greyscale: &Volume<f32>,
    lower: f32,
    upper: f32,
    sigma: f64,
    min_voxels: usize,
    connectivity: Connectivity,
) -> Result<BinaryVolume, ImgprocError> {
    let smoothed = smooth(greyscale, sigma)?;
    let bone = binarize(&smoothed, lower, upper)?;
    remove_small_components(&bone, min_voxels, connectivity)
}

/// Keep the voids of a candidate mask that are at least `radius` wide.
///
/// Candidate voxels within `radius` of the candidate boundary are removed,
/// then the voxels within `radius` of what is left are added back.
pub fn distance_pass(candidate: &BinaryVolume, radius: usize) -> Result<BinaryVolume, ImgprocError> {
    if is_empty(candidate) {
        return Ok(candidate.clone());
    }
    let radius = radius as f32;

    let inner = if candidate.count_nonzero() == candidate.len() {
        // no boundary to measure from
        candidate.clone()
    } else {
        let distance = signed_distance_map(candidate, 1)?;
        let thin = binarize(&distance, 1.0, radius)?;
        and_not(candidate, &thin)?
    };
    if is_empty(&inner) {
        return Ok(inner);
    }

    let distance = signed_distance_map(&inner, 0)?;
    let outer = binarize(&distance, 1.0, radius)?;
    or(&inner, &outer)
}

/// Binarize a contour mask and bring it onto the scan grid.
pub(crate) fn align_contour(
    contour: &BinaryVolume,
    target: &VolumeGeometry,
) -> Result<BinaryVolume, DetectError> {
    let binary = to_binary(contour);
    if binary.geometry().same_space(target) {
        return Ok(binary);
    }
    let pasted = binary.pasted_onto(target, 0)?;
    log::warn!(
        "contour of size {} realigned onto the {} scan grid",
        contour.size(),
        target.size
    );
    Ok(pasted)
}

pub(crate) fn check_seeds(seeds: &[VoxelIndex], size: VolumeSize) -> Result<(), DetectError> {
    match seeds.iter().find(|&&s| !size.contains(s)) {
        Some(&seed) => Err(DetectError::SeedOutOfBounds(seed, size)),
        None => Ok(()),
    }
}
