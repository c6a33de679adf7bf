use std::fmt;

use bonevoid_imgproc::connected_components::component_sizes;
use bonevoid_imgproc::threshold::{auto_threshold, AUTO_THRESHOLD_BINS};
use bonevoid_imgproc::ImgprocError;
use bonevoid_volume::{BinaryVolume, LabelVolume, Volume, VoxelIndex};

use crate::config::CorticalBreakConfig;
use crate::error::DetectError;
use crate::pipeline::StepPipeline;
use crate::void_volume::{align_contour, preprocess_bone, VoidVolumeDetector, VoidVolumeStep};

mod band;
mod variant;

pub use band::{break_candidates, break_seeds, cortical_band, filter_breaks, CorticalBand};
pub use variant::CorticalBreakVariant;

use variant::BreakVariant;

/// The stages of the cortical break pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakStage {
    /// Stretch the contrast of an uncalibrated scan.
    NormalizeContrast,
    /// Segment the bone from the scan.
    Segment,
    /// Split the contour into the cortical band and its surfaces.
    CorticalBand,
    /// Find the band voxels without bone.
    BreakCandidates,
    /// Keep the candidates crossing the whole band.
    BreakFilter,
    /// Place one seed per break and set up the erosion pass.
    BreakSeeds,
    /// A step of the erosion pass seeded at the breaks.
    Erosion(VoidVolumeStep),
    /// Every step has run.
    Done,
}

impl fmt::Display for BreakStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakStage::NormalizeContrast => write!(f, "normalize contrast"),
            BreakStage::Segment => write!(f, "segment"),
            BreakStage::CorticalBand => write!(f, "cortical band"),
            BreakStage::BreakCandidates => write!(f, "break candidates"),
            BreakStage::BreakFilter => write!(f, "break filter"),
            BreakStage::BreakSeeds => write!(f, "break seeds"),
            BreakStage::Erosion(step) => write!(f, "erosion {step}"),
            BreakStage::Done => write!(f, "done"),
        }
    }
}

/// The volumes a [`CorticalBreakDetector`] works on.
#[derive(Debug, Clone)]
pub struct CorticalBreakInputs {
    /// The scan.
    pub greyscale: Volume<f32>,
    /// A bone mask on the scan grid, used instead of the segmentation to
    /// find the breaks.
    pub bone_mask: Option<BinaryVolume>,
    /// The periosteal contour mask, any nonzero voxel is inside.
    pub contour: BinaryVolume,
}

// Each variant holds what the next stage consumes; `working` is the
// prepared scan, `None` for the scan as given.
enum Phase {
    NormalizeContrast,
    Segment {
        working: Option<Volume<f32>>,
    },
    CorticalBand {
        working: Option<Volume<f32>>,
        thresholds: (f32, f32),
        bone: BinaryVolume,
    },
    BreakCandidates {
        working: Option<Volume<f32>>,
        thresholds: (f32, f32),
        bone: BinaryVolume,
        band: CorticalBand,
    },
    BreakFilter {
        working: Option<Volume<f32>>,
        thresholds: (f32, f32),
        band: CorticalBand,
        candidates: BinaryVolume,
    },
    BreakSeeds {
        working: Option<Volume<f32>>,
        thresholds: (f32, f32),
    },
    Erosions(Box<VoidVolumeDetector>),
}

/// Detection of cortical breaks and of the erosions beneath them.
///
/// Phase A segments the bone. Phase B looks for gaps that cross the
/// cortical band of the contour, places one seed per gap and runs a
/// [`VoidVolumeDetector`] from those seeds. Every stage is one step; the
/// eight steps of the embedded detector are steps of this pipeline too.
///
/// | variant | steps |
/// |---------|-------|
/// | [`CorticalBreakVariant::Peters`] | 13 |
/// | [`CorticalBreakVariant::Cbct`] | 14 |
pub struct CorticalBreakDetector {
    config: CorticalBreakConfig,
    variant: Box<dyn BreakVariant>,
    greyscale: Volume<f32>,
    bone_mask: Option<BinaryVolume>,
    contour: BinaryVolume,
    phase: Phase,
    thresholds: Option<(f32, f32)>,
    segmentation: Option<BinaryVolume>,
    breaks: Option<(LabelVolume, usize)>,
    seeds: Vec<VoxelIndex>,
}

impl CorticalBreakDetector {
    /// Create a detector.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the config is invalid, the contour
    /// cannot be aligned with the scan or the bone mask is not on the scan
    /// grid.
    pub fn new(
        inputs: CorticalBreakInputs,
        config: CorticalBreakConfig,
        variant: CorticalBreakVariant,
    ) -> Result<Self, DetectError> {
        config.validate()?;
        let CorticalBreakInputs {
            greyscale,
            bone_mask,
            contour,
        } = inputs;

        let contour = align_contour(&contour, greyscale.geometry())?;
        if let Some(mask) = &bone_mask {
            greyscale.check_same_space(mask)?;
        }

        log::info!(
            "cortical break detector ({variant}): {} volume, thickness {}, min break {} voxels",
            greyscale.size(),
            config.cortical_thickness,
            config.min_break_voxels()
        );

        let variant = variant.build();
        let phase = initial_phase(variant.as_ref());
        Ok(Self {
            config,
            variant,
            greyscale,
            bone_mask,
            contour,
            phase,
            thresholds: None,
            segmentation: None,
            breaks: None,
            seeds: Vec::new(),
        })
    }

    /// The algorithm variant.
    pub fn variant(&self) -> CorticalBreakVariant {
        self.variant.kind()
    }

    /// The configuration.
    pub fn config(&self) -> &CorticalBreakConfig {
        &self.config
    }

    /// The next stage to run.
    pub fn stage(&self) -> BreakStage {
        match &self.phase {
            Phase::NormalizeContrast => BreakStage::NormalizeContrast,
            Phase::Segment { .. } => BreakStage::Segment,
            Phase::CorticalBand { .. } => BreakStage::CorticalBand,
            Phase::BreakCandidates { .. } => BreakStage::BreakCandidates,
            Phase::BreakFilter { .. } => BreakStage::BreakFilter,
            Phase::BreakSeeds { .. } => BreakStage::BreakSeeds,
            Phase::Erosions(erosions) if erosions.is_complete() => BreakStage::Done,
            Phase::Erosions(erosions) => BreakStage::Erosion(erosions.step()),
        }
    }

    /// The bone thresholds used by phase A, once it has run.
    pub fn thresholds(&self) -> Option<(f32, f32)> {
        self.thresholds
    }

    /// The bone segmentation of phase A.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Incomplete`] until the segment stage has run.
    pub fn fetch_segmentation(&self) -> Result<&BinaryVolume, DetectError> {
        self.segmentation.as_ref().ok_or_else(|| self.incomplete())
    }

    /// The labeled breaks, largest first, and their number.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Incomplete`] until every step has run.
    pub fn fetch_labeled_breaks(&self) -> Result<(&LabelVolume, usize), DetectError> {
        match (&self.breaks, self.is_complete()) {
            (Some((labels, count)), true) => Ok((labels, *count)),
            _ => Err(self.incomplete()),
        }
    }

    /// The labeled erosions beneath the breaks.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Incomplete`] until every step has run.
    pub fn fetch_labeled_erosions(&self) -> Result<&LabelVolume, DetectError> {
        match &self.phase {
            Phase::Erosions(erosions) if erosions.is_complete() => erosions.fetch_labeled_erosions(),
            _ => Err(self.incomplete()),
        }
    }

    /// The seeds placed at the breaks, one per break in label order.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Incomplete`] until every step has run.
    pub fn fetch_seeds(&self) -> Result<&[VoxelIndex], DetectError> {
        if !self.is_complete() {
            return Err(self.incomplete());
        }
        Ok(&self.seeds)
    }

    fn incomplete(&self) -> DetectError {
        DetectError::Incomplete {
            step: self.current_step(),
            total: self.step_count(),
        }
    }

    fn reset(&mut self) {
        self.phase = initial_phase(self.variant.as_ref());
        self.thresholds = None;
        self.segmentation = None;
        self.breaks = None;
        self.seeds.clear();
    }

    fn advance(&mut self, phase: Phase) -> Result<Phase, ImgprocError> {
        let connectivity = self.config.connectivity;
        let next = match phase {
            Phase::NormalizeContrast => {
                let working = self.variant.prepare(&self.greyscale, &self.config)?;
                Phase::Segment { working }
            }
            Phase::Segment { working } => {
                let scan = working.as_ref().unwrap_or(&self.greyscale);
                let thresholds = match self.config.auto_threshold {
                    Some(method) => {
                        let lower = auto_threshold(scan, method, AUTO_THRESHOLD_BINS)?;
                        log::info!("{method:?} threshold: {lower}");
                        (lower, f32::INFINITY)
                    }
                    None => (self.config.lower_threshold, self.config.upper_threshold),
                };
                let sigma = self.config.sigma.unwrap_or(scan.spacing()[0]);
                let segmentation = preprocess_bone(
                    scan,
                    thresholds.0,
                    thresholds.1,
                    sigma,
                    self.config.min_bone_voxels,
                    connectivity,
                )?;
                log::debug!("segmentation: {} voxels", segmentation.count_nonzero());

                let bone = match &self.bone_mask {
                    Some(mask) => mask.map(|&v| u8::from(v != 0)),
                    None => segmentation.clone(),
                };
                self.thresholds = Some(thresholds);
                self.segmentation = Some(segmentation);
                Phase::CorticalBand {
                    working,
                    thresholds,
                    bone,
                }
            }
            Phase::CorticalBand {
                working,
                thresholds,
                bone,
            } => {
                let band = cortical_band(&self.contour, self.config.cortical_thickness)?;
                Phase::BreakCandidates {
                    working,
                    thresholds,
                    bone,
                    band,
                }
            }
            Phase::BreakCandidates {
                working,
                thresholds,
                bone,
                band,
            } => {
                let min_voxels = self.config.min_break_voxels();
                let candidates = break_candidates(&band, &bone, min_voxels, connectivity)?;
                log::debug!(
                    "break candidates (>= {min_voxels} voxels): {} voxels",
                    candidates.count_nonzero()
                );
                Phase::BreakFilter {
                    working,
                    thresholds,
                    band,
                    candidates,
                }
            }
            Phase::BreakFilter {
                working,
                thresholds,
                band,
                candidates,
            } => {
                let (labels, count) = filter_breaks(&candidates, &band, connectivity)?;
                log::info!("cortical break detector found {count} breaks");
                log::debug!("break sizes: {:?}", component_sizes(&labels));
                self.breaks = Some((labels, count));
                Phase::BreakSeeds {
                    working,
                    thresholds,
                }
            }
            Phase::BreakSeeds {
                working,
                thresholds,
            } => {
                self.seeds = match &self.breaks {
                    Some((labels, count)) => break_seeds(labels, *count),
                    None => Vec::new(),
                };
                for seed in &self.seeds {
                    log::debug!("break seed {seed}");
                }
                let greyscale = working.unwrap_or_else(|| self.greyscale.clone());
                let erosions = VoidVolumeDetector::from_aligned(
                    greyscale,
                    self.contour.clone(),
                    self.seeds.clone(),
                    self.config.erosion_config(thresholds.0, thresholds.1),
                );
                Phase::Erosions(Box::new(erosions))
            }
            erosions @ Phase::Erosions(_) => erosions,
        };
        Ok(next)
    }
}

impl fmt::Debug for CorticalBreakDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorticalBreakDetector")
            .field("variant", &self.variant.kind())
            .field("stage", &self.stage())
            .field("step", &self.current_step())
            .finish()
    }
}

impl StepPipeline for CorticalBreakDetector {
    fn step_count(&self) -> usize {
        self.variant.preparation_steps() + 5 + VoidVolumeStep::COUNT
    }

    fn current_step(&self) -> usize {
        let prepared = self.variant.preparation_steps();
        match &self.phase {
            Phase::NormalizeContrast => 0,
            Phase::Segment { .. } => prepared,
            Phase::CorticalBand { .. } => prepared + 1,
            Phase::BreakCandidates { .. } => prepared + 2,
            Phase::BreakFilter { .. } => prepared + 3,
            Phase::BreakSeeds { .. } => prepared + 4,
            Phase::Erosions(erosions) => prepared + 5 + erosions.current_step(),
        }
    }

    fn execute_next_step(&mut self) -> Result<bool, DetectError> {
        if self.is_complete() {
            return Ok(false);
        }

        let step = self.current_step() + 1;
        let stage = self.stage();
        log::debug!("cortical break step {step}: {stage}");

        let result = if let Phase::Erosions(erosions) = &mut self.phase {
            erosions.execute_next_step().map(|_| ()).map_err(|err| match err {
                DetectError::Execution { source, .. } => DetectError::Execution { step, source },
                other => other,
            })
        } else {
            let phase = std::mem::replace(&mut self.phase, Phase::NormalizeContrast);
            match self.advance(phase) {
                Ok(next) => {
                    self.phase = next;
                    Ok(())
                }
                Err(source) => Err(DetectError::Execution { step, source }),
            }
        };

        match result {
            Ok(()) => {
                if self.is_complete() {
                    log::info!("cortical break detector done after {step} steps");
                }
                Ok(true)
            }
            Err(err) => {
                log::warn!("cortical break step {stage} failed, pipeline reset: {err}");
                self.reset();
                Err(err)
            }
        }
    }
}

fn initial_phase(variant: &dyn BreakVariant) -> Phase {
    if variant.preparation_steps() > 0 {
        Phase::NormalizeContrast
    } else {
        Phase::Segment { working: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bonevoid_imgproc::threshold::AutoThresholdMethod;
    use bonevoid_volume::VolumeGeometry;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // a solid slab of bone filling the contour, no breaks
    fn slab_inputs() -> CorticalBreakInputs {
        let geometry = VolumeGeometry::new([16, 16, 16]);
        let contour = Volume::from_fn(geometry, |i| u8::from((3..13).contains(&i.z)));
        let greyscale = contour.map(|&v| if v == 1 { 1200.0 } else { 0.0 });
        CorticalBreakInputs {
            greyscale,
            bone_mask: None,
            contour,
        }
    }

    fn config() -> CorticalBreakConfig {
        CorticalBreakConfig {
            lower_threshold: 500.0,
            upper_threshold: 9999.0,
            sigma: Some(0.5),
            cortical_thickness: 2,
            minimal_radius: 1,
            min_bone_voxels: 10,
            min_erosion_voxels: 1,
            ..Default::default()
        }
    }

    #[test]
    fn peters_stage_order() -> Result<(), DetectError> {
        init_logger();
        let mut detector =
            CorticalBreakDetector::new(slab_inputs(), config(), CorticalBreakVariant::Peters)?;
        assert_eq!(detector.step_count(), 13);
        assert_eq!(detector.variant(), CorticalBreakVariant::Peters);

        let mut stages = vec![detector.stage()];
        while detector.execute_next_step()? {
            stages.push(detector.stage());
        }
        assert_eq!(stages.len(), 14);
        assert_eq!(stages[0], BreakStage::Segment);
        assert_eq!(stages[4], BreakStage::BreakSeeds);
        assert_eq!(stages[5], BreakStage::Erosion(VoidVolumeStep::Preprocess));
        assert_eq!(stages[12], BreakStage::Erosion(VoidVolumeStep::Label));
        assert_eq!(stages[13], BreakStage::Done);

        let (_, num_breaks) = detector.fetch_labeled_breaks()?;
        assert_eq!(num_breaks, 0);
        assert!(detector.fetch_seeds()?.is_empty());
        assert_eq!(detector.fetch_labeled_erosions()?.count_nonzero(), 0);
        assert_eq!(detector.thresholds(), Some((500.0, 9999.0)));

        assert!(!detector.execute_next_step()?);
        assert_eq!(detector.current_step(), 13);
        Ok(())
    }

    #[test]
    fn cbct_adds_contrast_stage() -> Result<(), DetectError> {
        let detector =
            CorticalBreakDetector::new(slab_inputs(), config(), CorticalBreakVariant::Cbct)?;
        assert_eq!(detector.step_count(), 14);
        assert_eq!(detector.stage(), BreakStage::NormalizeContrast);
        Ok(())
    }

    #[test]
    fn fetchers_wait_for_completion() -> Result<(), DetectError> {
        let mut detector =
            CorticalBreakDetector::new(slab_inputs(), config(), CorticalBreakVariant::Peters)?;
        assert!(matches!(
            detector.fetch_segmentation(),
            Err(DetectError::Incomplete { step: 0, total: 13 })
        ));

        detector.execute_next_step()?;
        assert_eq!(detector.fetch_segmentation()?.count_nonzero(), 16 * 16 * 10);
        assert!(detector.fetch_labeled_breaks().is_err());
        assert!(detector.fetch_seeds().is_err());
        assert!(matches!(
            detector.fetch_labeled_erosions(),
            Err(DetectError::Incomplete { step: 1, total: 13 })
        ));
        Ok(())
    }

    #[test]
    fn cbct_thresholds_apply_to_normalized_scan() -> Result<(), DetectError> {
        // raw scanner units far above the normalized range
        let mut inputs = slab_inputs();
        inputs.greyscale = inputs.contour.map(|&v| if v == 1 { 20000.0 } else { 0.0 });

        let mut detector =
            CorticalBreakDetector::new(inputs.clone(), config(), CorticalBreakVariant::Cbct)?;
        detector.execute_next_step()?;
        detector.execute_next_step()?;
        assert_eq!(detector.fetch_segmentation()?.count_nonzero(), 16 * 16 * 10);

        let raw = CorticalBreakConfig {
            lower_threshold: 15000.0,
            upper_threshold: 30000.0,
            ..config()
        };
        let mut detector = CorticalBreakDetector::new(inputs, raw, CorticalBreakVariant::Cbct)?;
        detector.execute_next_step()?;
        detector.execute_next_step()?;
        assert_eq!(detector.fetch_segmentation()?.count_nonzero(), 0);
        Ok(())
    }

    #[test]
    fn auto_threshold_is_open_ended() -> Result<(), DetectError> {
        let config = CorticalBreakConfig {
            auto_threshold: Some(AutoThresholdMethod::Otsu),
            ..config()
        };
        let mut detector =
            CorticalBreakDetector::new(slab_inputs(), config, CorticalBreakVariant::Peters)?;
        detector.execute_next_step()?;

        let (lower, upper) = detector.thresholds().ok_or(DetectError::Incomplete {
            step: detector.current_step(),
            total: detector.step_count(),
        })?;
        assert!(lower > 0.0 && lower <= 1200.0);
        assert_eq!(upper, f32::INFINITY);
        assert!(detector.fetch_segmentation()?.count_nonzero() >= 16 * 16 * 10);
        Ok(())
    }

    #[test]
    fn bone_mask_on_other_grid_is_rejected() {
        let mut inputs = slab_inputs();
        inputs.bone_mask = Some(Volume::from_geometry_val(VolumeGeometry::new([8, 8, 8]), 1));
        let err = CorticalBreakDetector::new(inputs, config(), CorticalBreakVariant::Peters)
            .unwrap_err();
        assert!(err.is_configuration_error());
    }

    fn assert_reset(detector: &CorticalBreakDetector) {
        assert_eq!(detector.current_step(), 0);
        assert_eq!(detector.stage(), BreakStage::Segment);
        assert_eq!(detector.thresholds(), None);
        assert!(matches!(
            detector.fetch_segmentation(),
            Err(DetectError::Incomplete { step: 0, total: 13 })
        ));
        assert!(detector.fetch_labeled_breaks().is_err());
        assert!(detector.fetch_seeds().is_err());
        assert!(detector.fetch_labeled_erosions().is_err());
    }

    #[test]
    fn failed_band_step_resets_pipeline() -> Result<(), DetectError> {
        init_logger();
        let mut detector =
            CorticalBreakDetector::new(slab_inputs(), config(), CorticalBreakVariant::Peters)?;
        detector.contour = Volume::from_geometry_val(VolumeGeometry::new([8, 8, 8]), 1u8);

        assert!(detector.execute_next_step()?);
        assert!(detector.execute_next_step()?);
        assert_eq!(detector.stage(), BreakStage::BreakCandidates);

        let err = detector.execute_next_step().unwrap_err();
        assert!(
            matches!(
                err,
                DetectError::Execution {
                    step: 3,
                    source: ImgprocError::Volume(_),
                }
            ),
            "unexpected error {err:?}"
        );
        assert_reset(&detector);
        Ok(())
    }

    #[test]
    fn failed_erosion_step_resets_pipeline() -> Result<(), DetectError> {
        init_logger();
        let mut detector =
            CorticalBreakDetector::new(slab_inputs(), config(), CorticalBreakVariant::Peters)?;
        for _ in 0..5 {
            assert!(detector.execute_next_step()?);
        }
        assert_eq!(detector.stage(), BreakStage::Erosion(VoidVolumeStep::Preprocess));

        // swap in an erosion pass whose contour is on another grid
        let contour = Volume::from_geometry_val(VolumeGeometry::new([8, 8, 8]), 1u8);
        let erosion_config = detector.config.erosion_config(500.0, 9999.0);
        match &mut detector.phase {
            Phase::Erosions(erosions) => {
                **erosions = VoidVolumeDetector::from_aligned(
                    detector.greyscale.clone(),
                    contour,
                    Vec::new(),
                    erosion_config,
                );
            }
            _ => panic!("erosion pass not set up"),
        }

        assert!(detector.execute_next_step()?);
        assert_eq!(detector.current_step(), 6);

        let err = detector.execute_next_step().unwrap_err();
        assert!(
            matches!(
                err,
                DetectError::Execution {
                    step: 7,
                    source: ImgprocError::Volume(_),
                }
            ),
            "unexpected error {err:?}"
        );
        assert_reset(&detector);

        // the pipeline runs again from phase A
        assert!(detector.execute_next_step()?);
        assert!(detector.fetch_segmentation().is_ok());
        Ok(())
    }

    #[test]
    fn unsegmented_band_is_all_breaks() -> Result<(), DetectError> {
        init_logger();
        // a scan without finite values stretches to a constant, so phase A
        // finds no bone and both halves of the band are gaps
        let mut inputs = slab_inputs();
        inputs.greyscale = Volume::from_geometry_val(*inputs.greyscale.geometry(), f32::NAN);
        let mut detector = CorticalBreakDetector::new(inputs, config(), CorticalBreakVariant::Cbct)?;
        while detector.execute_next_step()? {}

        assert_eq!(detector.current_step(), 14);
        assert_eq!(detector.fetch_segmentation()?.count_nonzero(), 0);
        let (breaks, num_breaks) = detector.fetch_labeled_breaks()?;
        assert_eq!(num_breaks, 2);
        assert_eq!(breaks.count_nonzero(), 4 * 16 * 16);
        assert_eq!(
            detector.fetch_seeds()?,
            &[VoxelIndex::new(7, 7, 3), VoxelIndex::new(7, 7, 11)]
        );
        Ok(())
    }
}
