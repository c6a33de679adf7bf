use argh::FromArgs;
use std::ops::ControlFlow;
use std::path::PathBuf;

use bonevoid::detect::{
    run_to_completion, CorticalBreakConfig, CorticalBreakDetector, CorticalBreakInputs,
    CorticalBreakVariant, StepPipeline, VoidVolumeConfig, VoidVolumeDetector,
};
use bonevoid::volume::{BinaryVolume, Volume, VolumeGeometry, VoxelIndex};

#[derive(FromArgs)]
/// Detect the erosion and the cortical break of a synthetic bone phantom
struct Args {
    /// edge length of the volume in voxels
    #[argh(option, default = "64")]
    size: usize,

    /// outer radius of the bone
    #[argh(option, default = "24.0")]
    bone_radius: f64,

    /// thickness of the cortical shell
    #[argh(option, default = "5.0")]
    cortex: f64,

    /// radius of the void at the center of the bone
    #[argh(option, default = "5.0")]
    void_radius: f64,

    /// width of the gap cut through the +x side of the cortex, 0 for none
    #[argh(option, default = "6")]
    gap_width: usize,

    /// cortical break variant: peters, cbct or auto
    #[argh(option, default = "String::from(\"auto\")")]
    variant: String,

    /// path to a JSON void volume configuration
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// stop after this many steps of each detector
    #[argh(option)]
    max_steps: Option<usize>,
}

struct Phantom {
    greyscale: Volume<f32>,
    contour: BinaryVolume,
    cortex: BinaryVolume,
    center: VoxelIndex,
}

fn build_phantom(args: &Args) -> Phantom {
    let geometry = VolumeGeometry::new([args.size; 3]);
    let c = args.size / 2;
    let center = VoxelIndex::new(c, c, c);
    let half_gap = args.gap_width / 2;

    let radius = |i: VoxelIndex| {
        [i.x, i.y, i.z]
            .iter()
            .map(|&v| (v as f64 - c as f64).powi(2))
            .sum::<f64>()
            .sqrt()
    };
    let in_gap = |i: VoxelIndex| {
        let near = |v: usize| v + half_gap >= c && v < c + args.gap_width - half_gap;
        args.gap_width > 0 && i.x > c && near(i.y) && near(i.z)
    };

    let contour = Volume::from_fn(geometry, |i| u8::from(radius(i) <= args.bone_radius));
    let cortex = Volume::from_fn(geometry, |i| {
        let r = radius(i);
        u8::from(r > args.bone_radius - args.cortex && r <= args.bone_radius && !in_gap(i))
    });

    // trabecular bone fills the marrow except the void
    let greyscale = Volume::from_fn(geometry, |i| {
        let r = radius(i);
        if cortex.get(i) == Some(&1) {
            1200.0
        } else if r <= args.bone_radius - args.cortex && r > args.void_radius {
            900.0
        } else {
            0.0
        }
    });

    Phantom {
        greyscale,
        contour,
        cortex,
        center,
    }
}

fn run<P: StepPipeline>(
    name: &str,
    detector: &mut P,
    max_steps: Option<usize>,
) -> Result<bool, Box<dyn std::error::Error>> {
    let completed = run_to_completion(detector, |step, total| {
        log::info!("{name}: step {step}/{total} ({:.0}%)", 100.0 * step as f32 / total as f32);
        match max_steps {
            Some(max) if step >= max => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    })?;
    Ok(completed)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let phantom = build_phantom(&args);
    log::info!(
        "phantom: {} voxels of bone, void radius {}",
        phantom.greyscale.as_slice().iter().filter(|&&v| v > 0.0).count(),
        args.void_radius
    );

    let void_config = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => VoidVolumeConfig {
            lower_threshold: 600.0,
            upper_threshold: 9999.0,
            sigma: Some(0.5),
            minimal_radius: 2,
            morphological_radius: 2,
            min_erosion_voxels: 50,
            ..Default::default()
        },
    };

    let mut erosions = VoidVolumeDetector::new(
        phantom.greyscale.clone(),
        &phantom.contour,
        vec![phantom.center],
        void_config,
    )?;
    if run("void volume", &mut erosions, args.max_steps)? {
        let labels = erosions.fetch_labeled_erosions()?;
        log::info!(
            "void volume: {} erosions, {} voxels",
            erosions.num_erosions()?,
            labels.count_nonzero()
        );
    }

    let variant = match args.variant.as_str() {
        "peters" => CorticalBreakVariant::Peters,
        "cbct" => CorticalBreakVariant::Cbct,
        "auto" => CorticalBreakVariant::for_scan(&phantom.greyscale),
        other => return Err(format!("unknown variant {other}").into()),
    };

    // the bone threshold also holds after contrast normalization onto [0, 1000]
    let break_config = CorticalBreakConfig {
        lower_threshold: 600.0,
        upper_threshold: 9999.0,
        sigma: Some(0.5),
        cortical_thickness: args.cortex.floor().max(1.0) as usize,
        minimal_radius: 2,
        min_erosion_voxels: 50,
        ..Default::default()
    };

    let inputs = CorticalBreakInputs {
        greyscale: phantom.greyscale,
        bone_mask: Some(phantom.cortex),
        contour: phantom.contour,
    };
    let mut breaks = CorticalBreakDetector::new(inputs, break_config, variant)?;
    if run("cortical break", &mut breaks, args.max_steps)? {
        let (_, num_breaks) = breaks.fetch_labeled_breaks()?;
        log::info!("cortical break ({variant}): {num_breaks} breaks");
        for seed in breaks.fetch_seeds()? {
            log::info!("break seed at {seed}");
        }
        log::info!(
            "cortical break: {} voxels eroded beneath the breaks",
            breaks.fetch_labeled_erosions()?.count_nonzero()
        );
    }

    Ok(())
}
