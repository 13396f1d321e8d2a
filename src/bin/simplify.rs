//! Quadric-error mesh simplifier.
//!
//! Loads an `.obj`, `.tri9`, or `.tri10` mesh, decimates it toward a
//! target triangle ratio with optional spatial weighting or bound
//! regions, and writes the result in the format named by the output
//! extension.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn, LevelFilter};
use nalgebra::Point3;

use decimesh::exchange::{load_mesh_file, save_mesh_file, DEFAULT_PROGRESS_LINES};
use decimesh::kernel::Kernel;
use decimesh::region::{load_region_spec, parse_coord, parse_ratio_pair};
use decimesh::simplify::{SimplifyOptions, WeightingMode};

#[derive(Parser, Debug)]
#[command(name = "simplify")]
#[command(about = "Simplify a triangular mesh with quadric error metrics", long_about = None)]
struct Args {
    /// Total ratio of the target's triangle count to the source's
    #[arg(short = 't', default_value_t = 0.5)]
    target_ratio: f64,

    /// Reduce INSIDE the -c/-r region to ratio arg1 and the OUTSIDE to
    /// arg2, e.g. "0.8,0.1"; overrides -t
    #[arg(short = 'T', value_name = "IN,OUT", allow_hyphen_values = true)]
    region_ratios: Option<String>,

    /// Aggressiveness; higher is faster, lower decimates more carefully
    #[arg(short = 'a', default_value_t = 7.0)]
    aggressiveness: f64,

    /// Weighting function for a spatially non-uniform reduction:
    /// square | triangular | gaussian
    #[arg(short = 'f', value_name = "NAME")]
    function: Option<String>,

    /// Comma-separated center of the weighting function; quote values
    /// with spaces, e.g. "(-1, 0, 100)"
    #[arg(short = 'c', default_value = "0,0,0", allow_hyphen_values = true)]
    center: String,

    /// Radius or boundary of the weighting function
    #[arg(short = 'r', default_value_t = 1.0)]
    radius: f64,

    /// Per-function scale; gaussian attenuates by 1/scale at the radius,
    /// square retains the region by scale (-1 to 1)
    #[arg(short = 's', default_value_t = 1.0, allow_hyphen_values = true)]
    scale: f64,

    /// Power the weighting function is raised to
    #[arg(short = 'p', default_value_t = 1.0)]
    power: f64,

    /// Use the negative form of the weighting function
    #[arg(short = 'n')]
    negate: bool,

    /// Be verbose
    #[arg(short = 'v')]
    verbose: bool,

    /// Be verbose with loader progress every N lines
    #[arg(short = 'V', value_name = "N")]
    progress_lines: Option<usize>,

    /// Stop after N consecutive iterations without a deletion
    #[arg(short = 'b', default_value_t = 1000, value_name = "N")]
    stall_limit: usize,

    /// Load per-region weighting and targets from a file, one region
    /// per line of flag/value pairs
    #[arg(short = 'L', value_name = "FILE")]
    region_file: Option<PathBuf>,

    input: PathBuf,
    output: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let verbose = args.verbose || args.progress_lines.is_some();
    env_logger::Builder::from_default_env()
        .filter_level(if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .format_timestamp(None)
        .init();

    let progress_lines = match args.progress_lines {
        Some(0) => {
            warn!("-V needs a positive argument, using default: {}", DEFAULT_PROGRESS_LINES);
            DEFAULT_PROGRESS_LINES
        }
        Some(n) => n,
        None => DEFAULT_PROGRESS_LINES,
    };

    // ratio validation mirrors the engine's (0, 1] domain
    let mut target_ratio = args.target_ratio;
    if target_ratio <= 0.0 {
        bail!("Ratio must be between zero and one.");
    }
    if target_ratio > 1.0 {
        target_ratio = 1.0;
    }

    let kernel = match args.function.as_deref() {
        Some(name) => match Kernel::from_name(name) {
            Some(kernel) => kernel,
            None => {
                warn!("unknown function `{}`, using the uniform threshold", name);
                Kernel::Constant
            }
        },
        None => Kernel::Constant,
    };
    if kernel == Kernel::Gaussian && args.scale <= 1.0 {
        warn!(
            "cannot use scale = {} for gaussian, will use default = 2",
            args.scale
        );
    }

    let center: Point3<f64> = parse_coord(&args.center)?;

    // -T switches to the single bound region; -L to multiple centers
    let mut mode = WeightingMode::Uniform;
    if let Some(raw) = &args.region_ratios {
        let (mut region_ratio, mut outside_ratio) = parse_ratio_pair(raw)?;
        if region_ratio > 1.0 || region_ratio <= 0.0 {
            warn!("region ratio out of range, using default: 0.5");
            region_ratio = 0.5;
        }
        if outside_ratio > 1.0 || outside_ratio <= 0.0 {
            warn!("outside ratio out of range, using default: 0.5");
            outside_ratio = 0.5;
        }
        target_ratio = region_ratio.min(outside_ratio);
        mode = WeightingMode::BoundRegion {
            region_ratio,
            outside_ratio,
        };
    }
    if let Some(path) = &args.region_file {
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read region spec `{}`", path.display()))?;
        let regions = load_region_spec(&text)?;
        if regions.is_empty() {
            bail!("no regions found in `{}`", path.display());
        }
        mode = WeightingMode::MultiCenter(regions);
    }

    let load_start = Instant::now();
    let mesh = load_mesh_file(&args.input, progress_lines)?;
    info!("File loaded in {:.4} sec", load_start.elapsed().as_secs_f64());

    let target_count = (mesh.faces.len() as f64 * target_ratio).round() as usize;
    if target_count < 4 {
        bail!("Object will not survive such extreme decimation");
    }
    info!(
        "Input: {} vertices, {} triangles (target {})",
        mesh.vertices.len(),
        mesh.faces.len(),
        target_count
    );

    let options = SimplifyOptions {
        target_count,
        aggressiveness: args.aggressiveness,
        kernel,
        center,
        radius: args.radius,
        scale: args.scale,
        power: args.power,
        negate: args.negate,
        mode,
        stall_limit: args.stall_limit,
    };

    let start = Instant::now();
    let simplified = mesh.simplify(&options)?;
    if simplified.faces.len() >= mesh.faces.len() {
        bail!("Unable to reduce mesh.");
    }

    save_mesh_file(&simplified, &args.output)?;
    info!(
        "Output: {} vertices, {} triangles ({:.6} reduction; {:.4} sec)",
        simplified.vertices.len(),
        simplified.faces.len(),
        simplified.faces.len() as f64 / mesh.faces.len() as f64,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
