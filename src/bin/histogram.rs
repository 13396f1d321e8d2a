//! Print an ASCII histogram of a mesh's edge lengths, a quick way to
//! judge how far a simplification pass has coarsened a model.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use itertools::Itertools;
use log::LevelFilter;

use decimesh::exchange::{load_mesh_file, DEFAULT_PROGRESS_LINES};

#[derive(Parser, Debug)]
#[command(name = "histogram")]
#[command(about = "Edge-length histogram of a triangular mesh", long_about = None)]
struct Args {
    /// Number of bins
    #[arg(short = 'b', default_value_t = 100)]
    bins: usize,

    /// Maximum bar height in characters
    #[arg(short = 'c', default_value_t = 200)]
    max_height: usize,

    /// Be verbose
    #[arg(short = 'v')]
    verbose: bool,

    input: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .format_timestamp(None)
        .init();

    if args.bins == 0 {
        bail!("-b needs a positive number of bins");
    }

    let mesh = load_mesh_file(&args.input, DEFAULT_PROGRESS_LINES)?;
    let lengths: Vec<f64> = mesh
        .edges()
        .iter()
        .map(|&[a, b]| (mesh.vertices[a] - mesh.vertices[b]).norm())
        .collect();
    println!("Lengths vector size = {}", lengths.len());

    let (min, max) = match lengths.iter().minmax().into_option() {
        Some((min, max)) => (*min, *max),
        None => bail!("mesh has no edges"),
    };
    let span = (max - min).max(f64::EPSILON);

    let mut frequency = vec![0usize; args.bins];
    for length in lengths.iter() {
        let bin = (((length - min) / span) * args.bins as f64) as usize;
        frequency[bin.min(args.bins - 1)] += 1;
    }

    // scale the tallest bin down to the requested height
    let tallest = frequency.iter().copied().max().unwrap_or(0).max(1);
    for (i, count) in frequency.iter().enumerate() {
        let low = min + span * i as f64 / args.bins as f64;
        let high = min + span * (i + 1) as f64 / args.bins as f64;
        let bar = (count * args.max_height).div_ceil(tallest);
        println!(
            "{:>12.6} - {:>12.6} | {:>8} {}",
            low,
            high,
            count,
            "#".repeat(bar)
        );
    }

    Ok(())
}
