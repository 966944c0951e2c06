mod config;

use std::{fs::File, io::BufReader, path::PathBuf};

use anyhow::{Context, Result};
use cache_sim::{
    cache::{CacheStat, Geometry},
    sim::{Simulator, Timing},
};
use clap::{Args, Parser};
use serde::Serialize;

use config::{FileConfig, SimConfig};

#[cfg(feature = "stat")]
use terminal_size::terminal_size;

/// Set-associative cache simulator (LRU)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    geometry: GeometryArgs,
    /// File path to memory access trace
    #[arg(short, long)]
    trace: PathBuf,
    /// Hit time in cycles [default: 1]
    #[arg(long)]
    hit_time: Option<f64>,
    /// Miss penalty in cycles [default: 50]
    #[arg(long)]
    miss_penalty: Option<f64>,
    /// File path to JSON config (command line flags take precedence)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug, Default)]
struct GeometryArgs {
    /// Cache size in KiB
    #[arg(long, required_unless_present = "config")]
    cache_kb: Option<u64>,
    /// Block size in bytes
    #[arg(long, required_unless_present = "config")]
    block: Option<u64>,
    /// Ways per set (0 = fully associative)
    #[arg(long, required_unless_present = "config")]
    assoc: Option<u64>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::init();
    }

    let file_config = match &args.config {
        Some(p) => {
            let file = File::open(p).with_context(|| format!("failed to open {}", p.display()))?;
            let c = FileConfig::deser(file)
                .with_context(|| format!("failed to parse config {}", p.display()))?;
            log::info!("loaded config from {}.", p.display());
            Some(c)
        }
        None => None,
    };
    let config = SimConfig::merge(&args, file_config)?;

    let geometry = Geometry::new(config.cache_kb, config.block, config.assoc)?;
    let mut sim = Simulator::new(geometry)?;

    let trace = &args.trace;
    let file = File::open(trace).with_context(|| format!("failed to open {}", trace.display()))?;
    sim.run(BufReader::new(file))
        .with_context(|| format!("failed to simulate {}", trace.display()))?;

    if args.json {
        output_json(&sim, config.timing)
    } else {
        output_stat(&sim, config.timing);
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonReport {
    #[serde(flatten)]
    cache: CacheStat,
    amat: f64,
    #[serde(flatten)]
    timing: Timing,
}

fn output_json(sim: &Simulator, timing: Timing) -> Result<()> {
    let cache = sim.cache_stat();
    let report = JsonReport {
        cache,
        amat: timing.amat(cache.miss_rate),
        timing,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(not(feature = "stat"))]
fn output_stat(sim: &Simulator, timing: Timing) {
    let s = sim.cache_stat();
    println!(
        "accesses: {}, hits: {}, misses: {}, AMAT: {:.2} cycles",
        s.accesses,
        s.hits,
        s.misses,
        timing.amat(s.miss_rate)
    );
}

#[cfg(feature = "stat")]
fn output_stat(sim: &Simulator, timing: Timing) {
    let max_width = get_terminal_width().unwrap_or(120) as usize;
    println!("{}", sim.collect_stat(timing).view(max_width));
}

#[cfg(feature = "stat")]
fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0.saturating_sub(20))
}
