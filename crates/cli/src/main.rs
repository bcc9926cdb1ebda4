//! Multiprocessor cache simulator CLI.
//!
//! This binary runs one trace through the simulator and prints the
//! statistics report. It performs:
//! 1. **Argument parsing:** trace path, optional verbosity, optional JSON
//!    configuration override.
//! 2. **Subscriber setup:** verbose runs stream per-event logs (grants,
//!    snoops, directory transitions) to stderr.
//! 3. **Run:** build the simulator, run to completion, print statistics.

use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process;

use mcsim_core::{Config, Simulator, Trace};

#[derive(Parser, Debug)]
#[command(
    name = "mcsim",
    version,
    about = "Cycle-based multiprocessor cache hierarchy simulator (MOESI)",
    long_about = "Runs a per-processor memory-access trace against N private \
set-associative caches kept coherent over a shared snooping bus, and reports \
hit/miss and coherence-traffic statistics.\n\nExamples:\n  mcsim traces/fft.trace\n  mcsim traces/fft.trace 0\n  mcsim traces/fft.trace --config cache.json"
)]
struct Cli {
    /// Path to the memory-access trace file.
    trace: PathBuf,

    /// Verbosity: 0 silent, nonzero verbose. Default verbose.
    verbose: Option<u32>,

    /// JSON file overriding the default cache geometry and timing.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let verbose = cli.verbose.is_none_or(|flag| flag != 0);
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(&cli) {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            serde_json::from_str::<Config>(&text)?
        }
        None => Config::default(),
    };

    let trace = Trace::from_file(&cli.trace)?;
    let mut sim = Simulator::new(config, trace)?;

    println!("executing with {} cpus", sim.num_cpus());
    sim.run()?;
    println!("simulation finished at cycle {}", sim.now());

    sim.stats().print();
    Ok(())
}
