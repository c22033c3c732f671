//! borough-bench: CLI tool for growth parameter experimentation and diagnostics.
//!
//! Grows a city from a topology graph read from a JSON file with
//! configurable parameters, printing detailed per-stage diagnostics.
//! Useful for:
//!
//! - Tuning connectivity, road length and snap size
//! - Seeing which stage dominates on a given topology
//! - Checking how often the growth cap is hit and loose ends stay open
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin borough-bench -- [OPTIONS] <TOPOLOGY_JSON>
//! ```
//!
//! The topology file holds a `TopologyGraph`:
//!
//! ```text
//! {"vertices": [{"x": 0, "y": 0}, {"x": 200, "y": 0}, ...], "edges": [[0, 1], ...]}
//! ```
//!
//! Set `RUST_LOG=debug` for per-region growth logs.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use borough_network::diagnostics::{Clock, GenerationDiagnostics};
use borough_network::{NetworkConfig, TopologyGraph};
use clap::Parser;
use log::info;

/// Growth parameter experimentation and diagnostics for borough.
///
/// Grows a city inside the regions of a topology graph with configurable
/// parameters, then prints what each stage did and how long it took.
#[derive(Parser)]
#[command(name = "borough-bench", version)]
struct Cli {
    /// Path to the topology graph (JSON).
    topology_json: PathBuf,

    /// Random seed.
    #[arg(long, default_value_t = NetworkConfig::DEFAULT_SEED)]
    seed: u64,

    /// Evenly spaced directions around each growth node.
    #[arg(long, default_value_t = NetworkConfig::DEFAULT_ROADS_FROM_POINT)]
    roads_from_point: usize,

    /// Probability that an eligible snap is taken (0.0-1.0).
    #[arg(long, default_value_t = NetworkConfig::DEFAULT_CONNECTIVITY)]
    connectivity: f64,

    /// Nominal secondary road length.
    #[arg(long, default_value_t = NetworkConfig::DEFAULT_ROAD_SEGMENT_LENGTH)]
    road_segment_length: f64,

    /// Snap radius.
    #[arg(long, default_value_t = NetworkConfig::DEFAULT_SNAP_SIZE)]
    snap_size: f64,

    /// Seed roads per region.
    #[arg(long, default_value_t = NetworkConfig::DEFAULT_MAX_START_POINTS_PER_CELL)]
    max_start_points: usize,

    /// Full network config as a JSON string.
    ///
    /// When provided, all other parameter flags are ignored. Missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Repeat generation this many times and summarize timings.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Print each run's diagnostics as JSON rather than a table.
    #[arg(long)]
    json: bool,

    /// Write the generated city (first run) as JSON to this file.
    #[arg(long)]
    dump: Option<PathBuf>,
}

/// Build a [`NetworkConfig`] from CLI arguments.
///
/// `--config-json` wins over the individual flags when both are given.
fn config_from_cli(cli: &Cli) -> Result<NetworkConfig, String> {
    if let Some(json) = cli.config_json.as_deref() {
        return serde_json::from_str(json).map_err(|e| format!("invalid --config-json: {e}"));
    }

    Ok(NetworkConfig {
        seed: cli.seed,
        roads_from_point: cli.roads_from_point,
        connectivity: cli.connectivity,
        road_segment_length: cli.road_segment_length,
        snap_size: cli.snap_size,
        max_start_points_per_cell: cli.max_start_points,
        ..NetworkConfig::default()
    })
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let topology_text = match std::fs::read_to_string(&cli.topology_json) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.topology_json.display());
            return ExitCode::FAILURE;
        }
    };
    let topology: TopologyGraph = match serde_json::from_str(&topology_text) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error parsing {}: {e}", cli.topology_json.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Topology: {} ({} vertices, {} edges)",
        cli.topology_json.display(),
        topology.vertices.len(),
        topology.edges.len(),
    );
    eprintln!("Runs: {}  |  Seed: {}", cli.runs, config.seed);
    eprintln!("{config:#?}");
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("[run {} of {}]", run + 1, cli.runs);
        }

        match borough_network::generate_with_diagnostics(&topology, &config, &StdClock) {
            Ok((city, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("could not serialize diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Dump the city on the first run only.
                if run == 0
                    && let Some(ref dump_path) = cli.dump
                {
                    let written = serde_json::to_string(&city)
                        .map_err(|e| e.to_string())
                        .and_then(|json| {
                            std::fs::write(dump_path, &json)
                                .map(|()| json.len())
                                .map_err(|e| e.to_string())
                        });
                    match written {
                        Ok(len) => {
                            info!("city written to {} ({len} bytes)", dump_path.display());
                            eprintln!("City written to {} ({len} bytes)", dump_path.display());
                        }
                        Err(e) => {
                            eprintln!("Error writing city to {}: {e}", dump_path.display());
                        }
                    }
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Generation error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Wall-clock [`Clock`] for the bench; the library itself never reads time.
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Pulls one stage's duration out of a run, `None` if the stage did not run.
type StageExtractor = fn(&GenerationDiagnostics) -> Option<Duration>;

/// `(min, mean, max)` of a non-empty sample, or `None` if it is empty.
#[allow(clippy::cast_precision_loss)]
fn spread(values: &[f64]) -> Option<(f64, f64, f64)> {
    let (&first, rest) = values.split_first()?;
    let (lo, hi, sum) = rest
        .iter()
        .fold((first, first, first), |(lo, hi, sum), &v| (lo.min(v), hi.max(v), sum + v));
    Some((lo, sum / values.len() as f64, hi))
}

/// Print timing spread per stage and the shape of the generated city
/// across all runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[GenerationDiagnostics]) {
    println!();
    println!("Across {} runs\n{}", all_diagnostics.len(), "=".repeat(60));

    let totals: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();
    let Some((lo, mean, hi)) = spread(&totals) else {
        println!("(no runs)");
        return;
    };
    println!("Total: {lo:.3} / {mean:.3} / {hi:.3} ms (min / mean / max)");

    println!();
    println!("{:<24} {:>10} {:>10} {:>10}", "Stage", "min ms", "mean ms", "max ms");
    println!("{}", "-".repeat(57));

    let extractors: &[(&str, StageExtractor)] = &[
        ("Topology Sampling", |d| {
            d.topology_sampling.as_ref().map(|s| s.duration)
        }),
        ("Validation", |d| Some(d.validation.duration)),
        ("Decomposition", |d| Some(d.decomposition.duration)),
        ("Growth", |d| Some(d.growth.duration)),
        ("Merge", |d| Some(d.merge.duration)),
        ("Block Extraction", |d| Some(d.block_extraction.duration)),
    ];
    for (name, extract) in extractors {
        let samples: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(extract)
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();
        if let Some((lo, mean, hi)) = spread(&samples) {
            println!("{name:<24} {lo:>10.3} {mean:>10.3} {hi:>10.3}");
        }
    }

    // Same seed means the same city every run; these only vary when
    // --config-json or the library changes between builds.
    let runs = all_diagnostics.len() as f64;
    let mean_of = |f: fn(&GenerationDiagnostics) -> usize| {
        all_diagnostics.iter().map(f).sum::<usize>() as f64 / runs
    };
    println!();
    println!(
        "Mean city: {:.1} edges, {:.1} blocks, {:.1} open loose ends, {:.1} capped regions",
        mean_of(|d| d.summary.edge_count),
        mean_of(|d| d.summary.block_count),
        mean_of(|d| d.summary.open_loose_ends),
        mean_of(|d| d.summary.growth_caps_hit),
    );
}
