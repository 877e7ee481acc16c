//! gwfc CLI entry point.
//!
//! Reads an example graph, one or more templates, and a target graph from
//! GraphML files, then retries the solver until the target collapses or the
//! attempt budget runs out. On success the colored target is written out and
//! the process exits 0; contradiction exhaustion or invalid inputs exit
//! non-zero.

use anyhow::{bail, Context, Result};
use clap::Parser;
use gwfc_core::{RunOutcome, RunStats, Solver};
use gwfc_io::{read_graphml, write_graphml};
use serde::Serialize;
use std::path::PathBuf;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "gwfc")]
#[command(version = VERSION)]
#[command(about = "Colors a graph with the local patterns of an example graph", long_about = None)]
struct Args {
    /// Working directory containing the input GraphML files
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Example graph file (fully colored), relative to DIR
    #[arg(long, default_value = "GI.graphml")]
    gi: PathBuf,

    /// Template graph files describing the local pattern shapes
    #[arg(long, num_args = 1.., default_value = "GL.graphml")]
    gls: Vec<PathBuf>,

    /// Target graph file to be colored (this is an input file)
    #[arg(long, default_value = "GO.graphml")]
    go: PathBuf,

    /// Where to write the colored target graph
    #[arg(short, long, default_value = "out.graphml")]
    output: PathBuf,

    /// How many attempts before giving up; each retry reseeds
    #[arg(short = 'n', long, default_value_t = 10)]
    tries: u64,

    /// Node attribute holding the color
    #[arg(short = 'v', long = "node-attr", default_value = "value")]
    node_attr: String,

    /// Edge attribute that must match between edges during enumeration
    #[arg(short = 'e', long = "edge-attr", default_value = "type")]
    edge_attr: String,

    /// RNG seed; with a fixed seed the whole invocation is reproducible
    #[arg(long)]
    seed: Option<u64>,

    /// Write a JSON run report to this path on success
    #[arg(long)]
    stats: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,
}

#[derive(Serialize)]
struct RunReport<'a> {
    seed: u64,
    attempts: u64,
    surviving_nodes: usize,
    pruned_nodes: &'a [String],
    stats: &'a RunStats,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if args.verbose { "debug" } else { "info" },
    ))
    .init();

    let example_path = args.dir.join(&args.gi);
    let example = read_graphml(&example_path, &args.node_attr, &args.edge_attr)
        .with_context(|| format!("loading example graph '{}'", example_path.display()))?;

    let mut templates = Vec::with_capacity(args.gls.len());
    for template in &args.gls {
        let path = args.dir.join(template);
        templates.push(
            read_graphml(&path, &args.node_attr, &args.edge_attr)
                .with_context(|| format!("loading template graph '{}'", path.display()))?,
        );
    }

    let target_path = args.dir.join(&args.go);
    let target = read_graphml(&target_path, &args.node_attr, &args.edge_attr)
        .with_context(|| format!("loading target graph '{}'", target_path.display()))?;

    let mut solver = Solver::setup(&target, &templates, &example, args.seed)?;
    let base_seed = solver.seed();

    for attempt in 0..args.tries {
        if attempt > 0 {
            solver.reseed(base_seed.wrapping_add(attempt));
            solver.reset();
        }
        match solver.run() {
            RunOutcome::Collapsed => {
                log::info!(
                    "collapsed on attempt {} after {} observations",
                    attempt + 1,
                    solver.stats().observations
                );
                let output_path = args.dir.join(&args.output);
                write_graphml(&output_path, solver.graph(), &args.node_attr, &args.edge_attr)
                    .with_context(|| format!("writing '{}'", output_path.display()))?;
                if let Some(stats_path) = &args.stats {
                    let report = RunReport {
                        seed: base_seed,
                        attempts: attempt + 1,
                        surviving_nodes: solver.graph().node_count(),
                        pruned_nodes: solver.pruned_nodes(),
                        stats: solver.stats(),
                    };
                    let json = serde_json::to_string_pretty(&report)?;
                    std::fs::write(args.dir.join(stats_path), json)
                        .with_context(|| "writing run report")?;
                }
                return Ok(());
            }
            RunOutcome::Contradiction { node } => {
                log::warn!(
                    "attempt {} of {} hit a contradiction at node '{}'",
                    attempt + 1,
                    args.tries,
                    node
                );
            }
            RunOutcome::LimitReached => {
                unreachable!("uncapped run cannot exhaust its observation budget")
            }
        }
    }

    bail!("no valid coloring found after {} attempts", args.tries)
}
