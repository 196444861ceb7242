//! Standalone trace generator.
//!
//! Simulates a set of users requesting Zipf-ranked content while moving
//! over a node graph and writes the resulting instruction trace as a gzip
//! file, ready for `edge-simulator simulate`.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

use edge_simulator::generator::{write_trace, TraceConfig, TraceGenerator};
use edge_simulator::resources::{default_node_map, read_node_map, read_resource_map};

/// Generate instruction traces for the edge cache simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Resource size map (;-delimited CSV)
    #[arg(value_name = "RESOURCES")]
    resources: PathBuf,

    /// Node map JSON describing how users move between nodes
    #[arg(long, value_name = "PATH")]
    node_map: Option<PathBuf>,

    /// Number of nodes (cdn1..cdnN) when no node map is given
    #[arg(long, default_value = "3")]
    no_nodes: usize,

    /// Output trace file
    #[arg(short, long, default_value = "./example.trace.gz")]
    out_file: PathBuf,

    /// Number of iterations to simulate
    #[arg(long, default_value = "50")]
    no_iterations: u32,

    /// Number of users to simulate
    #[arg(long, default_value = "10")]
    no_users: u32,

    /// Seed used by the random generator
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Zipf exponent of the content popularity distribution
    #[arg(long, default_value = "0.8")]
    zipf_exponent: f64,

    /// Chance per iteration that a user moves to a neighbouring node
    #[arg(long, default_value = "0.05")]
    move_chance: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let resource_map = read_resource_map(&args.resources)
        .with_context(|| format!("reading resource map {}", args.resources.display()))?;
    if resource_map.is_empty() {
        bail!(
            "resource map {} holds no usable rows",
            args.resources.display()
        );
    }
    let node_map = match &args.node_map {
        Some(path) => read_node_map(path)
            .with_context(|| format!("reading node map {}", path.display()))?,
        None => default_node_map(args.no_nodes),
    };
    if node_map.is_empty() {
        bail!("node map holds no nodes");
    }

    let config = TraceConfig {
        node_map,
        no_users: args.no_users,
        no_iterations: args.no_iterations,
        zipf_exponent: args.zipf_exponent,
        move_chance: args.move_chance,
        seed: args.seed,
    };
    let trace = TraceGenerator::new(config, &resource_map).generate();
    write_trace(&trace, &args.out_file)
        .with_context(|| format!("writing trace {}", args.out_file.display()))?;

    println!(
        "Generated {} instructions into {}",
        trace.len(),
        args.out_file.display()
    );
    Ok(())
}
