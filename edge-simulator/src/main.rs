use std::collections::HashMap;
use std::num::NonZeroU64;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};

use edge_cache::config::{LruCacheConfig, ProfileCacheConfig, DEFAULT_MIN_REQ_COUNT};
use edge_simulator::belady::run_belady;
use edge_simulator::generator::{self, TraceConfig, TraceGenerator};
use edge_simulator::instruction::Instruction;
use edge_simulator::resources::{default_node_map, read_node_map, read_resource_map};
use edge_simulator::stats::writers_for_nodes;
use edge_simulator::strategy::{
    CooperativeLruStrategy, FederatedStrategy, LruStrategy, ProfilesStrategy, Strategy,
};
use edge_simulator::trace::{BufferedTrace, StreamingTrace};
use edge_simulator::StrategyRunner;

/// Edge-content cache simulator CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Caching strategies available for simulation
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum StrategyKind {
    /// Independent LRU cache per node
    Lru,
    /// Hash-sharded LRU over all nodes
    Federated,
    /// Cooperative LRU probing the user's recent nodes
    Cooperative,
    /// Cooperative LRU probing a fixed adjacency list
    Neighbouring,
    /// Profile-ranked cooperative caching
    Profiles,
}

/// Subcommands for the CLI
#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a trace against a caching strategy
    Simulate {
        /// Gzip trace file to replay
        #[arg(value_name = "TRACE")]
        trace: PathBuf,

        /// Resource size map (;-delimited CSV)
        #[arg(value_name = "RESOURCES")]
        resources: PathBuf,

        /// Strategy to simulate
        #[arg(short, long, value_enum, default_value = "lru")]
        strategy: StrategyKind,

        /// Node map JSON; node ids and neighbourhoods come from here
        #[arg(long, value_name = "PATH")]
        node_map: Option<PathBuf>,

        /// Number of nodes (cdn1..cdnN) when no node map is given
        #[arg(long, default_value = "2")]
        no_nodes: usize,

        /// Byte capacity per node in MB
        #[arg(long, default_value = "512")]
        node_capacity: u64,

        /// Requests before an item is admitted to an LRU cache
        #[arg(long, default_value_t = DEFAULT_MIN_REQ_COUNT)]
        min_req_count: u32,

        /// Visited nodes a cooperative cache probes on a miss
        #[arg(long, default_value = "2")]
        trail_length: usize,

        /// Serve neighbour hits remotely instead of admitting locally
        #[arg(long)]
        outsource: bool,

        /// Iterations between profile ranking refreshes
        #[arg(long, default_value = "5")]
        ranking_timeout: u64,

        /// Resources remembered per user profile
        #[arg(long, default_value = "1000")]
        profile_size: usize,

        /// Where to write the per-node statistics files
        #[arg(short, long, default_value = "./stats-out")]
        out_dir: PathBuf,

        /// Marker appended to statistics file names
        #[arg(long, default_value = "")]
        marker: String,

        /// Stream the trace from disk instead of pre-loading it
        #[arg(long)]
        streaming: bool,
    },

    /// Replay a trace against the offline Belady-MIN optimum
    Belady {
        /// Gzip trace file to evaluate
        #[arg(value_name = "TRACE")]
        trace: PathBuf,

        /// Resource size map (;-delimited CSV)
        #[arg(value_name = "RESOURCES")]
        resources: PathBuf,

        /// Byte capacity per node in MB
        #[arg(long, default_value = "512")]
        node_capacity: u64,

        /// Where to save the statistics
        #[arg(short, long, default_value = "./belady-out")]
        out_dir: PathBuf,

        /// Marker appended to statistics file names
        #[arg(long, default_value = "")]
        marker: String,
    },

    /// Generate a Zipf-distributed trace over a node graph
    Generate {
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
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Commands::Simulate {
            trace,
            resources,
            strategy,
            node_map,
            no_nodes,
            node_capacity,
            min_req_count,
            trail_length,
            outsource,
            ranking_timeout,
            profile_size,
            out_dir,
            marker,
            streaming,
        } => run_simulate(SimulateArgs {
            trace,
            resources,
            strategy,
            node_map,
            no_nodes,
            node_capacity,
            min_req_count,
            trail_length,
            outsource,
            ranking_timeout,
            profile_size,
            out_dir,
            marker,
            streaming,
        }),

        Commands::Belady {
            trace,
            resources,
            node_capacity,
            out_dir,
            marker,
        } => {
            let resource_map = read_resource_map(&resources)
                .with_context(|| format!("reading resource map {}", resources.display()))?;
            let instructions: Vec<Instruction> = BufferedTrace::from_path(&trace)
                .with_context(|| format!("reading trace {}", trace.display()))?
                .instructions()
                .to_vec();
            std::fs::create_dir_all(&out_dir)?;

            let cache_size = node_capacity * 1024 * 1024;
            run_belady(&instructions, &resource_map, cache_size, &out_dir, &marker)?;
            println!(
                "Evaluated Belady-MIN over {} instructions into {}",
                instructions.len(),
                out_dir.display()
            );
            Ok(())
        }

        Commands::Generate {
            resources,
            node_map,
            no_nodes,
            out_file,
            no_iterations,
            no_users,
            seed,
            zipf_exponent,
            move_chance,
        } => {
            let resource_map = read_resource_map(&resources)
                .with_context(|| format!("reading resource map {}", resources.display()))?;
            if resource_map.is_empty() {
                bail!("resource map {} holds no usable rows", resources.display());
            }
            let node_map = load_node_map(node_map.as_deref(), no_nodes)?;

            let config = TraceConfig {
                node_map,
                no_users,
                no_iterations,
                zipf_exponent,
                move_chance,
                seed,
            };
            let trace = TraceGenerator::new(config, &resource_map).generate();
            generator::write_trace(&trace, &out_file)
                .with_context(|| format!("writing trace {}", out_file.display()))?;
            println!(
                "Generated {} instructions into {}",
                trace.len(),
                out_file.display()
            );
            Ok(())
        }
    }
}

/// Arguments of the simulate subcommand.
struct SimulateArgs {
    trace: PathBuf,
    resources: PathBuf,
    strategy: StrategyKind,
    node_map: Option<PathBuf>,
    no_nodes: usize,
    node_capacity: u64,
    min_req_count: u32,
    trail_length: usize,
    outsource: bool,
    ranking_timeout: u64,
    profile_size: usize,
    out_dir: PathBuf,
    marker: String,
    streaming: bool,
}

fn load_node_map(
    path: Option<&std::path::Path>,
    no_nodes: usize,
) -> anyhow::Result<HashMap<String, Vec<String>>> {
    let node_map = match path {
        Some(path) => read_node_map(path)
            .with_context(|| format!("reading node map {}", path.display()))?,
        None => default_node_map(no_nodes),
    };
    if node_map.is_empty() {
        bail!("node map holds no nodes");
    }
    Ok(node_map)
}

fn run_simulate(args: SimulateArgs) -> anyhow::Result<()> {
    let resource_map = read_resource_map(&args.resources)
        .with_context(|| format!("reading resource map {}", args.resources.display()))?;
    let node_map = load_node_map(args.node_map.as_deref(), args.no_nodes)?;

    let mut node_ids: Vec<String> = node_map.keys().cloned().collect();
    node_ids.sort_unstable();

    let capacity = NonZeroU64::new(args.node_capacity * 1024 * 1024)
        .context("node capacity may not be zero")?;
    let lru_config = LruCacheConfig {
        capacity,
        min_req_count: args.min_req_count,
    };
    let lru_nodes: Vec<(String, LruCacheConfig)> = node_ids
        .iter()
        .map(|node_id| (node_id.clone(), lru_config))
        .collect();

    let strategy: Box<dyn Strategy> = match args.strategy {
        StrategyKind::Lru => Box::new(LruStrategy::new(&lru_nodes)),
        StrategyKind::Federated => Box::new(FederatedStrategy::new(&lru_nodes)),
        StrategyKind::Cooperative => Box::new(CooperativeLruStrategy::new(
            &lru_nodes,
            args.trail_length,
            args.outsource,
        )),
        StrategyKind::Neighbouring => {
            if args.node_map.is_none() {
                bail!("the neighbouring strategy needs --node-map");
            }
            Box::new(CooperativeLruStrategy::neighbouring(
                &lru_nodes,
                node_map.clone(),
                args.outsource,
            ))
        }
        StrategyKind::Profiles => {
            let profile_nodes: Vec<(String, ProfileCacheConfig)> = node_ids
                .iter()
                .map(|node_id| (node_id.clone(), ProfileCacheConfig { capacity }))
                .collect();
            Box::new(ProfilesStrategy::new(
                &profile_nodes,
                args.ranking_timeout,
                args.profile_size,
            ))
        }
    };

    std::fs::create_dir_all(&args.out_dir)?;
    let writers = writers_for_nodes(&node_ids, &args.out_dir, &args.marker)?;

    println!("Edge Cache Simulation");
    println!("=====================");
    println!("Trace: {}", args.trace.display());
    println!("Strategy: {:?}", args.strategy);
    println!("Nodes: {} x {} MB", node_ids.len(), args.node_capacity);
    println!("Known resources: {}", resource_map.len());
    println!();

    let mut runner = StrategyRunner::new(strategy, resource_map, writers);
    let summary = if args.streaming {
        let trace = StreamingTrace::from_path(&args.trace)
            .with_context(|| format!("opening trace {}", args.trace.display()))?;
        runner.perform(trace)?
    } else {
        let trace = BufferedTrace::from_path(&args.trace)
            .with_context(|| format!("reading trace {}", args.trace.display()))?;
        runner.perform(trace)?
    };

    println!("Processed {} instructions", summary.instructions);
    println!(
        "Requests: {} ({} skipped for missing sizes)",
        summary.requests, summary.skipped_requests
    );
    println!(
        "Wrote {} samples per node into {}",
        summary.samples,
        args.out_dir.display()
    );
    Ok(())
}
