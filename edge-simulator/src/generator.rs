//! Synthetic trace generation.
//!
//! Generates instruction traces for a set of users requesting Zipf-ranked
//! content while moving over a graph of edge nodes. Every iteration each
//! user may move to a neighbouring node (emitting a disconnect/connect
//! pair) and requests one resource at their current node; the iteration
//! closes with a statistics sample.
//!
//! Generation is seeded, so the same configuration always produces the
//! same trace.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::instruction::Instruction;

/// Relative request frequency of the content at `rank` compared to the
/// first.
fn zipf(rank: usize, exponent: f64) -> f64 {
    1.0 / (rank as f64).powf(exponent)
}

/// Parameters of a generated trace.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// How users can move between nodes.
    pub node_map: HashMap<String, Vec<String>>,
    /// Number of simulated users.
    pub no_users: u32,
    /// Number of iterations to simulate.
    pub no_iterations: u32,
    /// Skew of the content popularity distribution.
    pub zipf_exponent: f64,
    /// Chance per iteration that a user moves to a neighbouring node, in
    /// [0, 1].
    pub move_chance: f64,
    /// Seed for the random generator.
    pub seed: u64,
}

/// A user roaming the node graph.
#[derive(Debug)]
struct User {
    identifier: String,
    current_node: String,
    previous_node: Option<String>,
}

impl User {
    /// Nodes the user can move to: the current node's neighbours plus the
    /// node they came from.
    fn next_nodes(&self, node_map: &HashMap<String, Vec<String>>) -> Vec<String> {
        let mut nodes = node_map.get(&self.current_node).cloned().unwrap_or_default();
        if let Some(previous) = &self.previous_node {
            nodes.push(previous.clone());
        }
        nodes
    }

    fn move_to(&mut self, node: String) {
        self.previous_node = Some(std::mem::replace(&mut self.current_node, node));
    }
}

/// Generates instruction traces from a [`TraceConfig`] and a resource
/// catalogue.
#[derive(Debug)]
pub struct TraceGenerator {
    config: TraceConfig,
    resources: Vec<String>,
    weights: WeightedIndex<f64>,
    rng: StdRng,
}

impl TraceGenerator {
    /// Creates a generator over the identifiers of a resource size map.
    ///
    /// The catalogue is shuffled once so the Zipf ranks do not follow the
    /// input order of the resource map.
    pub fn new(config: TraceConfig, resource_map: &HashMap<String, u64>) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut resources: Vec<String> = resource_map.keys().cloned().collect();
        resources.sort_unstable();
        resources.shuffle(&mut rng);
        let weights = WeightedIndex::new(
            (1..=resources.len().max(1)).map(|rank| zipf(rank, config.zipf_exponent)),
        )
        .expect("at least one positive weight");
        TraceGenerator {
            config,
            resources,
            weights,
            rng,
        }
    }

    /// Generates the full instruction trace.
    pub fn generate(&mut self) -> Vec<Instruction> {
        let mut node_ids: Vec<String> = self.config.node_map.keys().cloned().collect();
        node_ids.sort_unstable();

        let mut users = Vec::new();
        let mut actions = Vec::new();
        for i in 0..self.config.no_users {
            let starting_node = node_ids
                .choose(&mut self.rng)
                .expect("node map may not be empty")
                .clone();
            actions.push(Instruction::Connect {
                user_id: i.to_string(),
                node_id: starting_node.clone(),
            });
            users.push(User {
                identifier: i.to_string(),
                current_node: starting_node,
                previous_node: None,
            });
        }

        for iteration in 0..self.config.no_iterations {
            actions.push(Instruction::SetIteration {
                iteration: iteration.into(),
            });
            for user_index in 0..users.len() {
                self.simulate_user_movement(&mut users[user_index], &mut actions);
                self.simulate_user_request(&users[user_index], &mut actions);
            }
            actions.push(Instruction::CollectStatistics);
        }
        actions
    }

    fn simulate_user_movement(&mut self, user: &mut User, actions: &mut Vec<Instruction>) {
        if self.rng.gen::<f64>() > self.config.move_chance {
            return;
        }
        let options = user.next_nodes(&self.config.node_map);
        let Some(new_node) = options.choose(&mut self.rng).cloned() else {
            return;
        };
        actions.push(Instruction::Disconnect {
            user_id: user.identifier.clone(),
            node_id: user.current_node.clone(),
        });
        actions.push(Instruction::Connect {
            user_id: user.identifier.clone(),
            node_id: new_node.clone(),
        });
        user.move_to(new_node);
    }

    fn simulate_user_request(&mut self, user: &User, actions: &mut Vec<Instruction>) {
        if self.resources.is_empty() {
            return;
        }
        let resource = &self.resources[self.weights.sample(&mut self.rng)];
        actions.push(Instruction::Request {
            user_id: user.identifier.clone(),
            node_id: user.current_node.clone(),
            identifier: resource.clone(),
        });
    }
}

/// Writes instructions to a gzip trace file, one per line in canonical
/// form.
pub fn write_trace(instructions: &[Instruction], path: impl AsRef<Path>) -> io::Result<()> {
    let file = File::create(path.as_ref())?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    for instruction in instructions {
        writeln!(encoder, "{instruction}")?;
    }
    encoder.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource_map(n: usize) -> HashMap<String, u64> {
        (0..n).map(|i| (format!("res{i}"), 100)).collect()
    }

    fn config(seed: u64) -> TraceConfig {
        TraceConfig {
            node_map: crate::resources::default_node_map(3),
            no_users: 4,
            no_iterations: 10,
            zipf_exponent: 0.8,
            move_chance: 0.2,
            seed,
        }
    }

    #[test]
    fn test_same_seed_same_trace() {
        let resources = resource_map(20);
        let a = TraceGenerator::new(config(7), &resources).generate();
        let b = TraceGenerator::new(config(7), &resources).generate();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seed_different_trace() {
        let resources = resource_map(20);
        let a = TraceGenerator::new(config(7), &resources).generate();
        let b = TraceGenerator::new(config(8), &resources).generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_trace_shape() {
        let resources = resource_map(20);
        let trace = TraceGenerator::new(config(7), &resources).generate();

        let connects = trace
            .iter()
            .take(4)
            .all(|i| matches!(i, Instruction::Connect { .. }));
        assert!(connects, "trace starts with one connect per user");

        let iterations = trace
            .iter()
            .filter(|i| matches!(i, Instruction::SetIteration { .. }))
            .count();
        let samples = trace
            .iter()
            .filter(|i| matches!(i, Instruction::CollectStatistics))
            .count();
        let requests = trace
            .iter()
            .filter(|i| matches!(i, Instruction::Request { .. }))
            .count();
        assert_eq!(iterations, 10);
        assert_eq!(samples, 10);
        // One request per user per iteration.
        assert_eq!(requests, 40);
    }

    #[test]
    fn test_requests_reference_known_resources_and_nodes() {
        let resources = resource_map(20);
        let cfg = config(7);
        let trace = TraceGenerator::new(cfg.clone(), &resources).generate();
        for instruction in &trace {
            if let Instruction::Request {
                node_id,
                identifier,
                ..
            } = instruction
            {
                assert!(resources.contains_key(identifier));
                assert!(cfg.node_map.contains_key(node_id));
            }
        }
    }

    #[test]
    fn test_written_trace_parses_back() {
        use crate::trace::BufferedTrace;
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);

        let resources = resource_map(5);
        let trace = TraceGenerator::new(config(3), &resources).generate();
        let path = std::env::temp_dir().join(format!(
            "edge-sim-gen-{}-{}.trace.gz",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        write_trace(&trace, &path).unwrap();

        let read_back: Vec<Instruction> = BufferedTrace::from_path(&path)
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(read_back, trace);
        std::fs::remove_file(path).unwrap();
    }
}
