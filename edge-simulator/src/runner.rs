//! Replay loop driving a strategy over an instruction stream.
//!
//! The runner owns the per-event clock: `timestamp` increments on every
//! instruction and doubles as the `last_accessed` stamp, while `iteration`
//! carries the value of the most recent `ITERATION` marker. Requests are
//! resolved against the injected resource size map; identifiers without a
//! known size are skipped without touching any counter. On `GET_STATS` every
//! node's metrics are snapshotted and appended to that node's writer.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use edge_cache::{CacheItem, NotEnoughCapacity};

use crate::instruction::Instruction;
use crate::stats::StatsWriter;
use crate::strategy::Strategy;
use crate::trace::TraceError;

/// Fatal simulation error.
#[derive(Debug, Error)]
pub enum SimError {
    /// The trace could not be read or parsed.
    #[error(transparent)]
    Trace(#[from] TraceError),
    /// A cache violated its capacity invariant.
    #[error("cache invariant violated: {0}")]
    Capacity(#[from] NotEnoughCapacity),
    /// A statistics file could not be written.
    #[error("statistics error: {0}")]
    Stats(#[from] csv::Error),
}

/// Totals reported after a completed run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Instructions processed, including markers and samples.
    pub instructions: u64,
    /// Requests with a known resource size.
    pub requests: u64,
    /// Requests dropped for lack of a resource size.
    pub skipped_requests: u64,
    /// Statistics samples written per node.
    pub samples: u64,
}

/// Dispatches an instruction stream to a strategy and its stats writers.
pub struct StrategyRunner<S> {
    strategy: S,
    content_map: HashMap<String, u64>,
    stats_writers: BTreeMap<String, StatsWriter>,
}

impl<S: Strategy> StrategyRunner<S> {
    /// Creates a runner over a strategy, a resource size map and one stats
    /// writer per node.
    pub fn new(
        strategy: S,
        content_map: HashMap<String, u64>,
        stats_writers: BTreeMap<String, StatsWriter>,
    ) -> Self {
        StrategyRunner {
            strategy,
            content_map,
            stats_writers,
        }
    }

    /// Replays the instruction stream to completion.
    ///
    /// Instructions apply strictly in stream order; a parse or I/O error
    /// aborts the run.
    pub fn perform<I>(&mut self, instructions: I) -> Result<RunSummary, SimError>
    where
        I: IntoIterator<Item = Result<Instruction, TraceError>>,
    {
        let mut timestamp: u64 = 0;
        let mut iteration: u64 = 0;
        let mut summary = RunSummary::default();

        for instruction in instructions {
            match instruction? {
                Instruction::Request {
                    user_id,
                    node_id,
                    identifier,
                } => match self.content_map.get(&identifier) {
                    Some(&byte_size) => {
                        let item = CacheItem::new(identifier, byte_size);
                        self.strategy
                            .on_request(&user_id, &node_id, item, timestamp)?;
                        summary.requests += 1;
                    }
                    None => {
                        log::debug!("no size known for {identifier}, skipping request");
                        summary.skipped_requests += 1;
                    }
                },
                Instruction::Connect { user_id, node_id } => {
                    self.strategy.on_connect(&user_id, &node_id);
                }
                Instruction::Disconnect { user_id, node_id } => {
                    self.strategy.on_disconnect(&user_id, &node_id);
                }
                Instruction::SetIteration { iteration: i } => {
                    iteration = i;
                    self.strategy.on_iteration(iteration);
                }
                Instruction::CollectStatistics => {
                    for (node_id, stats) in self.strategy.snapshot_metrics() {
                        if let Some(writer) = self.stats_writers.get_mut(&node_id) {
                            writer.append(iteration, &stats)?;
                        }
                    }
                    summary.samples += 1;
                }
                Instruction::RegisterNode { .. } => {
                    // Reserved instruction; accepted and ignored.
                }
            }
            timestamp += 1;
            summary.instructions += 1;
        }
        Ok(summary)
    }

    /// The strategy, for inspection after a run.
    pub fn strategy(&self) -> &S {
        &self.strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats;
    use crate::strategy::LruStrategy;
    use core::num::NonZeroU64;
    use edge_cache::config::LruCacheConfig;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_dir() -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "edge-sim-runner-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn instructions(lines: &[&str]) -> Vec<Result<Instruction, TraceError>> {
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| Instruction::parse(line, i as u64 + 1).map_err(Into::into))
            .collect()
    }

    fn runner(dir: &PathBuf) -> StrategyRunner<LruStrategy> {
        let config = LruCacheConfig {
            capacity: NonZeroU64::new(100).unwrap(),
            min_req_count: 1,
        };
        let nodes = vec![("cdn1".to_owned(), config), ("cdn2".to_owned(), config)];
        let strategy = LruStrategy::new(&nodes);
        let node_ids: Vec<String> = nodes.iter().map(|(n, _)| n.clone()).collect();
        let writers = stats::writers_for_nodes(&node_ids, dir, "").unwrap();
        let content_map: HashMap<String, u64> =
            [("x".to_owned(), 40), ("y".to_owned(), 30)].into();
        StrategyRunner::new(strategy, content_map, writers)
    }

    #[test]
    fn test_full_replay_writes_stats() {
        let dir = temp_dir();
        let mut runner = runner(&dir);
        let summary = runner
            .perform(instructions(&[
                "CON 0 cdn1",
                "ITERATION 0",
                "REQ 0 cdn1 x",
                "REQ 0 cdn1 x",
                "GET_STATS",
                "ITERATION 1",
                "REQ 0 cdn1 y",
                "GET_STATS",
            ]))
            .unwrap();

        assert_eq!(summary.instructions, 8);
        assert_eq!(summary.requests, 3);
        assert_eq!(summary.samples, 2);

        let contents = std::fs::read_to_string(stats::stats_path(&dir, "cdn1", "")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        // Header plus one row per GET_STATS.
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("0;1;1;1;40;40;40;0;1"));
        assert!(lines[2].starts_with("1;1;2;2;70;40;70;0;2"));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_unknown_resource_is_skipped_silently() {
        let dir = temp_dir();
        let mut runner = runner(&dir);
        let summary = runner
            .perform(instructions(&[
                "CON 0 cdn1",
                "REQ 0 cdn1 unknown-object",
                "GET_STATS",
            ]))
            .unwrap();
        assert_eq!(summary.requests, 0);
        assert_eq!(summary.skipped_requests, 1);

        let stats = runner.strategy().snapshot_metrics();
        assert_eq!(stats["cdn1"].total_requests(), 0);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_register_node_is_accepted_and_ignored() {
        let dir = temp_dir();
        let mut runner = runner(&dir);
        runner
            .perform(instructions(&["REGISTER_NODE cdn9", "GET_STATS"]))
            .unwrap();
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_timestamp_advances_per_instruction() {
        // The item stored on the second request carries the timestamp of
        // the retrieval that hit it afterwards.
        let dir = temp_dir();
        let mut runner = runner(&dir);
        runner
            .perform(instructions(&[
                "CON 0 cdn1",    // ts 0
                "REQ 0 cdn1 x",  // ts 1, miss+store
                "ITERATION 1",   // ts 2
                "REQ 0 cdn1 x",  // ts 3, hit
            ]))
            .unwrap();
        let stats = runner.strategy().snapshot_metrics();
        assert_eq!(stats["cdn1"].hits, 1);
        assert_eq!(stats["cdn1"].misses, 1);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_parse_error_aborts_run() {
        let dir = temp_dir();
        let mut runner = runner(&dir);
        let mut stream = instructions(&["CON 0 cdn1"]);
        stream.push(Instruction::parse("NONSENSE", 2).map_err(Into::into));
        assert!(matches!(
            runner.perform(stream),
            Err(SimError::Trace(_))
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
