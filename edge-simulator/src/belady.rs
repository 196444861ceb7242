//! Offline Belady-MIN benchmark.
//!
//! Belady's MIN evicts the stored item that will not be needed for the
//! longest time. It needs the future, so it runs offline: the trace is split
//! into per-node, per-iteration request lists first, then each node is
//! replayed against an oracle built from its own future requests.
//!
//! One refinement keeps admissions feasible: an item may only displace items
//! whose next access lies no earlier than its own. When no such set frees
//! enough space the request is *passed*: counted as a miss to origin
//! without admission or eviction.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use thiserror::Error;

use edge_cache::CacheMetrics;

use crate::instruction::Instruction;
use crate::stats::StatsWriter;
use crate::SimError;

/// Next-access index used for items that are never requested again.
pub const NEVER: u64 = u64::MAX;

/// Error raised when no feasible eviction set exists for an admission.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unable to store item of {needed} bytes")]
pub struct UnableToStore {
    /// Bytes that could not be freed.
    pub needed: u64,
}

/// Answers "when is this identifier requested next?" for one node's future.
#[derive(Debug)]
pub struct BeladyOracle {
    /// Sorted request indices per identifier.
    requests_for: HashMap<String, Vec<u64>>,
}

impl BeladyOracle {
    /// Builds the oracle from a flat, ordered request list.
    pub fn from_ordered_requests<'a, I>(requests: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut requests_for: HashMap<String, Vec<u64>> = HashMap::new();
        for (index, identifier) in requests.into_iter().enumerate() {
            requests_for
                .entry(identifier.to_owned())
                .or_default()
                .push(index as u64);
        }
        BeladyOracle { requests_for }
    }

    /// Smallest request index greater than `current` at which the
    /// identifier is requested; [`NEVER`] if none.
    pub fn next_access(&self, identifier: &str, current: u64) -> u64 {
        let Some(calls) = self.requests_for.get(identifier) else {
            return NEVER;
        };
        let position = calls.partition_point(|&index| index <= current);
        calls.get(position).copied().unwrap_or(NEVER)
    }
}

/// Outcome of one request against the MIN policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Served from the cache.
    Hit,
    /// Admitted after evicting the listed identifiers.
    Miss(Vec<String>),
    /// Not admitted: no feasible eviction set existed.
    Pass,
}

/// Capacity-bounded Belady-MIN policy for a single node.
#[derive(Debug)]
pub struct BeladyMin {
    capacity: u64,
    used: u64,
    /// Requests handled so far; the oracle's clock.
    no_requests: u64,
    /// Stored identifiers with their next-access index.
    stored: HashMap<String, u64>,
    oracle: BeladyOracle,
    sizes: HashMap<String, u64>,
    /// Fallback for identifiers missing from the size map.
    average_size: u64,
}

impl BeladyMin {
    /// Creates a policy over one node's future requests.
    pub fn new(
        capacity: u64,
        oracle: BeladyOracle,
        sizes: HashMap<String, u64>,
        average_size: u64,
    ) -> Self {
        BeladyMin {
            capacity,
            used: 0,
            no_requests: 0,
            stored: HashMap::new(),
            oracle,
            sizes,
            average_size,
        }
    }

    /// Byte size of an identifier, falling back to the average size.
    pub fn weight_for(&self, identifier: &str) -> u64 {
        self.sizes
            .get(identifier)
            .copied()
            .unwrap_or(self.average_size)
    }

    fn next_access(&self, identifier: &str) -> u64 {
        self.oracle.next_access(identifier, self.no_requests)
    }

    /// Handles a single request, returning what happened and which items
    /// were evicted to make room.
    pub fn handle_request(&mut self, identifier: &str) -> RequestOutcome {
        if self.stored.contains_key(identifier) {
            let next = self.next_access(identifier);
            self.no_requests += 1;
            self.stored.insert(identifier.to_owned(), next);
            return RequestOutcome::Hit;
        }

        let weight = self.weight_for(identifier);
        let incoming_next = self.next_access(identifier);
        match self.make_weight_available(weight, incoming_next) {
            Ok(evicted) => {
                self.stored
                    .insert(identifier.to_owned(), self.next_access(identifier));
                self.used += weight;
                self.no_requests += 1;
                RequestOutcome::Miss(evicted)
            }
            Err(_) => {
                self.no_requests += 1;
                RequestOutcome::Pass
            }
        }
    }

    /// Stored identifiers eligible for eviction in favour of an item next
    /// used at `min_next`, sorted by next access (earliest first).
    ///
    /// Eligible means the stored item's next access is no earlier than the
    /// incoming item's; indices are unique, so this only coincides at
    /// [`NEVER`].
    fn ranking_by_next_access(&self, min_next: u64) -> Vec<String> {
        let mut ranking: Vec<(&String, u64)> = self
            .stored
            .iter()
            .filter(|(_, &next)| next >= min_next)
            .map(|(identifier, &next)| (identifier, next))
            .collect();
        ranking.sort_unstable_by(|(id_a, next_a), (id_b, next_b)| {
            next_a.cmp(next_b).then_with(|| id_a.cmp(id_b))
        });
        ranking
            .into_iter()
            .map(|(identifier, _)| identifier.clone())
            .collect()
    }

    /// Frees at least `weight` bytes by evicting eligible items, the one
    /// used furthest in the future first.
    ///
    /// Fails without evicting anything when the item cannot fit at all or
    /// the eligible candidates cannot cover the weight.
    fn make_weight_available(
        &mut self,
        weight: u64,
        min_next: u64,
    ) -> Result<Vec<String>, UnableToStore> {
        if weight > self.capacity {
            return Err(UnableToStore { needed: weight });
        }
        if self.can_store(weight) {
            return Ok(Vec::new());
        }
        let mut ranking = self.ranking_by_next_access(min_next);
        let available: u64 = ranking.iter().map(|id| self.weight_for(id)).sum();
        if weight > available {
            return Err(UnableToStore { needed: weight });
        }
        let mut evicted = Vec::new();
        while !self.can_store(weight) {
            // Guaranteed by the availability check above.
            let Some(item) = ranking.pop() else {
                return Err(UnableToStore { needed: weight });
            };
            self.evict_item(&item);
            evicted.push(item);
        }
        Ok(evicted)
    }

    /// Evicts a specific stored item, releasing its weight.
    fn evict_item(&mut self, identifier: &str) {
        if self.stored.remove(identifier).is_some() {
            self.used -= self.weight_for(identifier);
        }
    }

    fn available_weight(&self) -> u64 {
        self.capacity - self.used
    }

    fn can_store(&self, weight: u64) -> bool {
        weight <= self.available_weight()
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.stored.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }
}

/// Replays one node's per-iteration request lists against Belady-MIN,
/// collecting the same metric schema as the online strategies.
#[derive(Debug)]
pub struct BeladySimulation {
    policy: BeladyMin,
    request_trace: BTreeMap<u64, Vec<String>>,
    metrics: CacheMetrics,
}

impl BeladySimulation {
    /// Builds the simulation for one node.
    ///
    /// The order of requests within every iteration entry matters; the
    /// oracle is built from their flat concatenation.
    pub fn new(
        byte_capacity: u64,
        request_trace: BTreeMap<u64, Vec<String>>,
        sizes: HashMap<String, u64>,
        average_size: u64,
    ) -> Self {
        let oracle = BeladyOracle::from_ordered_requests(
            request_trace
                .values()
                .flat_map(|requests| requests.iter().map(String::as_str)),
        );
        BeladySimulation {
            policy: BeladyMin::new(byte_capacity, oracle, sizes, average_size),
            request_trace,
            metrics: CacheMetrics::new(),
        }
    }

    /// Replays `no_iterations` iterations, appending one stats row per
    /// iteration.
    pub fn simulate(&mut self, no_iterations: u64, writer: &mut StatsWriter) -> Result<(), SimError> {
        for iteration in 0..no_iterations {
            let requests = self.request_trace.remove(&iteration).unwrap_or_default();
            for identifier in &requests {
                let weight = self.policy.weight_for(identifier);
                let outcome = self.policy.handle_request(identifier);
                match &outcome {
                    RequestOutcome::Hit => self.metrics.track_hit(weight),
                    RequestOutcome::Miss(evicted) => {
                        self.metrics.track_miss();
                        self.metrics.track_item_stored(weight);
                        self.metrics.track_request_origin();
                        self.metrics.track_bytes_origin(weight);
                        for item in evicted {
                            let item_weight = self.policy.weight_for(item);
                            self.metrics.track_item_removed(item_weight);
                        }
                    }
                    RequestOutcome::Pass => {
                        self.metrics.track_miss();
                        self.metrics.track_request_origin();
                        self.metrics.track_bytes_origin(weight);
                    }
                }
            }
            writer.append(iteration, &self.metrics)?;
        }
        Ok(())
    }

    /// The node's cumulative metrics.
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}

/// Splits a trace into per-node, per-iteration request lists.
///
/// Returns the lists and the number of iterations (one past the highest
/// `ITERATION` marker seen).
pub fn order_content_by_node(
    instructions: &[Instruction],
) -> (BTreeMap<String, BTreeMap<u64, Vec<String>>>, u64) {
    let mut content: BTreeMap<String, BTreeMap<u64, Vec<String>>> = BTreeMap::new();
    let mut iteration = 0;
    for instruction in instructions {
        match instruction {
            Instruction::SetIteration { iteration: i } => iteration = *i,
            Instruction::Request {
                node_id,
                identifier,
                ..
            } => {
                content
                    .entry(node_id.clone())
                    .or_default()
                    .entry(iteration)
                    .or_default()
                    .push(identifier.clone());
            }
            _ => {}
        }
    }
    (content, iteration + 1)
}

/// Runs Belady-MIN for every node of a trace, writing one stats file per
/// node into `out_dir`.
pub fn run_belady(
    instructions: &[Instruction],
    resource_map: &HashMap<String, u64>,
    cache_size: u64,
    out_dir: &Path,
    marker: &str,
) -> Result<(), SimError> {
    let average_size = if resource_map.is_empty() {
        0
    } else {
        resource_map.values().sum::<u64>() / resource_map.len() as u64
    };
    let (content_by_node, no_iterations) = order_content_by_node(instructions);

    for (node_id, content_by_iteration) in content_by_node {
        let mut simulation = BeladySimulation::new(
            cache_size,
            content_by_iteration,
            resource_map.clone(),
            average_size,
        );
        let mut writer = StatsWriter::create(&crate::stats::stats_path(out_dir, &node_id, marker))?;
        simulation.simulate(no_iterations, &mut writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(pairs: &[(&str, u64)]) -> HashMap<String, u64> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect()
    }

    #[test]
    fn test_oracle_next_access() {
        let oracle = BeladyOracle::from_ordered_requests(["a", "b", "a", "c"]);
        assert_eq!(oracle.next_access("a", 0), 2);
        assert_eq!(oracle.next_access("a", 2), NEVER);
        assert_eq!(oracle.next_access("b", 0), 1);
        assert_eq!(oracle.next_access("b", 1), NEVER);
        assert_eq!(oracle.next_access("unknown", 0), NEVER);
    }

    #[test]
    fn test_oracle_includes_current_index() {
        // At index 0 the next access of "a" is its own later occurrence.
        let oracle = BeladyOracle::from_ordered_requests(["a", "a"]);
        assert_eq!(oracle.next_access("a", 0), 1);
    }

    /// Trace A B C A D A with capacity for two equal items: MIN admits A and
    /// B, sacrifices B for C, C for D, and keeps A throughout for its two
    /// future uses.
    #[test]
    fn test_min_scenario() {
        let trace = ["a", "b", "c", "a", "d", "a"];
        let oracle = BeladyOracle::from_ordered_requests(trace);
        let mut policy = BeladyMin::new(2, oracle, sizes(&[]), 1);

        let outcomes: Vec<RequestOutcome> = trace
            .iter()
            .map(|id| policy.handle_request(id))
            .collect();

        assert_eq!(outcomes[0], RequestOutcome::Miss(vec![]));
        assert_eq!(outcomes[1], RequestOutcome::Miss(vec![]));
        // C evicts B: B is never used again while A returns at index 3.
        assert_eq!(outcomes[2], RequestOutcome::Miss(vec!["b".to_owned()]));
        assert_eq!(outcomes[3], RequestOutcome::Hit);
        // D evicts C for the same reason.
        assert_eq!(outcomes[4], RequestOutcome::Miss(vec!["c".to_owned()]));
        assert_eq!(outcomes[5], RequestOutcome::Hit);

        let hits = outcomes
            .iter()
            .filter(|o| matches!(o, RequestOutcome::Hit))
            .count();
        let passes = outcomes
            .iter()
            .filter(|o| matches!(o, RequestOutcome::Pass))
            .count();
        assert_eq!(hits, 2);
        assert_eq!(passes, 0);
    }

    #[test]
    fn test_item_larger_than_capacity_passes() {
        let oracle = BeladyOracle::from_ordered_requests(["big"]);
        let mut policy = BeladyMin::new(10, oracle, sizes(&[("big", 11)]), 1);
        assert_eq!(policy.handle_request("big"), RequestOutcome::Pass);
        assert!(policy.is_empty());
    }

    #[test]
    fn test_pass_when_stored_items_are_needed_sooner() {
        // "a" is needed at index 3, the incoming "b" never again; "b" may
        // not displace "a".
        let trace = ["a", "b", "a", "a"];
        let oracle = BeladyOracle::from_ordered_requests(trace);
        let mut policy = BeladyMin::new(1, oracle, sizes(&[]), 1);

        assert_eq!(policy.handle_request("a"), RequestOutcome::Miss(vec![]));
        assert_eq!(policy.handle_request("b"), RequestOutcome::Pass);
        assert_eq!(policy.handle_request("a"), RequestOutcome::Hit);
    }

    #[test]
    fn test_incoming_cannot_displace_sooner_needed_items() {
        let trace = ["a", "b", "c", "a", "b"];
        let oracle = BeladyOracle::from_ordered_requests(trace);
        let mut policy = BeladyMin::new(2, oracle, sizes(&[]), 1);

        policy.handle_request("a");
        policy.handle_request("b");
        // a returns at 3 and b at 4 while c is never requested again, so
        // neither stored item is eligible and c passes.
        assert_eq!(policy.handle_request("c"), RequestOutcome::Pass);
        assert_eq!(policy.handle_request("a"), RequestOutcome::Hit);
        assert_eq!(policy.handle_request("b"), RequestOutcome::Hit);
    }

    #[test]
    fn test_order_content_by_node() {
        let instructions = vec![
            Instruction::SetIteration { iteration: 0 },
            Instruction::Request {
                user_id: "u1".into(),
                node_id: "cdn1".into(),
                identifier: "x".into(),
            },
            Instruction::Connect {
                user_id: "u1".into(),
                node_id: "cdn2".into(),
            },
            Instruction::SetIteration { iteration: 1 },
            Instruction::Request {
                user_id: "u1".into(),
                node_id: "cdn2".into(),
                identifier: "y".into(),
            },
            Instruction::Request {
                user_id: "u1".into(),
                node_id: "cdn1".into(),
                identifier: "x".into(),
            },
        ];
        let (content, no_iterations) = order_content_by_node(&instructions);
        assert_eq!(no_iterations, 2);
        assert_eq!(content["cdn1"][&0], vec!["x"]);
        assert_eq!(content["cdn1"][&1], vec!["x"]);
        assert_eq!(content["cdn2"][&1], vec!["y"]);
        assert!(content["cdn2"].get(&0).is_none());
    }

    /// Belady's byte hit ratio must not fall below a plain LRU replay of
    /// the same single-node trace and capacity.
    #[test]
    fn test_min_not_worse_than_lru() {
        use edge_cache::config::LruCacheConfig;
        use edge_cache::{CacheItem, LruCache};
        use core::num::NonZeroU64;

        let trace = [
            "a", "b", "c", "d", "a", "b", "e", "a", "c", "b", "d", "a", "e", "b", "a",
        ];
        let capacity = 3u64;

        let oracle = BeladyOracle::from_ordered_requests(trace);
        let mut min = BeladyMin::new(capacity, oracle, sizes(&[]), 1);
        let min_hits = trace
            .iter()
            .filter(|id| matches!(min.handle_request(id), RequestOutcome::Hit))
            .count();

        let mut lru = LruCache::init(LruCacheConfig {
            capacity: NonZeroU64::new(capacity).unwrap(),
            min_req_count: 1,
        });
        let mut lru_hits = 0;
        for (ts, id) in trace.iter().enumerate() {
            if lru.retrieve(id, ts as u64).is_some() {
                lru_hits += 1;
            } else {
                lru.store(CacheItem::new(*id, 1)).unwrap();
            }
        }
        assert!(min_hits >= lru_hits, "MIN {min_hits} vs LRU {lru_hits}");
    }
}
