//! Cooperative LRU caching with neighbour lookup.
//!
//! On a local miss the node first re-probes the neighbour that served the
//! object last time (the *hint*), then probes candidate neighbours. Where the
//! candidates come from distinguishes the two variants:
//!
//! - **trail**: the nodes the requesting user visited most recently, from
//!   the strategy's connect history;
//! - **adjacency**: a fixed neighbour list per node, supplied at
//!   construction (the neighbouring variant; the user trail is ignored).
//!
//! Probes peek into peer caches without affecting their metrics or recency.
//! A neighbour hit counts as a hit on the requesting node and, unless the
//! strategy outsources storage to the neighbourhood, the object is admitted
//! locally as well.

use std::collections::{BTreeMap, HashMap};

use edge_cache::config::LruCacheConfig;
use edge_cache::{CacheItem, CacheMetrics, LruCache, NotEnoughCapacity};

use super::{NodeCache, Strategy, StrategyCore};

/// Per-node state: the cache plus the remembered source of previous
/// neighbour hits.
#[derive(Debug)]
struct CoopNode {
    cache: LruCache,
    /// identifier -> node that held it last time we asked around.
    content_neighbour: HashMap<String, String>,
}

impl NodeCache for CoopNode {
    fn metrics(&self) -> &CacheMetrics {
        self.cache.metrics()
    }
}

/// Where a node finds candidate neighbours to probe.
#[derive(Debug)]
enum NeighbourSource {
    /// The last `trail_length` distinct nodes of the user's history.
    Trail { trail_length: usize },
    /// A static adjacency list per node.
    Adjacency(HashMap<String, Vec<String>>),
}

/// Cooperative LRU over a neighbourhood of nodes.
#[derive(Debug)]
pub struct CooperativeLruStrategy {
    core: StrategyCore<CoopNode>,
    source: NeighbourSource,
    /// When set, neighbour hits are served remotely and not admitted
    /// locally.
    outsource_resources: bool,
}

impl CooperativeLruStrategy {
    /// Creates the trail variant: candidates come from the user's recent
    /// connect history.
    pub fn new(
        nodes: &[(String, LruCacheConfig)],
        trail_length: usize,
        outsource_resources: bool,
    ) -> Self {
        CooperativeLruStrategy {
            core: StrategyCore::new(Self::build_nodes(nodes)),
            source: NeighbourSource::Trail { trail_length },
            outsource_resources,
        }
    }

    /// Creates the neighbouring variant: candidates come from a fixed
    /// adjacency list and the user trail is ignored.
    pub fn neighbouring(
        nodes: &[(String, LruCacheConfig)],
        node_map: HashMap<String, Vec<String>>,
        outsource_resources: bool,
    ) -> Self {
        CooperativeLruStrategy {
            core: StrategyCore::new(Self::build_nodes(nodes)),
            source: NeighbourSource::Adjacency(node_map),
            outsource_resources,
        }
    }

    fn build_nodes(nodes: &[(String, LruCacheConfig)]) -> BTreeMap<String, CoopNode> {
        nodes
            .iter()
            .map(|(node_id, config)| {
                (
                    node_id.clone(),
                    CoopNode {
                        cache: LruCache::init(*config),
                        content_neighbour: HashMap::new(),
                    },
                )
            })
            .collect()
    }

    /// Candidate neighbours for a request, excluding the current node and
    /// the already-probed hint node.
    fn candidate_neighbours(
        &self,
        user_id: &str,
        node_id: &str,
        hint: Option<&str>,
    ) -> Vec<String> {
        let candidates = match &self.source {
            NeighbourSource::Trail { trail_length } => {
                self.core.latest_nodes(user_id, *trail_length)
            }
            NeighbourSource::Adjacency(node_map) => {
                node_map.get(node_id).cloned().unwrap_or_default()
            }
        };
        candidates
            .into_iter()
            .filter(|n| n != node_id && Some(n.as_str()) != hint)
            .collect()
    }

    /// Peeks whether a peer currently holds the identifier.
    fn peer_holds(&self, peer_id: &str, identifier: &str) -> bool {
        self.core
            .nodes
            .get(peer_id)
            .is_some_and(|peer| peer.cache.peek(identifier).is_some())
    }
}

impl Strategy for CooperativeLruStrategy {
    fn on_connect(&mut self, user_id: &str, node_id: &str) {
        self.core.connect(user_id, node_id);
    }

    fn on_request(
        &mut self,
        user_id: &str,
        node_id: &str,
        content: CacheItem,
        at_timestamp: u64,
    ) -> Result<(), NotEnoughCapacity> {
        let size = content.size();
        let identifier = content.identifier.clone();

        {
            let Some(node) = self.core.nodes.get_mut(node_id) else {
                log::warn!("request for unknown node {node_id}, skipping");
                return Ok(());
            };
            if node.cache.retrieve(&identifier, at_timestamp).is_some() {
                node.cache.metrics_mut().track_hit(size);
                return Ok(());
            }
        }

        // Re-probe the neighbour that served this object last time.
        let hint = self
            .core
            .nodes
            .get(node_id)
            .and_then(|node| node.content_neighbour.get(&identifier).cloned());
        let mut stale_hint = None;
        if let Some(hint_node) = hint {
            let holds = self.peer_holds(&hint_node, &identifier);
            let Some(node) = self.core.nodes.get_mut(node_id) else {
                return Ok(());
            };
            node.cache.metrics_mut().track_request_neighbour();
            if holds {
                node.cache.metrics_mut().track_request_neighbour_success(size);
                node.cache.metrics_mut().track_hit(size);
                if !self.outsource_resources {
                    node.cache.store(content)?;
                }
                return Ok(());
            }
            node.content_neighbour.remove(&identifier);
            stale_hint = Some(hint_node);
        }

        // Probe the candidate neighbours in order; stop at the first holder.
        let candidates = self.candidate_neighbours(user_id, node_id, stale_hint.as_deref());
        let mut probed = 0;
        let mut holder = None;
        for candidate in &candidates {
            probed += 1;
            if self.peer_holds(candidate, &identifier) {
                holder = Some(candidate.clone());
                break;
            }
        }

        let Some(node) = self.core.nodes.get_mut(node_id) else {
            return Ok(());
        };
        for _ in 0..probed {
            node.cache.metrics_mut().track_request_neighbour();
        }
        if let Some(holder) = holder {
            node.content_neighbour.insert(identifier, holder);
            node.cache.metrics_mut().track_request_neighbour_success(size);
            node.cache.metrics_mut().track_hit(size);
            if !self.outsource_resources {
                node.cache.store(content)?;
            }
            return Ok(());
        }

        node.cache.metrics_mut().track_miss();
        node.cache.metrics_mut().track_request_origin();
        node.cache.store(content)?;
        node.cache.metrics_mut().track_bytes_origin(size);
        Ok(())
    }

    fn snapshot_metrics(&self) -> BTreeMap<String, CacheMetrics> {
        self.core.snapshot()
    }
}
