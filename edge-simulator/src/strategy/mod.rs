//! Caching strategies.
//!
//! A strategy owns one cache per edge node and decides how requests are
//! served: locally, from a neighbour cache, or from origin. The runner
//! drives it through the [`Strategy`] trait; per-event accounting happens on
//! the metrics of the node(s) a request touches.
//!
//! All strategies share the same base state: an append-only history of the
//! nodes each user connected to, and a registry of per-node caches. The
//! registry is ordered so metric snapshots and node iteration are
//! deterministic for a given trace.

use std::collections::BTreeMap;
use std::collections::HashMap;

use edge_cache::{CacheItem, CacheMetrics, NotEnoughCapacity};

mod cooperative;
mod federated;
mod lru;
mod profiles;

pub use cooperative::CooperativeLruStrategy;
pub use federated::FederatedStrategy;
pub use lru::LruStrategy;
pub use profiles::ProfilesStrategy;

/// Capability set every caching strategy implements.
///
/// The currently connected node of a user is the last entry of their connect
/// history; connects append even when the node is unchanged and disconnects
/// never remove entries. Cooperative strategies rely on that history to know
/// a user's recent neighbourhood.
pub trait Strategy {
    /// Records that a user connected to a node.
    fn on_connect(&mut self, user_id: &str, node_id: &str);

    /// Records that a user disconnected from a node. Default no-op.
    fn on_disconnect(&mut self, user_id: &str, node_id: &str) {
        let _ = (user_id, node_id);
    }

    /// Advances the logical simulation tick. Default no-op.
    fn on_iteration(&mut self, iteration: u64) {
        let _ = iteration;
    }

    /// Serves one request at a node, updating the metrics of every node the
    /// request touches.
    fn on_request(
        &mut self,
        user_id: &str,
        node_id: &str,
        content: CacheItem,
        at_timestamp: u64,
    ) -> Result<(), NotEnoughCapacity>;

    /// Returns a deep copy of every node's metrics.
    fn snapshot_metrics(&self) -> BTreeMap<String, CacheMetrics>;
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn on_connect(&mut self, user_id: &str, node_id: &str) {
        (**self).on_connect(user_id, node_id);
    }

    fn on_disconnect(&mut self, user_id: &str, node_id: &str) {
        (**self).on_disconnect(user_id, node_id);
    }

    fn on_iteration(&mut self, iteration: u64) {
        (**self).on_iteration(iteration);
    }

    fn on_request(
        &mut self,
        user_id: &str,
        node_id: &str,
        content: CacheItem,
        at_timestamp: u64,
    ) -> Result<(), NotEnoughCapacity> {
        (**self).on_request(user_id, node_id, content, at_timestamp)
    }

    fn snapshot_metrics(&self) -> BTreeMap<String, CacheMetrics> {
        (**self).snapshot_metrics()
    }
}

/// Per-node cache types a [`StrategyCore`] can hold.
pub(crate) trait NodeCache {
    /// The node's metric counters.
    fn metrics(&self) -> &CacheMetrics;
}

impl NodeCache for edge_cache::LruCache {
    fn metrics(&self) -> &CacheMetrics {
        self.metrics()
    }
}

impl NodeCache for edge_cache::ProfileCache {
    fn metrics(&self) -> &CacheMetrics {
        self.metrics()
    }
}

/// State shared by every strategy: the per-node cache registry and the
/// append-only user connect history.
#[derive(Debug)]
pub(crate) struct StrategyCore<C> {
    /// Cache per node, in stable order.
    pub(crate) nodes: BTreeMap<String, C>,
    /// Every node each user has connected to, in connect order.
    pub(crate) user_node_map: HashMap<String, Vec<String>>,
}

impl<C: NodeCache> StrategyCore<C> {
    pub(crate) fn new(nodes: BTreeMap<String, C>) -> Self {
        StrategyCore {
            nodes,
            user_node_map: HashMap::new(),
        }
    }

    /// Appends a node to the user's connect history.
    pub(crate) fn connect(&mut self, user_id: &str, node_id: &str) {
        self.user_node_map
            .entry(user_id.to_owned())
            .or_default()
            .push(node_id.to_owned());
    }

    /// The node the user connected to most recently, if any.
    pub(crate) fn last_connected(&self, user_id: &str) -> Option<&str> {
        self.user_node_map
            .get(user_id)
            .and_then(|history| history.last())
            .map(String::as_str)
    }

    /// The nodes a user visited before their current one, most recent
    /// first.
    ///
    /// Takes the last `trail_length + 1` entries of the connect history,
    /// drops the most recent (the currently connected node), and
    /// deduplicates keeping the first occurrence in most-recent-first order.
    pub(crate) fn latest_nodes(&self, user_id: &str, trail_length: usize) -> Vec<String> {
        let Some(history) = self.user_node_map.get(user_id) else {
            return Vec::new();
        };
        if history.is_empty() {
            return Vec::new();
        }
        let end = history.len() - 1;
        let start = end.saturating_sub(trail_length);
        let mut latest = Vec::new();
        for node in history[start..end].iter().rev() {
            if !latest.contains(node) {
                latest.push(node.clone());
            }
        }
        latest
    }

    /// Deep copy of every node's metrics, in stable node order.
    pub(crate) fn snapshot(&self) -> BTreeMap<String, CacheMetrics> {
        self.nodes
            .iter()
            .map(|(node_id, cache)| (node_id.clone(), cache.metrics().clone()))
            .collect()
    }
}
