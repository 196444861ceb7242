//! Independent per-node LRU caching.
//!
//! The baseline strategy: every node runs its own LRU cache with the
//! admission filter and never talks to its neighbours. Misses always go to
//! origin.

use std::collections::BTreeMap;

use edge_cache::config::LruCacheConfig;
use edge_cache::{CacheItem, CacheMetrics, LruCache, NotEnoughCapacity};

use super::{Strategy, StrategyCore};

/// One independent LRU cache per node.
#[derive(Debug)]
pub struct LruStrategy {
    core: StrategyCore<LruCache>,
}

impl LruStrategy {
    /// Creates a strategy with one cache per `(node id, byte capacity)`
    /// pair.
    pub fn new(nodes: &[(String, LruCacheConfig)]) -> Self {
        let nodes: BTreeMap<String, LruCache> = nodes
            .iter()
            .map(|(node_id, config)| (node_id.clone(), LruCache::init(*config)))
            .collect();
        LruStrategy {
            core: StrategyCore::new(nodes),
        }
    }
}

impl Strategy for LruStrategy {
    fn on_connect(&mut self, user_id: &str, node_id: &str) {
        self.core.connect(user_id, node_id);
    }

    fn on_request(
        &mut self,
        _user_id: &str,
        node_id: &str,
        content: CacheItem,
        at_timestamp: u64,
    ) -> Result<(), NotEnoughCapacity> {
        let Some(node) = self.core.nodes.get_mut(node_id) else {
            log::warn!("request for unknown node {node_id}, skipping");
            return Ok(());
        };
        let size = content.size();
        if node.retrieve(&content.identifier, at_timestamp).is_some() {
            node.metrics_mut().track_hit(size);
        } else {
            node.metrics_mut().track_miss();
            node.metrics_mut().track_request_origin();
            node.store(content)?;
            node.metrics_mut().track_bytes_origin(size);
        }
        Ok(())
    }

    fn snapshot_metrics(&self) -> BTreeMap<String, CacheMetrics> {
        self.core.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::num::NonZeroU64;

    fn strategy(capacity: u64, min_req_count: u32) -> LruStrategy {
        let config = LruCacheConfig {
            capacity: NonZeroU64::new(capacity).unwrap(),
            min_req_count,
        };
        LruStrategy::new(&[("cdn1".to_owned(), config), ("cdn2".to_owned(), config)])
    }

    fn request(s: &mut LruStrategy, node: &str, id: &str, size: u64, ts: u64) {
        s.on_request("u1", node, CacheItem::new(id, size), ts).unwrap();
    }

    #[test]
    fn test_miss_then_hit() {
        let mut s = strategy(100, 1);
        request(&mut s, "cdn1", "x", 40, 0);
        request(&mut s, "cdn1", "x", 40, 1);

        let stats = s.snapshot_metrics();
        let cdn1 = &stats["cdn1"];
        assert_eq!(cdn1.misses, 1);
        assert_eq!(cdn1.hits, 1);
        assert_eq!(cdn1.requests_to_origin, 1);
        assert_eq!(cdn1.origin_bytes, 40);
        assert_eq!(cdn1.cache_bytes, 40);
        // The other node saw nothing.
        assert_eq!(stats["cdn2"].total_requests(), 0);
    }

    #[test]
    fn test_admission_filter_scenario() {
        // A B C A B C A B C with 40-byte items against 100 bytes: all nine
        // requests miss, three items are admitted, one is evicted again.
        let mut s = strategy(100, 3);
        let mut ts = 0;
        for _ in 0..3 {
            for id in ["a", "b", "c"] {
                request(&mut s, "cdn1", id, 40, ts);
                ts += 1;
            }
        }
        let stats = s.snapshot_metrics();
        let cdn1 = &stats["cdn1"];
        assert_eq!(cdn1.hits, 0);
        assert_eq!(cdn1.misses, 9);
        assert_eq!(cdn1.requests_to_origin, 9);
        // Two items remain: the third admission evicted the first.
        assert_eq!(cdn1.no_items, 2);
        assert_eq!(cdn1.bytes_used, 80);
    }

    #[test]
    fn test_nodes_are_independent() {
        let mut s = strategy(100, 1);
        request(&mut s, "cdn1", "x", 40, 0);
        request(&mut s, "cdn2", "x", 40, 1);

        let stats = s.snapshot_metrics();
        // Same object misses on both nodes; no cooperation.
        assert_eq!(stats["cdn1"].misses, 1);
        assert_eq!(stats["cdn2"].misses, 1);
        assert_eq!(stats["cdn1"].requests_to_neighbours, 0);
        assert_eq!(stats["cdn2"].requests_to_neighbours, 0);
    }

    #[test]
    fn test_hits_plus_misses_equals_requests() {
        let mut s = strategy(200, 1);
        let ids = ["a", "b", "a", "c", "a", "b"];
        for (ts, id) in ids.iter().enumerate() {
            request(&mut s, "cdn1", id, 30, ts as u64);
        }
        let stats = s.snapshot_metrics();
        assert_eq!(
            stats["cdn1"].hits + stats["cdn1"].misses,
            ids.len() as u64
        );
    }
}
