//! Per-node cache metrics.
//!
//! Every simulated node owns one [`CacheMetrics`] value. The storage
//! primitives account for item and byte counts; the strategies account for
//! hits, misses, and origin/neighbour traffic. All counters are cumulative
//! over a simulation run and are snapshotted (cloned) whenever statistics are
//! collected, so a snapshot reflects exactly the state after the preceding
//! instruction.
//!
//! Two counters may also decrease: `no_items` and `bytes_used` track the
//! current cache content and shrink on eviction. The invariant `bytes_used ==
//! Σ size(item)` over the owning cache holds at every observation point.

/// Cumulative counters for a single node.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheMetrics {
    /// Number of items currently stored.
    pub no_items: u64,
    /// Number of requests served from this cache.
    pub hits: u64,
    /// Number of requests this cache could not serve.
    pub misses: u64,
    /// Bytes currently stored.
    pub bytes_used: u64,
    /// Bytes served from the local cache.
    pub cache_bytes: u64,
    /// Bytes fetched from origin.
    pub origin_bytes: u64,
    /// Bytes fetched from neighbour caches.
    pub neighbour_bytes: u64,
    /// Requests forwarded to origin.
    pub requests_to_origin: u64,
    /// Probes sent to neighbour caches.
    pub requests_to_neighbours: u64,
    /// Probes answered by a neighbour cache.
    pub requests_to_neighbours_success: u64,
}

impl CacheMetrics {
    /// Creates a zeroed metrics value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that an item of `no_bytes` entered the cache.
    pub fn track_item_stored(&mut self, no_bytes: u64) {
        self.no_items += 1;
        self.bytes_used += no_bytes;
    }

    /// Records that an item of `no_bytes` left the cache.
    pub fn track_item_removed(&mut self, no_bytes: u64) {
        debug_assert!(self.no_items > 0 && self.bytes_used >= no_bytes);
        self.no_items -= 1;
        self.bytes_used -= no_bytes;
    }

    /// Records a request served locally.
    pub fn track_hit(&mut self, no_bytes: u64) {
        self.hits += 1;
        self.cache_bytes += no_bytes;
    }

    /// Records a request that missed locally.
    pub fn track_miss(&mut self) {
        self.misses += 1;
    }

    /// Records bytes transferred from origin.
    pub fn track_bytes_origin(&mut self, no_bytes: u64) {
        self.origin_bytes += no_bytes;
    }

    /// Records a request forwarded to origin.
    pub fn track_request_origin(&mut self) {
        self.requests_to_origin += 1;
    }

    /// Records a probe sent to a neighbour cache.
    pub fn track_request_neighbour(&mut self) {
        self.requests_to_neighbours += 1;
    }

    /// Records a probe answered by a neighbour, transferring `no_bytes`.
    pub fn track_request_neighbour_success(&mut self, no_bytes: u64) {
        self.requests_to_neighbours_success += 1;
        self.neighbour_bytes += no_bytes;
    }

    /// Total accounted requests at this node.
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Total bytes served to users, from cache and origin combined.
    pub fn total_bytes(&self) -> u64 {
        self.cache_bytes + self.origin_bytes
    }

    /// Fraction of requests served locally, 0.0 when no requests were made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_remove_balance() {
        let mut m = CacheMetrics::new();
        m.track_item_stored(100);
        m.track_item_stored(50);
        assert_eq!(m.no_items, 2);
        assert_eq!(m.bytes_used, 150);
        m.track_item_removed(100);
        assert_eq!(m.no_items, 1);
        assert_eq!(m.bytes_used, 50);
    }

    #[test]
    fn test_hit_miss_totals() {
        let mut m = CacheMetrics::new();
        m.track_hit(10);
        m.track_miss();
        m.track_miss();
        assert_eq!(m.total_requests(), 3);
        assert_eq!(m.cache_bytes, 10);
        assert_eq!(m.hit_rate(), 1.0 / 3.0);
    }

    #[test]
    fn test_neighbour_success_never_exceeds_probes() {
        let mut m = CacheMetrics::new();
        m.track_request_neighbour();
        m.track_request_neighbour();
        m.track_request_neighbour_success(25);
        assert!(m.requests_to_neighbours_success <= m.requests_to_neighbours);
        assert_eq!(m.neighbour_bytes, 25);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut m = CacheMetrics::new();
        m.track_hit(10);
        let snapshot = m.clone();
        m.track_miss();
        assert_eq!(snapshot.misses, 0);
        assert_eq!(m.misses, 1);
    }
}
