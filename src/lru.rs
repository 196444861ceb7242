//! Least Recently Used cache with a minimum-request admission filter.
//!
//! An [`LruCache`] composes the [`FiniteCache`] storage primitives with a
//! recency list and a per-identifier request counter. Retrieval hits
//! reposition the identifier at the head of the recency list; admission pops
//! identifiers off the tail until the incoming item fits.
//!
//! # Admission filter
//!
//! A missed item is only admitted on its `min_req_count`-th store attempt
//! (default 3). Until then the request counter accumulates; once the item is
//! admitted its counter is cleared. Items larger than the whole cache are
//! never admitted.
//!
//! ```text
//! store("a")   req_count[a]=1   not admitted
//! store("a")   req_count[a]=2   not admitted
//! store("a")   req_count[a]=3   admitted, counter cleared
//! ```
//!
//! Counters for identifiers that never reach the threshold are kept
//! indefinitely.

extern crate alloc;

use alloc::string::String;

use hashbrown::HashMap;

use crate::cache::{FiniteCache, NotEnoughCapacity};
use crate::config::LruCacheConfig;
use crate::item::CacheItem;
use crate::list::RecencyList;
use crate::metrics::CacheMetrics;

/// A byte-capacity LRU cache with a minimum-request admission filter.
///
/// # Examples
///
/// ```
/// use edge_cache::config::LruCacheConfig;
/// use edge_cache::{CacheItem, LruCache};
/// use core::num::NonZeroU64;
///
/// let mut cache = LruCache::init(LruCacheConfig {
///     capacity: NonZeroU64::new(100).unwrap(),
///     min_req_count: 1,
/// });
/// cache.store(CacheItem::new("a", 60)).unwrap();
/// assert!(cache.retrieve("a", 1).is_some());
/// // "b" does not fit next to "a", so "a" is evicted
/// cache.store(CacheItem::new("b", 60)).unwrap();
/// assert!(!cache.has("a"));
/// ```
#[derive(Debug)]
pub struct LruCache {
    inner: FiniteCache,
    recency: RecencyList,
    req_count: HashMap<String, u32>,
    min_req_count: u32,
}

impl LruCache {
    /// Creates an empty cache from a configuration.
    pub fn init(config: LruCacheConfig) -> Self {
        LruCache {
            inner: FiniteCache::new(config.capacity),
            recency: RecencyList::new(),
            req_count: HashMap::new(),
            min_req_count: config.min_req_count.max(1),
        }
    }

    /// Retrieves an item, marking it most recently used.
    pub fn retrieve(&mut self, identifier: &str, at_timestamp: u64) -> Option<&CacheItem> {
        if self.inner.retrieve(identifier, at_timestamp).is_none() {
            return None;
        }
        self.recency.touch(identifier);
        self.inner.peek(identifier)
    }

    /// Looks at an item without touching recency, timestamps or metrics.
    #[inline]
    pub fn peek(&self, identifier: &str) -> Option<&CacheItem> {
        self.inner.peek(identifier)
    }

    /// Returns true if the identifier is stored.
    #[inline]
    pub fn has(&self, identifier: &str) -> bool {
        self.inner.has(identifier)
    }

    /// Offers an item for admission.
    ///
    /// Oversized items and items below the admission threshold are rejected
    /// silently. An admitted item evicts least-recently-used items first if
    /// the remaining capacity is insufficient. Storing an identifier that is
    /// already present leaves the cache untouched.
    ///
    /// An error here means the eviction pass could not free enough space,
    /// which the oversized-item guard makes unreachable unless the recency
    /// list and the content map have gone out of sync.
    pub fn store(&mut self, content: CacheItem) -> Result<(), NotEnoughCapacity> {
        if self.inner.has(&content.identifier) {
            return Ok(());
        }
        if content.size() > self.inner.capacity() {
            // Only admit items that can fit in the cache at all.
            return Ok(());
        }

        let count = self
            .req_count
            .entry(content.identifier.clone())
            .or_insert(0);
        *count += 1;
        if *count < self.min_req_count {
            return Ok(());
        }
        // Once admitted the request count resets.
        self.req_count.remove(&content.identifier);

        if !self.inner.content_fits(&content) {
            self.evict(content.size())?;
        }
        let identifier = content.identifier.clone();
        self.inner.store(content)?;
        self.recency.touch(&identifier);
        Ok(())
    }

    /// Removes least-recently-used items until `no_bytes` are available.
    ///
    /// Cannot free more than the capacity of the node; asking for more fails
    /// with [`NotEnoughCapacity`], as does running out of evictable items
    /// while space is still insufficient.
    fn evict(&mut self, no_bytes: u64) -> Result<(), NotEnoughCapacity> {
        if no_bytes > self.inner.capacity() {
            return Err(NotEnoughCapacity {
                needed: no_bytes,
                capacity: self.inner.capacity(),
            });
        }
        while self.inner.capacity_available() < no_bytes {
            match self.recency.pop_tail() {
                Some(identifier) => self.inner.remove(&identifier),
                None => {
                    return Err(NotEnoughCapacity {
                        needed: no_bytes,
                        capacity: self.inner.capacity(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Counters owned by this node.
    #[inline]
    pub fn metrics(&self) -> &CacheMetrics {
        self.inner.metrics()
    }

    /// Mutable access for callers that account hits, misses and traffic.
    #[inline]
    pub fn metrics_mut(&mut self) -> &mut CacheMetrics {
        self.inner.metrics_mut()
    }

    /// Number of stored items.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if nothing is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Total byte capacity.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.inner.capacity()
    }

    /// Bytes currently occupied.
    #[inline]
    pub fn capacity_used(&self) -> u64 {
        self.inner.capacity_used()
    }

    /// Iterates over the stored items in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CacheItem)> {
        self.inner.iter()
    }

    #[cfg(test)]
    fn recency_is_synced(&self) -> bool {
        self.recency.len() == self.inner.len()
            && self.iter().all(|(id, _)| self.recency.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::num::NonZeroU64;

    fn cache(capacity: u64, min_req_count: u32) -> LruCache {
        LruCache::init(LruCacheConfig {
            capacity: NonZeroU64::new(capacity).unwrap(),
            min_req_count,
        })
    }

    fn offer(cache: &mut LruCache, id: &str, size: u64) {
        cache.store(CacheItem::new(id, size)).unwrap();
    }

    #[test]
    fn test_admission_on_third_request() {
        let mut c = cache(100, 3);
        offer(&mut c, "a", 40);
        assert!(!c.has("a"));
        offer(&mut c, "a", 40);
        assert!(!c.has("a"));
        offer(&mut c, "a", 40);
        assert!(c.has("a"));
        // Counter cleared on admission.
        assert!(!c.req_count.contains_key("a"));
    }

    #[test]
    fn test_min_req_count_one_admits_immediately() {
        let mut c = cache(100, 1);
        offer(&mut c, "a", 40);
        assert!(c.has("a"));
    }

    #[test]
    fn test_oversized_item_never_admitted() {
        let mut c = cache(100, 1);
        for _ in 0..5 {
            offer(&mut c, "big", 101);
        }
        assert!(!c.has("big"));
        assert_eq!(c.capacity_used(), 0);
    }

    #[test]
    fn test_round_robin_admission_evicts_least_recent() {
        // capacity=100, min_req_count=3, items A(40) B(40) C(40) offered as
        // A B C A B C A B C: all three reach the threshold, but C's
        // admission forces the least recently stored item (A) out.
        let mut c = cache(100, 3);
        for _ in 0..3 {
            offer(&mut c, "a", 40);
            offer(&mut c, "b", 40);
            offer(&mut c, "c", 40);
        }
        assert!(!c.has("a"));
        assert!(c.has("b"));
        assert!(c.has("c"));
        assert_eq!(c.capacity_used(), 80);
        assert_eq!(c.metrics().no_items, 2);
        assert_eq!(c.metrics().bytes_used, 80);
        assert!(c.recency_is_synced());
    }

    #[test]
    fn test_retrieve_protects_from_eviction() {
        let mut c = cache(100, 1);
        offer(&mut c, "a", 40);
        offer(&mut c, "b", 40);
        // "a" becomes most recently used, so "b" is the eviction victim.
        assert!(c.retrieve("a", 1).is_some());
        offer(&mut c, "c", 40);
        assert!(c.has("a"));
        assert!(!c.has("b"));
        assert!(c.has("c"));
        assert!(c.recency_is_synced());
    }

    #[test]
    fn test_eviction_frees_multiple_items() {
        let mut c = cache(100, 1);
        offer(&mut c, "a", 30);
        offer(&mut c, "b", 30);
        offer(&mut c, "c", 30);
        offer(&mut c, "d", 90);
        assert!(c.has("d"));
        assert_eq!(c.len(), 1);
        assert_eq!(c.capacity_used(), 90);
        assert!(c.recency_is_synced());
    }

    #[test]
    fn test_store_is_idempotent() {
        let mut c = cache(100, 1);
        offer(&mut c, "a", 40);
        let metrics_before = c.metrics().clone();
        offer(&mut c, "a", 40);
        assert_eq!(c.metrics(), &metrics_before);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_evict_more_than_capacity_fails() {
        let mut c = cache(100, 1);
        offer(&mut c, "a", 40);
        assert!(c.evict(101).is_err());
        // The failed pass must not have touched stored content.
        assert!(c.has("a"));
    }

    #[test]
    fn test_unadmitted_items_leave_no_trace_in_storage() {
        let mut c = cache(100, 3);
        offer(&mut c, "a", 40);
        offer(&mut c, "b", 40);
        assert_eq!(c.capacity_used(), 0);
        assert_eq!(c.metrics().no_items, 0);
        assert_eq!(c.req_count["a"], 1);
        assert_eq!(c.req_count["b"], 1);
    }
}
