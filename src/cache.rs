//! Finite cache storage primitives.
//!
//! [`FiniteCache`] is the storage layer shared by every eviction policy: a
//! map from identifier to [`CacheItem`] with byte-capacity accounting and a
//! [`CacheMetrics`] value owned by the cache. It stores and removes items but
//! never decides *what* to evict; the policies built on top of it
//! ([`LruCache`](crate::LruCache), [`ProfileCache`](crate::ProfileCache)) do.
//!
//! The capacity invariant `capacity_used <= capacity` holds at all times;
//! a store that would break it fails with [`NotEnoughCapacity`].

extern crate alloc;

use alloc::string::String;
use core::error::Error;
use core::fmt;
use core::num::NonZeroU64;

use hashbrown::HashMap;

use crate::item::CacheItem;
use crate::metrics::CacheMetrics;

/// Error returned when an item does not fit in the remaining capacity.
///
/// In the LRU policies this is prevented by pre-eviction; seeing it surface
/// from one of them indicates a bookkeeping bug rather than a full cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotEnoughCapacity {
    /// Bytes that were needed.
    pub needed: u64,
    /// Total capacity of the cache.
    pub capacity: u64,
}

impl fmt::Display for NotEnoughCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "not enough capacity: needed {} bytes of {}",
            self.needed, self.capacity
        )
    }
}

impl Error for NotEnoughCapacity {}

/// A capacity-bounded store of content objects.
#[derive(Debug)]
pub struct FiniteCache {
    /// Total byte capacity.
    capacity: NonZeroU64,
    /// Bytes currently occupied by stored items.
    capacity_used: u64,
    /// Stored items by identifier.
    content: HashMap<String, CacheItem>,
    /// Counters owned by this node.
    metrics: CacheMetrics,
}

impl FiniteCache {
    /// Creates an empty cache with the given byte capacity.
    pub fn new(capacity: NonZeroU64) -> Self {
        FiniteCache {
            capacity,
            capacity_used: 0,
            content: HashMap::new(),
            metrics: CacheMetrics::new(),
        }
    }

    /// Total byte capacity.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity.get()
    }

    /// Bytes currently occupied.
    #[inline]
    pub fn capacity_used(&self) -> u64 {
        self.capacity_used
    }

    /// Bytes still available.
    #[inline]
    pub fn capacity_available(&self) -> u64 {
        self.capacity.get() - self.capacity_used
    }

    /// Returns true if the item fits in the remaining capacity.
    #[inline]
    pub fn content_fits(&self, content: &CacheItem) -> bool {
        self.capacity_available() >= content.size()
    }

    /// Number of stored items.
    #[inline]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Returns true if nothing is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Returns true if the identifier is stored.
    #[inline]
    pub fn has(&self, identifier: &str) -> bool {
        self.content.contains_key(identifier)
    }

    /// Counters owned by this node.
    #[inline]
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Mutable access for callers that account hits, misses and traffic.
    #[inline]
    pub fn metrics_mut(&mut self) -> &mut CacheMetrics {
        &mut self.metrics
    }

    /// Stores an item under its identifier.
    ///
    /// Storing an identifier that is already present is a no-op; the cache
    /// and its metrics are left untouched. Fails with [`NotEnoughCapacity`]
    /// when the item does not fit in the remaining capacity.
    pub fn store(&mut self, content: CacheItem) -> Result<(), NotEnoughCapacity> {
        if self.content.contains_key(&content.identifier) {
            return Ok(());
        }
        if !self.content_fits(&content) {
            return Err(NotEnoughCapacity {
                needed: content.size(),
                capacity: self.capacity.get(),
            });
        }
        self.capacity_used += content.size();
        self.metrics.track_item_stored(content.size());
        self.content.insert(content.identifier.clone(), content);
        Ok(())
    }

    /// Retrieves an item, updating its last-accessed stamp.
    ///
    /// This is the metric-affecting path: callers account the hit or miss on
    /// the node that served the request.
    pub fn retrieve(&mut self, identifier: &str, at_timestamp: u64) -> Option<&CacheItem> {
        let content = self.content.get_mut(identifier)?;
        content.touch(at_timestamp);
        Some(content)
    }

    /// Looks at an item without touching recency, timestamps or metrics.
    ///
    /// Used by cooperative strategies probing a peer cache; the probe must
    /// not influence the peer's own caching decisions.
    pub fn peek(&self, identifier: &str) -> Option<&CacheItem> {
        self.content.get(identifier)
    }

    /// Removes an item, adjusting the capacity and item counters.
    ///
    /// Removing an identifier that is not stored is logged and otherwise a
    /// no-op.
    pub fn remove(&mut self, identifier: &str) {
        let Some(item) = self.content.remove(identifier) else {
            log::warn!("trying to remove item that is not in the cache: {identifier}");
            return;
        };
        self.capacity_used -= item.size();
        self.metrics.track_item_removed(item.size());
    }

    /// Iterates over the stored items in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CacheItem)> {
        self.content.iter().map(|(k, v)| (k.as_str(), v))
    }
}
