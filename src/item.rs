//! Cached content object.
//!
//! A [`CacheItem`] describes one immutable content object as the simulation
//! sees it: a string identifier, a byte size, and the timestamp of the last
//! accounted retrieval. Identity is by identifier only; two items with the
//! same identifier refer to the same content regardless of their access
//! stamps.

extern crate alloc;

use alloc::string::String;

/// An identified content object of known byte size.
///
/// The `last_accessed` stamp is mutated by the owning cache on every
/// accounted retrieval (see
/// [`FiniteCache::retrieve`](crate::FiniteCache::retrieve)); peeks leave it
/// untouched.
///
/// # Examples
///
/// ```
/// use edge_cache::CacheItem;
///
/// let item = CacheItem::new("img/a.png", 2048);
/// assert_eq!(item.size(), 2048);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheItem {
    /// Identifier of the content object. Item identity.
    pub identifier: String,
    /// Size of the content in bytes. Always positive.
    pub byte_size: u64,
    /// Timestamp of the last accounted retrieval.
    pub last_accessed: u64,
}

impl CacheItem {
    /// Creates an item that has not been retrieved yet.
    pub fn new(identifier: impl Into<String>, byte_size: u64) -> Self {
        CacheItem {
            identifier: identifier.into(),
            byte_size,
            last_accessed: 0,
        }
    }

    /// Size of the content in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.byte_size
    }

    /// Updates the last-accessed stamp.
    #[inline]
    pub fn touch(&mut self, at_timestamp: u64) {
        self.last_accessed = at_timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_updates_last_accessed() {
        let mut item = CacheItem::new("a", 10);
        assert_eq!(item.last_accessed, 0);
        item.touch(42);
        assert_eq!(item.last_accessed, 42);
    }

    #[test]
    fn test_identity_ignores_access_stamp() {
        let a = CacheItem::new("a", 10);
        let mut b = CacheItem::new("a", 10);
        b.touch(7);
        assert_eq!(a.identifier, b.identifier);
        assert_ne!(a, b);
    }
}
