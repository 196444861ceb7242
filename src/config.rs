//! Cache configuration structures.
//!
//! Configuration structs have all public fields for simple instantiation: no
//! constructors or builder methods, just create the struct with every field
//! set. Capacities are byte counts and must be nonzero.
//!
//! # Examples
//!
//! ```
//! use edge_cache::config::{LruCacheConfig, DEFAULT_MIN_REQ_COUNT};
//! use edge_cache::LruCache;
//! use core::num::NonZeroU64;
//!
//! // 512 MB edge node admitting content on the third request
//! let config = LruCacheConfig {
//!     capacity: NonZeroU64::new(512 * 1024 * 1024).unwrap(),
//!     min_req_count: DEFAULT_MIN_REQ_COUNT,
//! };
//! let cache = LruCache::init(config);
//! ```

use core::num::NonZeroU64;

/// Default number of requests before an item is admitted to an LRU cache.
///
/// Admission on the third request discards one-hit-wonders, which improves
/// the byte hit ratio on Zipfian workloads.
pub const DEFAULT_MIN_REQ_COUNT: u32 = 3;

/// Configuration for an [`LruCache`](crate::LruCache).
#[derive(Debug, Clone, Copy)]
pub struct LruCacheConfig {
    /// Byte capacity of the cache.
    pub capacity: NonZeroU64,
    /// Number of requests an item needs before it is admitted. At least 1;
    /// a value of 1 admits on the first miss.
    pub min_req_count: u32,
}

/// Configuration for a [`ProfileCache`](crate::ProfileCache).
#[derive(Debug, Clone, Copy)]
pub struct ProfileCacheConfig {
    /// Byte capacity of the cache.
    pub capacity: NonZeroU64,
}
