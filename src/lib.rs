//! Cache data structures for edge-content cache simulation.
//!
//! This crate provides the storage side of a trace-driven simulator for
//! edge caching policies: a capacity-bounded store, an LRU cache with a
//! minimum-request admission filter, and a cache evicted by an externally
//! supplied popularity ranking. The replay engine, the caching strategies
//! and the statistics pipeline live in the `edge-simulator` workspace
//! member; this crate knows nothing about traces or nodes beyond the
//! metrics each cache owns.
//!
//! # Which cache backs which policy?
//!
//! | Cache | Eviction driver | Used by |
//! |-------|-----------------|---------|
//! | [`FiniteCache`] | none (fails when full) | building block |
//! | [`LruCache`] | recency + admission filter | LRU, federated, cooperative strategies |
//! | [`ProfileCache`] | external popularity ranking | profile strategy |
//!
//! # Examples
//!
//! ```
//! use edge_cache::config::LruCacheConfig;
//! use edge_cache::{CacheItem, LruCache};
//! use core::num::NonZeroU64;
//!
//! let mut cache = LruCache::init(LruCacheConfig {
//!     capacity: NonZeroU64::new(1024).unwrap(),
//!     min_req_count: 1,
//! });
//!
//! cache.store(CacheItem::new("img/a.png", 300)).unwrap();
//! assert!(cache.retrieve("img/a.png", 1).is_some());
//! assert_eq!(cache.metrics().bytes_used, 300);
//! ```
//!
//! # Modules
//!
//! - [`cache`]: capacity-bounded storage primitives
//! - [`lru`]: LRU eviction with a minimum-request admission filter
//! - [`profile`]: popularity-ranked tiered eviction and user profiles
//! - [`config`]: configuration structures for both cache types
//! - [`metrics`]: per-node counters snapshotted by the simulator

#![no_std]

/// Cached content object value type.
///
/// Provides [`CacheItem`], the identifier/size/last-accessed triple every
/// cache in this crate stores.
pub mod item;

/// Cache metrics.
///
/// Per-node counters for storage, hit/miss behaviour and origin/neighbour
/// traffic.
pub mod metrics;

/// Doubly linked recency list with O(1) reposition by identifier.
///
/// Internal infrastructure for the LRU cache; it relies on raw pointer
/// operations that require careful invariant maintenance and is not part of
/// the public API.
pub(crate) mod list;

/// Capacity-bounded storage primitives shared by all eviction policies.
pub mod cache;

/// Cache configuration structures.
pub mod config;

/// Least Recently Used cache with a minimum-request admission filter.
pub mod lru;

/// Popularity-ranked cache for profile-driven strategies.
pub mod profile;

pub use cache::{FiniteCache, NotEnoughCapacity};
pub use item::CacheItem;
pub use lru::LruCache;
pub use metrics::CacheMetrics;
pub use profile::{ProfileCache, ProfileRanking, UserProfile};
