//! Popularity-ranked cache for profile-driven strategies.
//!
//! A [`ProfileCache`] uses the same storage primitives as the other caches
//! but is evicted by an **external popularity ranking** instead of recency.
//! The owning strategy rebuilds the ranking periodically from the profiles of
//! the users connected to the node; between refreshes the ranking is frozen.
//!
//! Eviction is tiered: stored items absent from the ranking go first, then
//! ranked items in ascending popularity up to the popularity of the incoming
//! item. If the eligible items cannot free enough space the store is aborted
//! and nothing is evicted.

extern crate alloc;

use alloc::collections::{BTreeSet, VecDeque};
use alloc::string::String;
use alloc::vec::Vec;

use hashbrown::{HashMap, HashSet};

use crate::cache::{FiniteCache, NotEnoughCapacity};
use crate::config::ProfileCacheConfig;
use crate::item::CacheItem;
use crate::metrics::CacheMetrics;

/// Popularity of one identifier within a node's ranking.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProfileRanking {
    /// Number of profile entries referencing the identifier.
    pub popularity: u32,
    /// Users whose profiles reference the identifier, in stable order.
    pub by_users: BTreeSet<String>,
}

/// Bounded FIFO of the resources a user visited most recently.
#[derive(Debug, Clone)]
pub struct UserProfile {
    max_size: usize,
    resources: VecDeque<String>,
    /// Node the user last disconnected from. Only updated on disconnect, so
    /// it may be stale for a currently-connected user.
    pub last_connected_node: Option<String>,
}

impl UserProfile {
    /// Creates an empty profile holding at most `max_size` resources.
    pub fn new(max_size: usize) -> Self {
        UserProfile {
            max_size,
            resources: VecDeque::new(),
            last_connected_node: None,
        }
    }

    /// Records a visited resource, dropping the oldest entry once the
    /// profile is over capacity. Duplicates are not checked.
    pub fn track(&mut self, identifier: &str) {
        self.resources.push_back(String::from(identifier));
        if self.resources.len() > self.max_size {
            self.resources.pop_front();
        }
    }

    /// Iterates over the recorded resources, oldest first.
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().map(|s| s.as_str())
    }

    /// Number of recorded resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// A byte-capacity cache evicted by externally supplied popularity.
///
/// Besides the ranking the cache carries the per-node state the
/// profile-driven strategy needs: the set of currently connected users and
/// the remembered source node of previous neighbour hits.
#[derive(Debug)]
pub struct ProfileCache {
    inner: FiniteCache,
    /// Users currently connected to this node.
    connected_profiles: HashSet<String>,
    /// Remembered source node for a previous neighbour hit, by identifier.
    content_neighbour: HashMap<String, String>,
    /// Ranking sorted ascending by popularity, ties by identifier.
    ranking: Vec<(String, ProfileRanking)>,
}

impl ProfileCache {
    /// Creates an empty cache from a configuration.
    pub fn init(config: ProfileCacheConfig) -> Self {
        ProfileCache {
            inner: FiniteCache::new(config.capacity),
            connected_profiles: HashSet::new(),
            content_neighbour: HashMap::new(),
            ranking: Vec::new(),
        }
    }

    /// Retrieves an item, updating its last-accessed stamp.
    #[inline]
    pub fn retrieve(&mut self, identifier: &str, at_timestamp: u64) -> Option<&CacheItem> {
        self.inner.retrieve(identifier, at_timestamp)
    }

    /// Looks at an item without touching timestamps or metrics.
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
    /// If the item does not fit, items of lower popularity are evicted to
    /// make room; when the eligible candidates cannot free enough bytes the
    /// store is aborted without evicting anything. Storing an identifier that
    /// is already present leaves the cache untouched.
    pub fn store(&mut self, content: CacheItem) -> Result<(), NotEnoughCapacity> {
        if self.inner.has(&content.identifier) {
            return Ok(());
        }
        if !self.inner.content_fits(&content) {
            // Unranked items default to the lowest popularity.
            let popularity = self
                .rank(&content.identifier)
                .map(|r| r.popularity)
                .unwrap_or(0);
            if !self.evict_below(popularity, content.size()) {
                // Not enough lower-ranked items to make room; keep what we
                // have.
                return Ok(());
            }
        }
        self.inner.store(content)
    }

    /// Evicts stored items ranked no higher than `less_popular_than` until
    /// `no_bytes` are available.
    ///
    /// Candidates are taken in eviction order: stored identifiers absent from
    /// the ranking first, then ranked identifiers in ascending popularity.
    /// Returns false, evicting nothing, when the candidates cannot cover the
    /// requested bytes.
    fn evict_below(&mut self, less_popular_than: u32, no_bytes: u64) -> bool {
        let mut bytes_freed = self.inner.capacity_available();

        let mut unranked: Vec<String> = self
            .inner
            .iter()
            .map(|(id, _)| id)
            .filter(|id| self.rank(id).is_none())
            .map(String::from)
            .collect();
        unranked.sort_unstable();

        let mut candidates = unranked;
        for (identifier, rank) in &self.ranking {
            if rank.popularity > less_popular_than {
                // The ranking is pre-sorted, so everything from here on is
                // too popular to evict.
                break;
            }
            if self.inner.has(identifier) {
                candidates.push(identifier.clone());
            }
        }

        let available: u64 = candidates
            .iter()
            .filter_map(|id| self.inner.peek(id))
            .map(CacheItem::size)
            .sum();
        if bytes_freed + available < no_bytes {
            return false;
        }

        let mut next = candidates.into_iter();
        while bytes_freed < no_bytes {
            // Candidates were checked to cover no_bytes, so the iterator
            // cannot run dry here.
            let Some(identifier) = next.next() else {
                return false;
            };
            if let Some(item) = self.inner.peek(&identifier) {
                bytes_freed += item.size();
            }
            self.inner.remove(&identifier);
        }
        true
    }

    /// Rebuilds the ranking from the given user profiles.
    ///
    /// Scans every profile's resource list, counting occurrences per
    /// identifier and collecting the set of users that referenced it, then
    /// replaces the previous ranking in one assignment.
    pub fn update_ranking<'a, I>(&mut self, profiles: I)
    where
        I: IntoIterator<Item = (&'a str, &'a UserProfile)>,
    {
        let mut counts: HashMap<String, ProfileRanking> = HashMap::new();
        for (user, profile) in profiles {
            for identifier in profile.resources() {
                let rank = counts.entry(String::from(identifier)).or_default();
                rank.popularity += 1;
                rank.by_users.insert(String::from(user));
            }
        }
        let mut ranking: Vec<(String, ProfileRanking)> = counts.into_iter().collect();
        ranking.sort_unstable_by(|(id_a, a), (id_b, b)| {
            a.popularity.cmp(&b.popularity).then_with(|| id_a.cmp(id_b))
        });
        self.ranking = ranking;
    }

    /// Looks up an identifier's ranking entry.
    pub fn rank(&self, identifier: &str) -> Option<&ProfileRanking> {
        self.ranking
            .iter()
            .find(|(id, _)| id == identifier)
            .map(|(_, rank)| rank)
    }

    /// Remembered source node for a previous neighbour hit.
    pub fn neighbour_hint(&self, identifier: &str) -> Option<&str> {
        self.content_neighbour.get(identifier).map(String::as_str)
    }

    /// Remembers which node served a neighbour hit for the identifier.
    pub fn remember_neighbour(&mut self, identifier: &str, node: &str) {
        self.content_neighbour
            .insert(String::from(identifier), String::from(node));
    }

    /// Clears a stale neighbour hint.
    pub fn forget_neighbour(&mut self, identifier: &str) {
        self.content_neighbour.remove(identifier);
    }

    /// Marks a user as connected to this node.
    pub fn connect_user(&mut self, user: &str) {
        self.connected_profiles.insert(String::from(user));
    }

    /// Marks a user as no longer connected to this node.
    pub fn disconnect_user(&mut self, user: &str) {
        self.connected_profiles.remove(user);
    }

    /// Returns true if the user is currently connected to this node.
    pub fn is_connected(&self, user: &str) -> bool {
        self.connected_profiles.contains(user)
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

    /// Bytes currently occupied.
    #[inline]
    pub fn capacity_used(&self) -> u64 {
        self.inner.capacity_used()
    }
}
