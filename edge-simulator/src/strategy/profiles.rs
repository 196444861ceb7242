//! Profile-ranked cooperative caching.
//!
//! Every user carries a bounded FIFO profile of the resources they visited.
//! Each node periodically rebuilds a popularity ranking from the profiles of
//! its currently connected users; the ranking drives both eviction (see
//! [`ProfileCache`]) and peer discovery: on a miss, the node asks the last
//! known locations of the users that rank the object.
//!
//! The peer candidates rely on `last_connected_node`, which is only updated
//! on disconnect, so for a currently-connected peer it may be stale. That is
//! deliberate; the ranking refresh has the same once-per-timeout coarseness.

use std::collections::{BTreeMap, HashMap};

use edge_cache::config::ProfileCacheConfig;
use edge_cache::{CacheItem, CacheMetrics, NotEnoughCapacity, ProfileCache, UserProfile};

use super::{Strategy, StrategyCore};

/// Cooperative caching ranked by connected users' profiles.
#[derive(Debug)]
pub struct ProfilesStrategy {
    core: StrategyCore<ProfileCache>,
    profiles: HashMap<String, UserProfile>,
    /// Rankings refresh on iterations divisible by this.
    ranking_timeout: u64,
    /// Maximum resources remembered per user.
    profile_size: usize,
}

impl ProfilesStrategy {
    /// Creates a strategy with one profile cache per `(node id, config)`
    /// pair.
    pub fn new(
        nodes: &[(String, ProfileCacheConfig)],
        ranking_timeout: u64,
        profile_size: usize,
    ) -> Self {
        let nodes: BTreeMap<String, ProfileCache> = nodes
            .iter()
            .map(|(node_id, config)| (node_id.clone(), ProfileCache::init(*config)))
            .collect();
        ProfilesStrategy {
            core: StrategyCore::new(nodes),
            profiles: HashMap::new(),
            ranking_timeout: ranking_timeout.max(1),
            profile_size,
        }
    }

    /// Last known locations of the users that rank the identifier at this
    /// node, excluding the node itself.
    fn ranked_peers(&self, node_id: &str, identifier: &str) -> Vec<String> {
        let Some(node) = self.core.nodes.get(node_id) else {
            return Vec::new();
        };
        let Some(rank) = node.rank(identifier) else {
            return Vec::new();
        };
        rank.by_users
            .iter()
            .filter_map(|user| self.profiles.get(user))
            .filter_map(|profile| profile.last_connected_node.clone())
            .filter(|peer| peer != node_id)
            .collect()
    }
}

impl Strategy for ProfilesStrategy {
    fn on_connect(&mut self, user_id: &str, node_id: &str) {
        self.core.connect(user_id, node_id);
        if let Some(node) = self.core.nodes.get_mut(node_id) {
            node.connect_user(user_id);
        }
    }

    /// Remembers where the user was last seen and drops them from the
    /// node's connected set.
    ///
    /// The node is derived from the connect history; a disconnect for a user
    /// that never connected is tolerated and ignored.
    fn on_disconnect(&mut self, user_id: &str, _node_id: &str) {
        let Some(from_node) = self.core.last_connected(user_id).map(String::from) else {
            return;
        };
        self.profiles
            .entry(user_id.to_owned())
            .or_insert_with(|| UserProfile::new(self.profile_size))
            .last_connected_node = Some(from_node.clone());
        if let Some(node) = self.core.nodes.get_mut(&from_node) {
            node.disconnect_user(user_id);
        }
    }

    fn on_iteration(&mut self, iteration: u64) {
        if iteration % self.ranking_timeout != 0 {
            return;
        }
        for node in self.core.nodes.values_mut() {
            let connected: Vec<(&str, &UserProfile)> = self
                .profiles
                .iter()
                .filter(|(user, _)| node.is_connected(user))
                .map(|(user, profile)| (user.as_str(), profile))
                .collect();
            node.update_ranking(connected);
        }
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

        self.profiles
            .entry(user_id.to_owned())
            .or_insert_with(|| UserProfile::new(self.profile_size))
            .track(&identifier);

        {
            let Some(node) = self.core.nodes.get_mut(node_id) else {
                log::warn!("request for unknown node {node_id}, skipping");
                return Ok(());
            };
            if node.retrieve(&identifier, at_timestamp).is_some() {
                node.metrics_mut().track_hit(size);
                return Ok(());
            }
        }

        // Re-probe the neighbour that served this object last time.
        let hint = self
            .core
            .nodes
            .get(node_id)
            .and_then(|node| node.neighbour_hint(&identifier).map(String::from));
        if let Some(hint_node) = hint {
            let holds = self
                .core
                .nodes
                .get(&hint_node)
                .is_some_and(|peer| peer.peek(&identifier).is_some());
            let Some(node) = self.core.nodes.get_mut(node_id) else {
                return Ok(());
            };
            node.metrics_mut().track_request_neighbour();
            if holds {
                node.metrics_mut().track_request_neighbour_success(size);
                node.metrics_mut().track_hit(size);
                node.store(content)?;
                return Ok(());
            }
            node.forget_neighbour(&identifier);
        }

        // Ask the last known locations of the users that rank this object.
        let peers = self.ranked_peers(node_id, &identifier);
        let mut probed = 0;
        let mut holder = None;
        for peer in &peers {
            probed += 1;
            let holds = self
                .core
                .nodes
                .get(peer)
                .is_some_and(|cache| cache.peek(&identifier).is_some());
            if holds {
                holder = Some(peer.clone());
                break;
            }
        }

        let Some(node) = self.core.nodes.get_mut(node_id) else {
            return Ok(());
        };
        for _ in 0..probed {
            node.metrics_mut().track_request_neighbour();
        }
        if let Some(holder) = holder {
            node.remember_neighbour(&identifier, &holder);
            node.metrics_mut().track_request_neighbour_success(size);
            node.metrics_mut().track_hit(size);
            node.store(content)?;
            return Ok(());
        }

        node.metrics_mut().track_miss();
        node.metrics_mut().track_request_origin();
        node.store(content)?;
        node.metrics_mut().track_bytes_origin(size);
        Ok(())
    }

    fn snapshot_metrics(&self) -> BTreeMap<String, CacheMetrics> {
        self.core.snapshot()
    }
}
