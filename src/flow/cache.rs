//! Bounded flow cache
//!
//! Maps the SHA-256 digest of a canonical flow key to the list of live flows
//! sharing that key, in a splay tree with a hard capacity. Hashing gives
//! uniform tree shape regardless of key text; collisions are negligible at
//! the expected scale.
//!
//! Eviction picks the LAST node of a level-order traversal. Because lookups
//! splay hot keys toward the root, the victim approximates the
//! least-recently-restructured entry. This is a structural policy, not a
//! timestamp LRU, and is kept deliberately.

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::splay::SplayTree;
use super::Flow;

type KeyDigest = [u8; 32];

struct CacheEntry {
    /// Original key text, kept for iteration and logging
    key: String,
    flows: Vec<Flow>,
}

/// Cache counters
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub inserts: u64,
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub stale_removals: u64,
}

/// Fixed-capacity working set of active flows
pub struct BoundedFlowCache {
    tree: SplayTree<KeyDigest, CacheEntry>,
    capacity: usize,
    pub stats: CacheStats,
}

impl BoundedFlowCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            tree: SplayTree::new(),
            capacity: capacity.max(1),
            stats: CacheStats::default(),
        }
    }

    fn digest(key: &str) -> KeyDigest {
        Sha256::digest(key.as_bytes()).into()
    }

    /// Live flows under a key; the access splays the entry toward the root
    pub fn get(&mut self, key: &str) -> Option<&mut Vec<Flow>> {
        let digest = Self::digest(key);
        self.stats.lookups += 1;
        if self.tree.contains(&digest) {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        self.tree.get_mut(&digest).map(|entry| &mut entry.flows)
    }

    /// Existing flow list for a key, or a fresh one-flow entry built from
    /// `make`. Returns the list and whether it was newly created.
    pub fn get_or_create(
        &mut self,
        key: &str,
        make: impl FnOnce() -> Flow,
    ) -> (&mut Vec<Flow>, bool) {
        let digest = Self::digest(key);
        self.stats.lookups += 1;

        let created = if self.tree.contains(&digest) {
            self.stats.hits += 1;
            false
        } else {
            self.stats.misses += 1;
            if self.tree.len() >= self.capacity {
                self.evict_structural_oldest();
            }
            self.stats.inserts += 1;
            self.tree.insert(
                digest,
                CacheEntry {
                    key: key.to_string(),
                    flows: vec![make()],
                },
            );
            true
        };

        let entry = self
            .tree
            .get_mut(&digest)
            .expect("entry ensured by insert above");
        (&mut entry.flows, created)
    }

    /// Create or overwrite the entry for a key, evicting first if the tree
    /// is at capacity and the key is new
    pub fn put(&mut self, key: &str, flows: Vec<Flow>) {
        let digest = Self::digest(key);

        if !self.tree.contains(&digest) && self.tree.len() >= self.capacity {
            self.evict_structural_oldest();
        }

        self.stats.inserts += 1;
        self.tree.insert(
            digest,
            CacheEntry {
                key: key.to_string(),
                flows,
            },
        );
    }

    /// Remove one flow from a key's list; the key disappears once its list
    /// empties. Removing from an absent key or an absent flow is a warning,
    /// not an error.
    pub fn remove(&mut self, key: &str, flow_id: u64) {
        let digest = Self::digest(key);

        let Some(entry) = self.tree.get_mut(&digest) else {
            warn!(key, flow_id, "stale removal: flow key not in cache");
            self.stats.stale_removals += 1;
            return;
        };

        let before = entry.flows.len();
        entry.flows.retain(|f| f.id != flow_id);

        if entry.flows.len() == before {
            warn!(key, flow_id, "stale removal: flow not under its key");
            self.stats.stale_removals += 1;
        }

        if entry.flows.is_empty() {
            self.tree.remove(&digest);
        }
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Entries in level order: hottest keys first, eviction candidate last
    pub fn items(&self) -> impl Iterator<Item = (&str, &[Flow])> {
        self.tree
            .level_order()
            .map(|(_, entry)| (entry.key.as_str(), entry.flows.as_slice()))
    }

    fn evict_structural_oldest(&mut self) {
        if let Some(victim) = self.tree.last_level_order_key() {
            if let Some(entry) = self.tree.remove(&victim) {
                debug!(key = %entry.key, flows = entry.flows.len(), "evicting flow entry at capacity");
                self.stats.evictions += 1;
            }
        }
    }
}
