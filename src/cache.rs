//! In-memory TTL cache shared by handlers

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

pub const CATEGORY_TREE: &str = "categories:tree";
pub const MANUFACTURERS: &str = "manufacturers:all";
pub const WAREHOUSE_TREE: &str = "warehouse:tree";
/// Every key derived from the location hierarchy.
pub const WAREHOUSE_PREFIX: &str = "warehouse:";

/// Each invalidation bumps a generation counter. A fill that started under an
/// older generation is dropped by [`TtlCache::insert_if_current`], so a read
/// racing a write cannot put the pre-write value back.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, (Instant, V)>>,
    generation: AtomicU64,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()), generation: AtomicU64::new(0) }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((stored, value)) if stored.elapsed() < self.ttl => return Some(value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop it so the map doesn't grow with dead keys.
        let mut entries = self.entries.write().await;
        if matches!(entries.get(key), Some((stored, _)) if stored.elapsed() >= self.ttl) {
            entries.remove(key);
        }
        None
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Stores the value only if nothing was invalidated since `seen` was
    /// read. Returns whether it was stored.
    pub async fn insert_if_current(&self, key: K, value: V, seen: u64) -> bool {
        let mut entries = self.entries.write().await;
        if self.generation.load(Ordering::Acquire) != seen {
            return false;
        }
        entries.insert(key, (Instant::now(), value));
        true
    }

    pub async fn invalidate(&self, key: &K) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

impl<V: Clone> TtlCache<String, V> {
    pub async fn invalidate_prefix(&self, prefix: &str) {
        let mut entries = self.entries.write().await;
        entries.retain(|k, _| !k.starts_with(prefix));
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}
