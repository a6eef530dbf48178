use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Shared Memory Optimizer (G): a process-wide keyed cache with per-entry
/// TTL. Grounded on `analysis-orchestrator/src/lib.rs`'s per-symbol
/// `DashMap<String, CacheEntry<T>>` caches, generalized to a single
/// `serde_json::Value`-typed map since keys here span heterogeneous config
/// and detector-state entries (`detector_{id}_patterns`, `cfg_{name}`, ...).
pub struct SharedMemoryOptimizer {
    entries: DashMap<String, Entry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

struct Entry {
    value: serde_json::Value,
    inserted_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

impl Default for SharedMemoryOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedMemoryOptimizer {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        match self.entries.get(key) {
            Some(entry) if !entry.expired() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value, ttl: Duration) {
        self.entries.insert(
            key.into(),
            Entry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Remove all expired entries. Call periodically from the scheduler's
    /// background tick, not on the hot read path.
    pub fn sweep_expired(&self) {
        self.entries.retain(|_, entry| !entry.expired());
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn miss_then_hit_then_expiry() {
        let cache = SharedMemoryOptimizer::new();
        assert!(cache.get("cfg_x").is_none());
        cache.set("cfg_x", serde_json::json!({"a": 1}), Duration::from_millis(50));
        assert!(cache.get("cfg_x").is_some());
        sleep(Duration::from_millis(60));
        assert!(cache.get("cfg_x").is_none());
        assert_eq!(cache.hit_count(), 1);
        assert_eq!(cache.miss_count(), 2);
    }

    #[test]
    fn sweep_expired_removes_stale_entries() {
        let cache = SharedMemoryOptimizer::new();
        cache.set("k", serde_json::json!(1), Duration::from_millis(10));
        sleep(Duration::from_millis(20));
        cache.sweep_expired();
        assert!(cache.is_empty());
    }
}
