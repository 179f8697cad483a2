//! TTL-bounded LRU stores for resolved inheritance state.
//!
//! Two instances back the inheritance resolver: one keyed by template name
//! holding hierarchies, one keyed by `"{name}::{context_hash}"` holding
//! resolved templates. Entries expire after a TTL and the store evicts the
//! least recently used entry at capacity. A miss and an expired hit are
//! indistinguishable to callers; expired entries are removed lazily.
//!
//! Each store serializes access through one `RwLock`. Lookups update the
//! entry's `last_access` and the hit/miss counters, so access accounting
//! runs under the write lock rather than upgrading a read lock.

use std::{
    sync::RwLock,
    time::{Duration, Instant},
};

use ahash::AHashMap;
use tracing::{debug, trace};

/// Hit/miss counters for one store.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit; 0 when no lookups happened.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct CacheEntry<T> {
    value: T,
    created_at: Instant,
    last_access: Instant,
    access_count: u64,
}

#[derive(Debug)]
struct CacheInner<T> {
    entries: AHashMap<String, CacheEntry<T>>,
    hits: u64,
    misses: u64,
    last_sweep: Instant,
}

/// One TTL + LRU store.
///
/// `T` is cheap to clone (the stores hold `Arc`ed payloads); `get` hands out
/// an owned clone so the lock is never held across caller work.
#[derive(Debug)]
pub struct TtlCache<T: Clone> {
    name: &'static str,
    inner: RwLock<CacheInner<T>>,
    ttl: Duration,
    max_entries: usize,
    sweep_interval: Duration,
}

impl<T: Clone> TtlCache<T> {
    #[must_use]
    pub fn new(name: &'static str, ttl: Duration, max_entries: usize) -> Self {
        Self {
            name,
            inner: RwLock::new(CacheInner {
                entries: AHashMap::new(),
                hits: 0,
                misses: 0,
                last_sweep: Instant::now(),
            }),
            ttl,
            max_entries,
            // sweep lazily at TTL cadence; correctness only needs the
            // per-access expiry check
            sweep_interval: ttl,
        }
    }

    /// Looks up `key`, refreshing its recency on a hit.
    ///
    /// An entry past its TTL counts as a miss and is removed on the spot.
    pub fn get(&self, key: &str) -> Option<T> {
        let mut guard = self.write_lock();
        self.maybe_sweep(&mut guard);
        let inner = &mut *guard;

        let now = Instant::now();
        let live = inner
            .entries
            .get(key)
            .is_some_and(|entry| now.duration_since(entry.last_access) <= self.ttl);
        if !live {
            let expired = inner.entries.remove(key).is_some();
            inner.misses += 1;
            trace!(cache = self.name, key, expired, "cache miss");
            return None;
        }

        let (value, accesses) = {
            let entry = inner.entries.get_mut(key)?;
            entry.last_access = now;
            entry.access_count += 1;
            (entry.value.clone(), entry.access_count)
        };
        inner.hits += 1;
        trace!(cache = self.name, key, accesses, "cache hit");
        Some(value)
    }

    /// Inserts `value` under `key`, evicting the least recently used entry
    /// when the store is full. LRU ties break on the oldest `created_at`.
    pub fn insert(&self, key: impl Into<String>, value: T) {
        let key = key.into();
        let mut inner = self.write_lock();
        let now = Instant::now();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_entries {
            let victim = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.last_access, entry.created_at))
                .map(|(key, _)| key.clone());
            if let Some(victim) = victim {
                debug!(cache = self.name, key = %victim, "evicting least recently used entry");
                inner.entries.remove(&victim);
            }
        }

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                last_access: now,
                access_count: 0,
            },
        );
    }

    /// Removes one entry by exact key.
    pub fn remove(&self, key: &str) {
        self.write_lock().entries.remove(key);
    }

    /// Removes every entry the predicate matches. Used for dependency
    /// invalidation ("base template changed, drop every descendant").
    pub fn invalidate_where(&self, mut predicate: impl FnMut(&str, &T) -> bool) -> usize {
        let mut inner = self.write_lock();
        let before = inner.entries.len();
        inner.entries.retain(|key, entry| !predicate(key, &entry.value));
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(cache = self.name, removed, "invalidated entries");
        }
        removed
    }

    /// Drops all expired entries now, regardless of the sweep interval.
    pub fn sweep(&self) -> usize {
        let mut inner = self.write_lock();
        self.sweep_now(&mut inner)
    }

    /// Removes everything and resets the counters.
    pub fn clear(&self) {
        let mut inner = self.write_lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.entries.len(),
        }
    }

    fn maybe_sweep(&self, inner: &mut CacheInner<T>) {
        if inner.last_sweep.elapsed() >= self.sweep_interval {
            self.sweep_now(inner);
        }
    }

    fn sweep_now(&self, inner: &mut CacheInner<T>) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| now.duration_since(entry.last_access) <= ttl);
        inner.last_sweep = now;
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(cache = self.name, removed, "swept expired entries");
        }
        removed
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, CacheInner<T>> {
        self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
