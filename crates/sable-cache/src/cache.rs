//! The cache proper.

use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;

use sable_core::SharedPayload;

use crate::config::CacheConfig;
use crate::metrics::CacheMetrics;

/// Errors from cache mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheError {
    /// `insert` found an existing entry for the key. The caller's
    /// freshly built payload lost the race and must be freed by the
    /// caller; the existing entry stays canonical.
    Duplicate,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate => write!(f, "key already has a cache entry"),
        }
    }
}

impl Error for CacheError {}

struct CacheEntry {
    payload: SharedPayload,
    refcount: u32,
    last_used: u64,
    /// May enter the keep-alive window at refcount zero. False for
    /// oversized items and no-keep-alive requests.
    keepable: bool,
    /// Marked by `clear` while referenced: freed at last release
    /// instead of entering the keep-alive window.
    stale: bool,
    /// Currently in the keep-alive window.
    kept: bool,
}

/// A reference-counted key→payload map with deferred eviction.
///
/// Entries with `refcount > 0` are never evicted. At refcount zero an
/// entry either enters the keep-alive LRU window (bounded by
/// [`CacheConfig::keep_alive_budget`]) or is handed back to the caller
/// for freeing. Every method that can retire entries returns the
/// payloads that just became dead — the cache never frees arena memory
/// itself.
pub struct ResourceCache<K> {
    config: CacheConfig,
    entries: IndexMap<K, CacheEntry>,
    /// Keys whose entries hit refcount zero, oldest release first.
    /// Lazily pruned: a key is skipped if its entry was revived or
    /// removed since being pushed.
    keep_alive: VecDeque<K>,
    kept_bytes: u64,
    use_counter: u64,
    metrics: CacheMetrics,
}

impl<K: Eq + Hash + Clone> ResourceCache<K> {
    /// An empty cache with the given policy.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: IndexMap::new(),
            keep_alive: VecDeque::new(),
            kept_bytes: 0,
            use_counter: 0,
            metrics: CacheMetrics::default(),
        }
    }

    /// Look up `key`, taking one reference on a hit.
    ///
    /// A kept-alive entry is revived: it leaves the keep-alive window
    /// and is referenced again.
    pub fn lookup(&mut self, key: &K) -> Option<SharedPayload> {
        self.use_counter += 1;
        let counter = self.use_counter;
        let Some(entry) = self.entries.get_mut(key) else {
            self.metrics.misses += 1;
            return None;
        };
        if entry.kept {
            entry.kept = false;
            self.kept_bytes -= u64::from(entry.payload.len);
        }
        entry.refcount += 1;
        entry.last_used = counter;
        self.metrics.hits += 1;
        Some(entry.payload)
    }

    /// Insert a freshly produced entry with refcount 1.
    ///
    /// Fails with [`CacheError::Duplicate`] if the key already has an
    /// entry — the existing entry is canonical and the caller frees its
    /// redundant payload. `keepable: false` excludes the entry from the
    /// keep-alive window regardless of size.
    pub fn insert(
        &mut self,
        key: K,
        payload: SharedPayload,
        keepable: bool,
    ) -> Result<(), CacheError> {
        if self.entries.contains_key(&key) {
            self.metrics.duplicate_inserts += 1;
            return Err(CacheError::Duplicate);
        }
        self.use_counter += 1;
        let keepable = keepable && payload.len <= self.config.max_item_bytes;
        self.entries.insert(
            key,
            CacheEntry {
                payload,
                refcount: 1,
                last_used: self.use_counter,
                keepable,
                stale: false,
                kept: false,
            },
        );
        self.metrics.insertions += 1;
        Ok(())
    }

    /// Release one reference on `key`.
    ///
    /// At refcount zero the entry enters the keep-alive window (which
    /// may push older entries over the budget) or dies immediately if
    /// it is oversized, marked stale, or not keepable. Returns the
    /// payloads that became dead; the caller frees their arena blocks.
    ///
    /// # Panics
    ///
    /// Panics on a key with no entry or an entry with refcount zero —
    /// both mean a reference was released twice, which is cache
    /// corruption, not a recoverable condition.
    pub fn release(&mut self, key: &K) -> Vec<SharedPayload> {
        let entry = self
            .entries
            .get_mut(key)
            .expect("release of a key with no cache entry");
        assert!(entry.refcount > 0, "cache refcount underflow");
        entry.refcount -= 1;
        if entry.refcount > 0 {
            return Vec::new();
        }

        if entry.stale || !entry.keepable {
            let stale = entry.stale;
            let payload = entry.payload;
            self.entries.shift_remove(key);
            if stale {
                self.metrics.stale_releases += 1;
            } else {
                self.metrics.oversize_releases += 1;
            }
            return vec![payload];
        }

        entry.kept = true;
        self.kept_bytes += u64::from(entry.payload.len);
        self.keep_alive.push_back(key.clone());
        self.evict_to_budget()
    }

    /// Purge keep-alive entries, oldest first, until kept bytes fit the
    /// budget. Returns the purged payloads.
    pub fn evict_to_budget(&mut self) -> Vec<SharedPayload> {
        let mut dead = Vec::new();
        while self.kept_bytes > self.config.keep_alive_budget {
            let Some(key) = self.keep_alive.pop_front() else {
                break;
            };
            // Skip deque entries whose key was revived or removed since
            // being pushed.
            let still_kept = self.entries.get(&key).map(|e| e.kept).unwrap_or(false);
            if !still_kept {
                continue;
            }
            let entry = self.entries.shift_remove(&key).expect("kept entry exists");
            self.kept_bytes -= u64::from(entry.payload.len);
            self.metrics.keep_alive_evictions += 1;
            dead.push(entry.payload);
        }
        dead
    }

    /// Drop every unreferenced entry now and mark referenced ones
    /// stale, so they die at their last release instead of entering the
    /// keep-alive window. Returns the payloads freed now.
    ///
    /// This is the theme-switch path: in-flight client references stay
    /// valid; nothing is yanked out from under them.
    pub fn clear(&mut self) -> Vec<SharedPayload> {
        self.metrics.clears += 1;
        let mut dead = Vec::new();
        self.entries.retain(|_, entry| {
            if entry.refcount == 0 {
                dead.push(entry.payload);
                false
            } else {
                entry.stale = true;
                true
            }
        });
        self.keep_alive.clear();
        self.kept_bytes = 0;
        dead
    }

    /// Remove an unreferenced entry outright (kept-alive or not).
    /// Returns its payload, or `None` if the key is absent or still
    /// referenced.
    pub fn remove(&mut self, key: &K) -> Option<SharedPayload> {
        let entry = self.entries.get(key)?;
        if entry.refcount > 0 {
            return None;
        }
        let entry = self.entries.shift_remove(key).expect("entry just seen");
        if entry.kept {
            self.kept_bytes -= u64::from(entry.payload.len);
        }
        Some(entry.payload)
    }

    /// Whether `key` has an entry (referenced or kept alive).
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Current refcount of `key`'s entry, if present.
    pub fn refcount(&self, key: &K) -> Option<u32> {
        self.entries.get(key).map(|e| e.refcount)
    }

    /// Number of entries, referenced plus kept alive.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total payload bytes of all entries.
    pub fn resident_bytes(&self) -> u64 {
        self.entries
            .values()
            .map(|e| u64::from(e.payload.len))
            .sum()
    }

    /// Payload bytes currently in the keep-alive window.
    pub fn kept_bytes(&self) -> u64 {
        self.kept_bytes
    }

    /// Cumulative counters.
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}
