//! Cache hit/miss and eviction counters.

/// Cumulative counters for one cache instance.
///
/// The server reads these for its own telemetry; nothing inside the
/// cache consumes them.
#[derive(Clone, Debug, Default)]
pub struct CacheMetrics {
    /// Lookups that found a live or kept-alive entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Successful inserts.
    pub insertions: u64,
    /// Inserts rejected because the key already had an entry.
    pub duplicate_inserts: u64,
    /// Entries purged from the keep-alive window by the byte budget.
    pub keep_alive_evictions: u64,
    /// Entries freed at last release because they exceeded the
    /// per-item admission cap.
    pub oversize_releases: u64,
    /// Entries freed at last release because a clear had marked them.
    pub stale_releases: u64,
    /// Full cache clears.
    pub clears: u64,
}
