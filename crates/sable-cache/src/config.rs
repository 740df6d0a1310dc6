//! Cache policy configuration.
//!
//! The keep-alive and admission thresholds were fixed constants in
//! older theming stacks, tuned for one device profile. Here they are
//! plain configuration with conservative defaults.

/// Policy knobs for one [`ResourceCache`](crate::ResourceCache).
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Byte budget for unreferenced entries held in the keep-alive
    /// window. When kept bytes exceed this, the oldest are purged.
    pub keep_alive_budget: u64,

    /// Entries larger than this are never kept alive: they are cached
    /// only while referenced and freed at the last release, bounding
    /// worst-case memory per oversized item.
    pub max_item_bytes: u32,
}

impl CacheConfig {
    /// Default keep-alive budget: 1 MiB.
    pub const DEFAULT_KEEP_ALIVE_BUDGET: u64 = 1024 * 1024;

    /// Default per-item admission cap: 128 KiB.
    pub const DEFAULT_MAX_ITEM_BYTES: u32 = 128 * 1024;
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            keep_alive_budget: Self::DEFAULT_KEEP_ALIVE_BUDGET,
            max_item_bytes: Self::DEFAULT_MAX_ITEM_BYTES,
        }
    }
}
