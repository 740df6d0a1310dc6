//! Request-level server counters.
//!
//! Per-cache hit/miss detail lives in each cache's own
//! [`CacheMetrics`](sable_cache::CacheMetrics); these counters cover
//! the request surface and arena outcomes.

/// Cumulative counters for one server instance.
#[derive(Clone, Debug, Default)]
pub struct ServerMetrics {
    /// Requests dispatched, including ones that later failed.
    pub requests: u64,
    /// Icon lookups served from the icon cache.
    pub icon_hits: u64,
    /// Icon lookups that decoded fresh.
    pub icon_misses: u64,
    /// Style lookups served from the style cache.
    pub style_hits: u64,
    /// Style lookups that loaded fresh.
    pub style_misses: u64,
    /// Multi-part frames stitched.
    pub stitched_icons: u64,
    /// Requests answered `NotFound`.
    pub not_found: u64,
    /// Requests answered `OutOfMemory`.
    pub oom_failures: u64,
    /// Requests that violated the protocol and killed their session.
    pub protocol_errors: u64,
    /// Theme switches completed.
    pub theme_switches: u64,
    /// Sessions opened.
    pub sessions_opened: u64,
    /// Sessions closed (explicit or after a violation).
    pub sessions_closed: u64,
    /// Arena payload blocks freed back to the chunk.
    pub payloads_freed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = ServerMetrics::default();
        assert_eq!(m.requests, 0);
        assert_eq!(m.icon_hits, 0);
        assert_eq!(m.icon_misses, 0);
        assert_eq!(m.style_hits, 0);
        assert_eq!(m.style_misses, 0);
        assert_eq!(m.stitched_icons, 0);
        assert_eq!(m.not_found, 0);
        assert_eq!(m.oom_failures, 0);
        assert_eq!(m.protocol_errors, 0);
        assert_eq!(m.theme_switches, 0);
        assert_eq!(m.sessions_opened, 0);
        assert_eq!(m.sessions_closed, 0);
        assert_eq!(m.payloads_freed, 0);
    }
}
