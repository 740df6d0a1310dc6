//! Server configuration.

use sable_arena::ChunkConfig;
use sable_cache::CacheConfig;

/// Configuration for a [`ThemeServer`](crate::ThemeServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// The shared chunk every client maps.
    pub shared: ChunkConfig,
    /// The server's process-private chunk.
    pub local: ChunkConfig,
    /// Capacity of the request channel feeding the server thread.
    pub request_capacity: usize,
    /// Theme active at startup.
    pub default_theme: String,
    /// Icon cache policy.
    pub icon_cache: CacheConfig,
    /// Stylesheet/layout/effect cache policy.
    pub style_cache: CacheConfig,
}

impl ServerConfig {
    /// Default server-side local chunk size: 1 MiB.
    pub const DEFAULT_LOCAL_SIZE: u32 = 1024 * 1024;

    /// Default request channel capacity.
    pub const DEFAULT_REQUEST_CAPACITY: usize = 64;
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shared: ChunkConfig::default(),
            local: ChunkConfig::with_size(Self::DEFAULT_LOCAL_SIZE),
            request_capacity: Self::DEFAULT_REQUEST_CAPACITY,
            default_theme: "sable".to_string(),
            icon_cache: CacheConfig::default(),
            style_cache: CacheConfig::default(),
        }
    }
}
