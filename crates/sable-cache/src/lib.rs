//! Reference-counted resource cache with keep-alive eviction.
//!
//! The server keeps two instances of one policy: an icon cache keyed by
//! full rendering parameters and a style cache keyed by normalised
//! path. Entries stay resident while referenced; entries whose last
//! reference is released move into a bounded LRU keep-alive window
//! instead of being freed, because the same icon is very often
//! re-requested moments after becoming unused (list views while
//! scrolling).
//!
//! The cache owns bookkeeping only. Payload bytes live in the arena and
//! are freed by the caller, which is why every releasing operation
//! returns the payloads that just became dead.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod cache;
pub mod config;
pub mod metrics;

pub use cache::{CacheError, ResourceCache};
pub use config::CacheConfig;
pub use metrics::CacheMetrics;
