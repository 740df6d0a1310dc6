//! Shared-chunk arena allocation for the Sable theme resource service.
//!
//! One contiguous chunk holds every shared resource; clients map the
//! same bytes at their own base addresses and read them through
//! [`OffsetRef`](sable_core::OffsetRef)s, so only offsets ever cross a
//! process boundary.
//!
//! # Architecture
//!
//! ```text
//! RegionMap (per-process context)
//! ├── SharedRegion "shared" — the chunk (writable in the server,
//! │   read-only views in clients)
//! │   └── Chunk
//! │       ├── FreeList  (main allocator, best-fit + coalescing)
//! │       └── Pools     (size-class suballocator, blocks ≤ 224 B)
//! └── SharedRegion "local" — process-private heap chunk
//! ```
//!
//! Allocator bookkeeping is held in host-side maps, not inside the
//! chunk: clients never allocate (the server is the only writer), so no
//! bookkeeping needs to be position-independent and the chunk stays
//! payload-only.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod chunk;
pub mod error;
mod freelist;
mod pools;
pub mod region_map;

// Public re-exports for the primary API surface.
pub use chunk::{Chunk, ChunkConfig};
pub use error::ArenaError;
pub use region_map::{RegionMap, SharedRegion};
