//! Sable: a shared-memory theme resource cache for mobile UI toolkits.
//!
//! This is the top-level facade crate re-exporting the public API from
//! all Sable sub-crates. One server process holds parsed stylesheets,
//! layout definitions and decoded icons in a shared arena; client
//! processes map the same bytes at their own base addresses and
//! resolve everything through offset references.
//!
//! # Quick start
//!
//! ```rust
//! use sable::prelude::*;
//! use sable::server::{ResourceStore, ThemeDef, ThemeServer, ThemeService};
//! use sable::index::IndexEntry;
//!
//! // Declare a theme with one icon and start the server.
//! let mut store = ResourceStore::new();
//! store.add_theme(
//!     "sable",
//!     ThemeDef::new(vec![IndexEntry {
//!         name: "qtg_mono_back".into(),
//!         folder: "icons".into(),
//!         ext: "svg".into(),
//!         mirrored_ext: None,
//!         default_size: (24, 24),
//!         mirrored_default_size: (-1, -1),
//!     }]),
//! );
//! let service = ThemeService::spawn(ThemeServer::new(Default::default(), store).unwrap());
//!
//! // A client connects, requests an icon, and reads the pixels
//! // straight out of the shared region.
//! let link = service.connect().unwrap();
//! let response = link
//!     .request(Request::IconLookup {
//!         key: IconKey::new("qtg_mono_back", IconSize::new(32, 32)),
//!         options: Default::default(),
//!     })
//!     .unwrap();
//! let Response::Payload(payload) = response else { panic!("lookup failed") };
//! let pixels = link.payload_bytes(&payload).unwrap();
//! assert_eq!(pixels.len(), 32 * 32 * 4);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `sable-core` | Regions, offset references, keys, requests |
//! | [`arena`] | `sable-arena` | The shared chunk, allocators, region maps |
//! | [`relvec`] | `sable-relvec` | Relocatable copy-on-write vector |
//! | [`index`] | `sable-index` | Theme index tables and inheritance chains |
//! | [`cache`] | `sable-cache` | Reference-counted cache with keep-alive |
//! | [`server`] | `sable-server` | Server, sessions, client link, local decode |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types: regions, offset references, keys, the request surface
/// (`sable-core`).
pub use sable_core as types;

/// The shared chunk and per-process region maps (`sable-arena`).
pub use sable_arena as arena;

/// Relocatable copy-on-write vector (`sable-relvec`).
pub use sable_relvec as relvec;

/// Theme index tables, builders and inheritance chains (`sable-index`).
pub use sable_index as index;

/// Reference-counted resource cache with keep-alive (`sable-cache`).
pub use sable_cache as cache;

/// The theme server, session protocol, client link and local decoder
/// (`sable-server`).
pub use sable_server as server;

/// Common imports for typical Sable usage.
///
/// ```rust
/// use sable::prelude::*;
/// ```
pub mod prelude {
    pub use sable_arena::{ArenaError, ChunkConfig, RegionMap};
    pub use sable_cache::{CacheConfig, ResourceCache};
    pub use sable_core::{
        IconKey, IconSize, OffsetRef, ProtocolError, Region, Request, Response, SharedPayload,
        StyleKey,
    };
    pub use sable_index::{IndexChain, ThemeIndex};
    pub use sable_relvec::RelVec;
    pub use sable_server::{ClientLink, ServerConfig, ThemeServer, ThemeService};
}
