//! Immutable theme index tables.
//!
//! A theme index is a read-only binary table mapping resource names to
//! their metadata: header, sorted fixed-size item array, string blob.
//! Lookup is a binary search over the name strings. Up to four tables
//! chain into an inheritance list (active theme first, ancestors
//! after); the first table that knows a name wins.
//!
//! Tables are validated before first use and rejected wholesale on any
//! inconsistency — a corrupt table behaves exactly like an absent one.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod builder;
pub mod chain;
pub mod table;

// Public re-exports for the primary API surface.
pub use builder::{IndexBuilder, IndexEntry};
pub use chain::{ChainHit, IndexChain, TableSource};
pub use table::{IndexItem, ThemeIndex, HEADER_LEN, INDEX_VERSION_1, ITEM_LEN};
