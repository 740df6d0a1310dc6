//! Test fixtures for Sable development.
//!
//! Canned icon declarations, key constructors, index table builders
//! and region-map helpers shared by the crates' test suites.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use sable_arena::{ChunkConfig, RegionMap};
use sable_core::{IconKey, IconSize, Region, TableRef};
use sable_index::{IndexBuilder, IndexEntry};

/// An icon declaration with the stock folder/extension and a 24×24
/// default size.
pub fn icon_entry(name: &str) -> IndexEntry {
    icon_entry_sized(name, 24, 24)
}

/// An icon declaration with an explicit default size.
pub fn icon_entry_sized(name: &str, width: i32, height: i32) -> IndexEntry {
    IndexEntry {
        name: name.to_string(),
        folder: "icons".to_string(),
        ext: "svg".to_string(),
        mirrored_ext: None,
        default_size: (width, height),
        mirrored_default_size: (-1, -1),
    }
}

/// An icon key with default rendering parameters.
pub fn icon_key(name: &str, width: i32, height: i32) -> IconKey {
    IconKey::new(name, IconSize::new(width, height))
}

/// Index table bytes for the given names, stock metadata.
pub fn index_bytes(names: &[&str]) -> Vec<u8> {
    let mut builder = IndexBuilder::new();
    for name in names {
        builder.add(icon_entry(name));
    }
    builder.build()
}

/// A server-side region map with small test-sized chunks.
pub fn test_region_map() -> RegionMap {
    RegionMap::server(
        &ChunkConfig::with_size(1 << 16),
        &ChunkConfig::with_size(1 << 14),
    )
}

/// Write table bytes into the map's shared chunk and return the ref.
pub fn store_table(ctx: &RegionMap, bytes: &[u8]) -> TableRef {
    let offset = ctx
        .alloc(Region::Shared, bytes.len() as u32)
        .expect("test chunk large enough for fixture table");
    ctx.write_bytes(Region::Shared, offset, bytes)
        .expect("fixture table write");
    TableRef {
        offset,
        len: bytes.len() as u32,
        region: Region::Shared,
        drive: 'Z',
    }
}
