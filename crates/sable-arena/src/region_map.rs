//! Per-process region mapping and offset resolution.
//!
//! A [`RegionMap`] is the explicit context object each process
//! constructs once and passes to everything that touches arena memory.
//! The server builds one with a writable shared chunk; each client
//! builds one around a read-only view of the same chunk plus its own
//! private local chunk. There are no process-global singletons.
//!
//! Writes go through the server's map only; clients hold read-only
//! views and can never reach `alloc`/`free`. That asymmetry — one
//! writer, many readers, requests handled to completion one at a time —
//! is what keeps reads coherent without any locking protocol beyond the
//! uncontended `RwLock` around the chunk bytes.

use std::sync::{Arc, RwLock};

use sable_core::{OffsetRef, Region, Relocatable};

use crate::chunk::{Chunk, ChunkConfig};
use crate::error::ArenaError;

/// A handle to one mapped region.
///
/// Cloning shares the mapping; [`read_only_view`](Self::read_only_view)
/// produces the handle a client process attaches with. Whether the
/// region's bytes are shared across "processes" is decided by which
/// chunk the handle wraps, not by this type.
#[derive(Clone)]
pub struct SharedRegion {
    chunk: Arc<RwLock<Chunk>>,
    region: Region,
    writable: bool,
}

impl SharedRegion {
    /// Create a fresh writable mapping of a new chunk.
    pub fn new(region: Region, config: &ChunkConfig) -> Self {
        Self {
            chunk: Arc::new(RwLock::new(Chunk::new(config))),
            region,
            writable: true,
        }
    }

    /// A read-only view of the same chunk, as mapped by another
    /// process.
    pub fn read_only_view(&self) -> Self {
        Self {
            chunk: Arc::clone(&self.chunk),
            region: self.region,
            writable: false,
        }
    }

    /// The region this mapping serves.
    pub fn region(&self) -> Region {
        self.region
    }

    /// Whether this process may mutate the region.
    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

/// The per-process registry of mapped regions.
///
/// Cloning clones the handles, not the chunks: both maps see the same
/// mappings, as two references into one process's address space would.
#[derive(Clone)]
pub struct RegionMap {
    shared: Option<SharedRegion>,
    local: SharedRegion,
}

impl RegionMap {
    /// The server's map: a fresh writable shared chunk plus a private
    /// local chunk.
    pub fn server(shared: &ChunkConfig, local: &ChunkConfig) -> Self {
        Self {
            shared: Some(SharedRegion::new(Region::Shared, shared)),
            local: SharedRegion::new(Region::Local, local),
        }
    }

    /// A client's map: a read-only attachment to the server's shared
    /// chunk plus a private local chunk.
    ///
    /// The attachment itself (how `shared` reached this process) is the
    /// platform's shared-memory mechanism and is assumed established.
    pub fn client(shared: SharedRegion, local: &ChunkConfig) -> Self {
        Self {
            shared: Some(shared.read_only_view()),
            local: SharedRegion::new(Region::Local, local),
        }
    }

    /// A map with no shared attachment at all — local allocation only.
    pub fn standalone(local: &ChunkConfig) -> Self {
        Self {
            shared: None,
            local: SharedRegion::new(Region::Local, local),
        }
    }

    /// The shared mapping, for handing to a connecting client.
    pub fn share(&self) -> Option<SharedRegion> {
        self.shared.as_ref().map(SharedRegion::read_only_view)
    }

    /// Whether `region` is mapped in this process.
    pub fn is_mapped(&self, region: Region) -> bool {
        self.mapping(region).is_ok()
    }

    /// Whether this process may mutate `region`.
    pub fn is_writable(&self, region: Region) -> bool {
        self.mapping(region).map(|m| m.writable).unwrap_or(false)
    }

    fn mapping(&self, region: Region) -> Result<&SharedRegion, ArenaError> {
        match region {
            Region::Shared => self
                .shared
                .as_ref()
                .ok_or(ArenaError::RegionUnmapped { region }),
            Region::Local => Ok(&self.local),
        }
    }

    fn writable_mapping(&self, region: Region) -> Result<&SharedRegion, ArenaError> {
        let mapping = self.mapping(region)?;
        if !mapping.writable {
            return Err(ArenaError::ReadOnly { region });
        }
        Ok(mapping)
    }

    /// Allocate `size` bytes in `region`.
    pub fn alloc(&self, region: Region, size: u32) -> Result<u32, ArenaError> {
        let mapping = self.writable_mapping(region)?;
        mapping.chunk.write().expect("region lock poisoned").alloc(size)
    }

    /// Release the block at `offset` in `region`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is not a live block.
    pub fn free(&self, region: Region, offset: u32) -> Result<(), ArenaError> {
        let mapping = self.writable_mapping(region)?;
        mapping.chunk.write().expect("region lock poisoned").free(offset);
        Ok(())
    }

    /// Resize the block at `offset`; callers must use the returned
    /// offset.
    pub fn realloc(&self, region: Region, offset: u32, new_size: u32) -> Result<u32, ArenaError> {
        let mapping = self.writable_mapping(region)?;
        mapping
            .chunk
            .write()
            .expect("region lock poisoned")
            .realloc(offset, new_size)
    }

    /// Actual size of the live block at `offset`.
    pub fn allocated_size(&self, region: Region, offset: u32) -> Result<u32, ArenaError> {
        let mapping = self.mapping(region)?;
        Ok(mapping
            .chunk
            .read()
            .expect("region lock poisoned")
            .allocated_size(offset))
    }

    /// Free bytes remaining in `region`'s main allocator.
    pub fn free_bytes(&self, region: Region) -> Result<u32, ArenaError> {
        let mapping = self.mapping(region)?;
        Ok(mapping.chunk.read().expect("region lock poisoned").free_bytes())
    }

    /// Read one value through an offset reference.
    pub fn read<T: Relocatable>(&self, at: OffsetRef<T>) -> Result<T, ArenaError> {
        let region = at.region();
        let offset = at.offset().ok_or(ArenaError::NullRef { region })?;
        self.with_bytes(region, offset, T::SIZE as u32, |bytes| T::read_from(bytes))
    }

    /// Write one value through an offset reference.
    pub fn write<T: Relocatable>(&self, at: OffsetRef<T>, value: &T) -> Result<(), ArenaError> {
        let region = at.region();
        let offset = at.offset().ok_or(ArenaError::NullRef { region })?;
        let mapping = self.writable_mapping(region)?;
        let mut chunk = mapping.chunk.write().expect("region lock poisoned");
        let size = chunk.size();
        let bytes = chunk
            .get_mut(i64::from(offset), T::SIZE as u32)
            .ok_or(ArenaError::OutOfBounds {
                region,
                offset: i64::from(offset),
                len: T::SIZE as u32,
                size,
            })?;
        value.write_to(bytes);
        Ok(())
    }

    /// Run `f` over the bytes at `[offset, offset + len)` without
    /// copying them out.
    pub fn with_bytes<R>(
        &self,
        region: Region,
        offset: u32,
        len: u32,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, ArenaError> {
        let mapping = self.mapping(region)?;
        let chunk = mapping.chunk.read().expect("region lock poisoned");
        let bytes = chunk
            .get(i64::from(offset), len)
            .ok_or(ArenaError::OutOfBounds {
                region,
                offset: i64::from(offset),
                len,
                size: chunk.size(),
            })?;
        Ok(f(bytes))
    }

    /// Copy the bytes at `[offset, offset + len)` out of the region.
    pub fn read_bytes(&self, region: Region, offset: u32, len: u32) -> Result<Vec<u8>, ArenaError> {
        self.with_bytes(region, offset, len, |bytes| bytes.to_vec())
    }

    /// Write `bytes` into the region at `offset`.
    pub fn write_bytes(&self, region: Region, offset: u32, bytes: &[u8]) -> Result<(), ArenaError> {
        let mapping = self.writable_mapping(region)?;
        let mut chunk = mapping.chunk.write().expect("region lock poisoned");
        let size = chunk.size();
        let dst = chunk
            .get_mut(i64::from(offset), bytes.len() as u32)
            .ok_or(ArenaError::OutOfBounds {
                region,
                offset: i64::from(offset),
                len: bytes.len() as u32,
                size,
            })?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    /// Copy `len` bytes from `src` to `dst` within `region`; ranges may
    /// overlap.
    pub fn copy_within(
        &self,
        region: Region,
        src: u32,
        dst: u32,
        len: u32,
    ) -> Result<(), ArenaError> {
        if len == 0 {
            return Ok(());
        }
        let mapping = self.writable_mapping(region)?;
        let mut chunk = mapping.chunk.write().expect("region lock poisoned");
        let size = chunk.size();
        let end = src.max(dst) as u64 + u64::from(len);
        if end > u64::from(size) {
            return Err(ArenaError::OutOfBounds {
                region,
                offset: i64::from(src.max(dst)),
                len,
                size,
            });
        }
        chunk.copy_within(src, dst, len);
        Ok(())
    }
}
