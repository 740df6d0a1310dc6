//! The contiguous chunk and its two-tier allocator.
//!
//! A [`Chunk`] owns one zero-initialised byte buffer plus the allocator
//! state that carves it up. Small requests go to the size-class pools,
//! larger ones to the best-fit free list; `free` and `realloc` dispatch
//! on which tier owns the offset.

use crate::error::ArenaError;
use crate::freelist::FreeList;
use crate::pools::{Pools, SMALL_ALLOC_MAX};

/// Allocation alignment in bytes. Every offset the chunk hands out is a
/// multiple of this.
pub const ALIGN_SIZE: u32 = 4;

fn align(size: u32) -> u32 {
    (size + ALIGN_SIZE - 1) & !(ALIGN_SIZE - 1)
}

/// Configuration for a chunk.
#[derive(Clone, Debug)]
pub struct ChunkConfig {
    /// Total chunk size in bytes.
    pub size: u32,
}

impl ChunkConfig {
    /// Default shared chunk size: 13 MiB, sized for a full theme's
    /// stylesheets plus a working set of decoded icons.
    pub const DEFAULT_SIZE: u32 = 13 * 1024 * 1024;

    /// A config with the given chunk size.
    pub fn with_size(size: u32) -> Self {
        Self { size }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: Self::DEFAULT_SIZE,
        }
    }
}

/// One contiguous allocation domain.
pub struct Chunk {
    bytes: Vec<u8>,
    main: FreeList,
    pools: Pools,
}

impl Chunk {
    /// A zero-initialised chunk of `config.size` bytes.
    pub fn new(config: &ChunkConfig) -> Self {
        Self {
            bytes: vec![0; config.size as usize],
            main: FreeList::new(0, config.size),
            pools: Pools::new(),
        }
    }

    /// Allocate `size` bytes. The returned offset is 4-byte aligned.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn alloc(&mut self, size: u32) -> Result<u32, ArenaError> {
        assert!(size > 0, "zero-sized arena allocation");
        let size = align(size);
        let offset = if size <= SMALL_ALLOC_MAX {
            self.pools.alloc(size, &mut self.main)
        } else {
            self.main.alloc(size)
        };
        offset.ok_or(ArenaError::OutOfMemory {
            requested: size,
            free: self.main.free_bytes(),
        })
    }

    /// Release the block at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is not a live block.
    pub fn free(&mut self, offset: u32) {
        if self.pools.owns(offset) {
            self.pools.free(offset);
        } else {
            self.main.free(offset);
        }
    }

    /// Resize the block at `offset` to `new_size`, moving it if it
    /// cannot grow in place. Callers must always use the returned
    /// offset. On failure the original block is untouched.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is not a live block or `new_size` is zero.
    pub fn realloc(&mut self, offset: u32, new_size: u32) -> Result<u32, ArenaError> {
        assert!(new_size > 0, "zero-sized arena reallocation");
        let new_size = align(new_size);
        let old_size = self.allocated_size(offset);

        if new_size <= old_size {
            // Shrink in place. Pool blocks keep their class slot; main
            // blocks give back the tail.
            if self.main.owns(offset) {
                self.main.shrink(offset, new_size);
            }
            return Ok(offset);
        }

        if self.main.owns(offset) && self.main.try_extend(offset, new_size) {
            return Ok(offset);
        }

        // Allocate-copy-free. The old block is released only after the
        // new one exists, so failure leaves the caller's data intact.
        let new_offset = self.alloc(new_size)?;
        let copy = old_size.min(new_size) as usize;
        self.bytes
            .copy_within(offset as usize..offset as usize + copy, new_offset as usize);
        self.free(offset);
        Ok(new_offset)
    }

    /// Actual size of the live block at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is not a live block.
    pub fn allocated_size(&self, offset: u32) -> u32 {
        self.pools
            .allocated_size(offset)
            .or_else(|| self.main.allocated_size(offset))
            .unwrap_or_else(|| panic!("allocated_size of offset {offset} that is not live"))
    }

    /// Total chunk size in bytes.
    pub fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    /// Free bytes remaining in the main allocator.
    pub fn free_bytes(&self) -> u32 {
        self.main.free_bytes()
    }

    /// Bytes currently held by live blocks in both tiers.
    pub fn allocated_bytes(&self) -> u32 {
        self.main.allocated_bytes() + self.pools.allocated_bytes()
    }

    /// Bounds-checked view of `[offset, offset + len)`.
    pub fn get(&self, offset: i64, len: u32) -> Option<&[u8]> {
        if offset < 0 {
            return None;
        }
        let start = offset as usize;
        let end = start.checked_add(len as usize)?;
        self.bytes.get(start..end)
    }

    /// Bounds-checked mutable view of `[offset, offset + len)`.
    pub fn get_mut(&mut self, offset: i64, len: u32) -> Option<&mut [u8]> {
        if offset < 0 {
            return None;
        }
        let start = offset as usize;
        let end = start.checked_add(len as usize)?;
        self.bytes.get_mut(start..end)
    }

    /// Copy `len` bytes from `src` to `dst` within the chunk. Ranges
    /// may overlap.
    ///
    /// # Panics
    ///
    /// Panics if either range runs past the end of the chunk.
    pub fn copy_within(&mut self, src: u32, dst: u32, len: u32) {
        self.bytes
            .copy_within(src as usize..(src + len) as usize, dst as usize);
    }
}
