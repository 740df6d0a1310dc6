//! Size-class suballocator for small blocks.
//!
//! Requests at or below [`SMALL_ALLOC_MAX`] bytes are served from
//! per-class free lists instead of the main allocator, avoiding
//! fragmentation from the many small control blocks and strings the
//! theming pipeline produces. Classes carve fresh slabs out of the main
//! allocator when empty; slabs are never returned (freed blocks recycle
//! within their class).

use std::collections::BTreeMap;

use crate::freelist::FreeList;

/// The size classes, smallest first. Requests are rounded up to the
/// nearest class.
pub(crate) const CLASS_SIZES: [u32; 8] = [8, 16, 32, 48, 64, 96, 128, 224];

/// Largest request the suballocator serves; anything bigger goes to the
/// main allocator.
pub(crate) const SMALL_ALLOC_MAX: u32 = 224;

/// Blocks carved per slab.
const CHUNKS_PER_SLAB: u32 = 32;

struct PoolClass {
    size: u32,
    free: Vec<u32>,
}

/// The per-class pools plus a live-block index for free dispatch.
pub(crate) struct Pools {
    classes: [PoolClass; CLASS_SIZES.len()],
    /// Live small blocks: offset → class index.
    live: BTreeMap<u32, u8>,
}

impl Pools {
    pub fn new() -> Self {
        Self {
            classes: CLASS_SIZES.map(|size| PoolClass {
                size,
                free: Vec::new(),
            }),
            live: BTreeMap::new(),
        }
    }

    /// Class index serving `size`, or `None` if the request is too big.
    pub fn class_for(size: u32) -> Option<usize> {
        if size > SMALL_ALLOC_MAX {
            return None;
        }
        CLASS_SIZES.iter().position(|&c| size <= c)
    }

    /// Allocate a small block, carving a new slab from `main` if the
    /// class free list is empty.
    pub fn alloc(&mut self, size: u32, main: &mut FreeList) -> Option<u32> {
        let idx = Self::class_for(size)?;
        if self.classes[idx].free.is_empty() {
            self.carve_slab(idx, main)?;
        }
        let offset = self.classes[idx]
            .free
            .pop()
            .expect("slab carve leaves the class free list non-empty");
        self.live.insert(offset, idx as u8);
        Some(offset)
    }

    /// Release a small block back to its class.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is not a live small block.
    pub fn free(&mut self, offset: u32) -> u32 {
        let idx = self
            .live
            .remove(&offset)
            .unwrap_or_else(|| panic!("free of offset {offset} that is not a live small block"))
            as usize;
        self.classes[idx].free.push(offset);
        self.classes[idx].size
    }

    /// Whether `offset` is a live small block.
    pub fn owns(&self, offset: u32) -> bool {
        self.live.contains_key(&offset)
    }

    /// Class size of the live small block at `offset`, if any.
    pub fn allocated_size(&self, offset: u32) -> Option<u32> {
        self.live
            .get(&offset)
            .map(|&idx| self.classes[idx as usize].size)
    }

    /// Total bytes in live small blocks.
    pub fn allocated_bytes(&self) -> u32 {
        self.live
            .values()
            .map(|&idx| self.classes[idx as usize].size)
            .sum()
    }

    fn carve_slab(&mut self, idx: usize, main: &mut FreeList) -> Option<()> {
        let class_size = self.classes[idx].size;
        let slab = main.alloc(class_size * CHUNKS_PER_SLAB)?;
        for i in 0..CHUNKS_PER_SLAB {
            self.classes[idx].free.push(slab + i * class_size);
        }
        Some(())
    }
}
