//! The relocatable vector and its control block.

use std::marker::PhantomData;

use sable_arena::{ArenaError, RegionMap};
use sable_core::{OffsetRef, Region, Relocatable};

/// Capacity of a freshly created vector.
const DEFAULT_CAPACITY: u32 = 4;

/// Arena-resident control block: everything another process needs to
/// traverse the vector, expressed as offsets and counts only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CtrlBlock {
    /// Byte offset of element storage, −1 when capacity is zero.
    data: i64,
    len: u32,
    cap: u32,
    refs: u32,
}

impl Relocatable for CtrlBlock {
    const SIZE: usize = 20;

    fn write_to(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.data.to_le_bytes());
        out[8..12].copy_from_slice(&self.len.to_le_bytes());
        out[12..16].copy_from_slice(&self.cap.to_le_bytes());
        out[16..20].copy_from_slice(&self.refs.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            data: i64::from_le_bytes(buf[0..8].try_into().expect("ctrl block data field")),
            len: u32::from_le_bytes(buf[8..12].try_into().expect("ctrl block len field")),
            cap: u32::from_le_bytes(buf[12..16].try_into().expect("ctrl block cap field")),
            refs: u32::from_le_bytes(buf[16..20].try_into().expect("ctrl block refs field")),
        }
    }
}

/// A growable array whose storage lives in a mapped region.
///
/// Every operation takes the process's [`RegionMap`] explicitly — the
/// handle itself holds only the control block reference and the foreign
/// flag, so it stays plain data.
///
/// Handles are released with [`dispose`](Self::dispose), not `Drop`:
/// destruction needs the region map, and only a process with write
/// access ever runs it. A foreign handle's `dispose` is a no-op.
pub struct RelVec<T: Relocatable> {
    ctrl: OffsetRef<CtrlBlock>,
    /// Shared-but-not-owning: this handle reads storage it can never
    /// free (it was cloned through a read-only mapping, or from another
    /// foreign handle).
    foreign: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Relocatable> RelVec<T> {
    /// An empty vector allocated in `region`.
    pub fn new_in(ctx: &RegionMap, region: Region) -> Result<Self, ArenaError> {
        Self::with_capacity_in(ctx, region, DEFAULT_CAPACITY)
    }

    /// An empty vector with at least `capacity` element slots.
    pub fn with_capacity_in(
        ctx: &RegionMap,
        region: Region,
        capacity: u32,
    ) -> Result<Self, ArenaError> {
        let cap = capacity.max(1);
        let data = ctx.alloc(region, cap * T::SIZE as u32)?;
        let ctrl_off = match ctx.alloc(region, CtrlBlock::SIZE as u32) {
            Ok(off) => off,
            Err(e) => {
                // Roll back so the failure leaves nothing half-built.
                ctx.free(region, data)?;
                return Err(e);
            }
        };
        let ctrl = OffsetRef::new(ctrl_off, region);
        ctx.write(
            ctrl,
            &CtrlBlock {
                data: i64::from(data),
                len: 0,
                cap,
                refs: 1,
            },
        )?;
        Ok(Self {
            ctrl,
            foreign: false,
            _marker: PhantomData,
        })
    }

    /// Rebuild a handle from a control-block reference received from
    /// another process. The handle is foreign: it reads but never owns.
    pub fn from_shared(ctrl: OffsetRef<u8>) -> Self {
        Self {
            ctrl: ctrl.cast(),
            foreign: true,
            _marker: PhantomData,
        }
    }

    /// Rebuild the *owning* handle for a vector this process created
    /// earlier and parked as a bare control-block reference (a cache
    /// entry, typically). The handle takes over the share the original
    /// already held — it does not add one.
    ///
    /// Only the process that owns the region may adopt; a reader uses
    /// [`from_shared`](Self::from_shared).
    pub fn adopt(ctrl: OffsetRef<u8>) -> Self {
        Self {
            ctrl: ctrl.cast(),
            foreign: false,
            _marker: PhantomData,
        }
    }

    /// The control-block reference to hand to another process.
    pub fn shared_ref(&self) -> OffsetRef<u8> {
        self.ctrl.cast()
    }

    /// The region holding this vector's storage.
    pub fn region(&self) -> Region {
        self.ctrl.region()
    }

    /// Whether this handle shares storage it does not own.
    pub fn is_foreign(&self) -> bool {
        self.foreign
    }

    /// Number of elements.
    pub fn len(&self, ctx: &RegionMap) -> Result<u32, ArenaError> {
        Ok(self.ctrl_block(ctx)?.len)
    }

    /// Whether the vector has no elements.
    pub fn is_empty(&self, ctx: &RegionMap) -> Result<bool, ArenaError> {
        Ok(self.ctrl_block(ctx)?.len == 0)
    }

    /// Element slots available without reallocation.
    pub fn capacity(&self, ctx: &RegionMap) -> Result<u32, ArenaError> {
        Ok(self.ctrl_block(ctx)?.cap)
    }

    /// Current share count of the backing store.
    pub fn refcount(&self, ctx: &RegionMap) -> Result<u32, ArenaError> {
        Ok(self.ctrl_block(ctx)?.refs)
    }

    /// Read element `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn get(&self, ctx: &RegionMap, index: u32) -> Result<T, ArenaError> {
        let cb = self.ctrl_block(ctx)?;
        assert!(
            index < cb.len,
            "index {index} out of range (len {})",
            cb.len
        );
        ctx.read(self.element_ref(&cb, index))
    }

    /// Overwrite element `index`. Detaches first: the previous sharers
    /// keep the old value.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn set(&mut self, ctx: &RegionMap, index: u32, value: &T) -> Result<(), ArenaError> {
        let cb = self.detach(ctx, 0)?;
        assert!(
            index < cb.len,
            "index {index} out of range (len {})",
            cb.len
        );
        ctx.write(self.element_ref(&cb, index), value)
    }

    /// First element, if any.
    pub fn first(&self, ctx: &RegionMap) -> Result<Option<T>, ArenaError> {
        let cb = self.ctrl_block(ctx)?;
        if cb.len == 0 {
            return Ok(None);
        }
        ctx.read(self.element_ref(&cb, 0)).map(Some)
    }

    /// Last element, if any.
    pub fn last(&self, ctx: &RegionMap) -> Result<Option<T>, ArenaError> {
        let cb = self.ctrl_block(ctx)?;
        if cb.len == 0 {
            return Ok(None);
        }
        ctx.read(self.element_ref(&cb, cb.len - 1)).map(Some)
    }

    /// Append `value`, doubling capacity on overflow.
    pub fn push(&mut self, ctx: &RegionMap, value: &T) -> Result<(), ArenaError> {
        let mut cb = self.detach(ctx, 1)?;
        if cb.len == cb.cap {
            cb = self.grow(ctx, cb, cb.cap.saturating_mul(2).max(1))?;
        }
        ctx.write(self.element_ref(&cb, cb.len), value)?;
        cb.len += 1;
        ctx.write(self.ctrl, &cb)
    }

    /// Insert `value` at `index`, shifting later elements right.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, ctx: &RegionMap, index: u32, value: &T) -> Result<(), ArenaError> {
        self.insert_many(ctx, index, 1, value)
    }

    /// Insert `count` copies of `value` at `index`.
    ///
    /// Unlike [`push`](Self::push), growth here reserves exactly the
    /// required capacity rather than doubling.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert_many(
        &mut self,
        ctx: &RegionMap,
        index: u32,
        count: u32,
        value: &T,
    ) -> Result<(), ArenaError> {
        if count == 0 {
            return Ok(());
        }
        let mut cb = self.detach(ctx, count)?;
        assert!(
            index <= cb.len,
            "insert index {index} out of range (len {})",
            cb.len
        );
        let needed = cb.len + count;
        if needed > cb.cap {
            cb = self.grow(ctx, cb, needed)?;
        }
        let elem = T::SIZE as u32;
        let data = cb.data as u32;
        ctx.copy_within(
            self.region(),
            data + index * elem,
            data + (index + count) * elem,
            (cb.len - index) * elem,
        )?;
        for i in 0..count {
            ctx.write(self.element_ref(&cb, index + i), value)?;
        }
        cb.len = needed;
        ctx.write(self.ctrl, &cb)
    }

    /// Remove the element at `index`, shifting later elements left.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove(&mut self, ctx: &RegionMap, index: u32) -> Result<(), ArenaError> {
        self.remove_range(ctx, index, 1)
    }

    /// Remove `count` elements starting at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the range runs past the end.
    pub fn remove_range(
        &mut self,
        ctx: &RegionMap,
        index: u32,
        count: u32,
    ) -> Result<(), ArenaError> {
        if count == 0 {
            return Ok(());
        }
        let mut cb = self.detach(ctx, 0)?;
        assert!(
            index + count <= cb.len,
            "remove range [{index}, {}) out of range (len {})",
            index + count,
            cb.len
        );
        let elem = T::SIZE as u32;
        let data = cb.data as u32;
        ctx.copy_within(
            self.region(),
            data + (index + count) * elem,
            data + index * elem,
            (cb.len - index - count) * elem,
        )?;
        cb.len -= count;
        ctx.write(self.ctrl, &cb)
    }

    /// Resize to `new_len`, filling new slots with `fill`.
    pub fn resize(&mut self, ctx: &RegionMap, new_len: u32, fill: &T) -> Result<(), ArenaError> {
        let mut cb = self.detach(ctx, new_len.saturating_sub(self.ctrl_block(ctx)?.len))?;
        if new_len > cb.cap {
            cb = self.grow(ctx, cb, new_len)?;
        }
        for i in cb.len..new_len {
            ctx.write(self.element_ref(&cb, i), fill)?;
        }
        cb.len = new_len;
        ctx.write(self.ctrl, &cb)
    }

    /// Ensure capacity for at least `new_cap` elements.
    pub fn reserve(&mut self, ctx: &RegionMap, new_cap: u32) -> Result<(), ArenaError> {
        let cb = self.detach(ctx, 0)?;
        if new_cap > cb.cap {
            self.grow(ctx, cb, new_cap)?;
        }
        Ok(())
    }

    /// Remove all elements. Capacity is retained.
    pub fn clear(&mut self, ctx: &RegionMap) -> Result<(), ArenaError> {
        let mut cb = self.detach(ctx, 0)?;
        cb.len = 0;
        ctx.write(self.ctrl, &cb)
    }

    /// Whether any element equals `value`.
    pub fn contains(&self, ctx: &RegionMap, value: &T) -> Result<bool, ArenaError>
    where
        T: PartialEq,
    {
        let cb = self.ctrl_block(ctx)?;
        for i in 0..cb.len {
            if ctx.read(self.element_ref(&cb, i))? == *value {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Element-wise equality with `other`.
    pub fn eq_in(&self, ctx: &RegionMap, other: &Self) -> Result<bool, ArenaError>
    where
        T: PartialEq,
    {
        let a = self.ctrl_block(ctx)?;
        let b = other.ctrl_block(ctx)?;
        if a.len != b.len {
            return Ok(false);
        }
        for i in 0..a.len {
            let lhs = ctx.read(self.element_ref(&a, i))?;
            let rhs = ctx.read(other.element_ref(&b, i))?;
            if lhs != rhs {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Copy every element out into a `Vec`.
    pub fn to_vec(&self, ctx: &RegionMap) -> Result<Vec<T>, ArenaError> {
        let cb = self.ctrl_block(ctx)?;
        let mut out = Vec::with_capacity(cb.len as usize);
        for i in 0..cb.len {
            out.push(ctx.read(self.element_ref(&cb, i))?);
        }
        Ok(out)
    }

    /// Iterate over elements by value.
    ///
    /// The region must stay mapped for the iterator's lifetime; it
    /// reads through `ctx` on every step.
    pub fn iter<'a>(&'a self, ctx: &'a RegionMap) -> Result<RelVecIter<'a, T>, ArenaError> {
        let cb = self.ctrl_block(ctx)?;
        Ok(RelVecIter {
            vec: self,
            ctx,
            cb,
            index: 0,
        })
    }

    /// Share this vector.
    ///
    /// In a writable region the backing store is shared and its
    /// refcount bumped. Through a read-only mapping — or from a handle
    /// that is already foreign — the copy shares without owning and
    /// will deep-copy into [`Region::Local`] on its first mutation.
    pub fn clone_in(&self, ctx: &RegionMap) -> Result<Self, ArenaError> {
        if self.foreign || !ctx.is_writable(self.region()) {
            return Ok(Self {
                ctrl: self.ctrl,
                foreign: true,
                _marker: PhantomData,
            });
        }
        let mut cb = self.ctrl_block(ctx)?;
        cb.refs += 1;
        ctx.write(self.ctrl, &cb)?;
        Ok(Self {
            ctrl: self.ctrl,
            foreign: false,
            _marker: PhantomData,
        })
    }

    /// Release this handle's share of the backing store, freeing it
    /// when the last owner lets go. No-op for foreign handles.
    pub fn dispose(self, ctx: &RegionMap) -> Result<(), ArenaError> {
        if self.foreign {
            return Ok(());
        }
        let mut cb = self.ctrl_block(ctx)?;
        assert!(cb.refs >= 1, "relvec refcount underflow");
        cb.refs -= 1;
        if cb.refs == 0 {
            let region = self.region();
            ctx.free(region, cb.data as u32)?;
            ctx.free(region, self.ctrl.offset().expect("live ctrl block"))?;
        } else {
            ctx.write(self.ctrl, &cb)?;
        }
        Ok(())
    }

    fn ctrl_block(&self, ctx: &RegionMap) -> Result<CtrlBlock, ArenaError> {
        ctx.read(self.ctrl)
    }

    fn element_ref(&self, cb: &CtrlBlock, index: u32) -> OffsetRef<T> {
        OffsetRef::<T>::new(cb.data as u32, self.region()).add(index as usize)
    }

    /// Make this handle the sole owner of its storage, copying if it is
    /// shared or foreign. `extra` hints how many elements the caller is
    /// about to add so the copy is sized once.
    fn detach(&mut self, ctx: &RegionMap, extra: u32) -> Result<CtrlBlock, ArenaError> {
        let cb = self.ctrl_block(ctx)?;
        if !self.foreign && cb.refs == 1 {
            return Ok(cb);
        }

        // Foreign handles copy into local storage (this process cannot
        // write the source region); owned-but-shared handles copy
        // within their own region.
        let target = if self.foreign {
            Region::Local
        } else {
            self.region()
        };
        let new_cap = cb.len.saturating_add(extra).max(1);
        let elem = T::SIZE as u32;

        let data = ctx.alloc(target, new_cap * elem)?;
        let ctrl_off = match ctx.alloc(target, CtrlBlock::SIZE as u32) {
            Ok(off) => off,
            Err(e) => {
                ctx.free(target, data)?;
                return Err(e);
            }
        };
        if cb.len > 0 {
            let bytes = ctx.read_bytes(self.region(), cb.data as u32, cb.len * elem)?;
            ctx.write_bytes(target, data, &bytes)?;
        }
        let new_cb = CtrlBlock {
            data: i64::from(data),
            len: cb.len,
            cap: new_cap,
            refs: 1,
        };
        let new_ctrl = OffsetRef::new(ctrl_off, target);
        ctx.write(new_ctrl, &new_cb)?;

        if !self.foreign {
            // refs >= 2 here: detaching never drops the source to zero.
            let mut old = cb;
            old.refs -= 1;
            ctx.write(self.ctrl, &old)?;
        }
        self.ctrl = new_ctrl;
        self.foreign = false;
        Ok(new_cb)
    }

    /// Grow storage to exactly `new_cap` elements. The caller already
    /// holds sole ownership. On failure the vector is unchanged.
    fn grow(
        &mut self,
        ctx: &RegionMap,
        mut cb: CtrlBlock,
        new_cap: u32,
    ) -> Result<CtrlBlock, ArenaError> {
        let new_data = ctx.realloc(
            self.region(),
            cb.data as u32,
            new_cap * T::SIZE as u32,
        )?;
        cb.data = i64::from(new_data);
        cb.cap = new_cap;
        ctx.write(self.ctrl, &cb)?;
        Ok(cb)
    }
}

/// By-value iterator over a [`RelVec`].
pub struct RelVecIter<'a, T: Relocatable> {
    vec: &'a RelVec<T>,
    ctx: &'a RegionMap,
    cb: CtrlBlock,
    index: u32,
}

impl<T: Relocatable> Iterator for RelVecIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.index >= self.cb.len {
            return None;
        }
        let value = self
            .ctx
            .read(self.vec.element_ref(&self.cb, self.index))
            .expect("region unmapped during iteration");
        self.index += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = (self.cb.len - self.index) as usize;
        (rest, Some(rest))
    }
}
