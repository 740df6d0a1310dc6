//! Relocatable copy-on-write vector backed by the Sable arena.
//!
//! [`RelVec`] is a growable array whose backing storage lives in a
//! mapped region and is addressed only through offsets, so the same
//! bytes are a valid vector in every process mapping the region. It was
//! written for sharing parsed stylesheet output across processes: the
//! server builds a vector once, clients read it at zero copy, and any
//! client that needs to mutate gets its own private copy transparently.
//!
//! # Implicit sharing
//!
//! Copying a vector shares the backing store and bumps its refcount
//! when this process may write the region. Copying out of a read-only
//! region (the client case) shares *without owning*: the copy is marked
//! foreign, never touches the refcount, and never frees the original.
//! Either way, the first mutation detaches into a private allocation
//! before proceeding, so no mutation is ever visible through another
//! handle.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod relvec;

pub use relvec::{RelVec, RelVecIter};
