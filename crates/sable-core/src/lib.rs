//! Core types for the Sable theme resource service.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the currency the rest of the workspace trades in: region tags,
//! offset references, resource keys, the request/response surface of
//! the session protocol, and per-subsystem error types.
//!
//! Nothing in this crate touches memory directly — resolution of an
//! [`OffsetRef`] against a mapped region lives in `sable-arena`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod key;
pub mod offset;
pub mod region;
pub mod relocatable;
pub mod request;

// Public re-exports for the primary API surface.
pub use error::{IndexError, ProtocolError};
pub use key::{AspectMode, IconKey, IconMode, IconSize, StyleKey};
pub use offset::OffsetRef;
pub use region::Region;
pub use relocatable::Relocatable;
pub use request::{
    ClientId, IconOptions, LayerPriority, MultiPartGeometry, PayloadFormat, Request, Response,
    SharedPayload, TableRef, MAX_INDEX_TABLES,
};
