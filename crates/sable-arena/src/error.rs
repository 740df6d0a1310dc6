//! Arena-specific error types.

use std::error::Error;
use std::fmt;

use sable_core::Region;

/// Errors that can occur during arena operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The chunk has no free block large enough for the request.
    ///
    /// Always recoverable: the caller fails the single request or falls
    /// back to a process-local allocation path.
    OutOfMemory {
        /// Number of bytes requested.
        requested: u32,
        /// Free bytes remaining in the chunk.
        free: u32,
    },
    /// The region is not mapped in this process.
    RegionUnmapped {
        /// The unmapped region.
        region: Region,
    },
    /// A resolution ran past the end of the mapped chunk.
    OutOfBounds {
        /// The region the access targeted.
        region: Region,
        /// Starting byte offset of the access.
        offset: i64,
        /// Length of the access in bytes.
        len: u32,
        /// Size of the mapped chunk.
        size: u32,
    },
    /// A null offset reference was resolved.
    NullRef {
        /// The region the null reference was tagged with.
        region: Region,
    },
    /// A mutating operation was attempted through a read-only mapping.
    ReadOnly {
        /// The region mapped read-only.
        region: Region,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested, free } => {
                write!(
                    f,
                    "arena out of memory: requested {requested} bytes, {free} free"
                )
            }
            Self::RegionUnmapped { region } => {
                write!(f, "region {region} is not mapped in this process")
            }
            Self::OutOfBounds {
                region,
                offset,
                len,
                size,
            } => {
                write!(
                    f,
                    "access [{offset}, {offset}+{len}) out of bounds in {region} (size {size})"
                )
            }
            Self::NullRef { region } => {
                write!(f, "resolved a null reference in {region}")
            }
            Self::ReadOnly { region } => {
                write!(f, "region {region} is mapped read-only in this process")
            }
        }
    }
}

impl Error for ArenaError {}
