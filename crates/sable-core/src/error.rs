//! Error types shared across the workspace.
//!
//! Allocation errors live in `sable-arena` next to the allocator; this
//! module holds the index validation and session protocol taxonomies.
//! Fatal invariant violations (double free, refcount underflow) are
//! asserted at the violation site, not represented here.

use std::error::Error;
use std::fmt;

use crate::request::ClientId;

/// Reasons an index table is rejected wholesale.
///
/// A table failing any of these checks is never partially trusted:
/// lookups fall through to ancestor tables as if the table did not
/// exist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexError {
    /// The version field names a layout this reader does not know.
    UnknownVersion {
        /// The version found in the header.
        found: u32,
    },
    /// The table is shorter than its header and item array claim.
    Truncated {
        /// Bytes required by the header.
        needed: usize,
        /// Bytes actually present.
        len: usize,
    },
    /// An item's string offset points outside the string area.
    StringOffsetOutOfRange {
        /// Index of the offending item.
        item: u32,
        /// The out-of-range offset.
        offset: i32,
    },
    /// An item's string runs past the end of the table without a NUL.
    UnterminatedString {
        /// Index of the offending item.
        item: u32,
        /// Offset of the unterminated string.
        offset: i32,
    },
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownVersion { found } => {
                write!(f, "unknown index version {found}")
            }
            Self::Truncated { needed, len } => {
                write!(f, "index truncated: needs {needed} bytes, has {len}")
            }
            Self::StringOffsetOutOfRange { item, offset } => {
                write!(f, "item {item}: string offset {offset} out of range")
            }
            Self::UnterminatedString { item, offset } => {
                write!(f, "item {item}: unterminated string at offset {offset}")
            }
        }
    }
}

impl Error for IndexError {}

/// Session protocol failures.
///
/// A protocol violation is fatal to the offending session only: the
/// server drops that session and its reply channel, and other sessions
/// continue unaffected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// The request's parameters are inconsistent (empty part list,
    /// mismatched geometry, unload of an unowned key, …).
    MalformedRequest {
        /// What was wrong.
        reason: String,
    },
    /// The request named a session the server does not know.
    UnknownSession {
        /// The unrecognised client.
        client: ClientId,
    },
    /// The link to the server is gone (server shut down, or this
    /// session was terminated after a protocol violation).
    Disconnected,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedRequest { reason } => {
                write!(f, "malformed request: {reason}")
            }
            Self::UnknownSession { client } => {
                write!(f, "unknown session {client}")
            }
            Self::Disconnected => write!(f, "session disconnected"),
        }
    }
}

impl Error for ProtocolError {}
