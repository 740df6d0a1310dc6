//! Request and response types for the session protocol.
//!
//! Each client request is a synchronous operation-code + parameters
//! pair; each response is either a resolved payload reference, a table
//! list, an acknowledgement, or an explicit failure status. A response
//! never carries a partially valid offset.

use smallvec::SmallVec;

use crate::key::{IconKey, IconSize, StyleKey};
use crate::offset::OffsetRef;
use crate::region::Region;

/// Maximum number of chained theme index tables (active theme plus
/// ancestors).
pub const MAX_INDEX_TABLES: usize = 4;

/// Identifies one connected client session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Stylesheet stacking layer, lowest priority first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerPriority {
    /// Toolkit built-in styles.
    Core,
    /// Operator customisation layer.
    Operator,
    /// Active theme layer.
    #[default]
    Theme,
    /// Application-supplied overrides.
    Application,
}

/// What the bytes behind a payload reference contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PayloadFormat {
    /// Decoded pixel data, 4 bytes per pixel, row-major.
    Rgba32,
    /// Parsed stylesheet rules.
    StyleRules,
    /// Widget layout definition.
    LayoutDef,
    /// System effect definition.
    EffectData,
}

/// A resolved resource: where its bytes live and what they are.
///
/// Every payload handed to a client carries one reference count that
/// the client must release exactly once, either by an explicit unload
/// or implicitly at disconnect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SharedPayload {
    /// Start of the payload bytes.
    pub data: OffsetRef<u8>,
    /// Payload length in bytes.
    pub len: u32,
    /// Content tag.
    pub format: PayloadFormat,
}

/// Location of one immutable theme index table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableRef {
    /// Byte offset of the table within `region`.
    pub offset: u32,
    /// Table length in bytes.
    pub len: u32,
    /// The region holding the table.
    pub region: Region,
    /// Drive tag of the theme package the table was built from.
    pub drive: char,
}

/// Per-request icon load options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IconOptions {
    /// Serve and reference-count the icon normally but never hold it in
    /// the keep-alive window once unreferenced.
    pub no_keep_alive: bool,
}

/// Placement of the pieces of a multi-part icon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiPartGeometry {
    /// Top-left target position of each piece, matching the part list.
    pub positions: Vec<(i32, i32)>,
    /// Rendered size of each piece, matching the part list.
    pub part_sizes: Vec<IconSize>,
    /// Size of the stitched frame.
    pub target_size: IconSize,
}

/// A session protocol request.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    /// Look up (parse on miss) a stylesheet.
    StylesheetLookup {
        /// Stylesheet file path.
        path: String,
        /// Stacking layer the sheet belongs to.
        priority: LayerPriority,
    },
    /// Look up one layout section of a widget definition file.
    LayoutLookup {
        /// Definition file path.
        path: String,
        /// Layout name within the file.
        layout: String,
        /// Section within the layout.
        section: String,
    },
    /// Look up (decode on miss) a single icon rendition.
    IconLookup {
        /// Full rendering key.
        key: IconKey,
        /// Load options.
        options: IconOptions,
    },
    /// Look up a stitched multi-part icon frame.
    MultiPartIconLookup {
        /// Piece names, in placement order.
        parts: Vec<String>,
        /// Placement of each piece.
        geometry: MultiPartGeometry,
        /// Key of the stitched frame.
        key: IconKey,
        /// Load options.
        options: IconOptions,
    },
    /// Fetch the active theme's index table chain.
    ThemeIndexLookup,
    /// Switch the active theme.
    ThemeSelect {
        /// Name of the theme to activate.
        name: String,
    },
    /// Look up a system effect definition.
    EffectLookup {
        /// Effect definition file.
        file: String,
    },
    /// Release one icon reference previously granted to this session.
    UnloadIcon {
        /// The key that was looked up.
        key: IconKey,
    },
    /// Release one stylesheet/layout/effect reference.
    UnloadStylesheet {
        /// The key that was looked up.
        key: StyleKey,
    },
}

impl Request {
    /// Short operation name for diagnostics.
    pub fn opcode(&self) -> &'static str {
        match self {
            Request::StylesheetLookup { .. } => "StylesheetLookup",
            Request::LayoutLookup { .. } => "LayoutLookup",
            Request::IconLookup { .. } => "IconLookup",
            Request::MultiPartIconLookup { .. } => "MultiPartIconLookup",
            Request::ThemeIndexLookup => "ThemeIndexLookup",
            Request::ThemeSelect { .. } => "ThemeSelect",
            Request::EffectLookup { .. } => "EffectLookup",
            Request::UnloadIcon { .. } => "UnloadIcon",
            Request::UnloadStylesheet { .. } => "UnloadStylesheet",
        }
    }
}

/// A session protocol response.
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    /// The resolved resource. Grants the caller one reference.
    Payload(SharedPayload),
    /// The active index table chain, most-derived theme first.
    IndexTables(SmallVec<[TableRef; MAX_INDEX_TABLES]>),
    /// The operation completed with nothing to return.
    Ack,
    /// The resource is absent from index, cache and loaders.
    NotFound,
    /// The arena could not hold the resource; the caller may fall back
    /// to a process-local load path.
    OutOfMemory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_names() {
        let req = Request::ThemeSelect {
            name: "autumn".into(),
        };
        assert_eq!(req.opcode(), "ThemeSelect");
        assert_eq!(Request::ThemeIndexLookup.opcode(), "ThemeIndexLookup");
    }

    #[test]
    fn layer_priority_orders_low_to_high() {
        assert!(LayerPriority::Core < LayerPriority::Operator);
        assert!(LayerPriority::Operator < LayerPriority::Theme);
        assert!(LayerPriority::Theme < LayerPriority::Application);
    }

    #[test]
    fn payload_equality_is_structural() {
        let a = SharedPayload {
            data: OffsetRef::new(64, Region::Shared),
            len: 16,
            format: PayloadFormat::Rgba32,
        };
        let b = SharedPayload {
            data: OffsetRef::new(64, Region::Shared),
            len: 16,
            format: PayloadFormat::Rgba32,
        };
        assert_eq!(a, b);
    }
}
