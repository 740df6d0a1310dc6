//! One theme index table: header, item array, string area.
//!
//! Binary layout (little-endian, offsets relative to the table base):
//!
//! ```text
//! Header:          u32 version; u32 count;
//! ItemArray[count]: i32 name_off; i32 folder_off; i32 ext_off;
//!                   i32 mirrored_ext_off (−1 if none);
//!                   i32 default_w; i32 default_h;
//!                   i32 mirrored_w; i32 mirrored_h;
//! StringArea:      NUL-terminated UTF-8 strings
//! ```
//!
//! Only version 1 is defined. Readers dispatch on the version field
//! first and reject anything else — an unknown version is corrupt, not
//! a best-effort read.

use std::cell::OnceCell;

use sable_core::IndexError;

/// The only defined table version.
pub const INDEX_VERSION_1: u32 = 1;

/// Header length in bytes.
pub const HEADER_LEN: usize = 8;

/// Item record length in bytes.
pub const ITEM_LEN: usize = 32;

/// One decoded item record.
///
/// The string fields are table-relative byte offsets, not strings:
/// resolving them needs the table bytes (see
/// [`ThemeIndex::string_at`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexItem {
    /// Offset of the resource name.
    pub name_offset: i32,
    /// Offset of the container folder name.
    pub folder_offset: i32,
    /// Offset of the file extension.
    pub ext_offset: i32,
    /// Offset of the mirrored-variant extension, −1 if none.
    pub mirrored_ext_offset: i32,
    /// Default size (width, height).
    pub default_size: (i32, i32),
    /// Default size of the mirrored variant (width, height).
    pub mirrored_default_size: (i32, i32),
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes(bytes[at..at + 4].try_into().expect("4-byte field"))
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().expect("4-byte field"))
}

/// Read-only view over one table's bytes.
///
/// Header-derived values are computed on first access and cached; the
/// table itself is never modified after creation.
pub struct ThemeIndex<'a> {
    bytes: &'a [u8],
    count: OnceCell<u32>,
    string_area: OnceCell<usize>,
}

impl<'a> ThemeIndex<'a> {
    /// View over `bytes` without validation.
    ///
    /// Use [`validated`](Self::validated) for tables from writable
    /// storage; `new` is for tables already validated this session.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            count: OnceCell::new(),
            string_area: OnceCell::new(),
        }
    }

    /// View over `bytes`, rejecting the whole table on any
    /// inconsistency.
    pub fn validated(bytes: &'a [u8]) -> Result<Self, IndexError> {
        let table = Self::new(bytes);
        table.validate()?;
        Ok(table)
    }

    /// The table's version field, 0 for a table too short to have one.
    pub fn version(&self) -> u32 {
        if self.bytes.len() < 4 {
            return 0;
        }
        read_u32(self.bytes, 0)
    }

    /// Number of items, 0 for a table too short to say.
    pub fn item_count(&self) -> u32 {
        *self.count.get_or_init(|| {
            if self.bytes.len() < HEADER_LEN {
                return 0;
            }
            read_u32(self.bytes, 4)
        })
    }

    /// Byte offset where the string area begins.
    pub fn string_area_start(&self) -> usize {
        *self
            .string_area
            .get_or_init(|| HEADER_LEN + self.item_count() as usize * ITEM_LEN)
    }

    /// Decode item `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is past the item array — callers stay within
    /// [`item_count`](Self::item_count).
    pub fn item(&self, index: u32) -> IndexItem {
        assert!(
            index < self.item_count(),
            "item index {index} out of range (count {})",
            self.item_count()
        );
        let at = HEADER_LEN + index as usize * ITEM_LEN;
        let b = self.bytes;
        IndexItem {
            name_offset: read_i32(b, at),
            folder_offset: read_i32(b, at + 4),
            ext_offset: read_i32(b, at + 8),
            mirrored_ext_offset: read_i32(b, at + 12),
            default_size: (read_i32(b, at + 16), read_i32(b, at + 20)),
            mirrored_default_size: (read_i32(b, at + 24), read_i32(b, at + 28)),
        }
    }

    /// The NUL-terminated string at a table-relative offset.
    ///
    /// Returns `None` for −1, out-of-range offsets, unterminated or
    /// non-UTF-8 strings.
    pub fn string_at(&self, offset: i32) -> Option<&'a str> {
        if offset < 0 {
            return None;
        }
        let start = offset as usize;
        if start >= self.bytes.len() {
            return None;
        }
        let rest = &self.bytes[start..];
        let nul = rest.iter().position(|&b| b == 0)?;
        std::str::from_utf8(&rest[..nul]).ok()
    }

    /// Binary search for `name` over the sorted item array.
    ///
    /// Exact match only — no prefix or fuzzy matching. Returns `None`
    /// when the name is absent.
    pub fn binary_find(&self, name: &str) -> Option<IndexItem> {
        let target = name.as_bytes();
        let mut begin = 0i64;
        let mut end = i64::from(self.item_count()) - 1;
        while begin <= end {
            let mid = begin + (end - begin) / 2;
            let item = self.item(mid as u32);
            let candidate = self.string_at(item.name_offset)?.as_bytes();
            match target.cmp(candidate) {
                std::cmp::Ordering::Equal => return Some(item),
                std::cmp::Ordering::Less => end = mid - 1,
                std::cmp::Ordering::Greater => begin = mid + 1,
            }
        }
        None
    }

    /// Check the whole table. Any failure rejects it wholesale; a
    /// partially valid table is never used.
    pub fn validate(&self) -> Result<(), IndexError> {
        let len = self.bytes.len();
        if len < HEADER_LEN {
            return Err(IndexError::Truncated {
                needed: HEADER_LEN,
                len,
            });
        }
        let version = self.version();
        if version != INDEX_VERSION_1 {
            return Err(IndexError::UnknownVersion { found: version });
        }
        let count = self.item_count();
        let string_area = self.string_area_start();
        if len < string_area {
            return Err(IndexError::Truncated {
                needed: string_area,
                len,
            });
        }
        for index in 0..count {
            let item = self.item(index);
            self.check_string(index, item.name_offset, false)?;
            self.check_string(index, item.folder_offset, false)?;
            self.check_string(index, item.ext_offset, false)?;
            self.check_string(index, item.mirrored_ext_offset, true)?;
        }
        Ok(())
    }

    fn check_string(&self, item: u32, offset: i32, optional: bool) -> Result<(), IndexError> {
        if offset < 0 {
            if optional {
                return Ok(());
            }
            return Err(IndexError::StringOffsetOutOfRange { item, offset });
        }
        let start = offset as usize;
        let len = self.bytes.len();
        if start < self.string_area_start() || start >= len {
            return Err(IndexError::StringOffsetOutOfRange { item, offset });
        }
        if !self.bytes[start..].contains(&0) {
            return Err(IndexError::UnterminatedString { item, offset });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{IndexBuilder, IndexEntry};

    fn entry(name: &str) -> IndexEntry {
        IndexEntry {
            name: name.to_string(),
            folder: "icons".to_string(),
            ext: "svg".to_string(),
            mirrored_ext: None,
            default_size: (24, 24),
            mirrored_default_size: (-1, -1),
        }
    }

    fn table_bytes(names: &[&str]) -> Vec<u8> {
        let mut builder = IndexBuilder::new();
        for name in names {
            builder.add(entry(name));
        }
        builder.build()
    }

    #[test]
    fn header_fields_decode() {
        let bytes = table_bytes(&["a", "b", "c"]);
        let table = ThemeIndex::new(&bytes);
        assert_eq!(table.version(), INDEX_VERSION_1);
        assert_eq!(table.item_count(), 3);
        assert_eq!(table.string_area_start(), HEADER_LEN + 3 * ITEM_LEN);
    }

    #[test]
    fn strings_resolve() {
        let bytes = table_bytes(&["back", "menu"]);
        let table = ThemeIndex::validated(&bytes).unwrap();
        let item = table.binary_find("back").unwrap();
        assert_eq!(table.string_at(item.name_offset), Some("back"));
        assert_eq!(table.string_at(item.folder_offset), Some("icons"));
        assert_eq!(table.string_at(item.ext_offset), Some("svg"));
        assert_eq!(table.string_at(item.mirrored_ext_offset), None);
    }

    #[test]
    fn binary_find_exact_match_only() {
        let bytes = table_bytes(&["alpha", "beta", "gamma"]);
        let table = ThemeIndex::validated(&bytes).unwrap();
        assert!(table.binary_find("beta").is_some());
        assert!(table.binary_find("bet").is_none());
        assert!(table.binary_find("betas").is_none());
        assert!(table.binary_find("").is_none());
    }

    #[test]
    fn empty_table_finds_nothing() {
        let bytes = table_bytes(&[]);
        let table = ThemeIndex::validated(&bytes).unwrap();
        assert_eq!(table.item_count(), 0);
        assert!(table.binary_find("anything").is_none());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut bytes = table_bytes(&["a"]);
        bytes[0..4].copy_from_slice(&2u32.to_le_bytes());
        assert_eq!(
            ThemeIndex::new(&bytes).validate(),
            Err(IndexError::UnknownVersion { found: 2 })
        );
    }

    #[test]
    fn truncated_table_is_rejected() {
        let bytes = table_bytes(&["a", "b"]);
        let cut = &bytes[..HEADER_LEN + ITEM_LEN];
        assert!(matches!(
            ThemeIndex::new(cut).validate(),
            Err(IndexError::Truncated { .. })
        ));
        assert!(matches!(
            ThemeIndex::new(&bytes[..3]).validate(),
            Err(IndexError::Truncated { .. })
        ));
    }

    #[test]
    fn out_of_range_string_offset_is_rejected() {
        let mut bytes = table_bytes(&["a"]);
        // Corrupt the first item's name offset to point past the end.
        let past_end = bytes.len() as i32 + 10;
        bytes[HEADER_LEN..HEADER_LEN + 4].copy_from_slice(&past_end.to_le_bytes());
        assert!(matches!(
            ThemeIndex::new(&bytes).validate(),
            Err(IndexError::StringOffsetOutOfRange { item: 0, .. })
        ));
    }

    #[test]
    fn offset_into_item_array_is_rejected() {
        let mut bytes = table_bytes(&["a"]);
        // An offset before the string area must not be trusted even
        // though it is inside the file.
        bytes[HEADER_LEN..HEADER_LEN + 4].copy_from_slice(&4i32.to_le_bytes());
        assert!(matches!(
            ThemeIndex::new(&bytes).validate(),
            Err(IndexError::StringOffsetOutOfRange { item: 0, .. })
        ));
    }

    #[test]
    fn unterminated_string_is_rejected() {
        let mut bytes = table_bytes(&["a"]);
        // Strip the trailing NUL of the last string.
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        let err = ThemeIndex::new(&bytes).validate().unwrap_err();
        assert!(matches!(err, IndexError::UnterminatedString { .. }));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;
        use rand::prelude::*;
        use rand_chacha::ChaCha8Rng;

        /// Generate `n` distinct names deterministically from a seed.
        fn names(n: usize, seed: u64) -> Vec<String> {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut out = std::collections::BTreeSet::new();
            while out.len() < n {
                let len = rng.random_range(1..20);
                let name: String = (0..len)
                    .map(|_| char::from(rng.random_range(b'a'..=b'z')))
                    .collect();
                out.insert(name);
            }
            out.into_iter().collect()
        }

        #[test]
        fn binary_find_is_total_over_sizes() {
            // The sizes called out in the acceptance checklist.
            for &n in &[0usize, 1, 2, 50, 1000] {
                let all = names(n + 5, n as u64);
                let (present, absent) = all.split_at(n);
                let mut builder = IndexBuilder::new();
                for name in present {
                    builder.add(entry(name));
                }
                let bytes = builder.build();
                let table = ThemeIndex::validated(&bytes).unwrap();
                for name in present {
                    let item = table.binary_find(name).unwrap();
                    assert_eq!(table.string_at(item.name_offset), Some(name.as_str()));
                }
                for name in absent {
                    assert!(table.binary_find(name).is_none());
                }
            }
        }

        proptest! {
            #[test]
            fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
                let table = ThemeIndex::new(&bytes);
                // Validation must reject or accept without panicking,
                // and a rejected table must not be probed further.
                if table.validate().is_ok() {
                    let _ = table.binary_find("probe");
                }
            }
        }
    }
}
