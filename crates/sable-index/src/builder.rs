//! Table construction.
//!
//! The server builds one table per theme at startup and on theme
//! switch, from the theme package's resource declarations. Entries are
//! sorted by name before emission — [`binary_find`] depends on it —
//! and identical strings are stored once.
//!
//! [`binary_find`]: crate::table::ThemeIndex::binary_find

use std::collections::HashMap;

use crate::table::{HEADER_LEN, INDEX_VERSION_1, ITEM_LEN};

/// One resource declaration going into a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    /// Logical resource name (the binary-search key).
    pub name: String,
    /// Container folder within the theme package.
    pub folder: String,
    /// File extension of the resource.
    pub ext: String,
    /// Extension of the mirrored variant, if the theme ships one.
    pub mirrored_ext: Option<String>,
    /// Default size (width, height).
    pub default_size: (i32, i32),
    /// Default size of the mirrored variant, `(-1, -1)` if none.
    pub mirrored_default_size: (i32, i32),
}

/// Accumulates entries and emits a valid version-1 table.
#[derive(Default)]
pub struct IndexBuilder {
    entries: Vec<IndexEntry>,
}

impl IndexBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entry. Order does not matter; `build` sorts.
    pub fn add(&mut self, entry: IndexEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Number of entries added so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries have been added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Emit the table bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut entries: Vec<&IndexEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        entries.dedup_by(|a, b| a.name == b.name);

        let count = entries.len();
        let string_area = HEADER_LEN + count * ITEM_LEN;

        // Intern strings into the blob; identical strings share bytes.
        let mut blob: Vec<u8> = Vec::new();
        let mut interned: HashMap<&str, i32> = HashMap::new();

        let mut items = Vec::with_capacity(count * ITEM_LEN);
        for entry in &entries {
            let name_off = intern(entry.name.as_str(), string_area, &mut blob, &mut interned);
            let folder_off = intern(entry.folder.as_str(), string_area, &mut blob, &mut interned);
            let ext_off = intern(entry.ext.as_str(), string_area, &mut blob, &mut interned);
            let mirrored_off = match &entry.mirrored_ext {
                Some(ext) => intern(ext.as_str(), string_area, &mut blob, &mut interned),
                None => -1,
            };
            for field in [
                name_off,
                folder_off,
                ext_off,
                mirrored_off,
                entry.default_size.0,
                entry.default_size.1,
                entry.mirrored_default_size.0,
                entry.mirrored_default_size.1,
            ] {
                items.extend_from_slice(&field.to_le_bytes());
            }
        }

        let mut out = Vec::with_capacity(string_area + blob.len());
        out.extend_from_slice(&INDEX_VERSION_1.to_le_bytes());
        out.extend_from_slice(&(count as u32).to_le_bytes());
        out.extend_from_slice(&items);
        out.extend_from_slice(&blob);
        out
    }
}

/// Offset of `s` in the string blob, appending it on first sight.
fn intern<'a>(
    s: &'a str,
    string_area: usize,
    blob: &mut Vec<u8>,
    interned: &mut HashMap<&'a str, i32>,
) -> i32 {
    if let Some(&off) = interned.get(s) {
        return off;
    }
    let off = (string_area + blob.len()) as i32;
    blob.extend_from_slice(s.as_bytes());
    blob.push(0);
    interned.insert(s, off);
    off
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ThemeIndex;

    fn entry(name: &str, folder: &str) -> IndexEntry {
        IndexEntry {
            name: name.to_string(),
            folder: folder.to_string(),
            ext: "svg".to_string(),
            mirrored_ext: None,
            default_size: (16, 16),
            mirrored_default_size: (-1, -1),
        }
    }

    #[test]
    fn built_table_validates_and_finds() {
        let mut builder = IndexBuilder::new();
        builder
            .add(entry("zeta", "icons"))
            .add(entry("alpha", "icons"))
            .add(entry("mid", "pixmaps"));
        let bytes = builder.build();
        let table = ThemeIndex::validated(&bytes).unwrap();
        assert_eq!(table.item_count(), 3);
        // Unsorted input, sorted output.
        assert_eq!(table.string_at(table.item(0).name_offset), Some("alpha"));
        assert_eq!(table.string_at(table.item(2).name_offset), Some("zeta"));
        let hit = table.binary_find("mid").unwrap();
        assert_eq!(table.string_at(hit.folder_offset), Some("pixmaps"));
    }

    #[test]
    fn identical_strings_are_interned_once() {
        let mut builder = IndexBuilder::new();
        builder.add(entry("a", "icons")).add(entry("b", "icons"));
        let bytes = builder.build();
        let table = ThemeIndex::validated(&bytes).unwrap();
        assert_eq!(
            table.item(0).folder_offset,
            table.item(1).folder_offset,
        );
    }

    #[test]
    fn duplicate_names_collapse_to_one_item() {
        let mut builder = IndexBuilder::new();
        builder.add(entry("same", "icons")).add(entry("same", "other"));
        let bytes = builder.build();
        let table = ThemeIndex::validated(&bytes).unwrap();
        assert_eq!(table.item_count(), 1);
    }

    #[test]
    fn mirrored_extension_round_trips() {
        let mut builder = IndexBuilder::new();
        builder.add(IndexEntry {
            name: "arrow".to_string(),
            folder: "icons".to_string(),
            ext: "svg".to_string(),
            mirrored_ext: Some("svgm".to_string()),
            default_size: (24, 24),
            mirrored_default_size: (24, 24),
        });
        let bytes = builder.build();
        let table = ThemeIndex::validated(&bytes).unwrap();
        let item = table.binary_find("arrow").unwrap();
        assert_eq!(table.string_at(item.mirrored_ext_offset), Some("svgm"));
        assert_eq!(item.mirrored_default_size, (24, 24));
    }

    #[test]
    fn empty_builder_emits_header_only() {
        let bytes = IndexBuilder::new().build();
        assert_eq!(bytes.len(), crate::table::HEADER_LEN);
        assert!(ThemeIndex::validated(&bytes).is_ok());
    }
}
