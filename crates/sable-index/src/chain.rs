//! The theme inheritance chain.
//!
//! The active theme's table is consulted first; on a miss, lookup
//! falls through to ancestor tables in order. Table locations come
//! from the server lazily — the first lookup fetches them through a
//! [`TableSource`] and they stay cached in the chain (per session)
//! until a theme switch clears it.
//!
//! Validation is also lazy and per table: a table that fails is marked
//! invalid once and skipped thereafter, exactly as if it were absent.

use smallvec::SmallVec;

use sable_arena::RegionMap;
use sable_core::{TableRef, MAX_INDEX_TABLES};

use crate::table::{IndexItem, ThemeIndex};

/// Where a chain gets its table locations from.
///
/// Client-side this is the session link issuing a `ThemeIndexLookup`
/// request; tests hand in canned locations.
pub trait TableSource {
    /// The current table chain, most-derived theme first.
    fn fetch_tables(&mut self) -> SmallVec<[TableRef; MAX_INDEX_TABLES]>;
}

/// A successful chain lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainHit {
    /// The matching item record.
    pub item: IndexItem,
    /// Which table in the chain matched (0 = active theme).
    pub table_index: usize,
}

struct ChainTable {
    table: TableRef,
    /// Lazily established validity; `None` until first probed.
    valid: Option<bool>,
}

/// Cached, lazily fetched chain of up to four index tables.
#[derive(Default)]
pub struct IndexChain {
    tables: SmallVec<[ChainTable; MAX_INDEX_TABLES]>,
    retrieved: bool,
}

impl IndexChain {
    /// An empty chain; tables are fetched on first lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether table locations have been fetched.
    pub fn is_retrieved(&self) -> bool {
        self.retrieved
    }

    /// Drop fetched locations and validity marks. The next lookup
    /// re-fetches — called on theme switch.
    pub fn clear(&mut self) {
        self.tables.clear();
        self.retrieved = false;
    }

    /// Look `name` up through the chain, first hit wins.
    pub fn lookup(
        &mut self,
        ctx: &RegionMap,
        source: &mut dyn TableSource,
        name: &str,
    ) -> Option<ChainHit> {
        self.resolve(ctx, source, name, |_, item| *item)
            .map(|(item, table_index)| ChainHit { item, table_index })
    }

    /// Like [`lookup`](Self::lookup), but hands the matching table to
    /// `f` so string fields can be resolved without copying the table.
    pub fn resolve<R>(
        &mut self,
        ctx: &RegionMap,
        source: &mut dyn TableSource,
        name: &str,
        f: impl FnOnce(&ThemeIndex<'_>, &IndexItem) -> R,
    ) -> Option<(R, usize)> {
        if !self.retrieved {
            self.tables = source
                .fetch_tables()
                .into_iter()
                .map(|table| ChainTable { table, valid: None })
                .collect();
            self.retrieved = true;
        }

        let mut f = Some(f);
        for (table_index, chain_table) in self.tables.iter_mut().enumerate() {
            let t = chain_table.table;
            let known_valid = chain_table.valid;
            let probe = ctx.with_bytes(t.region, t.offset, t.len, |bytes| {
                let index = ThemeIndex::new(bytes);
                let valid = match known_valid {
                    Some(v) => v,
                    None => index.validate().is_ok(),
                };
                if !valid {
                    return (false, None);
                }
                let hit = index
                    .binary_find(name)
                    .map(|item| (f.take().expect("resolve closure used once"))(&index, &item));
                (true, hit)
            });
            match probe {
                Ok((valid, hit)) => {
                    chain_table.valid = Some(valid);
                    if let Some(result) = hit {
                        return Some((result, table_index));
                    }
                }
                Err(_) => {
                    // Unmapped or out-of-range table location: treat the
                    // table as invalid and fall through to ancestors.
                    chain_table.valid = Some(false);
                }
            }
        }
        None
    }
}
