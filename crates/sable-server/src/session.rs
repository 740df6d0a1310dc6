//! Per-client session state.
//!
//! The session's owned-key lists are the source of truth for cleanup:
//! every payload reference granted to a client is recorded here, and on
//! disconnect each recorded key is released exactly once — the server
//! never relies on the client having sent an unload for every load.

use sable_core::{IconKey, StyleKey};

/// One connected client's resource ownership.
pub(crate) struct Session {
    /// One element per granted icon reference; the same key appears
    /// once per grant.
    icons: Vec<IconKey>,
    /// One element per granted style reference.
    styles: Vec<StyleKey>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            icons: Vec::new(),
            styles: Vec::new(),
        }
    }

    /// Record one granted icon reference.
    pub fn own_icon(&mut self, key: IconKey) {
        self.icons.push(key);
    }

    /// Record one granted style reference.
    pub fn own_style(&mut self, key: StyleKey) {
        self.styles.push(key);
    }

    /// Give back one icon reference. Returns `false` if this session
    /// holds none for `key` — the client is unloading something it
    /// never loaded.
    pub fn release_icon(&mut self, key: &IconKey) -> bool {
        match self.icons.iter().position(|k| k == key) {
            Some(at) => {
                self.icons.swap_remove(at);
                true
            }
            None => false,
        }
    }

    /// Give back one style reference.
    pub fn release_style(&mut self, key: &StyleKey) -> bool {
        match self.styles.iter().position(|k| k == key) {
            Some(at) => {
                self.styles.swap_remove(at);
                true
            }
            None => false,
        }
    }

    /// Drain every owned reference for disconnect cleanup.
    pub fn take_owned(&mut self) -> (Vec<IconKey>, Vec<StyleKey>) {
        (
            std::mem::take(&mut self.icons),
            std::mem::take(&mut self.styles),
        )
    }

    #[cfg(test)]
    pub fn owned_count(&self) -> usize {
        self.icons.len() + self.styles.len()
    }
}
