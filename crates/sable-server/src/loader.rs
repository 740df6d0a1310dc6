//! Resource sources and icon decoding.
//!
//! Parsing and rasterisation proper are outside this crate's scope —
//! the server sees them as two seams: a [`ResourceStore`] that yields
//! source bytes for style-side keys and theme declarations, and an
//! [`IconDecoder`] that turns a fully resolved icon key into pixels.
//! [`FlatDecoder`] is the built-in deterministic renderer used by the
//! server by default and by every test.

use indexmap::IndexMap;
use smallvec::SmallVec;

use sable_core::{IconKey, IconMode, IconSize, StyleKey, MAX_INDEX_TABLES};
use sable_index::IndexEntry;

/// One theme package's declarations.
#[derive(Clone, Debug)]
pub struct ThemeDef {
    /// Parent theme this one inherits from, if any.
    pub parent: Option<String>,
    /// Drive tag of the package the theme was installed from.
    pub drive: char,
    /// Icon resources the theme ships, in any order.
    pub icons: Vec<IndexEntry>,
}

impl ThemeDef {
    /// A standalone theme with the given icons.
    pub fn new(icons: Vec<IndexEntry>) -> Self {
        Self {
            parent: None,
            drive: 'Z',
            icons,
        }
    }

    /// A theme inheriting from `parent`.
    pub fn derived(parent: impl Into<String>, icons: Vec<IndexEntry>) -> Self {
        Self {
            parent: Some(parent.into()),
            drive: 'Z',
            icons,
        }
    }
}

/// Registered resource sources: style-side file bytes plus theme
/// declarations.
///
/// Stands where the original consulted the filesystem; registration
/// happens once at server startup.
#[derive(Default)]
pub struct ResourceStore {
    sources: IndexMap<StyleKey, Vec<u8>>,
    themes: IndexMap<String, ThemeDef>,
}

impl ResourceStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stylesheet file.
    pub fn add_stylesheet(&mut self, path: &str, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.sources.insert(StyleKey::stylesheet(path), bytes.into());
        self
    }

    /// Register one layout section of a widget definition file.
    pub fn add_layout(
        &mut self,
        path: &str,
        layout: &str,
        section: &str,
        bytes: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.sources
            .insert(StyleKey::layout(path, layout, section), bytes.into());
        self
    }

    /// Register a system effect definition.
    pub fn add_effect(&mut self, file: &str, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.sources.insert(StyleKey::effect(file), bytes.into());
        self
    }

    /// Register a theme.
    pub fn add_theme(&mut self, name: impl Into<String>, def: ThemeDef) -> &mut Self {
        self.themes.insert(name.into(), def);
        self
    }

    /// Source bytes for a style-side key.
    pub fn source(&self, key: &StyleKey) -> Option<&[u8]> {
        self.sources.get(key).map(Vec::as_slice)
    }

    /// The named theme's declarations.
    pub fn theme(&self, name: &str) -> Option<&ThemeDef> {
        self.themes.get(name)
    }

    /// The theme plus its ancestors, most-derived first, capped at the
    /// index chain length. Unknown parents and cycles end the walk.
    pub fn ancestry<'a>(&'a self, name: &'a str) -> SmallVec<[&'a str; MAX_INDEX_TABLES]> {
        let mut chain: SmallVec<[&str; MAX_INDEX_TABLES]> = SmallVec::new();
        let mut current = Some(name);
        while let Some(theme_name) = current {
            if chain.len() == MAX_INDEX_TABLES || chain.contains(&theme_name) {
                break;
            }
            let Some(def) = self.themes.get(theme_name) else {
                break;
            };
            chain.push(theme_name);
            current = def.parent.as_deref();
        }
        chain
    }
}

/// A decoded icon frame: RGBA32, row-major, 4 bytes per pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedIcon {
    /// Frame dimensions.
    pub size: IconSize,
    /// Pixel bytes, `width * height * 4` long.
    pub rgba: Vec<u8>,
}

/// Turns a fully resolved icon key into pixels.
///
/// The server resolves existence and default size against the theme
/// index before calling in, so `decode` only sees keys with a valid
/// size for icons the theme actually ships.
pub trait IconDecoder: Send {
    /// Render the icon, or `None` if the key cannot be rendered.
    fn decode(&self, key: &IconKey) -> Option<DecodedIcon>;
}

/// Deterministic built-in renderer.
///
/// Every output byte is a pure function of the key, which is what the
/// cache tests need: the same key decodes to the same bytes in any
/// process, different render parameters produce observably different
/// frames (mirroring flips the horizontal gradient, modes shift the
/// base colour).
pub struct FlatDecoder;

impl IconDecoder for FlatDecoder {
    fn decode(&self, key: &IconKey) -> Option<DecodedIcon> {
        if !key.size.is_valid() {
            return None;
        }
        let width = key.size.width;
        let height = key.size.height;
        let base = key.color.unwrap_or_else(|| name_color(&key.name));
        let [alpha, red, green, blue] = base.to_be_bytes();
        let shift = mode_shift(key.mode);

        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                let gx = if key.mirrored { width - 1 - x } else { x };
                let ramp = ((gx + y) & 0x3F) as u8;
                rgba.push(red.wrapping_add(ramp).wrapping_add(shift));
                rgba.push(green.wrapping_add(ramp).wrapping_add(shift));
                rgba.push(blue.wrapping_add(ramp).wrapping_add(shift));
                rgba.push(alpha);
            }
        }
        Some(DecodedIcon {
            size: key.size,
            rgba,
        })
    }
}

fn mode_shift(mode: IconMode) -> u8 {
    match mode {
        IconMode::Normal => 0,
        IconMode::Disabled => 0x40,
        IconMode::Highlighted => 0x80,
        IconMode::Selected => 0xC0,
    }
}

/// FNV-1a over the icon name, spread into an opaque ARGB value.
fn name_color(name: &str) -> u32 {
    let mut hash: u32 = 0x811C_9DC5;
    for byte in name.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash | 0xFF00_0000
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn ancestry_walks_parents_most_derived_first() {
        let mut store = ResourceStore::new();
        store
            .add_theme("base", ThemeDef::new(vec![entry("a")]))
            .add_theme("dark", ThemeDef::derived("base", vec![entry("b")]))
            .add_theme("oled", ThemeDef::derived("dark", vec![entry("c")]));
        let chain = store.ancestry("oled");
        assert_eq!(chain.as_slice(), &["oled", "dark", "base"]);
    }

    #[test]
    fn ancestry_survives_cycles_and_missing_parents() {
        let mut store = ResourceStore::new();
        store
            .add_theme("a", ThemeDef::derived("b", vec![]))
            .add_theme("b", ThemeDef::derived("a", vec![]));
        assert_eq!(store.ancestry("a").as_slice(), &["a", "b"]);

        let mut orphan = ResourceStore::new();
        orphan.add_theme("x", ThemeDef::derived("gone", vec![]));
        assert_eq!(orphan.ancestry("x").as_slice(), &["x"]);
        assert!(orphan.ancestry("unknown").is_empty());
    }

    #[test]
    fn store_sources_round_trip() {
        let mut store = ResourceStore::new();
        store
            .add_stylesheet("w/pushbutton.css", b"button { }".to_vec())
            .add_layout("w/pushbutton.widgetml", "portrait", "main", b"<layout/>".to_vec())
            .add_effect("fade.fxml", b"<effect/>".to_vec());
        assert_eq!(
            store.source(&StyleKey::stylesheet("w/pushbutton.css")),
            Some(b"button { }".as_slice())
        );
        assert_eq!(
            store.source(&StyleKey::layout("w/pushbutton.widgetml", "portrait", "main")),
            Some(b"<layout/>".as_slice())
        );
        assert!(store.source(&StyleKey::stylesheet("absent.css")).is_none());
    }

    #[test]
    fn decode_is_deterministic_per_key() {
        let key = IconKey::new("qtg_mono_back", IconSize::new(8, 8));
        let a = FlatDecoder.decode(&key).unwrap();
        let b = FlatDecoder.decode(&key).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.rgba.len(), 8 * 8 * 4);
    }

    #[test]
    fn render_parameters_change_the_pixels() {
        let base = IconKey::new("qtg_mono_back", IconSize::new(8, 8));
        let mut mirrored = base.clone();
        mirrored.mirrored = true;
        let mut disabled = base.clone();
        disabled.mode = IconMode::Disabled;
        let mut colored = base.clone();
        colored.color = Some(0xFF12_3456);

        let plain = FlatDecoder.decode(&base).unwrap();
        assert_ne!(plain, FlatDecoder.decode(&mirrored).unwrap());
        assert_ne!(plain, FlatDecoder.decode(&disabled).unwrap());
        assert_ne!(plain, FlatDecoder.decode(&colored).unwrap());
    }

    #[test]
    fn invalid_size_does_not_decode() {
        let key = IconKey::new("x", IconSize::unspecified());
        assert!(FlatDecoder.decode(&key).is_none());
    }
}
