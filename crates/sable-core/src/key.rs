//! Cache keys for themed resources.
//!
//! Icon entries are keyed by the full set of rendering parameters — the
//! same logical icon at two sizes is two cache entries. Stylesheet,
//! layout and effect entries are keyed by a normalised path string.

use std::fmt;

/// Requested icon dimensions in pixels.
///
/// A non-positive dimension means "use the theme's default size for
/// this icon" (resolved against the theme index by the server).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IconSize {
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl IconSize {
    /// A size with both dimensions set.
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// The "use theme default" sentinel.
    pub fn unspecified() -> Self {
        Self {
            width: -1,
            height: -1,
        }
    }

    /// Whether both dimensions are positive.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Pixel count, zero for invalid sizes.
    pub fn pixel_count(&self) -> u64 {
        if self.is_valid() {
            self.width as u64 * self.height as u64
        } else {
            0
        }
    }
}

impl fmt::Display for IconSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How an icon is scaled into its requested size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AspectMode {
    /// Stretch freely to the requested size.
    Ignore,
    /// Scale uniformly so the whole icon fits.
    #[default]
    Keep,
    /// Scale uniformly so the icon covers the whole size.
    KeepByExpanding,
}

/// Rendering mode of an icon.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IconMode {
    /// The plain rendition.
    #[default]
    Normal,
    /// Greyed-out rendition for disabled controls.
    Disabled,
    /// Highlight rendition for focused controls.
    Highlighted,
    /// Rendition for selected controls.
    Selected,
}

/// Composite key identifying one cached icon rendition.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IconKey {
    /// Logical icon name, e.g. `qtg_mono_back`.
    pub name: String,
    /// Requested size.
    pub size: IconSize,
    /// Scaling behaviour.
    pub aspect: AspectMode,
    /// Rendering mode.
    pub mode: IconMode,
    /// Whether the layout-mirrored variant was requested.
    pub mirrored: bool,
    /// Optional colourisation, packed 0xAARRGGBB.
    pub color: Option<u32>,
}

impl IconKey {
    /// Key for `name` at `size` with default rendering parameters.
    pub fn new(name: impl Into<String>, size: IconSize) -> Self {
        Self {
            name: name.into(),
            size,
            aspect: AspectMode::default(),
            mode: IconMode::default(),
            mirrored: false,
            color: None,
        }
    }
}

impl fmt::Display for IconKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.size)?;
        if self.mirrored {
            write!(f, "/mirrored")?;
        }
        Ok(())
    }
}

/// Normalised key for stylesheet, layout and effect entries.
///
/// Constructors produce a canonical string so the same resource is
/// never cached twice under spelling variants.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StyleKey(pub String);

impl StyleKey {
    /// Key for a stylesheet file.
    pub fn stylesheet(path: &str) -> Self {
        Self(format!("css:{}", normalize(path)))
    }

    /// Key for one layout section of a widget definition file.
    pub fn layout(path: &str, layout: &str, section: &str) -> Self {
        Self(format!("wml:{}|{layout}|{section}", normalize(path)))
    }

    /// Key for a system effect definition.
    pub fn effect(file: &str) -> Self {
        Self(format!("fx:{}", normalize(file)))
    }
}

impl fmt::Display for StyleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collapse path separators and strip redundant leading `./`.
fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_sep = false;
    for c in path.chars() {
        let sep = c == '/' || c == '\\';
        if sep {
            if !prev_sep {
                out.push('/');
            }
        } else {
            out.push(c);
        }
        prev_sep = sep;
    }
    if let Some(stripped) = out.strip_prefix("./") {
        return stripped.to_string();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_size_is_invalid() {
        assert!(!IconSize::unspecified().is_valid());
        assert!(IconSize::new(32, 32).is_valid());
        assert_eq!(IconSize::new(32, 32).pixel_count(), 1024);
        assert_eq!(IconSize::unspecified().pixel_count(), 0);
    }

    #[test]
    fn icon_keys_distinguish_render_params() {
        let base = IconKey::new("qtg_mono_back", IconSize::new(32, 32));
        let mut mirrored = base.clone();
        mirrored.mirrored = true;
        let mut colored = base.clone();
        colored.color = Some(0xFF00_FF00);
        assert_ne!(base, mirrored);
        assert_ne!(base, colored);
        assert_eq!(base, IconKey::new("qtg_mono_back", IconSize::new(32, 32)));
    }

    #[test]
    fn style_key_normalizes_separators() {
        assert_eq!(
            StyleKey::stylesheet("themes\\style//widget.css"),
            StyleKey::stylesheet("themes/style/widget.css"),
        );
        assert_eq!(
            StyleKey::stylesheet("./a/b.css"),
            StyleKey::stylesheet("a/b.css"),
        );
    }

    #[test]
    fn style_key_namespaces_do_not_collide() {
        assert_ne!(StyleKey::stylesheet("a"), StyleKey::effect("a"));
        assert_ne!(
            StyleKey::layout("a", "b", "c"),
            StyleKey::layout("a", "b", "d"),
        );
    }
}
