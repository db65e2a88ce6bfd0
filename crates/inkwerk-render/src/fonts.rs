// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Handwriting font resolution — maps style names to font files and loads
// them via ab_glyph, falling back to a common system font when the bundled
// file is missing.

use std::path::{Path, PathBuf};

use ab_glyph::FontArc;
use inkwerk_core::error::{InkwerkError, Result};
use tracing::{debug, instrument, warn};

/// Known handwriting styles and their font files (Google Fonts).
const FONT_MAP: &[(&str, &str)] = &[
    ("Caveat", "Caveat-Regular.ttf"),
    ("Indie Flower", "IndieFlower-Regular.ttf"),
    ("Permanent Marker", "PermanentMarker-Regular.ttf"),
    ("Shadows Into Light", "ShadowsIntoLight-Regular.ttf"),
    ("Patrick Hand", "PatrickHand-Regular.ttf"),
    ("Reenie Beanie", "ReenieBeanie-Regular.ttf"),
    ("Covered By Your Grace", "CoveredByYourGrace-Regular.ttf"),
    ("Homemade Apple", "HomemadeApple-Regular.ttf"),
];

/// System fonts tried when no bundled handwriting font can be read. Not
/// handwriting-shaped, but a legible page beats a failed job.
const SYSTEM_FALLBACKS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Resolves handwriting style names to loaded `ab_glyph` fonts.
pub struct FontLibrary {
    /// Directory holding the bundled handwriting fonts; `None` means only
    /// `./fonts` and the system fallbacks are searched.
    fonts_dir: Option<PathBuf>,
}

impl FontLibrary {
    pub fn new(fonts_dir: Option<PathBuf>) -> Self {
        Self { fonts_dir }
    }

    /// File name for a handwriting style, defaulting to Caveat for unknown
    /// names.
    pub fn font_file(style_name: &str) -> &'static str {
        FONT_MAP
            .iter()
            .find(|(name, _)| *name == style_name)
            .map(|(_, file)| *file)
            .unwrap_or("Caveat-Regular.ttf")
    }

    /// Load the font for a handwriting style.
    ///
    /// Search order: the configured fonts directory, then `./fonts`, then
    /// the system fallback chain. A font that cannot be found anywhere is a
    /// render fault — the job cannot proceed without glyphs.
    #[instrument(skip(self), fields(style_name))]
    pub fn load(&self, style_name: &str) -> Result<FontArc> {
        let file = Self::font_file(style_name);

        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(dir) = &self.fonts_dir {
            candidates.push(dir.join(file));
        }
        candidates.push(PathBuf::from("fonts").join(file));

        for path in &candidates {
            if let Some(font) = try_load(path) {
                debug!(path = %path.display(), "handwriting font loaded");
                return Ok(font);
            }
        }

        warn!(
            style_name,
            "handwriting font not found; trying system fallbacks"
        );
        if let Some(font) = Self::system_fallback() {
            return Ok(font);
        }

        Err(InkwerkError::Font(format!(
            "no usable font for style '{style_name}' ({file} missing and no system fallback)"
        )))
    }

    /// First readable font from the system fallback chain, if any.
    pub fn system_fallback() -> Option<FontArc> {
        SYSTEM_FALLBACKS
            .iter()
            .find_map(|path| try_load(Path::new(path)))
    }
}

/// Read and parse a font file, returning `None` on any failure.
fn try_load(path: &Path) -> Option<FontArc> {
    let data = std::fs::read(path).ok()?;
    FontArc::try_from_vec(data).ok()
}
