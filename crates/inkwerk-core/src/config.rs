// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine and per-job configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{PaperColor, PaperKind};

/// Per-job rendering style. Supplied once per job and immutable for its
/// lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderStyle {
    /// Handwriting font identity (see the render crate's font map).
    pub handwriting_font: String,
    /// Base font size in document units.
    pub font_size: f32,
    /// Ink colour as a hex string, e.g. "#1a1a2e".
    pub ink_color: String,
    /// Vertical distance between rule lines, document units.
    pub line_spacing: f32,
    /// Probability that an eligible word receives a defect. Clamped to
    /// [0.0, 0.20] by `imperfection_level()`.
    pub imperfection_level: f64,
    pub paper_kind: PaperKind,
    pub paper_color: PaperColor,
    /// Cell size for graph paper, document units.
    pub grid_size: f32,
    pub enable_smudges: bool,
    pub enable_coffee_stains: bool,
    pub enable_page_shadows: bool,
    /// Fixed PRNG seed for reproducible output; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            handwriting_font: "Caveat".into(),
            font_size: 18.0,
            ink_color: "#1a1a2e".into(),
            line_spacing: 28.0,
            imperfection_level: 0.07,
            paper_kind: PaperKind::Lined,
            paper_color: PaperColor::White,
            grid_size: 20.0,
            enable_smudges: true,
            enable_coffee_stains: false,
            enable_page_shadows: true,
            seed: None,
        }
    }
}

impl RenderStyle {
    /// Ink colour parsed to RGB. Malformed hex falls back to near-black.
    pub fn ink_rgb(&self) -> [u8; 3] {
        parse_hex_color(&self.ink_color).unwrap_or([26, 26, 46])
    }

    /// Imperfection probability clamped to the supported range.
    pub fn imperfection_level(&self) -> f64 {
        self.imperfection_level.clamp(0.0, 0.20)
    }

    /// Font size used for corrections written above a defective word.
    pub fn correction_font_size(&self) -> f32 {
        self.font_size * 0.75
    }
}

/// Parse a "#rrggbb" hex string into RGB.
fn parse_hex_color(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}

/// Paper description derived from a `RenderStyle`, consumed by the paper
/// texture generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperSpec {
    pub kind: PaperKind,
    pub base_color: [u8; 3],
    /// Rule spacing in pixels.
    pub line_spacing: f32,
    /// Graph cell size in pixels.
    pub grid_size: f32,
    pub coffee_stains: bool,
    pub edge_shadow: bool,
}

impl PaperSpec {
    /// Derive the paper spec for a job at the given device scale.
    pub fn from_style(style: &RenderStyle, scale: f32) -> Self {
        Self {
            kind: style.paper_kind,
            base_color: style.paper_color.rgb(),
            line_spacing: style.line_spacing * scale,
            grid_size: style.grid_size * scale,
            coffee_stains: style.enable_coffee_stains,
            edge_shadow: style.enable_page_shadows,
        }
    }
}

/// Engine-wide settings: storage layout, raster resolution, and the
/// optional external stylization credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory for uploads, results, and the diagram cache.
    pub storage_path: PathBuf,
    /// Raster resolution in dots per inch.
    pub dpi: u32,
    /// Directory holding handwriting font files.
    pub fonts_dir: Option<PathBuf>,
    /// Imagen API key; empty disables stylization entirely.
    pub imagen_api_key: String,
    pub imagen_project_id: String,
    pub imagen_location: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("./storage"),
            dpi: 150,
            fonts_dir: None,
            imagen_api_key: String::new(),
            imagen_project_id: String::new(),
            imagen_location: "us-central1".into(),
        }
    }
}

impl EngineConfig {
    /// Device pixels per document unit (document units are PDF points).
    pub fn scale(&self) -> f32 {
        self.dpi as f32 / 72.0
    }

    /// Whether an external stylization capability is configured.
    pub fn stylization_configured(&self) -> bool {
        !self.imagen_api_key.is_empty()
    }

    /// Results directory, created on demand.
    pub fn results_path(&self) -> std::io::Result<PathBuf> {
        let path = self.storage_path.join("results");
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Diagram cache directory, created on demand.
    pub fn cache_path(&self) -> std::io::Result<PathBuf> {
        let path = self.storage_path.join("cache").join("diagrams");
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }
}
