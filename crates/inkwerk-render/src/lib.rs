// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// inkwerk-render — Raster engine for the Inkwerk handwriting pipeline.
//
// Provides the imperfection model (word-level defect injection), the stroke
// renderer (glyph placement with jitter and pressure onto an alpha canvas),
// the procedural paper texture generator, and the layer compositor that
// merges paper, text, and diagram rasters into final opaque pages.

pub mod compose;
pub mod fonts;
pub mod imperfect;
pub mod paper;
pub mod stroke;

// Re-export the primary entry points so callers can use `inkwerk_render::StrokeRenderer` etc.
pub use compose::{ComposedPage, PlacedDiagram, compose_page};
pub use fonts::FontLibrary;
pub use imperfect::{Defect, TextSegment, segment_line};
pub use paper::render_paper;
pub use stroke::StrokeRenderer;
