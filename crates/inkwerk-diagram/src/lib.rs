// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// inkwerk-diagram — Diagram conversion for the Inkwerk handwriting pipeline.
//
// Maps raw diagram bytes to hand-drawn rasters through a content-addressed
// cache (on-disk blob store + SQLite index) fronting an external
// stylization capability. Stylization failure is always absorbed here: the
// converter falls back to the original image with a warning rather than
// failing the page.

pub mod cache;
pub mod convert;
pub mod stylize;

pub use cache::{CacheEntry, DiagramCache};
pub use convert::{ConvertedDiagram, DiagramConverter, RetryPolicy};
pub use stylize::{DiagramType, ImagenStylizer, Stylizer, build_prompt};
