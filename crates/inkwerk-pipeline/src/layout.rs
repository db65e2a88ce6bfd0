// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Layout extraction boundary.
//
// The upstream extractor (PDF parser or otherwise) lives outside this
// engine; the orchestrator only sees this trait. Contract: text lines carry
// position and font size, diagram regions carry raw bytes and bounds,
// all in the same document-unit coordinate space the renderer scales.

use inkwerk_core::error::Result;
use inkwerk_core::types::PageLayout;

/// Supplies page layouts for one source document.
pub trait LayoutProvider: Send + Sync {
    /// Number of pages in the source document.
    fn page_count(&self) -> Result<u32>;

    /// Extract the layout of one page (zero-based index).
    fn extract_page(&self, page_index: u32) -> Result<PageLayout>;
}
