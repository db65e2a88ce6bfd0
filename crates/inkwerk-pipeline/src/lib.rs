// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// inkwerk-pipeline — Job state tracking and the sequential rendering
// orchestrator for Inkwerk.
//
// Drives one job at a time through paper, text, diagram, and compositing
// stages, page by page, updating shared progress state and handing the
// composed pages to an exporter.

pub mod export;
pub mod layout;
pub mod orchestrator;
pub mod state;

pub use export::{FileExporter, PageExporter};
pub use layout::LayoutProvider;
pub use orchestrator::RenderPipeline;
pub use state::JobStore;
