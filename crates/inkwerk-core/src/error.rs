// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Inkwerk.

use thiserror::Error;

use crate::types::JobStatus;

/// Top-level error type for all Inkwerk operations.
#[derive(Debug, Error)]
pub enum InkwerkError {
    // -- Layout / input errors --
    #[error("page layout error: {0}")]
    Layout(String),

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("job cannot start processing from state {0:?}")]
    NotStartable(JobStatus),

    // -- Render errors --
    #[error("font error: {0}")]
    Font(String),

    #[error("image processing failed: {0}")]
    Image(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error("export failed: {0}")]
    Export(String),

    // -- Diagram stylization --
    #[error("stylization failed: {0}")]
    Stylization(String),

    #[error("stylization rate-limited")]
    RateLimited,

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, InkwerkError>;
