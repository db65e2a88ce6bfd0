// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Inkwerk handwriting engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Unique identifier for a rendering job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of a rendering job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Source document received, waiting for a processing request.
    Uploaded,
    /// Currently rendering pages.
    Processing,
    /// All pages composed and exported.
    Completed,
    /// Rendering failed — see job error field.
    Failed,
}

impl JobStatus {
    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A complete rendering job record.
///
/// Created at upload time; mutated only by the orchestrator during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    pub id: JobId,
    pub filename: String,
    pub status: JobStatus,
    pub num_pages: u32,
    /// Percentage complete, 0–100, monotonically non-decreasing within a run.
    pub progress: u32,
    /// Human-readable label of the current pipeline stage.
    pub current_stage: String,
    pub upload_path: Option<String>,
    pub result_path: Option<String>,
    pub error_message: Option<String>,
    /// Non-fatal annotations accumulated during a run (e.g. a diagram that
    /// could not be stylized). Present even on Completed jobs.
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RenderJob {
    pub fn new(filename: String) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            filename,
            status: JobStatus::Uploaded,
            num_pages: 0,
            progress: 0,
            current_stage: String::new(),
            upload_path: None,
            result_path: None,
            error_message: None,
            warnings: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Available paper backgrounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperKind {
    Lined,
    Graph,
    Blank,
    Engineering,
}

/// Base paper colour palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperColor {
    White,
    Cream,
    Yellow,
    Aged,
}

impl PaperColor {
    /// Base fill RGB for this palette entry.
    pub fn rgb(&self) -> [u8; 3] {
        match self {
            Self::White => [253, 252, 250],
            Self::Cream => [252, 247, 235],
            Self::Yellow => [255, 253, 230],
            Self::Aged => [245, 235, 220],
        }
    }
}

/// Output container formats for composed pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    /// Single multi-page PDF document.
    Pdf,
    /// One PNG file per page.
    Png,
    /// One JPEG file per page.
    Jpg,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Png => "png",
            Self::Jpg => "jpg",
        }
    }
}

/// One extracted line of source text with its baseline position.
///
/// Coordinates and font size are in document units; the renderer applies
/// the device scale factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
}

/// An embedded raster region (figure, chart, illustration) on a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Raw encoded image bytes (PNG/JPEG) cropped from the source page.
    pub image_bytes: Vec<u8>,
    /// SHA-256 hex digest of `image_bytes` — the cache key.
    pub content_hash: String,
}

impl DiagramRegion {
    /// Build a region, deriving the content hash from the image bytes.
    pub fn new(x: f32, y: f32, width: f32, height: f32, image_bytes: Vec<u8>) -> Self {
        let content_hash = content_hash(&image_bytes);
        Self {
            x,
            y,
            width,
            height,
            image_bytes,
            content_hash,
        }
    }
}

/// SHA-256 hex digest of a byte buffer.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Everything extracted from one source page, in document units.
///
/// Immutable once produced by the upstream extractor; owned by the
/// orchestrator for the duration of that page's processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_index: u32,
    pub width: f32,
    pub height: f32,
    pub lines: Vec<TextLine>,
    pub diagrams: Vec<DiagramRegion>,
}
