// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// External stylization capability — converts a diagram raster to a
// hand-drawn look. The production backend is the Vertex AI Imagen
// image-to-image endpoint; the trait keeps the converter testable and the
// capability optional.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, instrument, warn};

use inkwerk_core::error::{InkwerkError, Result};

/// Base instruction shared by every diagram prompt. Transparent background
/// so the result composites onto the paper texture.
const BASE_PROMPT: &str = "Convert this diagram to a hand-drawn sketch with TRANSPARENT BACKGROUND. \
     No paper background, no white background. Only the hand-drawn lines, labels, \
     and elements should be visible. Make it look naturally drawn with pencil/pen, \
     slightly imperfect lines, like a student drew it.";

/// Coarse diagram classification driving the prompt suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagramType {
    Circuit,
    Flowchart,
    Graph,
    Chemistry,
    Biology,
    Math,
    Generic,
}

impl DiagramType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Circuit => "circuit",
            Self::Flowchart => "flowchart",
            Self::Graph => "graph",
            Self::Chemistry => "chemistry",
            Self::Biology => "biology",
            Self::Math => "math",
            Self::Generic => "generic",
        }
    }

    fn prompt_suffix(&self) -> &'static str {
        match self {
            Self::Circuit => {
                " Use pencil style, hand-drawn circuit symbols (resistors, capacitors, wires), slightly imperfect lines."
            }
            Self::Flowchart => {
                " Pen style, hand-drawn boxes with rounded corners, natural arrows, slight size variations."
            }
            Self::Graph => {
                " Pencil drawn axes and curves, natural mathematical notation, hand-labeled axes."
            }
            Self::Chemistry => {
                " Hand-drawn molecular structures, bond lines, chemical symbols in handwriting."
            }
            Self::Biology => {
                " Hand-drawn anatomical sketch with labels and arrows, natural biological illustration."
            }
            Self::Math => {
                " Hand-drawn geometric shapes, equations, labeled points, pencil style."
            }
            Self::Generic => " Sketchy natural hand-drawn appearance, pencil/pen style.",
        }
    }
}

/// Full stylization prompt for a diagram type.
pub fn build_prompt(diagram_type: DiagramType) -> String {
    format!("{BASE_PROMPT}{}", diagram_type.prompt_suffix())
}

/// An external image-to-image stylization capability.
///
/// Implementations must be idempotent-safe to retry. `Ok(None)` means the
/// service answered but produced no image — the caller falls back to the
/// original. A rate-limit signal surfaces as `InkwerkError::RateLimited`.
#[async_trait]
pub trait Stylizer: Send + Sync {
    async fn stylize(
        &self,
        image: &[u8],
        prompt: &str,
        sample_count: u32,
    ) -> Result<Option<Vec<u8>>>;
}

/// Vertex AI Imagen backend.
pub struct ImagenStylizer {
    client: reqwest::Client,
    api_key: String,
    project_id: String,
    location: String,
}

impl ImagenStylizer {
    pub fn new(
        api_key: impl Into<String>,
        project_id: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            project_id: project_id.into(),
            location: location.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://{loc}-aiplatform.googleapis.com/v1/projects/{proj}/locations/{loc}/publishers/google/models/imagen-3.0-generate-001:predict",
            loc = self.location,
            proj = self.project_id,
        )
    }
}

#[async_trait]
impl Stylizer for ImagenStylizer {
    #[instrument(skip_all, fields(image_len = image.len(), sample_count))]
    async fn stylize(
        &self,
        image: &[u8],
        prompt: &str,
        sample_count: u32,
    ) -> Result<Option<Vec<u8>>> {
        let body = serde_json::json!({
            "instances": [{
                "prompt": prompt,
                "image": { "bytesBase64Encoded": BASE64.encode(image) },
            }],
            "parameters": { "sampleCount": sample_count },
        });

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| InkwerkError::Stylization(format!("request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            warn!("stylization endpoint rate-limited");
            return Err(InkwerkError::RateLimited);
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(InkwerkError::Stylization(format!(
                "endpoint returned {status}: {}",
                detail.chars().take(200).collect::<String>()
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InkwerkError::Stylization(format!("malformed response: {e}")))?;

        let encoded = payload["predictions"]
            .get(0)
            .and_then(|p| p["bytesBase64Encoded"].as_str())
            .unwrap_or("");
        if encoded.is_empty() {
            debug!("stylization response carried no image");
            return Ok(None);
        }

        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| InkwerkError::Stylization(format!("undecodable image payload: {e}")))?;
        Ok(Some(bytes))
    }
}
