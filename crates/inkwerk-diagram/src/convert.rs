// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Diagram converter — cache-first conversion of diagram regions to
// hand-drawn rasters, with bounded retries against the external stylizer
// and graceful fallback to the original image.
//
// Failure policy: only an undecodable *original* image escapes as an error
// (input fault). Stylization problems of any kind degrade to the original
// raster plus a warning — they must never abort the page.

use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use inkwerk_core::error::{InkwerkError, Result};
use inkwerk_core::types::DiagramRegion;

use crate::cache::DiagramCache;
use crate::stylize::{DiagramType, Stylizer, build_prompt};

/// Retry behaviour for stylization calls.
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff base; the delay doubles per rate-limited attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// A diagram ready for compositing: the (possibly stylized) raster, its
/// target rectangle in document units, and any degradation warning.
#[derive(Debug)]
pub struct ConvertedDiagram {
    pub image: RgbaImage,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub warning: Option<String>,
    pub from_cache: bool,
}

/// Cache-fronted converter around an optional stylization capability.
pub struct DiagramConverter {
    cache: DiagramCache,
    stylizer: Option<Arc<dyn Stylizer>>,
    retry: RetryPolicy,
}

impl DiagramConverter {
    /// `stylizer = None` means no external capability is configured; every
    /// miss degrades to the original image with a warning.
    pub fn new(cache: DiagramCache, stylizer: Option<Arc<dyn Stylizer>>) -> Self {
        Self {
            cache,
            stylizer,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Coarse diagram-type heuristic. Deliberately a stub: the prompt table
    /// supports richer types, but no classifier is assumed yet.
    fn classify(&self, _region: &DiagramRegion) -> DiagramType {
        DiagramType::Generic
    }

    /// Convert one diagram region, cache first.
    #[instrument(skip_all, fields(hash = %region.content_hash))]
    pub async fn convert(&self, region: &DiagramRegion) -> Result<ConvertedDiagram> {
        let hash = &region.content_hash;

        match self.cache.lookup(hash)? {
            Some(bytes) => match decode_rgba(&bytes) {
                Ok(image) => {
                    debug!("diagram served from cache");
                    return Ok(self.place(region, image, None, true));
                }
                Err(err) => {
                    // A cached blob we cannot decode is as good as missing.
                    warn!(%err, "cached diagram blob undecodable; regenerating");
                }
            },
            None => {}
        }

        let Some(stylizer) = &self.stylizer else {
            debug!("no stylization capability configured");
            return self.fallback(
                region,
                "diagram not stylized: no stylization capability configured",
            );
        };

        let diagram_type = self.classify(region);
        let prompt = build_prompt(diagram_type);

        match self
            .call_with_retry(stylizer.as_ref(), &region.image_bytes, &prompt)
            .await
        {
            Some(bytes) => {
                self.cache
                    .insert(hash, diagram_type.as_str(), &region.image_bytes, &bytes)?;
                match decode_rgba(&bytes) {
                    Ok(image) => {
                        info!("diagram stylized");
                        Ok(self.place(region, image, None, false))
                    }
                    Err(err) => {
                        warn!(%err, "stylized image undecodable; using original");
                        self.fallback(region, "diagram not stylized: unusable service output")
                    }
                }
            }
            None => self.fallback(region, "diagram not stylized: conversion failed"),
        }
    }

    /// Call the stylizer with bounded retries. Rate limits back off
    /// exponentially (base 2 s, doubling); any other failure ends the loop
    /// early. `None` means the caller should fall back to the original.
    async fn call_with_retry(
        &self,
        stylizer: &dyn Stylizer,
        image: &[u8],
        prompt: &str,
    ) -> Option<Vec<u8>> {
        for attempt in 0..self.retry.max_attempts {
            match stylizer.stylize(image, prompt, 1).await {
                Ok(Some(bytes)) => return Some(bytes),
                Ok(None) => {
                    warn!(attempt, "stylizer produced no image");
                    return None;
                }
                Err(InkwerkError::RateLimited) => {
                    if attempt + 1 < self.retry.max_attempts {
                        let delay = self.retry.base_delay * 2u32.pow(attempt);
                        debug!(attempt, delay_ms = delay.as_millis() as u64, "rate-limited; backing off");
                        sleep(delay).await;
                    }
                }
                Err(err) => {
                    warn!(attempt, %err, "stylization attempt failed");
                    return None;
                }
            }
        }
        warn!(max_attempts = self.retry.max_attempts, "stylization retries exhausted");
        None
    }

    /// Degrade to the original image with a warning. An original that does
    /// not even decode is an input fault and does escape.
    fn fallback(&self, region: &DiagramRegion, warning: &str) -> Result<ConvertedDiagram> {
        let image = decode_rgba(&region.image_bytes)
            .map_err(|e| InkwerkError::Image(format!("original diagram undecodable: {e}")))?;
        Ok(self.place(region, image, Some(warning.to_string()), false))
    }

    fn place(
        &self,
        region: &DiagramRegion,
        image: RgbaImage,
        warning: Option<String>,
        from_cache: bool,
    ) -> ConvertedDiagram {
        ConvertedDiagram {
            image,
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
            warning,
            from_cache,
        }
    }
}

/// Decode encoded image bytes into an RGBA raster.
fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| InkwerkError::Image(format!("failed to decode image: {e}")))?;
    Ok(image.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    use async_trait::async_trait;
    use image::Rgba;

    /// Scripted stylizer: counts calls and replays a fixed outcome.
    struct MockStylizer {
        calls: AtomicU32,
        outcome: MockOutcome,
    }

    enum MockOutcome {
        Succeed(Vec<u8>),
        RateLimited,
        Fail,
        Empty,
    }

    impl MockStylizer {
        fn new(outcome: MockOutcome) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                outcome,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Stylizer for MockStylizer {
        async fn stylize(
            &self,
            _image: &[u8],
            _prompt: &str,
            _sample_count: u32,
        ) -> Result<Option<Vec<u8>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                MockOutcome::Succeed(bytes) => Ok(Some(bytes.clone())),
                MockOutcome::RateLimited => Err(InkwerkError::RateLimited),
                MockOutcome::Fail => Err(InkwerkError::Stylization("boom".into())),
                MockOutcome::Empty => Ok(None),
            }
        }
    }

    /// A tiny valid PNG to stand in for diagram bytes.
    fn png_bytes(color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(4, 4, Rgba(color));
        let mut buffer = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png)
            .expect("encode png");
        buffer.into_inner()
    }

    fn region(color: [u8; 4]) -> DiagramRegion {
        DiagramRegion::new(10.0, 20.0, 100.0, 80.0, png_bytes(color))
    }

    fn converter(
        dir: &TempDir,
        stylizer: Option<Arc<dyn Stylizer>>,
    ) -> DiagramConverter {
        let cache = DiagramCache::open_in_memory(dir.path()).expect("cache");
        DiagramConverter::new(cache, stylizer)
    }

    #[tokio::test]
    async fn unconfigured_capability_degrades_with_warning() {
        let dir = TempDir::new().expect("dir");
        let converter = converter(&dir, None);

        let result = converter.convert(&region([9, 9, 9, 255])).await.expect("convert");
        assert!(result.warning.as_deref().unwrap_or("").contains("not stylized"));
        assert!(!result.from_cache);
        // Placement is carried through from the region.
        assert_eq!((result.x, result.y), (10.0, 20.0));
        assert_eq!(result.image.get_pixel(0, 0).0, [9, 9, 9, 255]);
    }

    #[tokio::test]
    async fn success_persists_and_second_call_hits_cache() {
        let dir = TempDir::new().expect("dir");
        let stylized = png_bytes([1, 2, 3, 255]);
        let mock = MockStylizer::new(MockOutcome::Succeed(stylized));
        let converter = converter(&dir, Some(mock.clone()));

        let input = region([200, 200, 200, 255]);

        let first = converter.convert(&input).await.expect("first");
        assert!(first.warning.is_none());
        assert!(!first.from_cache);
        assert_eq!(first.image.get_pixel(0, 0).0, [1, 2, 3, 255]);
        assert_eq!(mock.calls(), 1);

        let second = converter.convert(&input).await.expect("second");
        assert!(second.from_cache);
        assert_eq!(second.image.get_pixel(0, 0).0, [1, 2, 3, 255]);
        // The cache absorbed the second conversion — zero extra calls.
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_retries_exactly_three_times_then_falls_back() {
        let dir = TempDir::new().expect("dir");
        let mock = MockStylizer::new(MockOutcome::RateLimited);
        let converter = converter(&dir, Some(mock.clone()));

        let result = converter
            .convert(&region([50, 60, 70, 255]))
            .await
            .expect("convert");

        assert_eq!(mock.calls(), 3);
        assert!(result.warning.is_some());
        // Fallback returns the original pixels.
        assert_eq!(result.image.get_pixel(0, 0).0, [50, 60, 70, 255]);
    }

    #[tokio::test]
    async fn non_rate_limit_failure_stops_after_one_attempt() {
        let dir = TempDir::new().expect("dir");
        let mock = MockStylizer::new(MockOutcome::Fail);
        let converter = converter(&dir, Some(mock.clone()));

        let result = converter.convert(&region([5, 5, 5, 255])).await.expect("convert");
        assert_eq!(mock.calls(), 1);
        assert!(result.warning.is_some());
    }

    #[tokio::test]
    async fn empty_service_response_falls_back() {
        let dir = TempDir::new().expect("dir");
        let mock = MockStylizer::new(MockOutcome::Empty);
        let converter = converter(&dir, Some(mock.clone()));

        let result = converter.convert(&region([7, 7, 7, 255])).await.expect("convert");
        assert_eq!(mock.calls(), 1);
        assert!(result.warning.is_some());
        assert_eq!(result.image.get_pixel(0, 0).0, [7, 7, 7, 255]);
    }

    #[tokio::test]
    async fn stale_index_regenerates_instead_of_failing() {
        let dir = TempDir::new().expect("dir");
        let stylized = png_bytes([11, 12, 13, 255]);
        let mock = MockStylizer::new(MockOutcome::Succeed(stylized));

        let cache = DiagramCache::open_in_memory(dir.path()).expect("cache");
        let input = region([90, 90, 90, 255]);

        // Seed the cache, then delete the blob behind the index's back.
        cache
            .insert(&input.content_hash, "generic", &input.image_bytes, &png_bytes([1, 1, 1, 255]))
            .expect("seed");
        std::fs::remove_file(cache.blob_path(&input.content_hash)).expect("remove blob");

        let converter = DiagramConverter::new(cache, Some(mock.clone()));
        let result = converter.convert(&input).await.expect("convert");

        // Healed by regeneration: one external call, fresh pixels, no error.
        assert_eq!(mock.calls(), 1);
        assert!(result.warning.is_none());
        assert_eq!(result.image.get_pixel(0, 0).0, [11, 12, 13, 255]);
    }

    #[tokio::test]
    async fn undecodable_original_is_an_input_error() {
        let dir = TempDir::new().expect("dir");
        let converter = converter(&dir, None);

        let bogus = DiagramRegion::new(0.0, 0.0, 10.0, 10.0, vec![0xde, 0xad]);
        let err = converter.convert(&bogus).await.expect_err("must fail");
        assert!(matches!(err, InkwerkError::Image(_)));
    }
}
