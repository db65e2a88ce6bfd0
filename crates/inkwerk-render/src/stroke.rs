// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stroke renderer — draws imperfect handwriting onto a transparent canvas.
//
// Every glyph run gets independent position jitter and pressure (opacity)
// jitter, and the cursor advances by measured width plus a randomized gap,
// so no two renders of the same text look mechanically identical unless
// they share a seed.

use ab_glyph::{FontArc, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_line_segment_mut, draw_text_mut, text_size};
use inkwerk_core::config::RenderStyle;
use inkwerk_core::types::TextLine;
use rand::Rng;
use tracing::{debug, instrument};

use crate::imperfect::{Defect, TextSegment, segment_line};

/// Renders text lines as handwriting onto a shared alpha canvas.
pub struct StrokeRenderer {
    font: FontArc,
    ink: [u8; 3],
    font_size: f32,
    correction_size: f32,
    imperfection: f64,
    enable_smudges: bool,
}

impl StrokeRenderer {
    pub fn new(style: &RenderStyle, font: FontArc) -> Self {
        Self {
            font,
            ink: style.ink_rgb(),
            font_size: style.font_size,
            correction_size: style.correction_font_size(),
            imperfection: style.imperfection_level(),
            enable_smudges: style.enable_smudges,
        }
    }

    /// Render all text lines of a page onto a fresh transparent canvas
    /// sized `page_width x page_height` document units at `scale` device
    /// pixels per unit.
    #[instrument(skip_all, fields(lines = lines.len(), page_width, page_height, scale))]
    pub fn render_page<R: Rng>(
        &self,
        lines: &[TextLine],
        page_width: f32,
        page_height: f32,
        scale: f32,
        rng: &mut R,
    ) -> RgbaImage {
        let canvas_w = (page_width * scale).round().max(1.0) as u32;
        let canvas_h = (page_height * scale).round().max(1.0) as u32;
        let mut canvas = RgbaImage::new(canvas_w, canvas_h);

        for line in lines {
            let segments = segment_line(&line.text, self.imperfection, rng);
            let y = line.y * scale + rng.gen_range(-1.0..1.0f32);
            let x = line.x * scale;
            self.render_segments(&mut canvas, &segments, x, y, scale, rng);
        }

        if self.enable_smudges {
            apply_smudges(&mut canvas, rng);
        }

        debug!(canvas_w, canvas_h, "text layer rendered");
        canvas
    }

    /// Render one line's segments left to right from `(x, y)`.
    fn render_segments<R: Rng>(
        &self,
        canvas: &mut RgbaImage,
        segments: &[TextSegment],
        x: f32,
        y: f32,
        scale: f32,
        rng: &mut R,
    ) {
        let font_px = PxScale::from(self.font_size * scale);
        let correction_px = PxScale::from(self.correction_size * scale);
        let mut cursor_x = x;

        for segment in segments {
            // Position jitter, bounded so words stay near their baseline.
            let jx = rng.gen_range(-2.0..2.0f32) * scale;
            let jy = rng.gen_range(-1.5..1.5f32) * scale;

            // Pen pressure as opacity.
            let pressure: f32 = rng.gen_range(0.75..1.0);
            let alpha = (255.0 * pressure) as u8;
            let ink = self.rgba(alpha);

            let pos_x = cursor_x + jx;
            let pos_y = y + jy;
            let (text_w, text_h) = text_size(font_px, &self.font, &segment.text);
            let (text_w, text_h) = (text_w as f32, text_h as f32);

            match &segment.defect {
                Defect::Normal => {
                    self.draw(canvas, &segment.text, pos_x, pos_y, font_px, ink);
                }

                Defect::Misspelled { correction } => {
                    self.draw(canvas, &segment.text, pos_x, pos_y, font_px, ink);

                    // Light underline beneath the misspelt word.
                    let under_y = pos_y + text_h + 1.0;
                    draw_line_segment_mut(
                        canvas,
                        (pos_x, under_y),
                        (pos_x + text_w, under_y),
                        self.rgba(150),
                    );

                    let corr_x = pos_x + rng.gen_range(-2.0..2.0f32);
                    let corr_y = pos_y - self.correction_size * scale - 2.0;
                    let corr_ink = self.rgba((alpha as f32 * 0.9) as u8);
                    self.draw(canvas, correction, corr_x, corr_y, correction_px, corr_ink);
                }

                Defect::StruckThrough { correction } => {
                    self.draw(canvas, &segment.text, pos_x, pos_y, font_px, ink);
                    self.draw_wavy_strike(canvas, pos_x, pos_y, text_w, text_h, rng);

                    let corr_x = pos_x + rng.gen_range(-3.0..3.0f32);
                    let corr_y = pos_y - self.correction_size * scale - 2.0;
                    let corr_ink = self.rgba((alpha as f32 * 0.9) as u8);
                    self.draw(canvas, correction, corr_x, corr_y, correction_px, corr_ink);
                }

                Defect::ErasureRedo => {
                    // Ghost of the erased attempt, then the rewrite just off
                    // to the side at full pressure.
                    self.draw(canvas, &segment.text, pos_x, pos_y, font_px, self.rgba(60));
                    let redo_x = pos_x + rng.gen_range(1.0..3.0f32);
                    let redo_y = pos_y + rng.gen_range(-1.0..1.0f32);
                    self.draw(canvas, &segment.text, redo_x, redo_y, font_px, ink);
                }
            }

            // Variable inter-word spacing — fixed gaps read as typeset.
            cursor_x += text_w + rng.gen_range(4.0..8.0f32) * scale;
        }
    }

    /// A wavy horizontal strike through the vertical midpoint of a word:
    /// sampled every 4 px with per-sample vertical jitter, drawn twice for
    /// a 2 px stroke.
    fn draw_wavy_strike<R: Rng>(
        &self,
        canvas: &mut RgbaImage,
        pos_x: f32,
        pos_y: f32,
        text_w: f32,
        text_h: f32,
        rng: &mut R,
    ) {
        let mid_y = pos_y + text_h / 2.0;
        let start = pos_x - 3.0;
        let end = pos_x + text_w + 3.0;

        let mut points = Vec::new();
        let mut px = start;
        while px < end {
            let wave = rng.gen_range(-1.5..1.5f32);
            points.push((px, mid_y + wave));
            px += 4.0;
        }

        let ink = self.rgba(200);
        for pair in points.windows(2) {
            draw_line_segment_mut(canvas, pair[0], pair[1], ink);
            draw_line_segment_mut(
                canvas,
                (pair[0].0, pair[0].1 + 1.0),
                (pair[1].0, pair[1].1 + 1.0),
                ink,
            );
        }
    }

    fn draw(
        &self,
        canvas: &mut RgbaImage,
        text: &str,
        x: f32,
        y: f32,
        scale: PxScale,
        ink: Rgba<u8>,
    ) {
        draw_text_mut(
            canvas,
            ink,
            x.round() as i32,
            y.round() as i32,
            scale,
            &self.font,
            text,
        );
    }

    fn rgba(&self, alpha: u8) -> Rgba<u8> {
        Rgba([self.ink[0], self.ink[1], self.ink[2], alpha])
    }
}

/// Smudge post-pass: pick 0–3 spots and, within a small disc around each,
/// deepen the alpha of pixels that already carry ink. Models capillary ink
/// spread — blank paper is never inked.
pub(crate) fn apply_smudges<R: Rng>(canvas: &mut RgbaImage, rng: &mut R) {
    let (w, h) = canvas.dimensions();
    if w <= 100 || h <= 100 {
        return;
    }

    let count = rng.gen_range(0..=3u32);
    for _ in 0..count {
        let sx = rng.gen_range(50..w - 50) as i64;
        let sy = rng.gen_range(50..h - 50) as i64;
        let radius = rng.gen_range(3..=8i64);

        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy > radius * radius {
                    continue;
                }
                let (px, py) = (sx + dx, sy + dy);
                if px < 0 || py < 0 || px >= w as i64 || py >= h as i64 {
                    continue;
                }
                let pixel = canvas.get_pixel_mut(px as u32, py as u32);
                if pixel.0[3] > 0 {
                    let boost: u8 = rng.gen_range(0..=20);
                    pixel.0[3] = pixel.0[3].saturating_add(boost);
                }
            }
        }
    }
}
