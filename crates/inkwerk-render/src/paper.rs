// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Paper texture generator — synthesizes opaque page backgrounds: palette
// base with Gaussian grain, ruled/grid patterns with per-line jitter,
// optional coffee stains and edge shadow.
//
// Patterns and stains are drawn into an RGBA overlay that is alpha
// composited onto the base, so their low alpha values tint rather than
// overwrite the paper.

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use inkwerk_core::config::PaperSpec;
use inkwerk_core::types::PaperKind;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, instrument};

use crate::compose::alpha_over;

const RULE_COLOR: Rgba<u8> = Rgba([190, 210, 230, 128]);
const MARGIN_COLOR: Rgba<u8> = Rgba([240, 130, 130, 100]);
const GRAPH_COLOR: Rgba<u8> = Rgba([200, 215, 230, 80]);
const ENG_MINOR_COLOR: Rgba<u8> = Rgba([210, 225, 210, 50]);
const ENG_MAJOR_COLOR: Rgba<u8> = Rgba([170, 200, 170, 100]);
const STAIN_RGB: [u8; 3] = [139, 90, 43];

/// Generate a paper background of `width x height` pixels.
#[instrument(skip(spec, rng), fields(kind = ?spec.kind, width, height))]
pub fn render_paper<R: Rng>(spec: &PaperSpec, width: u32, height: u32, rng: &mut R) -> RgbImage {
    let mut paper = RgbImage::from_pixel(width, height, Rgb(spec.base_color));
    add_grain(&mut paper, rng);

    let mut overlay = RgbaImage::new(width, height);
    match spec.kind {
        PaperKind::Lined => draw_lined(&mut overlay, width, height, spec.line_spacing, rng),
        PaperKind::Graph => draw_graph(&mut overlay, width, height, spec.grid_size, rng),
        PaperKind::Engineering => draw_engineering(&mut overlay, width, height),
        PaperKind::Blank => {}
    }

    if spec.coffee_stains {
        add_coffee_stains(&mut overlay, width, height, rng);
    }

    alpha_over(&mut paper, &overlay);

    if spec.edge_shadow {
        add_edge_shadow(&mut paper);
    }

    debug!("paper texture generated");
    paper
}

/// Subtle per-channel Gaussian luminance noise so the fill does not read
/// as a flat digital colour.
fn add_grain<R: Rng>(paper: &mut RgbImage, rng: &mut R) {
    let noise = Normal::new(0.0f32, 2.5).expect("valid std dev");
    for pixel in paper.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            let value = *channel as f32 + noise.sample(rng);
            *channel = value.clamp(0.0, 255.0) as u8;
        }
    }
}

/// Rule-line y positions for lined paper: start below the top margin and
/// stop short of the bottom edge.
pub(crate) fn rule_positions(height: u32, spacing: f32) -> Vec<f32> {
    let mut positions = Vec::new();
    let mut y = spacing + 40.0;
    while y < height as f32 - 20.0 {
        positions.push(y);
        y += spacing;
    }
    positions
}

/// Horizontal rules with a red margin line near 12% of the width. Each
/// rule is a short-segmented polyline with slight vertical jitter.
fn draw_lined<R: Rng>(overlay: &mut RgbaImage, width: u32, height: u32, spacing: f32, rng: &mut R) {
    let margin_x = width as f32 * 0.12;
    draw_line_segment_mut(overlay, (margin_x, 0.0), (margin_x, height as f32), MARGIN_COLOR);
    draw_line_segment_mut(
        overlay,
        (margin_x + 1.0, 0.0),
        (margin_x + 1.0, height as f32),
        MARGIN_COLOR,
    );

    for y in rule_positions(height, spacing) {
        let mut prev: Option<(f32, f32)> = None;
        let mut x = 0.0f32;
        while x < width as f32 {
            let jitter = rng.gen_range(-0.3..0.3f32);
            let point = (x, y + jitter);
            if let Some(p) = prev {
                draw_line_segment_mut(overlay, p, point, RULE_COLOR);
            }
            prev = Some(point);
            x += 15.0;
        }
    }
}

/// Square grid; each full-length line is independently offset by a small
/// sub-pixel jitter.
fn draw_graph<R: Rng>(overlay: &mut RgbaImage, width: u32, height: u32, cell: f32, rng: &mut R) {
    let cell = cell.max(2.0);

    let mut x = cell;
    while x < width as f32 {
        let jitter = rng.gen_range(-0.2..0.2f32);
        draw_line_segment_mut(
            overlay,
            (x + jitter, 0.0),
            (x + jitter, height as f32),
            GRAPH_COLOR,
        );
        x += cell;
    }

    let mut y = cell;
    while y < height as f32 {
        let jitter = rng.gen_range(-0.2..0.2f32);
        draw_line_segment_mut(
            overlay,
            (0.0, y + jitter),
            (width as f32, y + jitter),
            GRAPH_COLOR,
        );
        y += cell;
    }
}

/// Engineering paper: a fine minor grid under a coarser, darker major
/// grid. No text margin.
fn draw_engineering(overlay: &mut RgbaImage, width: u32, height: u32) {
    for (step, color) in [(5.0f32, ENG_MINOR_COLOR), (25.0, ENG_MAJOR_COLOR)] {
        let mut x = step;
        while x < width as f32 {
            draw_line_segment_mut(overlay, (x, 0.0), (x, height as f32), color);
            x += step;
        }
        let mut y = step;
        while y < height as f32 {
            draw_line_segment_mut(overlay, (0.0, y), (width as f32, y), color);
            y += step;
        }
    }
}

/// One or two coffee-ring stains: concentric faint rings shrinking inward
/// plus a very faint inner fill.
fn add_coffee_stains<R: Rng>(overlay: &mut RgbaImage, width: u32, height: u32, rng: &mut R) {
    if width <= 200 || height <= 200 {
        return;
    }

    let count = rng.gen_range(1..=2u32);
    for _ in 0..count {
        let cx = rng.gen_range(100..width - 100) as i32;
        let cy = rng.gen_range(100..height - 100) as i32;
        let radius = rng.gen_range(25..=55i32);

        for r in ((radius - 7)..=radius).rev() {
            let alpha: u8 = rng.gen_range(8..=20);
            let color = Rgba([STAIN_RGB[0], STAIN_RGB[1], STAIN_RGB[2], alpha]);
            draw_hollow_circle_mut(overlay, (cx, cy), r, color);
            draw_hollow_circle_mut(overlay, (cx, cy), r - 1, color);
        }

        let inner = radius - 10;
        if inner > 0 {
            draw_filled_circle_mut(
                overlay,
                (cx, cy),
                inner,
                Rgba([STAIN_RGB[0], STAIN_RGB[1], STAIN_RGB[2], 8]),
            );
        }
    }
}

/// Vignette: darken the four border bands with an ease-in falloff so the
/// extreme edge is darkest and the effect fades smoothly inward.
fn add_edge_shadow(paper: &mut RgbImage) {
    let (width, height) = paper.dimensions();
    let fade = 40u32.min(width / 2).min(height / 2);
    if fade == 0 {
        return;
    }

    let darken_row = |paper: &mut RgbImage, y: u32, factor: f32| {
        for x in 0..width {
            let pixel = paper.get_pixel_mut(x, y);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as f32 * factor) as u8;
            }
        }
    };
    let darken_col = |paper: &mut RgbImage, x: u32, factor: f32| {
        for y in 0..height {
            let pixel = paper.get_pixel_mut(x, y);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as f32 * factor) as u8;
            }
        }
    };

    for i in 0..fade {
        let eased = (i as f32 / fade as f32).sqrt();
        let factor = 1.0 - (1.0 - eased) * 0.08;

        darken_row(paper, i, factor);
        darken_row(paper, height - 1 - i, factor);
        darken_col(paper, i, factor);
        darken_col(paper, width - 1 - i, factor);
    }
}
