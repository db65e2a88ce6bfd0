// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Layer compositor — merges an opaque paper raster, an alpha text canvas,
// and stylized diagram rasters into one opaque page.
//
// Text is alpha composited ("over") onto the paper. Diagrams occlude: each
// is pasted as a hard overwrite inside its own alpha cutout mask, so
// handwriting never bleeds through a figure.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage, RgbaImage};
use tracing::{debug, instrument};

/// Final opaque raster for one document page.
pub type ComposedPage = RgbImage;

/// A diagram ready for placement: the converted raster plus its target
/// rectangle in document units.
pub struct PlacedDiagram {
    pub image: RgbaImage,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Compose one page. `scale` maps document units to pixels, the same
/// factor used by the paper and stroke renderers.
#[instrument(skip_all, fields(diagrams = diagrams.len(), scale))]
pub fn compose_page(
    mut paper: RgbImage,
    text_layer: RgbaImage,
    diagrams: &[PlacedDiagram],
    scale: f32,
) -> ComposedPage {
    let (paper_w, paper_h) = paper.dimensions();

    // Rounding during rendering can leave the text canvas a pixel off;
    // force an exact match before compositing.
    let text_layer = if text_layer.dimensions() != (paper_w, paper_h) {
        debug!(
            text = ?text_layer.dimensions(),
            paper = ?(paper_w, paper_h),
            "resizing text layer to paper dimensions"
        );
        imageops::resize(&text_layer, paper_w, paper_h, FilterType::Lanczos3)
    } else {
        text_layer
    };

    alpha_over(&mut paper, &text_layer);

    for diagram in diagrams {
        paste_diagram(&mut paper, diagram, scale);
    }

    paper
}

/// Resize a diagram to its target rectangle and hard-paste it through its
/// alpha mask. Pixels with any diagram coverage replace the page content
/// outright.
fn paste_diagram(page: &mut RgbImage, diagram: &PlacedDiagram, scale: f32) {
    let (page_w, page_h) = page.dimensions();

    let target_w = ((diagram.width * scale).round() as u32).max(1);
    let target_h = ((diagram.height * scale).round() as u32).max(1);
    let origin_x = (diagram.x * scale).round() as i64;
    let origin_y = (diagram.y * scale).round() as i64;

    let resized = if diagram.image.dimensions() == (target_w, target_h) {
        diagram.image.clone()
    } else {
        imageops::resize(&diagram.image, target_w, target_h, FilterType::Lanczos3)
    };

    for (dx, dy, pixel) in resized.enumerate_pixels() {
        if pixel.0[3] == 0 {
            continue;
        }
        let px = origin_x + dx as i64;
        let py = origin_y + dy as i64;
        if px < 0 || py < 0 || px >= page_w as i64 || py >= page_h as i64 {
            continue;
        }
        page.put_pixel(px as u32, py as u32, Rgb([pixel.0[0], pixel.0[1], pixel.0[2]]));
    }
}

/// Standard "over" compositing of an alpha raster onto an opaque base.
/// The base shows through wherever the overlay alpha is zero.
pub(crate) fn alpha_over(base: &mut RgbImage, overlay: &RgbaImage) {
    let (w, h) = base.dimensions();
    debug_assert_eq!(overlay.dimensions(), (w, h));

    for y in 0..h.min(overlay.height()) {
        for x in 0..w.min(overlay.width()) {
            let fg = overlay.get_pixel(x, y);
            let a = fg.0[3] as u32;
            if a == 0 {
                continue;
            }
            let bg = base.get_pixel_mut(x, y);
            for c in 0..3 {
                let blended = (fg.0[c] as u32 * a + bg.0[c] as u32 * (255 - a)) / 255;
                bg.0[c] = blended as u8;
            }
        }
    }
}
