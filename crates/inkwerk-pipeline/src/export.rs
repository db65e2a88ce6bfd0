// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page export — writes composed pages to distributable files.
//
// The orchestrator only sees the `PageExporter` trait; `FileExporter` is
// the concrete backend producing a multi-page PDF (via printpdf 0.8) or
// one PNG/JPEG file per page.

use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use tracing::{debug, info, instrument};

use inkwerk_core::error::{InkwerkError, Result};
use inkwerk_core::types::{ExportFormat, JobId};
use inkwerk_render::ComposedPage;

/// Receives the ordered composed pages of a finished job.
pub trait PageExporter: Send + Sync {
    /// Write `pages` to `output_dir` in the requested format, returning the
    /// path callers should surface as the job result (the PDF file, or the
    /// directory of per-page images).
    fn export(
        &self,
        pages: &[ComposedPage],
        format: ExportFormat,
        output_dir: &Path,
        job_id: &JobId,
    ) -> Result<PathBuf>;
}

/// File-based exporter. Pages are assumed uniform in size per document;
/// PDF page dimensions are derived from pixel dimensions at the engine DPI.
pub struct FileExporter {
    dpi: u32,
}

impl FileExporter {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }

    // -- PDF ------------------------------------------------------------------

    /// Build a multi-page PDF embedding each page raster at native DPI.
    #[instrument(skip(self, pages), fields(pages = pages.len()))]
    fn export_pdf(&self, pages: &[ComposedPage], path: &Path) -> Result<()> {
        let mut doc = PdfDocument::new("Inkwerk Document");
        let mut pdf_pages: Vec<PdfPage> = Vec::new();

        for page in pages {
            let (w_px, h_px) = page.dimensions();
            let w_mm = Mm(w_px as f32 * 25.4 / self.dpi as f32);
            let h_mm = Mm(h_px as f32 * 25.4 / self.dpi as f32);

            let raw = RawImage {
                pixels: RawImageData::U8(page.clone().into_raw()),
                width: w_px as usize,
                height: h_px as usize,
                data_format: RawImageFormat::RGB8,
                tag: Vec::new(),
            };
            let xobject_id = doc.add_image(&raw);

            // Placed at the page origin; at `dpi` the raster fills the page
            // exactly, since the page size was derived from the same pixels.
            let ops = vec![Op::UseXobject {
                id: xobject_id,
                transform: XObjectTransform {
                    translate_x: Some(Pt(0.0)),
                    translate_y: Some(Pt(0.0)),
                    scale_x: None,
                    scale_y: None,
                    dpi: Some(self.dpi as f32),
                    rotate: None,
                },
            }];

            pdf_pages.push(PdfPage::new(w_mm, h_mm, ops));
        }

        doc.with_pages(pdf_pages);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
        std::fs::write(path, &bytes)?;

        debug!(bytes = bytes.len(), "PDF written");
        Ok(())
    }

    // -- Per-page images ------------------------------------------------------

    fn export_images(
        &self,
        pages: &[ComposedPage],
        format: ExportFormat,
        output_dir: &Path,
    ) -> Result<()> {
        for (index, page) in pages.iter().enumerate() {
            let path = output_dir.join(format!("page_{}.{}", index + 1, format.extension()));
            match format {
                ExportFormat::Png => {
                    page.save_with_format(&path, image::ImageFormat::Png)
                        .map_err(|e| InkwerkError::Export(format!("PNG write failed: {e}")))?;
                }
                ExportFormat::Jpg => {
                    let file = std::fs::File::create(&path)?;
                    let encoder = JpegEncoder::new_with_quality(file, 95);
                    page.write_with_encoder(encoder)
                        .map_err(|e| InkwerkError::Export(format!("JPEG write failed: {e}")))?;
                }
                ExportFormat::Pdf => unreachable!("handled by export_pdf"),
            }
        }
        Ok(())
    }
}

impl PageExporter for FileExporter {
    #[instrument(skip(self, pages), fields(pages = pages.len(), ?format, job_id = %job_id))]
    fn export(
        &self,
        pages: &[ComposedPage],
        format: ExportFormat,
        output_dir: &Path,
        job_id: &JobId,
    ) -> Result<PathBuf> {
        if pages.is_empty() {
            return Err(InkwerkError::Export("document has no pages".into()));
        }
        std::fs::create_dir_all(output_dir)?;

        let result = match format {
            ExportFormat::Pdf => {
                let path = output_dir.join("result.pdf");
                self.export_pdf(pages, &path)?;
                path
            }
            ExportFormat::Png | ExportFormat::Jpg => {
                self.export_images(pages, format, output_dir)?;
                output_dir.to_path_buf()
            }
        };

        info!(result = %result.display(), "export complete");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn pages(n: usize) -> Vec<ComposedPage> {
        (0..n)
            .map(|i| RgbImage::from_pixel(120, 160, Rgb([250, 250, 240 - i as u8])))
            .collect()
    }

    #[test]
    fn png_export_writes_one_file_per_page() {
        let dir = TempDir::new().expect("dir");
        let exporter = FileExporter::new(150);
        let job_id = JobId::new();

        let result = exporter
            .export(&pages(3), ExportFormat::Png, dir.path(), &job_id)
            .expect("export");
        assert_eq!(result, dir.path());

        for i in 1..=3 {
            let path = dir.path().join(format!("page_{i}.png"));
            let reloaded = image::open(&path).expect("reload page");
            assert_eq!(reloaded.width(), 120);
            assert_eq!(reloaded.height(), 160);
        }
    }

    #[test]
    fn jpg_export_is_decodable() {
        let dir = TempDir::new().expect("dir");
        let exporter = FileExporter::new(150);

        exporter
            .export(&pages(1), ExportFormat::Jpg, dir.path(), &JobId::new())
            .expect("export");

        let reloaded = image::open(dir.path().join("page_1.jpg")).expect("reload");
        assert_eq!(reloaded.width(), 120);
    }

    #[test]
    fn pdf_export_produces_a_pdf_file() {
        let dir = TempDir::new().expect("dir");
        let exporter = FileExporter::new(150);

        let result = exporter
            .export(&pages(2), ExportFormat::Pdf, dir.path(), &JobId::new())
            .expect("export");

        assert_eq!(result, dir.path().join("result.pdf"));
        let bytes = std::fs::read(&result).expect("read pdf");
        assert!(bytes.starts_with(b"%PDF"), "missing PDF header");
    }

    #[test]
    fn empty_document_is_rejected() {
        let dir = TempDir::new().expect("dir");
        let exporter = FileExporter::new(150);

        let err = exporter
            .export(&[], ExportFormat::Pdf, dir.path(), &JobId::new())
            .expect_err("must reject");
        assert!(matches!(err, InkwerkError::Export(_)));
    }
}
