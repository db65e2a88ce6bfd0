// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rendering orchestrator — drives one job through the full pipeline.
//
// Pages are processed strictly one at a time: extract layout, render
// paper, render the text layer, convert diagrams, composite. Only one
// page's rasters are resident at a time and progress reporting stays
// ordered. Any failure during a page aborts the whole job; diagram
// stylization failures are absorbed by the converter and surface only as
// warnings on the job record.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{error, info, instrument};

use inkwerk_core::config::{EngineConfig, PaperSpec, RenderStyle};
use inkwerk_core::error::Result;
use inkwerk_core::types::{ExportFormat, JobId, JobStatus};
use inkwerk_diagram::DiagramConverter;
use inkwerk_render::{
    ComposedPage, FontLibrary, PlacedDiagram, StrokeRenderer, compose_page, render_paper,
};

use crate::export::PageExporter;
use crate::layout::LayoutProvider;
use crate::state::JobStore;

/// Fraction of the progress bar reserved for document-level setup; the
/// remaining span up to 90 is divided evenly across pages.
const SETUP_PROGRESS: u32 = 5;
const EXPORT_PROGRESS: u32 = 90;

/// Sequential per-job rendering pipeline.
pub struct RenderPipeline {
    store: Arc<Mutex<JobStore>>,
    converter: DiagramConverter,
    exporter: Arc<dyn PageExporter>,
    fonts: FontLibrary,
    config: EngineConfig,
}

impl RenderPipeline {
    pub fn new(
        store: Arc<Mutex<JobStore>>,
        converter: DiagramConverter,
        exporter: Arc<dyn PageExporter>,
        config: EngineConfig,
    ) -> Self {
        let fonts = FontLibrary::new(config.fonts_dir.clone());
        Self {
            store,
            converter,
            exporter,
            fonts,
            config,
        }
    }

    /// Run one job to a terminal state.
    ///
    /// Refuses (without touching the record) when the job is already
    /// Processing or terminal. Otherwise returns the terminal status the
    /// job reached: rendering errors are captured on the record as Failed
    /// rather than propagated.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn process_job(
        &self,
        job_id: JobId,
        provider: &dyn LayoutProvider,
        style: &RenderStyle,
        format: ExportFormat,
    ) -> Result<JobStatus> {
        self.store.lock().try_begin_processing(&job_id)?;

        match self.run(&job_id, provider, style, format).await {
            Ok(result_path) => {
                self.store.lock().update(&job_id, |job| {
                    job.status = JobStatus::Completed;
                    job.progress = 100;
                    job.current_stage = "Completed".into();
                    job.result_path = Some(result_path.to_string_lossy().into_owned());
                    job.completed_at = Some(chrono::Utc::now());
                })?;
                info!(job_id = %job_id, "job completed");
                Ok(JobStatus::Completed)
            }
            Err(err) => {
                error!(job_id = %job_id, %err, "job failed");
                // The last stage label is kept so the user can see where
                // the run died.
                self.store.lock().update(&job_id, |job| {
                    job.status = JobStatus::Failed;
                    job.error_message = Some(err.to_string());
                })?;
                Ok(JobStatus::Failed)
            }
        }
    }

    /// The fallible body of a run: every page in order, then export.
    async fn run(
        &self,
        job_id: &JobId,
        provider: &dyn LayoutProvider,
        style: &RenderStyle,
        format: ExportFormat,
    ) -> Result<PathBuf> {
        let scale = self.config.scale();
        let num_pages = provider.page_count()?;

        self.store
            .lock()
            .update(job_id, |job| job.num_pages = num_pages)?;
        self.set_progress(job_id, SETUP_PROGRESS, "Extracting document content...")?;

        let font = self.fonts.load(&style.handwriting_font)?;
        let renderer = StrokeRenderer::new(style, font);
        let paper_spec = PaperSpec::from_style(style, scale);
        let mut rng = match style.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let page_span = EXPORT_PROGRESS - SETUP_PROGRESS - 5;
        let mut pages: Vec<ComposedPage> = Vec::new();

        for page_index in 0..num_pages {
            let base = SETUP_PROGRESS + (page_index * page_span) / num_pages.max(1);
            let page_label = format!("page {}/{}", page_index + 1, num_pages);

            self.set_progress(job_id, base, &format!("Extracting {page_label}..."))?;
            let layout = provider.extract_page(page_index)?;

            let page_w = (layout.width * scale).round().max(1.0) as u32;
            let page_h = (layout.height * scale).round().max(1.0) as u32;

            self.set_progress(job_id, base + 5, &format!("Rendering paper for {page_label}..."))?;
            let paper = render_paper(&paper_spec, page_w, page_h, &mut rng);

            self.set_progress(job_id, base + 10, &format!("Writing text on {page_label}..."))?;
            let text_layer =
                renderer.render_page(&layout.lines, layout.width, layout.height, scale, &mut rng);

            let mut placed: Vec<PlacedDiagram> = Vec::new();
            if !layout.diagrams.is_empty() {
                self.set_progress(
                    job_id,
                    base + 15,
                    &format!("Converting diagrams on {page_label}..."),
                )?;
                for region in &layout.diagrams {
                    let converted = self.converter.convert(region).await?;
                    if let Some(warning) = &converted.warning {
                        let warning = warning.clone();
                        self.store
                            .lock()
                            .update(job_id, move |job| job.warnings.push(warning))?;
                    }
                    placed.push(PlacedDiagram {
                        image: converted.image,
                        x: converted.x,
                        y: converted.y,
                        width: converted.width,
                        height: converted.height,
                    });
                }
            }

            self.set_progress(job_id, base + 18, &format!("Composing {page_label}..."))?;
            pages.push(compose_page(paper, text_layer, &placed, scale));
        }

        self.set_progress(job_id, EXPORT_PROGRESS, "Generating output files...")?;
        let output_dir = self.config.results_path()?.join(job_id.to_string());
        self.exporter.export(&pages, format, &output_dir, job_id)
    }

    /// Monotone progress write. Quietly does nothing once the record is
    /// gone or the job has left the Processing state.
    fn set_progress(&self, job_id: &JobId, progress: u32, stage: &str) -> Result<()> {
        self.store.lock().update(job_id, |job| {
            if job.status == JobStatus::Processing {
                job.progress = job.progress.max(progress.min(100));
                job.current_stage = stage.to_string();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    use inkwerk_core::error::InkwerkError;
    use inkwerk_core::types::{DiagramRegion, PageLayout, RenderJob, TextLine};
    use inkwerk_diagram::DiagramCache;

    use crate::export::FileExporter;

    /// Fixed single-document layout provider.
    struct StubProvider {
        pages: Vec<PageLayout>,
    }

    impl LayoutProvider for StubProvider {
        fn page_count(&self) -> Result<u32> {
            Ok(self.pages.len() as u32)
        }

        fn extract_page(&self, page_index: u32) -> Result<PageLayout> {
            self.pages
                .get(page_index as usize)
                .cloned()
                .ok_or_else(|| InkwerkError::Layout(format!("no page {page_index}")))
        }
    }

    /// Provider whose extraction always fails, for the abort path.
    struct BrokenProvider;

    impl LayoutProvider for BrokenProvider {
        fn page_count(&self) -> Result<u32> {
            Ok(1)
        }

        fn extract_page(&self, _page_index: u32) -> Result<PageLayout> {
            Err(InkwerkError::Layout("extraction exploded".into()))
        }
    }

    fn one_page(lines: Vec<TextLine>, diagrams: Vec<DiagramRegion>) -> PageLayout {
        PageLayout {
            page_index: 0,
            width: 300.0,
            height: 200.0,
            lines,
            diagrams,
        }
    }

    fn test_style() -> RenderStyle {
        RenderStyle {
            imperfection_level: 0.0,
            enable_smudges: false,
            enable_page_shadows: false,
            seed: Some(7),
            ..Default::default()
        }
    }

    fn pipeline(storage: &TempDir) -> (RenderPipeline, Arc<Mutex<JobStore>>) {
        let store = Arc::new(Mutex::new(JobStore::open_in_memory().expect("store")));
        let cache =
            DiagramCache::open_in_memory(storage.path().join("cache")).expect("cache");
        let converter = DiagramConverter::new(cache, None);
        let config = EngineConfig {
            storage_path: storage.path().to_path_buf(),
            ..Default::default()
        };
        let exporter = Arc::new(FileExporter::new(config.dpi));
        (
            RenderPipeline::new(store.clone(), converter, exporter, config),
            store,
        )
    }

    fn png_bytes() -> Vec<u8> {
        let img = RgbaImage::from_pixel(8, 8, Rgba([40, 80, 120, 255]));
        let mut buffer = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png)
            .expect("encode");
        buffer.into_inner()
    }

    fn create_job(store: &Arc<Mutex<JobStore>>) -> JobId {
        let job = RenderJob::new("notes.pdf".into());
        store.lock().create_job(&job).expect("create");
        job.id
    }

    #[tokio::test]
    async fn single_page_job_completes_cleanly() {
        let Some(_) = inkwerk_render::FontLibrary::system_fallback() else { return };

        let storage = TempDir::new().expect("storage");
        let (pipeline, store) = pipeline(&storage);
        let job_id = create_job(&store);

        let provider = StubProvider {
            pages: vec![one_page(
                vec![TextLine {
                    text: "helo world".into(),
                    x: 40.0,
                    y: 60.0,
                    font_size: 18.0,
                }],
                vec![],
            )],
        };

        let status = pipeline
            .process_job(job_id, &provider, &test_style(), ExportFormat::Png)
            .await
            .expect("process");
        assert_eq!(status, JobStatus::Completed);

        let job = store.lock().get_job(&job_id).expect("get").expect("found");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.warnings.is_empty(), "unexpected warnings: {:?}", job.warnings);
        assert!(job.completed_at.is_some());

        let result = PathBuf::from(job.result_path.expect("result path"));
        assert!(result.join("page_1.png").exists());
    }

    #[tokio::test]
    async fn unstylized_diagrams_complete_with_warnings() {
        let Some(_) = inkwerk_render::FontLibrary::system_fallback() else { return };

        let storage = TempDir::new().expect("storage");
        let (pipeline, store) = pipeline(&storage);
        let job_id = create_job(&store);

        let provider = StubProvider {
            pages: vec![one_page(
                vec![],
                vec![DiagramRegion::new(50.0, 50.0, 80.0, 60.0, png_bytes())],
            )],
        };

        let status = pipeline
            .process_job(job_id, &provider, &test_style(), ExportFormat::Png)
            .await
            .expect("process");
        assert_eq!(status, JobStatus::Completed);

        let job = store.lock().get_job(&job_id).expect("get").expect("found");
        assert_eq!(job.warnings.len(), 1);
        assert!(job.warnings[0].contains("not stylized"));
    }

    #[tokio::test]
    async fn extraction_failure_fails_the_job() {
        let Some(_) = inkwerk_render::FontLibrary::system_fallback() else { return };

        let storage = TempDir::new().expect("storage");
        let (pipeline, store) = pipeline(&storage);
        let job_id = create_job(&store);

        let status = pipeline
            .process_job(job_id, &BrokenProvider, &test_style(), ExportFormat::Png)
            .await
            .expect("process resolves");
        assert_eq!(status, JobStatus::Failed);

        let job = store.lock().get_job(&job_id).expect("get").expect("found");
        assert_eq!(job.status, JobStatus::Failed);
        assert!(
            job.error_message.expect("error message").contains("extraction exploded")
        );
        // The stage label where the run died is retained.
        assert!(job.current_stage.contains("Extracting"));
    }

    #[tokio::test]
    async fn duplicate_start_is_refused() {
        let Some(_) = inkwerk_render::FontLibrary::system_fallback() else { return };

        let storage = TempDir::new().expect("storage");
        let (pipeline, store) = pipeline(&storage);
        let job_id = create_job(&store);

        let provider = StubProvider {
            pages: vec![one_page(vec![], vec![])],
        };

        let status = pipeline
            .process_job(job_id, &provider, &test_style(), ExportFormat::Png)
            .await
            .expect("first run");
        assert_eq!(status, JobStatus::Completed);

        let before = store.lock().get_job(&job_id).expect("get").expect("found");
        let err = pipeline
            .process_job(job_id, &provider, &test_style(), ExportFormat::Png)
            .await
            .expect_err("second start must be refused");
        assert!(matches!(err, InkwerkError::NotStartable(JobStatus::Completed)));

        // Refusal left the record untouched.
        let after = store.lock().get_job(&job_id).expect("get").expect("found");
        assert_eq!(after.progress, before.progress);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn progress_is_monotone_across_a_run() {
        let Some(_) = inkwerk_render::FontLibrary::system_fallback() else { return };

        let storage = TempDir::new().expect("storage");
        let (pipeline, store) = pipeline(&storage);
        let job_id = create_job(&store);

        // Three pages so per-page sub-step offsets overlap page bases.
        let provider = StubProvider {
            pages: vec![
                one_page(vec![], vec![]),
                one_page(vec![], vec![]),
                one_page(vec![], vec![]),
            ],
        };

        let status = pipeline
            .process_job(job_id, &provider, &test_style(), ExportFormat::Png)
            .await
            .expect("process");
        assert_eq!(status, JobStatus::Completed);

        let job = store.lock().get_job(&job_id).expect("get").expect("found");
        assert_eq!(job.progress, 100);
        assert_eq!(job.num_pages, 3);
    }
}
