// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline — the four entry points transports call.
//
// Each invocation gets its own temp directory. Finished files are staged in
// the caller's output directory under a random name and renamed into place,
// so a partial file is never visible.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pagewerk_core::config::PipelineConfig;
use pagewerk_core::error::PagewerkError;
use pagewerk_core::types::{ArchivePayload, EnhancementSettings, InvocationId, PageImage};
use tempfile::NamedTempFile;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::compress::orchestrator::{CompressionOrchestrator, CompressionOutcome};
use crate::image::enhance::Enhancer;
use crate::image::processor::ImageProcessor;
use crate::package::{archive, document};
use crate::pdf::reader::{PageGeometry, PdfReader};
use crate::pdf::writer::PdfWriter;
use crate::raster::rasterizer::Rasterizer;
use crate::raster::renderer::{PageRenderer, PdfiumRenderer, RenderedPage, UnavailableRenderer};

/// Shared, cheap-to-clone handle over one pipeline configuration.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    rasterizer: Rasterizer,
    enhancer: Enhancer,
    workers: Arc<Semaphore>,
}

impl Pipeline {
    /// Build a pipeline backed by PDFium.
    ///
    /// A missing PDFium library is not fatal: raster operations will fail
    /// with its load error while compression still has its other backends.
    pub fn new(config: PipelineConfig) -> Result<Self, PagewerkError> {
        let renderer: Arc<dyn PageRenderer> = match PdfiumRenderer::new() {
            Ok(renderer) => Arc::new(renderer),
            Err(err) => {
                warn!(error = %err, "PDFium unavailable, raster operations disabled");
                Arc::new(UnavailableRenderer::new(err.to_string()))
            }
        };
        Self::with_renderer(config, renderer)
    }

    pub fn with_renderer(
        config: PipelineConfig,
        renderer: Arc<dyn PageRenderer>,
    ) -> Result<Self, PagewerkError> {
        config.validate()?;
        Ok(Self {
            rasterizer: Rasterizer::new(renderer),
            enhancer: Enhancer::new(config.tone_curve),
            workers: Arc::new(Semaphore::new(config.worker_threads)),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // -- Entry points ---------------------------------------------------------

    /// Render every page at `dpi` (longest edge capped at `max_dimension`)
    /// and encode each under the per-image byte cap.
    #[instrument(skip(self, source), fields(invocation = %InvocationId::new(), source = %source.as_ref().display()))]
    pub async fn rasterize(
        &self,
        source: impl AsRef<Path>,
        dpi: u32,
        max_dimension: u32,
    ) -> Result<Vec<PageImage>, PagewerkError> {
        let source = source.as_ref();
        let geometry = load_geometry(source).await?;
        let max_bytes = self.config.max_image_bytes;

        let images = self
            .process_pages(source, &geometry, dpi, max_dimension, move |page: RenderedPage| {
                ImageProcessor::from_rgb(page.page_index as u32 + 1, page.image)
                    .encode_within(max_bytes)
            })
            .await?;
        info!(pages = images.len(), dpi, "Document rasterized");
        Ok(images)
    }

    /// Render, enhance, and rebuild the document at its original page sizes.
    /// Returns the path of the new PDF inside `output_dir`.
    #[instrument(skip(self, source, settings, output_dir), fields(invocation = %InvocationId::new(), source = %source.as_ref().display()))]
    pub async fn enhance_and_reassemble(
        &self,
        source: impl AsRef<Path>,
        settings: &EnhancementSettings,
        output_dir: impl AsRef<Path>,
    ) -> Result<PathBuf, PagewerkError> {
        let source = source.as_ref();
        settings.validate()?;
        let settings = *settings;
        let geometry = load_geometry(source).await?;

        let enhancer = self.enhancer;
        let quality = self.config.enhance_jpeg_quality;
        let pages = self
            .process_pages(
                source,
                &geometry,
                self.config.enhance_dpi,
                self.config.max_dimension,
                move |page: RenderedPage| {
                    let enhanced = enhancer.enhance(&page.image, &settings);
                    ImageProcessor::from_rgb(page.page_index as u32 + 1, enhanced).to_jpeg(quality)
                },
            )
            .await?;

        let bytes = tokio::task::spawn_blocking(move || {
            let mut writer = PdfWriter::new();
            for (page, size) in pages.iter().zip(&geometry) {
                writer.add_page(page, size.width_pt, size.height_pt)?;
            }
            writer.finish()
        })
        .await
        .map_err(|err| PagewerkError::PdfError(format!("reassembly task failed: {err}")))??;

        let path = persist_bytes(&bytes, output_dir.as_ref(), &output_name(source, "enhanced", "pdf"))?;
        info!(output = %path.display(), bytes = bytes.len(), "Enhanced document written");
        Ok(path)
    }

    /// Shrink the document with the first backend/method that produces a
    /// valid, strictly smaller file.
    ///
    /// When nothing qualifies the outcome points at the untouched source.
    pub async fn compress(
        &self,
        source: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<CompressionOutcome, PagewerkError> {
        self.compress_cancellable(source, output_dir, &CancellationToken::new())
            .await
    }

    #[instrument(skip(self, source, output_dir, cancel), fields(invocation = %InvocationId::new(), source = %source.as_ref().display()))]
    pub async fn compress_cancellable(
        &self,
        source: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> Result<CompressionOutcome, PagewerkError> {
        let source = source.as_ref();
        let work_dir = tempfile::tempdir()?;
        let orchestrator = CompressionOrchestrator::standard(&self.config, self.rasterizer.clone());

        let mut outcome = orchestrator.run(source, work_dir.path(), cancel).await?;
        if outcome.compressed {
            let staged = outcome.output.clone();
            let name = output_name(source, "compressed", "pdf");
            let output_dir = output_dir.as_ref().to_path_buf();
            outcome.output = tokio::task::spawn_blocking(move || persist_file(&staged, &output_dir, &name))
                .await
                .map_err(|err| PagewerkError::PdfError(format!("persist task failed: {err}")))??;
        }
        info!(
            compressed = outcome.compressed,
            original = outcome.original_size,
            final_size = outcome.final_size,
            attempts = outcome.attempts.len(),
            "Compression finished"
        );
        Ok(outcome)
    }

    /// Split page images into ZIP payloads no larger than `ceiling_bytes`.
    pub fn pack_for_delivery(
        &self,
        images: &[PageImage],
        ceiling_bytes: u64,
    ) -> Result<Vec<ArchivePayload>, PagewerkError> {
        archive::pack_archive(images, ceiling_bytes)
    }

    /// Assemble page images into one PDF named after `stem` in `output_dir`.
    pub fn pack_document(
        &self,
        images: &[PageImage],
        output_dir: impl AsRef<Path>,
        stem: &str,
    ) -> Result<PathBuf, PagewerkError> {
        let bytes = document::build_document(images)?;
        persist_bytes(&bytes, output_dir.as_ref(), &format!("{stem}.pdf"))
    }

    // -- Page processing ------------------------------------------------------

    /// Stream rendered pages through `job` on the blocking pool, at most
    /// `worker_threads` at a time, and collect the results in page order.
    async fn process_pages<F>(
        &self,
        source: &Path,
        geometry: &[PageGeometry],
        dpi: u32,
        max_dimension: u32,
        job: F,
    ) -> Result<Vec<PageImage>, PagewerkError>
    where
        F: Fn(RenderedPage) -> Result<PageImage, PagewerkError> + Send + Sync + 'static,
    {
        let targets = Rasterizer::targets(geometry, dpi, max_dimension);
        let (mut pages, render_task) = self.rasterizer.spawn_stream(
            source.to_path_buf(),
            targets,
            self.config.worker_threads,
        );

        let job = Arc::new(job);
        let mut pending = Vec::with_capacity(geometry.len());
        while let Some(item) = pages.recv().await {
            let page = item?;
            let permit = Arc::clone(&self.workers)
                .acquire_owned()
                .await
                .map_err(|_| PagewerkError::Cancelled)?;
            let job = Arc::clone(&job);
            debug!(page = page.page_index, "Page queued for processing");
            pending.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job(page)
            }));
        }
        render_task.await.map_err(|err| PagewerkError::Render {
            page: 0,
            reason: format!("render task failed: {err}"),
        })?;

        let mut images = Vec::with_capacity(pending.len());
        for handle in pending {
            let image = handle
                .await
                .map_err(|err| PagewerkError::ImageError(format!("page task failed: {err}")))??;
            images.push(image);
        }
        Ok(images)
    }
}

async fn load_geometry(source: &Path) -> Result<Vec<PageGeometry>, PagewerkError> {
    let path = source.to_path_buf();
    tokio::task::spawn_blocking(move || PdfReader::open(&path).map(|reader| reader.page_geometry()))
        .await
        .map_err(|err| PagewerkError::PdfError(format!("open task failed: {err}")))?
}

/// `<source stem>_<suffix>.<ext>`.
fn output_name(source: &Path, suffix: &str, extension: &str) -> String {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into());
    format!("{stem}_{suffix}.{extension}")
}

fn persist_bytes(bytes: &[u8], output_dir: &Path, file_name: &str) -> Result<PathBuf, PagewerkError> {
    let mut staged = NamedTempFile::new_in(output_dir)?;
    staged.write_all(bytes)?;
    finish_persist(staged, output_dir, file_name)
}

fn persist_file(source: &Path, output_dir: &Path, file_name: &str) -> Result<PathBuf, PagewerkError> {
    let mut staged = NamedTempFile::new_in(output_dir)?;
    let mut input = std::fs::File::open(source)?;
    std::io::copy(&mut input, staged.as_file_mut())?;
    finish_persist(staged, output_dir, file_name)
}

fn finish_persist(
    staged: NamedTempFile,
    output_dir: &Path,
    file_name: &str,
) -> Result<PathBuf, PagewerkError> {
    staged.as_file().sync_all()?;
    let destination = output_dir.join(file_name);
    staged
        .persist(&destination)
        .map_err(|err| PagewerkError::Io(err.error))?;
    debug!(path = %destination.display(), "Output persisted");
    Ok(destination)
}
