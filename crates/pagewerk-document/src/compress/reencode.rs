// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process re-encode: rasterize every page at the method's DPI, encode it
// as JPEG at the method's quality, and reassemble one image per page at the
// original page size. Text and vector content do not survive.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use pagewerk_core::config::PipelineConfig;
use pagewerk_core::error::PagewerkError;
use pagewerk_core::types::CompressionMethod;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::backend::{CompressionBackend, join_failure, require_output};
use crate::image::processor::ImageProcessor;
use crate::pdf::reader::PdfReader;
use crate::pdf::writer::PdfWriter;
use crate::raster::rasterizer::Rasterizer;
use crate::raster::renderer::RenderedPage;

const NAME: &str = "reencode";

pub struct ReencodeBackend {
    rasterizer: Rasterizer,
    config: PipelineConfig,
}

impl ReencodeBackend {
    pub fn new(rasterizer: Rasterizer, config: &PipelineConfig) -> Self {
        Self {
            rasterizer,
            config: config.clone(),
        }
    }
}

/// Re-encode `source` into `output` with the tuning for `method`. Blocking.
///
/// Rendering stops at the next page once `cancel` fires.
pub fn reencode_file(
    rasterizer: &Rasterizer,
    config: &PipelineConfig,
    source: &Path,
    output: &Path,
    method: CompressionMethod,
    cancel: &CancellationToken,
) -> Result<u64, PagewerkError> {
    let geometry = PdfReader::open(source)
        .map_err(|err| PagewerkError::BackendFailure {
            backend: NAME.into(),
            reason: err.to_string(),
        })?
        .page_geometry();

    let tuning = config.tuning(method);
    let targets = Rasterizer::targets(&geometry, tuning.dpi, config.max_dimension);
    info!(pages = targets.len(), dpi = tuning.dpi, quality = tuning.jpeg_quality, "Re-encoding pages");

    let mut writer = PdfWriter::new();
    rasterizer.render_each(source, &targets, |page: RenderedPage| {
        if cancel.is_cancelled() {
            return Err(PagewerkError::Cancelled);
        }
        let size = geometry[page.page_index];
        let jpeg = ImageProcessor::from_rgb(page.page_index as u32 + 1, page.image)
            .to_jpeg(tuning.jpeg_quality)?;
        writer.add_page(&jpeg, size.width_pt, size.height_pt)
    })?;
    if cancel.is_cancelled() {
        return Err(PagewerkError::Cancelled);
    }
    let bytes = writer.write_to_file(output)?;
    debug!(bytes, "Re-encoded document written");
    Ok(bytes)
}

#[async_trait]
impl CompressionBackend for ReencodeBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn timeout(&self) -> Duration {
        self.config.in_process_timeout()
    }

    async fn check_available(&self) -> Result<(), PagewerkError> {
        self.rasterizer.check_available()
    }

    #[instrument(skip(self), fields(source = %source.display(), %method))]
    async fn compress(
        &self,
        source: &Path,
        output: &Path,
        method: CompressionMethod,
        cancel: &CancellationToken,
    ) -> Result<(), PagewerkError> {
        let rasterizer = self.rasterizer.clone();
        let config = self.config.clone();
        let (source_path, output_path) = (source.to_path_buf(), output.to_path_buf());
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            reencode_file(&rasterizer, &config, &source_path, &output_path, method, &cancel)
        })
        .await
        .map_err(|err| join_failure(NAME, err))??;
        require_output(NAME, output).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pdf::reader::PageGeometry;
    use crate::test_support::{FakeRenderer, FixturePage, build_pdf, write_fixture};

    #[tokio::test]
    async fn pages_keep_their_point_size() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_fixture(
            dir.path(),
            "in.pdf",
            &build_pdf(&[FixturePage::blank(595.0, 842.0), FixturePage::blank(842.0, 595.0)]),
        );
        let output = dir.path().join("out.pdf");
        let backend = ReencodeBackend::new(
            Rasterizer::new(Arc::new(FakeRenderer::new(2))),
            &PipelineConfig::default(),
        );

        backend
            .compress(&source, &output, CompressionMethod::Extreme, &CancellationToken::new())
            .await
            .unwrap();

        let reader = PdfReader::open(&output).unwrap();
        assert_eq!(
            reader.page_geometry(),
            vec![
                PageGeometry { width_pt: 595.0, height_pt: 842.0 },
                PageGeometry { width_pt: 842.0, height_pt: 595.0 },
            ]
        );
        assert!(reader.analyze().has_raster_images);
    }

    #[tokio::test]
    async fn render_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_fixture(dir.path(), "in.pdf", &build_pdf(&[FixturePage::text("a")]));
        let backend = ReencodeBackend::new(
            Rasterizer::new(Arc::new(FakeRenderer::new(1).failing_at(0))),
            &PipelineConfig::default(),
        );
        let err = backend
            .compress(
                &source,
                &dir.path().join("out.pdf"),
                CompressionMethod::Light,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PagewerkError::Render { page: 0, .. }));
        assert!(err.triggers_fallback());
    }

    #[tokio::test]
    async fn cancellation_stops_at_the_next_page() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_fixture(
            dir.path(),
            "in.pdf",
            &build_pdf(&[FixturePage::text("a"), FixturePage::text("b"), FixturePage::text("c")]),
        );
        let output = dir.path().join("out.pdf");
        let renderer = Arc::new(FakeRenderer::new(3));
        let token = CancellationToken::new();
        token.cancel();

        let err = reencode_file(
            &Rasterizer::new(renderer.clone()),
            &PipelineConfig::default(),
            &source,
            &output,
            CompressionMethod::Balanced,
            &token,
        )
        .unwrap_err();
        assert!(matches!(err, PagewerkError::Cancelled));
        assert_eq!(renderer.rendered(), 1);
        assert!(!output.exists());
    }
}
