// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page renderers — turn PDF pages into RGB pixel buffers.
//
// `PageRenderer` is the seam between the rasterizer and the pixel decoder.
// The production implementation binds Google PDFium through `pdfium-render`.

use std::path::Path;

use image::{DynamicImage, RgbImage, RgbaImage};
use pagewerk_core::error::PagewerkError;
use pdfium_render::prelude::*;
use tracing::{debug, instrument};

/// One page to render, at an exact pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    /// 0-based page index.
    pub page_index: usize,
    pub width_px: u32,
    pub height_px: u32,
}

/// A rendered page, uncompressed.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page_index: usize,
    pub image: RgbImage,
}

/// Receives each rendered page as soon as it is ready. Returning an error
/// stops the render loop.
pub type PageSink<'a> = dyn FnMut(RenderedPage) -> Result<(), PagewerkError> + 'a;

/// Decodes PDF pages to pixels.
///
/// Implementations open the source once per call and hand pages to `sink`
/// in `targets` order. The first failure aborts the remaining pages.
pub trait PageRenderer: Send + Sync {
    /// Short name for logs and attempt records.
    fn name(&self) -> &'static str;

    /// Whether the renderer can run in this environment.
    fn check_available(&self) -> Result<(), PagewerkError> {
        Ok(())
    }

    fn render_pages(
        &self,
        source: &Path,
        targets: &[RenderTarget],
        sink: &mut PageSink<'_>,
    ) -> Result<(), PagewerkError>;
}

/// Renders pages with Google PDFium.
///
/// The library handle is loaded per call; the OS caches the underlying
/// `dlopen`, so repeat loads are cheap.
pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Create a renderer, verifying that the PDFium library can be loaded.
    ///
    /// Discovery order:
    /// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path to the library file)
    /// 2. Alongside the running executable
    /// 3. System library search paths
    pub fn new() -> Result<Self, PagewerkError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

fn load_pdfium() -> Result<Pdfium, PagewerkError> {
    let unavailable = |reason: String| PagewerkError::BackendUnavailable {
        backend: "pdfium".into(),
        reason,
    };

    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| unavailable(format!("failed to load PDFium from {path}: {e}")))?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        let lib_path =
            Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!(dir = %exe_dir.display(), "Loaded PDFium next to executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        unavailable(format!(
            "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Stand-in used when no PDFium library could be loaded. Every render call
/// fails with the original load error, so raster paths report it while
/// non-raster paths keep working.
pub struct UnavailableRenderer {
    reason: String,
}

impl UnavailableRenderer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> PagewerkError {
        PagewerkError::BackendUnavailable {
            backend: "pdfium".into(),
            reason: self.reason.clone(),
        }
    }
}

impl PageRenderer for UnavailableRenderer {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn check_available(&self) -> Result<(), PagewerkError> {
        Err(self.error())
    }

    fn render_pages(
        &self,
        _source: &Path,
        _targets: &[RenderTarget],
        _sink: &mut PageSink<'_>,
    ) -> Result<(), PagewerkError> {
        Err(self.error())
    }
}

impl PageRenderer for PdfiumRenderer {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn check_available(&self) -> Result<(), PagewerkError> {
        load_pdfium().map(|_| ())
    }

    #[instrument(skip(self, targets, sink), fields(source = %source.display(), pages = targets.len()))]
    fn render_pages(
        &self,
        source: &Path,
        targets: &[RenderTarget],
        sink: &mut PageSink<'_>,
    ) -> Result<(), PagewerkError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_file(source, None)
            .map_err(|e| PagewerkError::Render {
                page: 0,
                reason: format!("failed to load PDF: {e}"),
            })?;
        let pages = document.pages();

        for target in targets {
            let failed = |reason: String| PagewerkError::Render {
                page: target.page_index,
                reason,
            };

            let index = target
                .page_index
                .try_into()
                .map_err(|_| failed(format!("page index {} is too large", target.page_index)))?;
            let page = pages.get(index).map_err(|_| {
                failed(format!(
                    "page {} out of range (document has {} pages)",
                    target.page_index,
                    pages.len()
                ))
            })?;

            let config = PdfRenderConfig::new()
                .set_target_width(target.width_px as i32)
                .set_maximum_height(target.height_px as i32);
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| failed(format!("rendering failed: {e}")))?;

            let (width, height) = (bitmap.width() as u32, bitmap.height() as u32);
            let rgba = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes())
                .ok_or_else(|| failed("bitmap buffer does not match its size".into()))?;
            let image = DynamicImage::ImageRgba8(rgba).to_rgb8();

            debug!(page = target.page_index, width, height, "Rendered page");
            sink(RenderedPage {
                page_index: target.page_index,
                image,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_renderer_reports_its_reason() {
        let renderer = UnavailableRenderer::new("libpdfium.so not found");
        let err = renderer.check_available().unwrap_err();
        assert!(err.to_string().contains("libpdfium.so not found"));

        let target = RenderTarget {
            page_index: 0,
            width_px: 10,
            height_px: 10,
        };
        let result = renderer.render_pages(Path::new("x.pdf"), &[target], &mut |_| Ok(()));
        assert!(matches!(result, Err(PagewerkError::BackendUnavailable { .. })));
    }
}
