// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rasterizer — DPI/size-aware page rendering on top of a `PageRenderer`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;
use pagewerk_core::error::PagewerkError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::renderer::{PageRenderer, RenderTarget, RenderedPage};
use crate::pdf::reader::PageGeometry;

/// PDF points per inch.
pub const POINTS_PER_INCH: f32 = 72.0;

/// Pixel size of a page rendered at `dpi`, scaled down so that neither edge
/// exceeds `max_dimension`. Aspect ratio is preserved; both edges are at
/// least one pixel.
pub fn compute_render_dimensions(
    width_pt: f32,
    height_pt: f32,
    dpi: u32,
    max_dimension: u32,
) -> (u32, u32) {
    let mut zoom = dpi as f32 / POINTS_PER_INCH;
    let raw_w = width_pt.max(0.0) * zoom;
    let raw_h = height_pt.max(0.0) * zoom;

    let longest = raw_w.max(raw_h);
    let ceiling = max_dimension.max(1) as f32;
    if longest > ceiling {
        zoom *= ceiling / longest;
    }

    let clamp = |edge: f32| (edge * zoom).round().clamp(1.0, ceiling) as u32;
    (clamp(width_pt.max(0.0)), clamp(height_pt.max(0.0)))
}

/// Turns document pages into RGB buffers.
#[derive(Clone)]
pub struct Rasterizer {
    renderer: Arc<dyn PageRenderer>,
}

impl Rasterizer {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self { renderer }
    }

    pub fn check_available(&self) -> Result<(), PagewerkError> {
        self.renderer.check_available()
    }

    /// One render target per page, in page order.
    pub fn targets(geometry: &[PageGeometry], dpi: u32, max_dimension: u32) -> Vec<RenderTarget> {
        geometry
            .iter()
            .enumerate()
            .map(|(page_index, page)| {
                let (width_px, height_px) =
                    compute_render_dimensions(page.width_pt, page.height_pt, dpi, max_dimension);
                let (raw_width, raw_height) =
                    compute_render_dimensions(page.width_pt, page.height_pt, dpi, u32::MAX);
                if (raw_width, raw_height) != (width_px, height_px) {
                    warn!(
                        page = page_index,
                        raw_width,
                        raw_height,
                        capped_width = width_px,
                        capped_height = height_px,
                        "Page dimensions capped to {max_dimension}px",
                    );
                }
                RenderTarget {
                    page_index,
                    width_px,
                    height_px,
                }
            })
            .collect()
    }

    /// Render a single page. Blocking.
    #[instrument(skip(self, geometry), fields(source = %source.display()))]
    pub fn render(
        &self,
        source: &Path,
        geometry: &[PageGeometry],
        page_index: usize,
        dpi: u32,
        max_dimension: u32,
    ) -> Result<RgbImage, PagewerkError> {
        let page = geometry.get(page_index).ok_or_else(|| PagewerkError::Render {
            page: page_index,
            reason: format!("page index out of range (document has {} pages)", geometry.len()),
        })?;
        let (width_px, height_px) =
            compute_render_dimensions(page.width_pt, page.height_pt, dpi, max_dimension);
        let target = RenderTarget {
            page_index,
            width_px,
            height_px,
        };

        let mut rendered = None;
        self.renderer.render_pages(source, &[target], &mut |page: RenderedPage| -> Result<(), PagewerkError> {
            rendered = Some(page.image);
            Ok(())
        })?;
        rendered.ok_or_else(|| PagewerkError::Render {
            page: page_index,
            reason: "renderer produced no image".into(),
        })
    }

    /// Render every target, handing each page to `sink` in order. Blocking.
    pub fn render_each(
        &self,
        source: &Path,
        targets: &[RenderTarget],
        mut sink: impl FnMut(RenderedPage) -> Result<(), PagewerkError>,
    ) -> Result<(), PagewerkError> {
        self.renderer.render_pages(source, targets, &mut sink)
    }

    /// Render on the blocking pool and stream pages through a channel of
    /// `capacity` slots, so at most that many rendered pages wait in memory.
    ///
    /// A render failure is delivered as the final item. Dropping the
    /// receiver stops rendering at the next page.
    pub fn spawn_stream(
        &self,
        source: PathBuf,
        targets: Vec<RenderTarget>,
        capacity: usize,
    ) -> (mpsc::Receiver<Result<RenderedPage, PagewerkError>>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let renderer = Arc::clone(&self.renderer);

        let handle = tokio::task::spawn_blocking(move || {
            info!(pages = targets.len(), renderer = renderer.name(), "Rendering pages");
            let result = renderer.render_pages(&source, &targets, &mut |page: RenderedPage| {
                tx.blocking_send(Ok(page))
                    .map_err(|_| PagewerkError::Cancelled)
            });
            match result {
                Ok(()) => debug!("Render stream finished"),
                Err(PagewerkError::Cancelled) => debug!("Render stream receiver dropped"),
                Err(err) => {
                    let _ = tx.blocking_send(Err(err));
                }
            }
        });
        (rx, handle)
    }
}
