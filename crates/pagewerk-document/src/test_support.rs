// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared test fixtures: small generated PDFs, encoded page images, and a
// renderer that needs no PDFium binary.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};
use pagewerk_core::error::PagewerkError;
use pagewerk_core::types::PageImage;

use crate::image::processor::ImageProcessor;
use crate::raster::renderer::{PageRenderer, PageSink, RenderTarget, RenderedPage};

/// One page of a generated PDF.
#[derive(Debug, Clone)]
pub struct FixturePage {
    pub text: Option<&'static str>,
    /// Embedded raw RGB image of this pixel size.
    pub image: Option<(u32, u32)>,
    pub width_pt: f32,
    pub height_pt: f32,
    pub rotate: Option<i64>,
}

impl FixturePage {
    pub fn blank(width_pt: f32, height_pt: f32) -> Self {
        Self {
            text: None,
            image: None,
            width_pt,
            height_pt,
            rotate: None,
        }
    }

    pub fn text(text: &'static str) -> Self {
        Self {
            text: Some(text),
            ..Self::blank(612.0, 792.0)
        }
    }

    pub fn image(width: u32, height: u32) -> Self {
        Self {
            image: Some((width, height)),
            ..Self::blank(612.0, 792.0)
        }
    }

    pub fn rotated(mut self, degrees: i64) -> Self {
        self.rotate = Some(degrees);
        self
    }
}

/// Build an uncompressed PDF with the given pages.
pub fn build_pdf(pages: &[FixturePage]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let mut operations = Vec::new();
        let mut xobjects = Dictionary::new();

        if let Some((w, h)) = page.image {
            let pixels: Vec<u8> = (0..w * h * 3).map(|i| (i % 251) as u8).collect();
            let image_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => w as i64,
                    "Height" => h as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                },
                pixels,
            ));
            xobjects.set("Im0", image_id);
            operations.push(Operation::new("q", vec![]));
            operations.push(Operation::new(
                "cm",
                vec![
                    page.width_pt.into(),
                    0.into(),
                    0.into(),
                    page.height_pt.into(),
                    0.into(),
                    0.into(),
                ],
            ));
            operations.push(Operation::new("Do", vec!["Im0".into()]));
            operations.push(Operation::new("Q", vec![]));
        }

        if let Some(text) = page.text {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 24.into()]));
            operations.push(Operation::new("Td", vec![72.into(), 600.into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(text)]));
            operations.push(Operation::new("ET", vec![]));
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let mut page_dict = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), page.width_pt.into(), page.height_pt.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            },
        };
        if let Some(degrees) = page.rotate {
            page_dict.set("Rotate", degrees);
        }
        kids.push(doc.add_object(page_dict).into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// Write `bytes` to `dir/name` and return the path.
pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

pub fn solid_png(page_number: u32, width: u32, height: u32) -> PageImage {
    let rgb = RgbImage::from_pixel(width, height, Rgb([200, 180, 160]));
    ImageProcessor::from_rgb(page_number, rgb).to_png().unwrap()
}

pub fn solid_jpeg(page_number: u32, width: u32, height: u32, quality: u8) -> PageImage {
    let rgb = RgbImage::from_pixel(width, height, Rgb([60, 90, 120]));
    ImageProcessor::from_rgb(page_number, rgb).to_jpeg(quality).unwrap()
}

/// Synthetic page image of an exact byte length, for packing tests.
pub fn sized_image(page_number: u32, byte_len: usize) -> PageImage {
    PageImage {
        page_number,
        bytes: vec![0u8; byte_len],
        width: 1,
        height: 1,
        encoding: pagewerk_core::types::ImageEncoding::Png,
    }
}

/// Renderer that paints a gradient at the requested size.
///
/// Tracks how many `render_pages` calls are in flight at once.
pub struct FakeRenderer {
    page_count: usize,
    fail_at: Option<usize>,
    delay: Duration,
    rendered: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeRenderer {
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            fail_at: None,
            delay: Duration::ZERO,
            rendered: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn failing_at(mut self, page_index: usize) -> Self {
        self.fail_at = Some(page_index);
        self
    }

    /// Block the calling thread for `delay` before each page.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn rendered(&self) -> usize {
        self.rendered.load(Ordering::SeqCst)
    }

    /// Render calls currently running.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Most render calls ever running at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn render_all(&self, targets: &[RenderTarget], sink: &mut PageSink<'_>) -> Result<(), PagewerkError> {
        for target in targets {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            if target.page_index >= self.page_count || self.fail_at == Some(target.page_index) {
                return Err(PagewerkError::Render {
                    page: target.page_index,
                    reason: "fake renderer refused".into(),
                });
            }
            let shade = (target.page_index * 40 % 200) as u8;
            let image = RgbImage::from_fn(target.width_px, target.height_px, |x, y| {
                Rgb([shade, (x % 256) as u8, (y % 256) as u8])
            });
            self.rendered.fetch_add(1, Ordering::SeqCst);
            sink(RenderedPage {
                page_index: target.page_index,
                image,
            })?;
        }
        Ok(())
    }
}

impl PageRenderer for FakeRenderer {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn render_pages(
        &self,
        _source: &Path,
        targets: &[RenderTarget],
        sink: &mut PageSink<'_>,
    ) -> Result<(), PagewerkError> {
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        let result = self.render_all(targets, sink);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
