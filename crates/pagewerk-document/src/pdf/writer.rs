// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — assemble a document with one full-page raster image per page
// using `lopdf`.
//
// JPEG pages are embedded verbatim as DCTDecode streams, so the quality chosen
// by the encoder is exactly what lands in the file. PNG pages are decoded to
// RGB and stored Flate-compressed.

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use pagewerk_core::error::PagewerkError;
use pagewerk_core::types::{ImageEncoding, PageImage};
use tracing::{debug, info, instrument};

/// Builds an image-only PDF page by page.
///
/// Pages are appended in call order; the caller is responsible for feeding
/// them in page-number order.
pub struct PdfWriter {
    document: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfWriter {
    pub fn new() -> Self {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        Self {
            document,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// Number of pages appended so far.
    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append a page sized at the image's own pixel dimensions (1 px = 1 pt).
    pub fn add_image_page(&mut self, image: &PageImage) -> Result<(), PagewerkError> {
        self.add_page(image, image.width as f32, image.height as f32)
    }

    /// Append a page of `width_pt` x `height_pt` whose entire area is covered
    /// by `image`.
    #[instrument(skip(self, image), fields(page = image.page_number, bytes = image.byte_len()))]
    pub fn add_page(
        &mut self,
        image: &PageImage,
        width_pt: f32,
        height_pt: f32,
    ) -> Result<(), PagewerkError> {
        if image.width == 0 || image.height == 0 {
            return Err(PagewerkError::ImageError(format!(
                "page {} has an empty image",
                image.page_number
            )));
        }
        if !(width_pt > 0.0 && height_pt > 0.0) {
            return Err(PagewerkError::PdfError(format!(
                "page {} has a non-positive size {width_pt}x{height_pt}",
                image.page_number
            )));
        }

        let xobject = self.image_stream(image)?;
        let image_id = self.document.add_object(xobject);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        width_pt.into(),
                        0.into(),
                        0.into(),
                        height_pt.into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec!["Im0".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|err| PagewerkError::PdfError(format!("content stream: {err}")))?;
        let content_id = self
            .document
            .add_object(Stream::new(dictionary! {}, encoded));

        let page_id = self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width_pt.into(), height_pt.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        self.kids.push(page_id.into());

        debug!(width_pt, height_pt, "Page appended");
        Ok(())
    }

    fn image_stream(&self, image: &PageImage) -> Result<Stream, PagewerkError> {
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width as i64,
            "Height" => image.height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        };

        match image.encoding {
            ImageEncoding::Jpeg { .. } => {
                let mut dict = dict;
                dict.set("Filter", "DCTDecode");
                // Already compressed; lopdf must not deflate it again.
                Ok(Stream::new(dict, image.bytes.clone()).with_compression(false))
            }
            ImageEncoding::Png => {
                let decoded = ::image::load_from_memory(&image.bytes).map_err(|err| {
                    PagewerkError::ImageError(format!(
                        "failed to decode page {} for PDF: {err}",
                        image.page_number
                    ))
                })?;
                let rgb = decoded.to_rgb8();
                if rgb.dimensions() != (image.width, image.height) {
                    return Err(PagewerkError::ImageError(format!(
                        "page {} is {}x{} but was declared {}x{}",
                        image.page_number,
                        rgb.width(),
                        rgb.height(),
                        image.width,
                        image.height
                    )));
                }
                let mut stream = Stream::new(dict, rgb.into_raw());
                stream
                    .compress()
                    .map_err(|err| PagewerkError::PdfError(format!("flate: {err}")))?;
                Ok(stream)
            }
        }
    }

    /// Serialise the document. At least one page is required.
    #[instrument(skip(self), fields(pages = self.kids.len()))]
    pub fn finish(mut self) -> Result<Vec<u8>, PagewerkError> {
        if self.kids.is_empty() {
            return Err(PagewerkError::PdfError("cannot write a PDF with no pages".into()));
        }

        let count = self.kids.len() as i64;
        self.document.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => std::mem::take(&mut self.kids),
                "Count" => count,
            }),
        );
        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.document.trailer.set("Root", catalog_id);

        let info_dict = dictionary! {
            "Producer" => Object::string_literal("pagewerk"),
        };
        let info_id = self.document.add_object(info_dict);
        self.document.trailer.set("Info", info_id);

        let mut output = Vec::new();
        self.document
            .save_to(&mut output)
            .map_err(|err| PagewerkError::PdfError(format!("failed to serialise PDF: {err}")))?;

        info!(pages = count, bytes = output.len(), "PDF assembled");
        Ok(output)
    }

    /// Serialise the document straight to `path`.
    pub fn write_to_file(self, path: impl AsRef<Path>) -> Result<u64, PagewerkError> {
        let bytes = self.finish()?;
        std::fs::write(path.as_ref(), &bytes)?;
        info!("Wrote PDF to {}", path.as_ref().display());
        Ok(bytes.len() as u64)
    }
}
