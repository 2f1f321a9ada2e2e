// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor — encode rendered pages to PNG or JPEG bytes, optionally
// keeping each encoded page under a byte cap, using the `image` crate.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::RgbImage;
use pagewerk_core::error::PagewerkError;
use pagewerk_core::types::{ImageEncoding, PageImage};
use tracing::{debug, instrument, warn};

/// First JPEG quality tried when a PNG is over the byte cap.
pub const CAP_JPEG_START_QUALITY: u8 = 95;
/// Lowest JPEG quality the cap loop will go to.
pub const CAP_JPEG_MIN_QUALITY: u8 = 50;
/// Quality decrement per retry.
pub const CAP_JPEG_STEP: u8 = 5;

/// Encoder for a single rendered page.
///
/// ```ignore
/// let page = ImageProcessor::from_rgb(3, rgb).encode_within(5 * MIB)?;
/// ```
pub struct ImageProcessor {
    /// 1-based page number carried onto every produced [`PageImage`].
    page_number: u32,
    /// The current working image.
    image: RgbImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Wrap an already-decoded RGB image.
    pub fn from_rgb(page_number: u32, image: RgbImage) -> Self {
        Self { page_number, image }
    }

    /// Decode raw encoded bytes (JPEG, PNG, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(page_number: u32, data: &[u8]) -> Result<Self, PagewerkError> {
        let img = image::load_from_memory(data).map_err(|err| {
            PagewerkError::ImageError(format!("failed to decode image: {}", err))
        })?;
        debug!(width = img.width(), height = img.height(), "Image decoded from bytes");
        Ok(Self {
            page_number,
            image: img.to_rgb8(),
        })
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    // -- Output ---------------------------------------------------------------

    /// Encode as PNG.
    pub fn to_png(&self) -> Result<PageImage, PagewerkError> {
        let bytes = encode_png(&self.image)?;
        Ok(self.wrap(bytes, ImageEncoding::Png))
    }

    /// Encode as baseline JPEG at `quality` (clamped to 1-100).
    pub fn to_jpeg(&self, quality: u8) -> Result<PageImage, PagewerkError> {
        let quality = quality.clamp(1, 100);
        let bytes = encode_jpeg(&self.image, quality)?;
        Ok(self.wrap(bytes, ImageEncoding::Jpeg { quality }))
    }

    /// Encode as PNG, falling back to progressively lower JPEG qualities when
    /// the PNG exceeds `max_bytes`.
    ///
    /// If even the lowest quality is over the cap, that smallest attempt is
    /// returned anyway: one oversized page is better than a missing page.
    #[instrument(skip(self), fields(page = self.page_number, width = self.width(), height = self.height()))]
    pub fn encode_within(&self, max_bytes: u64) -> Result<PageImage, PagewerkError> {
        let png = self.to_png()?;
        if png.byte_len() <= max_bytes {
            return Ok(png);
        }
        debug!(png_bytes = png.byte_len(), max_bytes, "PNG over cap, trying JPEG");

        let mut quality = CAP_JPEG_START_QUALITY;
        loop {
            let jpeg = self.to_jpeg(quality)?;
            if jpeg.byte_len() <= max_bytes {
                debug!(quality, bytes = jpeg.byte_len(), "JPEG fits under cap");
                return Ok(jpeg);
            }
            if quality <= CAP_JPEG_MIN_QUALITY {
                warn!(
                    quality,
                    bytes = jpeg.byte_len(),
                    max_bytes,
                    "Page still over cap at minimum quality, keeping it"
                );
                return Ok(jpeg);
            }
            quality = quality.saturating_sub(CAP_JPEG_STEP).max(CAP_JPEG_MIN_QUALITY);
        }
    }

    fn wrap(&self, bytes: Vec<u8>, encoding: ImageEncoding) -> PageImage {
        PageImage {
            page_number: self.page_number,
            bytes,
            width: self.image.width(),
            height: self.image.height(),
            encoding,
        }
    }
}

/// Encode an RGB image as PNG with default compression.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, PagewerkError> {
    let mut buffer = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buffer, CompressionType::Default, FilterType::Adaptive);
    image
        .write_with_encoder(encoder)
        .map_err(|err| PagewerkError::ImageError(format!("PNG encoding failed: {}", err)))?;
    Ok(buffer)
}

/// Encode an RGB image as JPEG at the given quality (1-100).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, PagewerkError> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    image
        .write_with_encoder(encoder)
        .map_err(|err| PagewerkError::ImageError(format!("JPEG encoding failed: {}", err)))?;
    Ok(buffer)
}
