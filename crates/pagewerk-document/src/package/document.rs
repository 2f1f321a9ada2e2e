// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page images reassembled into a single PDF, one page per image.

use pagewerk_core::error::PagewerkError;
use pagewerk_core::types::PageImage;
use tracing::{info, instrument};

use crate::pdf::writer::PdfWriter;

/// Build a PDF whose page size equals each image's pixel size.
#[instrument(skip(images), fields(images = images.len()))]
pub fn build_document(images: &[PageImage]) -> Result<Vec<u8>, PagewerkError> {
    let mut writer = PdfWriter::new();
    for image in images {
        writer.add_image_page(image)?;
    }
    let bytes = writer.finish()?;
    info!(pages = images.len(), bytes = bytes.len(), "Image document built");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::reader::{PageGeometry, PdfReader};
    use crate::test_support::{solid_jpeg, solid_png};

    #[test]
    fn page_size_follows_pixel_size() {
        let images = vec![solid_png(1, 40, 30), solid_jpeg(2, 20, 50, 80)];
        let bytes = build_document(&images).unwrap();

        let reader = PdfReader::from_bytes(&bytes).unwrap();
        assert_eq!(
            reader.page_geometry(),
            vec![
                PageGeometry { width_pt: 40.0, height_pt: 30.0 },
                PageGeometry { width_pt: 20.0, height_pt: 50.0 },
            ]
        );
    }

    #[test]
    fn no_images_is_an_error() {
        assert!(build_document(&[]).is_err());
    }
}
