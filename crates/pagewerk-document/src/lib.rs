// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pagewerk-document — PDF rasterization, enhancement, compression, and
// delivery packaging.
//
// Provides structural analysis and page geometry (lopdf), PDFium page
// rendering, tone enhancement, a multi-backend compression fallback chain,
// and size-bounded packaging. `Pipeline` ties them together.

pub mod compress;
pub mod image;
pub mod package;
pub mod pdf;
pub mod pipeline;
pub mod raster;

#[cfg(test)]
mod test_support;

// Re-export the primary structs so callers can use `pagewerk_document::Pipeline` etc.
pub use compress::{CompressionBackend, CompressionOrchestrator, CompressionOutcome, CompressionState};
pub use image::enhance::Enhancer;
pub use image::processor::ImageProcessor;
pub use pdf::reader::{PageGeometry, PdfReader};
pub use pdf::writer::PdfWriter;
pub use pipeline::Pipeline;
pub use raster::{PageRenderer, PdfiumRenderer, Rasterizer};
