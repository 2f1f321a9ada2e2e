// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster module — page rendering and render-size planning.

pub mod rasterizer;
pub mod renderer;

pub use rasterizer::{Rasterizer, compute_render_dimensions};
pub use renderer::{PageRenderer, PdfiumRenderer, RenderTarget, RenderedPage, UnavailableRenderer};
