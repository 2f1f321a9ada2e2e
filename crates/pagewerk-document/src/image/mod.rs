// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — page enhancement and delivery encoding.

pub mod enhance;
pub mod processor;

pub use enhance::{Enhancer, apply_preset, auto_stretch, preset_names};
pub use processor::ImageProcessor;
