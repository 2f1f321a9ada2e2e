// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Compress module — strategy selection, pluggable backends, and the
// fallback orchestrator.

pub mod backend;
pub mod ghostscript;
pub mod orchestrator;
pub mod reencode;
pub mod rewrite;
pub mod strategy;

pub use backend::CompressionBackend;
pub use orchestrator::{CompressionOrchestrator, CompressionOutcome, CompressionState};
