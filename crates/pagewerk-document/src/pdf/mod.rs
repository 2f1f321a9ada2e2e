// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — reading and analysing source documents, assembling
// image-only output documents.

pub mod reader;
pub mod writer;

pub use reader::{PageGeometry, PdfReader};
pub use writer::PdfWriter;
