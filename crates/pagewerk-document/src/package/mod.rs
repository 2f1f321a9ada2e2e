// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Package module — delivery packaging of page images.

pub mod archive;
pub mod document;

pub use archive::{pack_archive, plan_units};
pub use document::build_document;
