// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Pagewerk.

use thiserror::Error;

/// Top-level error type for all Pagewerk operations.
#[derive(Debug, Error)]
pub enum PagewerkError {
    // -- Source document --
    #[error("cannot open source document {path}: {reason}")]
    SourceUnreadable { path: String, reason: String },

    #[error("PDF operation failed: {0}")]
    PdfError(String),

    // -- Rasterization / imaging --
    #[error("failed to render page {page}: {reason}")]
    Render { page: usize, reason: String },

    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("unknown enhancement preset: {0}")]
    UnknownPreset(String),

    // -- Compression backends --
    #[error("compression backend {backend} is unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("compression backend {backend} failed: {reason}")]
    BackendFailure { backend: String, reason: String },

    #[error("output rejected: {0}")]
    ValidationRejected(String),

    #[error("operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("operation cancelled")]
    Cancelled,

    // -- Packaging --
    #[error("archive packaging failed: {0}")]
    Archive(String),

    // -- Settings / configuration --
    #[error("invalid setting {field}: {reason}")]
    InvalidSettings { field: &'static str, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PagewerkError {
    /// Whether the orchestrator should move on to the next compression
    /// attempt instead of surfacing this error to the caller.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. }
                | Self::BackendFailure { .. }
                | Self::ValidationRejected(_)
                | Self::Timeout { .. }
                | Self::Render { .. }
                | Self::ImageError(_)
                | Self::PdfError(_)
                | Self::Io(_)
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PagewerkError>;
