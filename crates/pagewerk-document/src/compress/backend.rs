// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Compression backend abstraction.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use pagewerk_core::error::PagewerkError;
use pagewerk_core::types::CompressionMethod;
use tokio_util::sync::CancellationToken;

/// One way of producing a smaller copy of a document.
///
/// A backend writes its result to `output` and reports success only when
/// that file exists and is non-empty. Whether the result is actually
/// acceptable is decided by the orchestrator, not the backend.
#[async_trait]
pub trait CompressionBackend: Send + Sync {
    /// Short stable name used in logs and attempt records.
    fn name(&self) -> &'static str;

    /// Whether the backend's behaviour depends on the compression method.
    /// Method-independent backends are attempted once per invocation.
    fn per_method(&self) -> bool {
        true
    }

    /// Wall-clock limit for a single attempt.
    fn timeout(&self) -> Duration;

    /// Check whether the backend can run at all in this environment.
    async fn check_available(&self) -> Result<(), PagewerkError>;

    /// Write a compressed copy of `source` to `output`.
    ///
    /// Once `cancel` fires the backend must stop its work, including any
    /// blocking worker it started, and return before the future resolves.
    async fn compress(
        &self,
        source: &Path,
        output: &Path,
        method: CompressionMethod,
        cancel: &CancellationToken,
    ) -> Result<(), PagewerkError>;
}

/// Ensure a backend left a non-empty file at `output`.
pub(crate) async fn require_output(backend: &str, output: &Path) -> Result<u64, PagewerkError> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.len() > 0 => Ok(meta.len()),
        Ok(_) => Err(PagewerkError::BackendFailure {
            backend: backend.to_string(),
            reason: "output file is empty".into(),
        }),
        Err(err) => Err(PagewerkError::BackendFailure {
            backend: backend.to_string(),
            reason: format!("output file missing: {err}"),
        }),
    }
}

/// Map a failed `spawn_blocking` join into a backend failure.
pub(crate) fn join_failure(backend: &str, err: tokio::task::JoinError) -> PagewerkError {
    PagewerkError::BackendFailure {
        backend: backend.to_string(),
        reason: format!("worker task failed: {err}"),
    }
}
