// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Lossless in-process rewrite: drop unreferenced objects and empty streams,
// deflate every stream, and save with `lopdf`. No pixels are touched.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use lopdf::Document;
use pagewerk_core::error::PagewerkError;
use pagewerk_core::types::CompressionMethod;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::backend::{CompressionBackend, join_failure, require_output};

const NAME: &str = "lopdf-rewrite";

pub struct LosslessRewriteBackend {
    timeout: Duration,
}

impl LosslessRewriteBackend {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Rewrite `source` into `output`. Blocking.
///
/// `cancel` is checked between stages; nothing is written once it fires.
pub fn rewrite_file(source: &Path, output: &Path, cancel: &CancellationToken) -> Result<(), PagewerkError> {
    let failure = |reason: String| PagewerkError::BackendFailure {
        backend: NAME.into(),
        reason,
    };
    let checkpoint = || {
        if cancel.is_cancelled() {
            Err(PagewerkError::Cancelled)
        } else {
            Ok(())
        }
    };

    checkpoint()?;
    let mut document =
        Document::load(source).map_err(|err| failure(format!("failed to load: {err}")))?;
    checkpoint()?;
    let pruned = document.prune_objects();
    let emptied = document.delete_zero_length_streams();
    checkpoint()?;
    document.compress();
    debug!(pruned = pruned.len(), emptied = emptied.len(), "Document rewritten");

    checkpoint()?;
    document
        .save(output)
        .map_err(|err| failure(format!("failed to save: {err}")))?;
    Ok(())
}

#[async_trait]
impl CompressionBackend for LosslessRewriteBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn per_method(&self) -> bool {
        false
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn check_available(&self) -> Result<(), PagewerkError> {
        Ok(())
    }

    #[instrument(skip(self), fields(source = %source.display()))]
    async fn compress(
        &self,
        source: &Path,
        output: &Path,
        _method: CompressionMethod,
        cancel: &CancellationToken,
    ) -> Result<(), PagewerkError> {
        let (source_path, output_path) = (source.to_path_buf(), output.to_path_buf());
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || rewrite_file(&source_path, &output_path, &cancel))
            .await
            .map_err(|err| join_failure(NAME, err))??;
        require_output(NAME, output).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::reader::PdfReader;
    use crate::test_support::{FixturePage, build_pdf, write_fixture};

    #[tokio::test]
    async fn rewrite_deflates_raw_streams() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_fixture(
            dir.path(),
            "in.pdf",
            &build_pdf(&[FixturePage::image(64, 64), FixturePage::text("kept")]),
        );
        let output = dir.path().join("out.pdf");

        LosslessRewriteBackend::new(Duration::from_secs(10))
            .compress(&source, &output, CompressionMethod::Light, &CancellationToken::new())
            .await
            .unwrap();

        let before = std::fs::metadata(&source).unwrap().len();
        let after = std::fs::metadata(&output).unwrap().len();
        assert!(after < before, "{after} >= {before}");
        assert_eq!(PdfReader::open(&output).unwrap().page_count(), 2);
    }

    #[tokio::test]
    async fn garbage_source_is_a_backend_failure() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_fixture(dir.path(), "in.pdf", b"not a pdf at all");
        let err = LosslessRewriteBackend::new(Duration::from_secs(10))
            .compress(
                &source,
                &dir.path().join("out.pdf"),
                CompressionMethod::Light,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PagewerkError::BackendFailure { .. }));
    }

    #[tokio::test]
    async fn cancelled_rewrite_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_fixture(dir.path(), "in.pdf", &build_pdf(&[FixturePage::text("kept")]));
        let output = dir.path().join("out.pdf");
        let token = CancellationToken::new();
        token.cancel();

        let err = LosslessRewriteBackend::new(Duration::from_secs(10))
            .compress(&source, &output, CompressionMethod::Light, &token)
            .await
            .unwrap_err();
        assert!(matches!(err, PagewerkError::Cancelled));
        assert!(!output.exists());
    }
}
