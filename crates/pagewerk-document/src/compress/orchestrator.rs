// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Compression orchestrator — analyse, pick a method order, then try each
// backend/method pair in turn until one produces a valid, strictly smaller
// document. When nothing qualifies the source is returned untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use pagewerk_core::config::{PipelineConfig, SelectorThresholds};
use pagewerk_core::error::PagewerkError;
use pagewerk_core::types::{AttemptRecord, CompressionMethod, StructuralProfile};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::backend::CompressionBackend;
use super::ghostscript::GhostscriptBackend;
use super::reencode::ReencodeBackend;
use super::rewrite::LosslessRewriteBackend;
use super::strategy;
use crate::pdf::reader::PdfReader;
use crate::raster::rasterizer::Rasterizer;

/// Where an invocation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompressionState {
    Idle,
    Analyzing,
    SelectingStrategy,
    /// Running the attempt with this 0-based index.
    Attempting(usize),
    Validating(usize),
    Success,
    ExhaustedFallback,
}

/// Result of one `compress` invocation.
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    /// The accepted output, or the source path when nothing was smaller.
    pub output: PathBuf,
    /// False when the source is returned unchanged.
    pub compressed: bool,
    pub original_size: u64,
    pub final_size: u64,
    /// Method and backend of the accepted attempt.
    pub method: Option<CompressionMethod>,
    pub backend: Option<String>,
    pub profile: StructuralProfile,
    /// Every attempt, in the order it was made.
    pub attempts: Vec<AttemptRecord>,
    pub transitions: Vec<CompressionState>,
}

impl CompressionOutcome {
    /// Final size as a fraction of the original (1.0 when unchanged).
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            1.0
        } else {
            self.final_size as f64 / self.original_size as f64
        }
    }
}

/// Runs backends in order over a single source document.
pub struct CompressionOrchestrator {
    backends: Vec<Arc<dyn CompressionBackend>>,
    thresholds: SelectorThresholds,
}

impl CompressionOrchestrator {
    pub fn new(backends: Vec<Arc<dyn CompressionBackend>>, thresholds: SelectorThresholds) -> Self {
        Self {
            backends,
            thresholds,
        }
    }

    /// External tool first, then the lossless rewrite, then re-encoding.
    pub fn standard(config: &PipelineConfig, rasterizer: Rasterizer) -> Self {
        let backends: Vec<Arc<dyn CompressionBackend>> = vec![
            Arc::new(GhostscriptBackend::new(config)),
            Arc::new(LosslessRewriteBackend::new(config.in_process_timeout())),
            Arc::new(ReencodeBackend::new(rasterizer, config)),
        ];
        Self::new(backends, config.thresholds)
    }

    /// Compress `source`, staging attempt outputs in `work_dir`.
    ///
    /// Only an unreadable source or cancellation is an error; running out of
    /// attempts is a normal outcome with `compressed == false`.
    #[instrument(skip(self, work_dir, cancel), fields(source = %source.display()))]
    pub async fn run(
        &self,
        source: &Path,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<CompressionOutcome, PagewerkError> {
        let mut transitions = vec![CompressionState::Idle];

        advance(&mut transitions, CompressionState::Analyzing);
        let source_path = source.to_path_buf();
        let (profile, page_count) = tokio::task::spawn_blocking(move || {
            PdfReader::open(&source_path).map(|reader| (reader.analyze(), reader.page_count()))
        })
        .await
        .map_err(|err| PagewerkError::PdfError(format!("analysis task failed: {err}")))??;
        let original_size = profile.byte_size;

        advance(&mut transitions, CompressionState::SelectingStrategy);
        let methods = strategy::select(&profile, original_size, &self.thresholds);
        let primary = methods[0];

        let mut attempts = Vec::new();
        let mut plan: Vec<(Arc<dyn CompressionBackend>, CompressionMethod)> = Vec::new();
        for backend in &self.backends {
            let started = Instant::now();
            match backend.check_available().await {
                Ok(()) if backend.per_method() => {
                    plan.extend(methods.iter().map(|m| (Arc::clone(backend), *m)));
                }
                Ok(()) => plan.push((Arc::clone(backend), primary)),
                Err(err) => {
                    info!(backend = backend.name(), %err, "Backend unavailable, skipping");
                    attempts.push(AttemptRecord {
                        method: primary,
                        backend: backend.name().to_string(),
                        output_size: None,
                        success: false,
                        error: Some(err.to_string()),
                        elapsed: started.elapsed(),
                    });
                }
            }
        }

        for (index, (backend, method)) in plan.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(attempt = index, "Cancelled before attempt");
                return Err(PagewerkError::Cancelled);
            }
            advance(&mut transitions, CompressionState::Attempting(index));

            let output = work_dir.join(format!("attempt_{index:02}_{}_{method}.pdf", backend.name()));
            let started = Instant::now();
            let limit = backend.timeout();

            // The attempt owns a child token so a timeout can stop it
            // without cancelling the whole invocation.
            let attempt_token = cancel.child_token();
            let mut attempt = std::pin::pin!(backend.compress(source, &output, *method, &attempt_token));
            let raced = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Interrupt::Cancelled),
                result = tokio::time::timeout(limit, &mut attempt) => {
                    result.map_err(|_| Interrupt::TimedOut)
                }
            };

            let result = match raced {
                Ok(result) => result,
                Err(interrupt) => {
                    attempt_token.cancel();
                    // Wait for the backend to wind down before the next one starts.
                    if let Err(err) = attempt.await {
                        debug!(attempt = index, %err, "Interrupted attempt finished");
                    }
                    match interrupt {
                        Interrupt::Cancelled => {
                            remove_quietly(&output).await;
                            info!(attempt = index, "Cancelled during attempt");
                            return Err(PagewerkError::Cancelled);
                        }
                        Interrupt::TimedOut => Err(PagewerkError::Timeout {
                            seconds: limit.as_secs(),
                        }),
                    }
                }
            };

            let result = match result {
                Ok(()) => {
                    advance(&mut transitions, CompressionState::Validating(index));
                    validate(&output, original_size, page_count).await
                }
                Err(err) => Err(err),
            };

            match result {
                Ok(size) => {
                    attempts.push(AttemptRecord {
                        method: *method,
                        backend: backend.name().to_string(),
                        output_size: Some(size),
                        success: true,
                        error: None,
                        elapsed: started.elapsed(),
                    });
                    advance(&mut transitions, CompressionState::Success);
                    info!(
                        backend = backend.name(),
                        %method,
                        original_size,
                        final_size = size,
                        attempts = attempts.len(),
                        "Compression accepted"
                    );
                    return Ok(CompressionOutcome {
                        output: output.clone(),
                        compressed: true,
                        original_size,
                        final_size: size,
                        method: Some(*method),
                        backend: Some(backend.name().to_string()),
                        profile,
                        attempts,
                        transitions,
                    });
                }
                Err(err) => {
                    remove_quietly(&output).await;
                    if !err.triggers_fallback() {
                        return Err(err);
                    }
                    warn!(backend = backend.name(), %method, %err, "Attempt failed, falling back");
                    attempts.push(AttemptRecord {
                        method: *method,
                        backend: backend.name().to_string(),
                        output_size: None,
                        success: false,
                        error: Some(err.to_string()),
                        elapsed: started.elapsed(),
                    });
                }
            }
        }

        advance(&mut transitions, CompressionState::ExhaustedFallback);
        info!(attempts = attempts.len(), "No attempt produced a smaller document, keeping original");
        Ok(CompressionOutcome {
            output: source.to_path_buf(),
            compressed: false,
            original_size,
            final_size: original_size,
            method: None,
            backend: None,
            profile,
            attempts,
            transitions,
        })
    }
}

/// Why an attempt was stopped before its backend returned.
enum Interrupt {
    Cancelled,
    TimedOut,
}

fn advance(transitions: &mut Vec<CompressionState>, state: CompressionState) {
    debug!(?state, "Compression state");
    transitions.push(state);
}

/// Accept `output` only if it is non-empty, strictly smaller than the
/// source, and reopens with the same number of pages.
async fn validate(output: &Path, original_size: u64, page_count: usize) -> Result<u64, PagewerkError> {
    let size = tokio::fs::metadata(output)
        .await
        .map_err(|err| PagewerkError::ValidationRejected(format!("output unreadable: {err}")))?
        .len();
    if size == 0 {
        return Err(PagewerkError::ValidationRejected("output is empty".into()));
    }
    if size >= original_size {
        return Err(PagewerkError::ValidationRejected(format!(
            "output is {size} bytes, source is {original_size}"
        )));
    }

    let path = output.to_path_buf();
    let reopened = tokio::task::spawn_blocking(move || PdfReader::open(&path).map(|r| r.page_count()))
        .await
        .map_err(|err| PagewerkError::ValidationRejected(format!("validation task failed: {err}")))?
        .map_err(|err| PagewerkError::ValidationRejected(format!("output does not reopen: {err}")))?;
    if reopened != page_count {
        return Err(PagewerkError::ValidationRejected(format!(
            "output has {reopened} pages, source has {page_count}"
        )));
    }
    Ok(size)
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed rejected output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), %err, "Could not remove rejected output"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::test_support::{FakeRenderer, FixturePage, build_pdf, write_fixture};

    #[derive(Clone, Copy)]
    enum Behaviour {
        /// Write a valid, much smaller document with the same page count.
        Shrink,
        /// Write a valid document larger than the source.
        Grow,
        /// Write a smaller document that lost a page.
        DropPage,
        Fail,
        Hang,
    }

    struct FakeBackend {
        name: &'static str,
        per_method: bool,
        available: bool,
        behaviour: Behaviour,
        pages: usize,
        calls: Mutex<Vec<CompressionMethod>>,
    }

    impl FakeBackend {
        fn new(name: &'static str, behaviour: Behaviour, pages: usize) -> Self {
            Self {
                name,
                per_method: true,
                available: true,
                behaviour,
                pages,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn once(mut self) -> Self {
            self.per_method = false;
            self
        }

        fn unavailable(mut self) -> Self {
            self.available = false;
            self
        }

        fn calls(&self) -> Vec<CompressionMethod> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompressionBackend for FakeBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        fn per_method(&self) -> bool {
            self.per_method
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(200)
        }

        async fn check_available(&self) -> Result<(), PagewerkError> {
            if self.available {
                Ok(())
            } else {
                Err(PagewerkError::BackendUnavailable {
                    backend: self.name.into(),
                    reason: "not installed".into(),
                })
            }
        }

        async fn compress(
            &self,
            _source: &Path,
            output: &Path,
            method: CompressionMethod,
            cancel: &CancellationToken,
        ) -> Result<(), PagewerkError> {
            self.calls.lock().unwrap().push(method);
            let pages = match self.behaviour {
                Behaviour::Shrink => vec![FixturePage::blank(612.0, 792.0); self.pages],
                Behaviour::Grow => vec![FixturePage::image(256, 256); self.pages],
                Behaviour::DropPage => vec![FixturePage::blank(612.0, 792.0); self.pages - 1],
                Behaviour::Fail => {
                    return Err(PagewerkError::BackendFailure {
                        backend: self.name.into(),
                        reason: "exit 1".into(),
                    });
                }
                Behaviour::Hang => {
                    cancel.cancelled().await;
                    return Err(PagewerkError::Cancelled);
                }
            };
            std::fs::write(output, build_pdf(&pages)).unwrap();
            Ok(())
        }
    }

    /// Two image pages, about 100 KB.
    fn raster_source(dir: &Path) -> PathBuf {
        write_fixture(
            dir,
            "scan.pdf",
            &build_pdf(&[FixturePage::image(128, 128), FixturePage::image(128, 128)]),
        )
    }

    fn tiny_thresholds() -> SelectorThresholds {
        SelectorThresholds {
            extreme_above_bytes: 1024,
            aggressive_above_bytes: 512,
        }
    }

    fn orchestrator(backends: Vec<Arc<dyn CompressionBackend>>) -> CompressionOrchestrator {
        CompressionOrchestrator::new(backends, tiny_thresholds())
    }

    #[tokio::test]
    async fn exhausted_chain_returns_source_with_full_log() {
        use CompressionMethod::*;
        let dir = tempfile::tempdir().unwrap();
        let source = raster_source(dir.path());
        let external = Arc::new(FakeBackend::new("external", Behaviour::Fail, 2));
        let rewrite = Arc::new(FakeBackend::new("rewrite", Behaviour::Grow, 2).once());
        let reencode = Arc::new(FakeBackend::new("reencode", Behaviour::Fail, 2));

        let outcome = orchestrator(vec![external.clone(), rewrite.clone(), reencode.clone()])
            .run(&source, dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.compressed);
        assert_eq!(outcome.output, source);
        assert_eq!(outcome.final_size, outcome.original_size);
        assert_eq!(external.calls(), vec![Extreme, Aggressive, Balanced, Light]);
        assert_eq!(rewrite.calls(), vec![Extreme]);
        assert_eq!(reencode.calls(), vec![Extreme, Aggressive, Balanced, Light]);
        assert_eq!(outcome.attempts.len(), 9);
        assert!(outcome.attempts.iter().all(|a| !a.success));
        assert_eq!(outcome.transitions.last(), Some(&CompressionState::ExhaustedFallback));

        // Rejected outputs are gone; only the source remains.
        let left: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(left.len(), 1);
    }

    #[tokio::test]
    async fn first_valid_smaller_output_wins() {
        let dir = tempfile::tempdir().unwrap();
        let source = raster_source(dir.path());
        let external = Arc::new(FakeBackend::new("external", Behaviour::Fail, 2));
        let reencode = Arc::new(FakeBackend::new("reencode", Behaviour::Shrink, 2));

        let outcome = orchestrator(vec![external, reencode.clone()])
            .run(&source, dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.compressed);
        assert_eq!(outcome.backend.as_deref(), Some("reencode"));
        assert_eq!(outcome.method, Some(CompressionMethod::Extreme));
        assert!(outcome.final_size < outcome.original_size);
        assert!(outcome.output.exists());
        assert_eq!(reencode.calls().len(), 1);
        assert_eq!(outcome.attempts.len(), 5);
        assert!(outcome.attempts.last().unwrap().success);
        assert!(outcome.transitions.contains(&CompressionState::Validating(4)));
    }

    #[tokio::test]
    async fn page_loss_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = raster_source(dir.path());
        let lossy = Arc::new(FakeBackend::new("lossy", Behaviour::DropPage, 2).once());
        let good = Arc::new(FakeBackend::new("good", Behaviour::Shrink, 2).once());

        let outcome = orchestrator(vec![lossy, good])
            .run(&source, dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.backend.as_deref(), Some("good"));
        let rejected = &outcome.attempts[0];
        assert!(rejected.error.as_deref().unwrap().contains("pages"));
    }

    #[tokio::test]
    async fn timeout_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let source = raster_source(dir.path());
        let slow = Arc::new(FakeBackend::new("slow", Behaviour::Hang, 2).once());
        let good = Arc::new(FakeBackend::new("good", Behaviour::Shrink, 2).once());

        let outcome = orchestrator(vec![slow, good])
            .run(&source, dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.compressed);
        assert!(outcome.attempts[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn unavailable_backend_is_skipped_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        let source = raster_source(dir.path());
        let missing = Arc::new(FakeBackend::new("missing", Behaviour::Shrink, 2).unavailable());
        let good = Arc::new(FakeBackend::new("good", Behaviour::Shrink, 2).once());

        let outcome = orchestrator(vec![missing.clone(), good])
            .run(&source, dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(missing.calls().is_empty());
        assert_eq!(outcome.attempts[0].backend, "missing");
        assert!(!outcome.attempts[0].success);
        assert_eq!(outcome.backend.as_deref(), Some("good"));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let source = raster_source(dir.path());
        let good = Arc::new(FakeBackend::new("good", Behaviour::Shrink, 2));
        let token = CancellationToken::new();
        token.cancel();

        let err = orchestrator(vec![good.clone()])
            .run(&source, dir.path(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, PagewerkError::Cancelled));
        assert!(good.calls().is_empty());
    }

    #[tokio::test]
    async fn cancelled_during_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let source = raster_source(dir.path());
        let mut slow = FakeBackend::new("slow", Behaviour::Hang, 2);
        slow.per_method = false;
        let slow = Arc::new(slow);
        let token = CancellationToken::new();

        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = orchestrator(vec![slow])
            .run(&source, dir.path(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, PagewerkError::Cancelled));
    }

    #[tokio::test]
    async fn unreadable_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_fixture(dir.path(), "broken.pdf", b"not a pdf at all");
        let err = orchestrator(vec![Arc::new(FakeBackend::new("good", Behaviour::Shrink, 1))])
            .run(&source, dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PagewerkError::SourceUnreadable { .. }));
    }

    #[tokio::test]
    async fn timed_out_attempt_stops_before_the_next_starts() {
        let dir = tempfile::tempdir().unwrap();
        let source = raster_source(dir.path());
        let mut config = PipelineConfig::default();
        config.in_process_timeout_secs = 1;
        // Two pages at 700ms each overrun the one second limit.
        let renderer = Arc::new(FakeRenderer::new(2).with_delay(Duration::from_millis(700)));
        let reencode = ReencodeBackend::new(Rasterizer::new(renderer.clone()), &config);

        let outcome = orchestrator(vec![Arc::new(reencode)])
            .run(&source, dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.compressed);
        assert_eq!(outcome.attempts.len(), 4);
        for attempt in &outcome.attempts {
            assert!(attempt.error.as_deref().unwrap().contains("timed out"));
        }
        assert_eq!(renderer.peak(), 1);
        assert_eq!(renderer.active(), 0);
        let left: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(left.len(), 1);
    }
}
