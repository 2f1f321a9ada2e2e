// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// External compression through Ghostscript's `pdfwrite` device.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use pagewerk_core::config::{ExternalToolConfig, MethodTuning, PipelineConfig};
use pagewerk_core::error::PagewerkError;
use pagewerk_core::types::CompressionMethod;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::backend::{CompressionBackend, require_output};

/// Last bytes of stderr kept in a failure message.
const STDERR_TAIL: usize = 512;

/// Runs Ghostscript once per attempt.
pub struct GhostscriptBackend {
    config: PipelineConfig,
}

impl GhostscriptBackend {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn tool(&self) -> &ExternalToolConfig {
        &self.config.external_tool
    }

    /// Resolve the configured program through `PATH`.
    pub fn locate(&self) -> Option<PathBuf> {
        which::which(&self.tool().program).ok()
    }

    /// Command-line arguments for one attempt.
    pub fn build_args(&self, tuning: &MethodTuning, input: &Path, output: &Path) -> Vec<String> {
        let dpi = tuning.dpi.to_string();
        let filter = tuning.downsample.ghostscript_name();
        let mut args = vec![
            "-sDEVICE=pdfwrite".to_string(),
            format!("-dCompatibilityLevel={}", self.tool().compatibility_level),
            "-dNOPAUSE".to_string(),
            "-dQUIET".to_string(),
            "-dBATCH".to_string(),
            "-dSAFER".to_string(),
        ];
        for kind in ["Color", "Gray", "Mono"] {
            args.push(format!("-dDownsample{kind}Images=true"));
            args.push(format!("-d{kind}ImageResolution={dpi}"));
            args.push(format!("-d{kind}ImageDownsampleType={filter}"));
        }
        args.extend([
            "-dAutoFilterColorImages=false".to_string(),
            "-dAutoFilterGrayImages=false".to_string(),
            "-dColorImageFilter=/DCTEncode".to_string(),
            "-dGrayImageFilter=/DCTEncode".to_string(),
            format!("-dJPEGQ={}", tuning.jpeg_quality),
            format!("-dSubsetFonts={}", tuning.subset_fonts),
            "-dEmbedAllFonts=true".to_string(),
            format!("-sOutputFile={}", output.display()),
            input.display().to_string(),
        ]);
        args
    }
}

#[async_trait]
impl CompressionBackend for GhostscriptBackend {
    fn name(&self) -> &'static str {
        "ghostscript"
    }

    fn timeout(&self) -> Duration {
        self.config.external_timeout()
    }

    async fn check_available(&self) -> Result<(), PagewerkError> {
        match self.locate() {
            Some(path) => {
                debug!(path = %path.display(), "Ghostscript found");
                Ok(())
            }
            None => Err(PagewerkError::BackendUnavailable {
                backend: self.name().into(),
                reason: format!("`{}` not found on PATH", self.tool().program),
            }),
        }
    }

    #[instrument(skip(self), fields(source = %source.display(), %method))]
    async fn compress(
        &self,
        source: &Path,
        output: &Path,
        method: CompressionMethod,
        cancel: &CancellationToken,
    ) -> Result<(), PagewerkError> {
        let tuning = self.config.tuning(method);
        let args = self.build_args(&tuning, source, output);
        info!(dpi = tuning.dpi, quality = tuning.jpeg_quality, "Running Ghostscript");

        let mut command = Command::new(&self.tool().program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Dropping the output future kills the child.
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Ghostscript stopped");
                return Err(PagewerkError::Cancelled);
            }
            result = command.output() => result,
        };
        let result = result.map_err(|err| PagewerkError::BackendFailure {
            backend: self.name().into(),
            reason: format!("failed to start {}: {err}", self.tool().program),
        })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr
                .chars()
                .rev()
                .take(STDERR_TAIL)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            warn!(status = %result.status, "Ghostscript exited with failure");
            return Err(PagewerkError::BackendFailure {
                backend: self.name().into(),
                reason: format!("exit {}: {}", result.status, tail.trim()),
            });
        }

        let bytes = require_output(self.name(), output).await?;
        debug!(bytes, "Ghostscript produced output");
        Ok(())
    }
}
