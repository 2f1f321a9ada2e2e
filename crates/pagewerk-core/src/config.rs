// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PagewerkError, Result};
use crate::types::{CompressionMethod, ToneCurve};

/// One mebibyte, the unit every size threshold is expressed in.
pub const MIB: u64 = 1024 * 1024;

/// Image downsampling filter requested from the external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownsampleFilter {
    Bicubic,
    Average,
    Subsample,
}

impl DownsampleFilter {
    /// Ghostscript name for the filter.
    pub fn ghostscript_name(self) -> &'static str {
        match self {
            Self::Bicubic => "/Bicubic",
            Self::Average => "/Average",
            Self::Subsample => "/Subsample",
        }
    }
}

/// Knobs for one compression method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MethodTuning {
    /// Target image resolution in DPI.
    pub dpi: u32,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
    /// Downsampling filter for the external tool.
    pub downsample: DownsampleFilter,
    /// Ask the external tool to subset embedded fonts.
    pub subset_fonts: bool,
}

/// Size thresholds consulted by the strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorThresholds {
    /// Above this size an image-bearing document goes straight to `extreme`.
    pub extreme_above_bytes: u64,
    /// Above this size an image-bearing document starts at `aggressive`.
    pub aggressive_above_bytes: u64,
}

impl Default for SelectorThresholds {
    fn default() -> Self {
        Self {
            extreme_above_bytes: 50 * MIB,
            aggressive_above_bytes: 10 * MIB,
        }
    }
}

/// Settings for the external compression tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalToolConfig {
    /// Executable name or absolute path (resolved through `PATH`).
    pub program: String,
    /// PDF compatibility level written by the tool.
    pub compatibility_level: String,
    /// Per-attempt wall-clock limit, in seconds.
    pub timeout_secs: u64,
}

impl Default for ExternalToolConfig {
    fn default() -> Self {
        Self {
            program: if cfg!(windows) { "gswin64c" } else { "gs" }.to_string(),
            compatibility_level: "1.4".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-method tuning table.
    pub methods: BTreeMap<CompressionMethod, MethodTuning>,
    pub thresholds: SelectorThresholds,
    pub external_tool: ExternalToolConfig,
    /// Wall-clock limit for one in-process compression attempt, in seconds.
    pub in_process_timeout_secs: u64,
    /// Default rasterization DPI when the caller has no preference.
    pub default_dpi: u32,
    /// Largest rendered page edge in pixels.
    pub max_dimension: u32,
    /// Rasterization DPI for the enhance-and-reassemble path.
    pub enhance_dpi: u32,
    /// JPEG quality for enhanced pages.
    pub enhance_jpeg_quality: u8,
    /// A delivered page PNG larger than this is re-encoded as JPEG.
    pub max_image_bytes: u64,
    /// Default per-archive ceiling for delivery packaging.
    pub archive_ceiling_bytes: u64,
    /// Upper bound on concurrent page post-processing jobs.
    pub worker_threads: usize,
    /// Strength curve for contrast and brightness.
    pub tone_curve: ToneCurve,
}

impl PipelineConfig {
    /// Load configuration from a JSON file; missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded pipeline configuration");
        Ok(config)
    }

    /// Tuning for `method`, falling back to the built-in table when the
    /// configured table omits it.
    pub fn tuning(&self, method: CompressionMethod) -> MethodTuning {
        self.methods
            .get(&method)
            .copied()
            .unwrap_or_else(|| default_tuning(method))
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_tool.timeout_secs)
    }

    pub fn in_process_timeout(&self) -> Duration {
        Duration::from_secs(self.in_process_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        for (method, tuning) in &self.methods {
            if tuning.dpi == 0 {
                return Err(PagewerkError::Config(format!("{method}: dpi must be positive")));
            }
            if !(1..=100).contains(&tuning.jpeg_quality) {
                return Err(PagewerkError::Config(format!(
                    "{method}: jpeg_quality {} is outside 1-100",
                    tuning.jpeg_quality
                )));
            }
        }
        if self.thresholds.aggressive_above_bytes > self.thresholds.extreme_above_bytes {
            return Err(PagewerkError::Config(
                "aggressive threshold must not exceed extreme threshold".into(),
            ));
        }
        if self.max_dimension == 0 || self.default_dpi == 0 || self.enhance_dpi == 0 {
            return Err(PagewerkError::Config(
                "render dimensions and DPI values must be positive".into(),
            ));
        }
        if !(1..=100).contains(&self.enhance_jpeg_quality) {
            return Err(PagewerkError::Config(format!(
                "enhance_jpeg_quality {} is outside 1-100",
                self.enhance_jpeg_quality
            )));
        }
        if self.worker_threads == 0 {
            return Err(PagewerkError::Config("worker_threads must be at least 1".into()));
        }
        if self.external_tool.timeout_secs == 0 || self.in_process_timeout_secs == 0 {
            return Err(PagewerkError::Config("attempt timeouts must be at least 1s".into()));
        }
        debug!("Pipeline configuration validated");
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let methods = CompressionMethod::ALL
            .iter()
            .map(|&method| (method, default_tuning(method)))
            .collect();
        Self {
            methods,
            thresholds: SelectorThresholds::default(),
            external_tool: ExternalToolConfig::default(),
            in_process_timeout_secs: 300,
            default_dpi: 300,
            max_dimension: 10_000,
            enhance_dpi: 150,
            enhance_jpeg_quality: 95,
            max_image_bytes: 5 * MIB,
            archive_ceiling_bytes: 50 * MIB,
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get().min(4))
                .unwrap_or(2),
            tone_curve: ToneCurve::Linear,
        }
    }
}

/// Built-in tuning table.
fn default_tuning(method: CompressionMethod) -> MethodTuning {
    match method {
        CompressionMethod::Light => MethodTuning {
            dpi: 150,
            jpeg_quality: 90,
            downsample: DownsampleFilter::Bicubic,
            subset_fonts: true,
        },
        CompressionMethod::Balanced => MethodTuning {
            dpi: 150,
            jpeg_quality: 75,
            downsample: DownsampleFilter::Bicubic,
            subset_fonts: true,
        },
        CompressionMethod::Aggressive => MethodTuning {
            dpi: 96,
            jpeg_quality: 60,
            downsample: DownsampleFilter::Average,
            subset_fonts: true,
        },
        CompressionMethod::Extreme => MethodTuning {
            dpi: 72,
            jpeg_quality: 40,
            downsample: DownsampleFilter::Subsample,
            subset_fonts: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_method_table() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tuning(CompressionMethod::Light).dpi, 150);
        assert_eq!(config.tuning(CompressionMethod::Light).jpeg_quality, 90);
        assert_eq!(config.tuning(CompressionMethod::Balanced).jpeg_quality, 75);
        assert_eq!(config.tuning(CompressionMethod::Aggressive).dpi, 96);
        assert_eq!(config.tuning(CompressionMethod::Extreme).jpeg_quality, 40);
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let json = r#"{
            "enhance_dpi": 200,
            "methods": { "extreme": { "dpi": 50, "jpeg_quality": 30, "downsample": "subsample", "subset_fonts": false } }
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.enhance_dpi, 200);
        assert_eq!(config.tuning(CompressionMethod::Extreme).dpi, 50);
        // Methods missing from the table fall back to the built-in tuning.
        assert_eq!(config.tuning(CompressionMethod::Light).jpeg_quality, 90);
        assert_eq!(config.archive_ceiling_bytes, 50 * MIB);
    }

    #[test]
    fn invalid_quality_is_rejected() {
        let mut config = PipelineConfig::default();
        if let Some(tuning) = config.methods.get_mut(&CompressionMethod::Balanced) {
            tuning.jpeg_quality = 0;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn swapped_thresholds_are_rejected() {
        let config = PipelineConfig {
            thresholds: SelectorThresholds {
                extreme_above_bytes: MIB,
                aggressive_above_bytes: 2 * MIB,
            },
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let mut config = PipelineConfig::default();
        config.external_tool.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(PagewerkError::Config(_))));

        let config = PipelineConfig {
            in_process_timeout_secs: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(PagewerkError::Config(_))));
    }

    #[test]
    fn load_reads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagewerk.json");
        std::fs::write(&path, r#"{"worker_threads": 2, "tone_curve": {"kind": "powered", "exponent": 1.5}}"#)
            .unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.tone_curve, ToneCurve::Powered { exponent: 1.5 });
    }
}
