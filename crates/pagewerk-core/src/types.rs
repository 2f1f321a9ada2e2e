// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Pagewerk pipeline.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PagewerkError, Result};

/// Unique identifier for one pipeline invocation (used in log spans and
/// temporary directory names).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(pub Uuid);

impl InvocationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// -- Compression methods ------------------------------------------------------

/// Named compression strengths, ordered from least to most destructive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    Light,
    Balanced,
    Aggressive,
    Extreme,
}

impl CompressionMethod {
    /// Every method, least destructive first.
    pub const ALL: [CompressionMethod; 4] = [
        CompressionMethod::Light,
        CompressionMethod::Balanced,
        CompressionMethod::Aggressive,
        CompressionMethod::Extreme,
    ];

    /// Position in the destructiveness ordering (0 = least destructive).
    pub fn rank(self) -> usize {
        match self {
            Self::Light => 0,
            Self::Balanced => 1,
            Self::Aggressive => 2,
            Self::Extreme => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Balanced => "balanced",
            Self::Aggressive => "aggressive",
            Self::Extreme => "extreme",
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionMethod {
    type Err = PagewerkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "balanced" => Ok(Self::Balanced),
            "aggressive" => Ok(Self::Aggressive),
            "extreme" => Ok(Self::Extreme),
            other => Err(PagewerkError::Config(format!(
                "unknown compression method '{other}'"
            ))),
        }
    }
}

// -- Structural analysis ------------------------------------------------------

/// Coarse document classification derived from a [`StructuralProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentClass {
    /// Extractable text, no embedded raster images in the sample.
    TextOnly,
    /// Embedded raster images, no extractable text in the sample.
    ImageHeavy,
    /// Both text and raster images.
    Mixed,
    /// Neither (vector art, blank pages, or unreadable text layer).
    Unknown,
}

/// What the analyzer learned from the sampled pages of a document.
///
/// This is a heuristic over the first few pages only, never a guarantee about
/// pages outside the sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralProfile {
    pub page_count: usize,
    pub has_text: bool,
    pub has_raster_images: bool,
    pub byte_size: u64,
}

impl StructuralProfile {
    pub fn class(&self) -> DocumentClass {
        match (self.has_text, self.has_raster_images) {
            (true, false) => DocumentClass::TextOnly,
            (false, true) => DocumentClass::ImageHeavy,
            (true, true) => DocumentClass::Mixed,
            (false, false) => DocumentClass::Unknown,
        }
    }
}

// -- Enhancement --------------------------------------------------------------

/// Tone adjustments applied by the enhancer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnhancementSettings {
    /// Multiplicative contrast around mid-gray, within [`Self::CONTRAST_RANGE`].
    pub contrast: f32,
    /// Brightness shift, within [`Self::BRIGHTNESS_RANGE`].
    pub brightness: f32,
    /// Run a per-channel percentile stretch before contrast/brightness.
    pub auto_enhance: bool,
}

impl EnhancementSettings {
    pub const CONTRAST_RANGE: (f32, f32) = (0.1, 10.0);
    pub const BRIGHTNESS_RANGE: (f32, f32) = (-150.0, 150.0);

    /// Build validated settings; out-of-range values are rejected.
    pub fn new(contrast: f32, brightness: f32, auto_enhance: bool) -> Result<Self> {
        let settings = Self {
            contrast,
            brightness,
            auto_enhance,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let (c_lo, c_hi) = Self::CONTRAST_RANGE;
        if !self.contrast.is_finite() || self.contrast < c_lo || self.contrast > c_hi {
            return Err(PagewerkError::InvalidSettings {
                field: "contrast",
                reason: format!("{} is outside [{c_lo}, {c_hi}]", self.contrast),
            });
        }
        let (b_lo, b_hi) = Self::BRIGHTNESS_RANGE;
        if !self.brightness.is_finite() || self.brightness < b_lo || self.brightness > b_hi {
            return Err(PagewerkError::InvalidSettings {
                field: "brightness",
                reason: format!("{} is outside [{b_lo}, {b_hi}]", self.brightness),
            });
        }
        Ok(())
    }

    /// Clamp every field into its documented bounds. Non-finite values fall
    /// back to the neutral setting.
    pub fn clamped(self) -> Self {
        let (c_lo, c_hi) = Self::CONTRAST_RANGE;
        let (b_lo, b_hi) = Self::BRIGHTNESS_RANGE;
        let contrast = if self.contrast.is_finite() {
            self.contrast.clamp(c_lo, c_hi)
        } else {
            1.0
        };
        let brightness = if self.brightness.is_finite() {
            self.brightness.clamp(b_lo, b_hi)
        } else {
            0.0
        };
        Self {
            contrast,
            brightness,
            auto_enhance: self.auto_enhance,
        }
    }

    /// True when enhancement would leave every pixel untouched.
    pub fn is_identity(&self) -> bool {
        self.contrast == 1.0 && self.brightness == 0.0 && !self.auto_enhance
    }
}

impl Default for EnhancementSettings {
    fn default() -> Self {
        Self {
            contrast: 1.0,
            brightness: 0.0,
            auto_enhance: false,
        }
    }
}

/// Strength curve mapping user-facing contrast/brightness values onto the
/// multiplicative and additive factors the enhancer applies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToneCurve {
    /// contrast as-is, brightness scale `1 + b/100`.
    Linear,
    /// Both factors raised to `exponent` (> 1 strengthens, < 1 softens).
    Powered { exponent: f32 },
    /// Linear scale plus an additive offset of `b * offset_scale` levels.
    Aggressive { offset_scale: f32 },
}

impl ToneCurve {
    /// Multiplicative contrast factor around mid-gray.
    pub fn contrast_factor(&self, contrast: f32) -> f32 {
        match self {
            Self::Linear | Self::Aggressive { .. } => contrast,
            Self::Powered { exponent } => contrast.max(0.0).powf(*exponent),
        }
    }

    /// `(scale, offset)` applied as `v * scale + offset` after contrast.
    pub fn brightness_transform(&self, brightness: f32) -> (f32, f32) {
        let linear = (1.0 + brightness / 100.0).max(0.0);
        match self {
            Self::Linear => (linear, 0.0),
            Self::Powered { exponent } => (linear.powf(*exponent), 0.0),
            Self::Aggressive { offset_scale } => (linear, brightness * offset_scale),
        }
    }
}

impl Default for ToneCurve {
    fn default() -> Self {
        Self::Linear
    }
}

// -- Per-user settings --------------------------------------------------------

/// Per-user processing preferences as persisted by the settings store.
///
/// Stored records may be partial; missing fields take the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub dpi: u32,
    pub contrast: f32,
    pub brightness: i32,
    pub auto_enhance: bool,
}

impl UserSettings {
    pub const DPI_RANGE: (u32, u32) = (72, 600);
    pub const CONTRAST_RANGE: (f32, f32) = (0.1, 10.0);
    pub const BRIGHTNESS_RANGE: (i32, i32) = (-100, 100);

    pub fn validate(&self) -> Result<()> {
        let (d_lo, d_hi) = Self::DPI_RANGE;
        if !(d_lo..=d_hi).contains(&self.dpi) {
            return Err(PagewerkError::InvalidSettings {
                field: "dpi",
                reason: format!("{} is outside [{d_lo}, {d_hi}]", self.dpi),
            });
        }
        let (c_lo, c_hi) = Self::CONTRAST_RANGE;
        if !self.contrast.is_finite() || !(c_lo..=c_hi).contains(&self.contrast) {
            return Err(PagewerkError::InvalidSettings {
                field: "contrast",
                reason: format!("{} is outside [{c_lo}, {c_hi}]", self.contrast),
            });
        }
        let (b_lo, b_hi) = Self::BRIGHTNESS_RANGE;
        if !(b_lo..=b_hi).contains(&self.brightness) {
            return Err(PagewerkError::InvalidSettings {
                field: "brightness",
                reason: format!("{} is outside [{b_lo}, {b_hi}]", self.brightness),
            });
        }
        Ok(())
    }

    /// Enhancement parameters derived from these preferences.
    pub fn enhancement(&self) -> EnhancementSettings {
        EnhancementSettings {
            contrast: self.contrast,
            brightness: self.brightness as f32,
            auto_enhance: self.auto_enhance,
        }
        .clamped()
    }
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            dpi: 300,
            contrast: 1.15,
            brightness: 0,
            auto_enhance: false,
        }
    }
}

/// A partial change to a [`UserSettings`] record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub dpi: Option<u32>,
    pub contrast: Option<f32>,
    pub brightness: Option<i32>,
    pub auto_enhance: Option<bool>,
}

impl SettingsUpdate {
    /// Merge into `base`, returning the new (not yet validated) record.
    pub fn apply_to(&self, base: &UserSettings) -> UserSettings {
        UserSettings {
            dpi: self.dpi.unwrap_or(base.dpi),
            contrast: self.contrast.unwrap_or(base.contrast),
            brightness: self.brightness.unwrap_or(base.brightness),
            auto_enhance: self.auto_enhance.unwrap_or(base.auto_enhance),
        }
    }
}

/// Rendering quality shortcuts offered to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    High,
    Medium,
    Low,
}

impl QualityPreset {
    pub fn dpi(self) -> u32 {
        match self {
            Self::High => 300,
            Self::Medium => 150,
            Self::Low => 72,
        }
    }
}

/// Contrast shortcuts offered to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContrastPreset {
    High,
    Medium,
    Low,
}

impl ContrastPreset {
    pub fn contrast(self) -> f32 {
        match self {
            Self::High => 1.3,
            Self::Medium => 1.15,
            Self::Low => 1.05,
        }
    }
}

/// Step used by the "brighter" / "darker" shortcuts.
pub const BRIGHTNESS_STEP: i32 = 20;

// -- Page images and packaging ------------------------------------------------

/// Encoding of a delivered page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageEncoding {
    Png,
    Jpeg { quality: u8 },
}

impl ImageEncoding {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg { .. } => "jpg",
        }
    }
}

/// One encoded page image, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub page_number: u32,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub encoding: ImageEncoding,
}

impl PageImage {
    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// File name used when the image is placed in an archive.
    pub fn file_name(&self) -> String {
        format!("page_{:03}.{}", self.page_number, self.encoding.extension())
    }
}

/// One finished delivery archive and the page span it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePayload {
    pub bytes: Vec<u8>,
    pub first_page: u32,
    pub last_page: u32,
    pub page_count: usize,
}

impl ArchivePayload {
    /// Suggested attachment name, e.g. `report_images.zip` or
    /// `report_images_part2of3.zip`.
    pub fn file_name(&self, stem: &str, index: usize, total: usize) -> String {
        if total <= 1 {
            format!("{stem}_images.zip")
        } else {
            format!("{stem}_images_part{}of{}.zip", index + 1, total)
        }
    }
}

// -- Compression diagnostics --------------------------------------------------

/// One compression attempt as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub method: CompressionMethod,
    pub backend: String,
    pub output_size: Option<u64>,
    pub success: bool,
    pub error: Option<String>,
    pub elapsed: Duration,
}
