// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page enhancement — auto-level stretch, contrast and brightness through a
// configurable tone curve, plus a small table of named presets.
//
// Every operation is pure: it borrows the input buffer and returns a new one.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use pagewerk_core::error::PagewerkError;
use pagewerk_core::types::{EnhancementSettings, ToneCurve};
use tracing::{debug, instrument};

/// Mid-gray pivot for contrast.
const PIVOT: f32 = 128.0;

/// Lower and upper percentiles used by the auto-level stretch.
const STRETCH_LOW_PERCENTILE: f64 = 0.02;
const STRETCH_HIGH_PERCENTILE: f64 = 0.98;

/// Contrast used by the `tone` preset.
const PRESET_TONE_CONTRAST: f32 = 1.15;
/// Chroma gain used by the `saturation` preset.
const PRESET_SATURATION_GAIN: f32 = 1.3;
/// Corner darkening used by the `vignette` preset (0 = none, 1 = black).
const PRESET_VIGNETTE_STRENGTH: f32 = 0.35;
/// Blur radius used by the `soften` preset.
const PRESET_SOFTEN_SIGMA: f32 = 1.2;

type Lut = [u8; 256];

/// Applies tone adjustments to rendered pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct Enhancer {
    curve: ToneCurve,
}

impl Enhancer {
    pub fn new(curve: ToneCurve) -> Self {
        Self { curve }
    }

    /// Enhance one page.
    ///
    /// Settings are clamped into range first. With auto-enhance on, a
    /// per-channel percentile stretch runs before contrast and brightness.
    /// Neutral settings return an exact copy of the input.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn enhance(&self, image: &RgbImage, settings: &EnhancementSettings) -> RgbImage {
        let settings = settings.clamped();
        if settings.is_identity() {
            return image.clone();
        }

        let tone = self.tone_map(settings.contrast, settings.brightness);
        let stretches = if settings.auto_enhance {
            channel_stretches(image)
        } else {
            [None; 3]
        };
        // Stretch and tone are evaluated in float and rounded once.
        let luts = stretches.map(|stretch| {
            build_lut(|value| tone.apply(stretch.map_or(value, |s| s.apply(value))))
        });

        debug!(
            contrast = settings.contrast,
            brightness = settings.brightness,
            auto_enhance = settings.auto_enhance,
            "Applying tone lookup"
        );
        apply_luts(image, &luts)
    }

    fn tone_map(&self, contrast: f32, brightness: f32) -> ToneMap {
        let (scale, offset) = self.curve.brightness_transform(brightness);
        ToneMap {
            factor: self.curve.contrast_factor(contrast),
            scale,
            offset,
        }
    }
}

/// `((v - 128) * factor + 128) * scale + offset`, unclipped.
#[derive(Debug, Clone, Copy)]
struct ToneMap {
    factor: f32,
    scale: f32,
    offset: f32,
}

impl ToneMap {
    fn apply(&self, value: f32) -> f32 {
        ((value - PIVOT) * self.factor + PIVOT) * self.scale + self.offset
    }
}

/// Linear map sending `lo` to 0, clipped to the channel range.
#[derive(Debug, Clone, Copy)]
struct Stretch {
    lo: f32,
    scale: f32,
}

impl Stretch {
    fn apply(&self, value: f32) -> f32 {
        ((value - self.lo) * self.scale).clamp(0.0, 255.0)
    }
}

/// Per-channel auto-level stretch mapping the 2nd percentile to 0 and the
/// 98th to 255. Channels that are already spread or completely flat are left
/// unchanged.
pub fn auto_stretch(image: &RgbImage) -> RgbImage {
    let luts = channel_stretches(image).map(|stretch| match stretch {
        Some(stretch) => build_lut(|value| stretch.apply(value)),
        None => identity_lut(),
    });
    apply_luts(image, &luts)
}

fn channel_stretches(image: &RgbImage) -> [Option<Stretch>; 3] {
    let mut histograms = [[0u64; 256]; 3];
    for pixel in image.pixels() {
        for (channel, histogram) in histograms.iter_mut().enumerate() {
            histogram[pixel.0[channel] as usize] += 1;
        }
    }
    let total = u64::from(image.width()) * u64::from(image.height());
    histograms.map(|histogram| stretch_for(&histogram, total))
}

/// `None` for channels that are flat or already span the full range.
fn stretch_for(histogram: &[u64; 256], total: u64) -> Option<Stretch> {
    if total == 0 {
        return None;
    }
    let lo = percentile(histogram, total, STRETCH_LOW_PERCENTILE);
    let hi = percentile(histogram, total, STRETCH_HIGH_PERCENTILE);
    if hi <= lo || (lo == 0 && hi == 255) {
        return None;
    }
    Some(Stretch {
        lo: f32::from(lo),
        scale: 255.0 / f32::from(hi - lo),
    })
}

/// Value at rank `floor(fraction * (total - 1))` of the sorted samples.
fn percentile(histogram: &[u64; 256], total: u64, fraction: f64) -> u8 {
    let rank = (fraction * (total - 1) as f64).floor() as u64;
    let mut seen = 0u64;
    for (value, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen > rank {
            return value as u8;
        }
    }
    255
}

fn identity_lut() -> Lut {
    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        *slot = value as u8;
    }
    lut
}

fn build_lut(map: impl Fn(f32) -> f32) -> Lut {
    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        *slot = quantize(map(value as f32));
    }
    lut
}

fn apply_luts(image: &RgbImage, luts: &[Lut; 3]) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let Rgb([r, g, b]) = *pixel;
        *pixel = Rgb([
            luts[0][r as usize],
            luts[1][g as usize],
            luts[2][b as usize],
        ]);
    }
    out
}

fn quantize(value: f32) -> u8 {
    value.clamp(0.0, 255.0).round() as u8
}

// -- Presets --------------------------------------------------------------------

/// A named, self-contained page transform.
pub type PresetFn = fn(&RgbImage) -> RgbImage;

/// Named enhancement presets.
pub const PRESETS: &[(&str, PresetFn)] = &[
    ("tone", preset_tone),
    ("stretch", auto_stretch),
    ("grayscale", preset_grayscale),
    ("saturation", preset_saturation),
    ("vignette", preset_vignette),
    ("soften", preset_soften),
];

/// Names accepted by [`apply_preset`], in table order.
pub fn preset_names() -> impl Iterator<Item = &'static str> {
    PRESETS.iter().map(|(name, _)| *name)
}

/// Run the preset called `name` (case-insensitive).
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn apply_preset(name: &str, image: &RgbImage) -> Result<RgbImage, PagewerkError> {
    let (_, transform) = PRESETS
        .iter()
        .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
        .ok_or_else(|| PagewerkError::UnknownPreset(name.to_string()))?;
    Ok(transform(image))
}

fn preset_tone(image: &RgbImage) -> RgbImage {
    let settings = EnhancementSettings {
        contrast: PRESET_TONE_CONTRAST,
        brightness: 0.0,
        auto_enhance: false,
    };
    Enhancer::default().enhance(image, &settings)
}

fn preset_grayscale(image: &RgbImage) -> RgbImage {
    DynamicImage::ImageRgb8(image.clone()).grayscale().to_rgb8()
}

fn preset_saturation(image: &RgbImage) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let Rgb([r, g, b]) = *pixel;
        let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
        let luma = 0.299 * r + 0.587 * g + 0.114 * b;
        let boost = |c: f32| quantize(luma + (c - luma) * PRESET_SATURATION_GAIN);
        *pixel = Rgb([boost(r), boost(g), boost(b)]);
    }
    out
}

fn preset_vignette(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let max_sq = (cx * cx + cy * cy).max(f32::EPSILON);

    let mut out = image.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let falloff = 1.0 - PRESET_VIGNETTE_STRENGTH * ((dx * dx + dy * dy) / max_sq);
        let Rgb([r, g, b]) = *pixel;
        *pixel = Rgb([
            quantize(f32::from(r) * falloff),
            quantize(f32::from(g) * falloff),
            quantize(f32::from(b) * falloff),
        ]);
    }
    out
}

fn preset_soften(image: &RgbImage) -> RgbImage {
    gaussian_blur_f32(image, PRESET_SOFTEN_SIGMA)
}
