// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subcommand handlers.

use std::path::Path;

use anyhow::{Context, Result, bail};
use pagewerk_core::config::MIB;
use pagewerk_core::error::PagewerkError;
use pagewerk_core::settings::SettingsStore;
use pagewerk_core::types::{
    BRIGHTNESS_STEP, ContrastPreset, EnhancementSettings, PageImage, QualityPreset, SettingsUpdate,
    UserSettings,
};
use pagewerk_document::Pipeline;
use pagewerk_document::image::{ImageProcessor, apply_preset, preset_names};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{CompressArgs, EnhanceArgs, ImagesArgs, PackArgs, SetArgs};

/// What every handler needs: the pipeline and the caller's settings.
pub struct Session<'a> {
    pub pipeline: Pipeline,
    pub store: &'a dyn SettingsStore,
    pub user: &'a str,
}

impl Session<'_> {
    fn settings(&self) -> UserSettings {
        self.store.get(self.user)
    }
}

pub async fn images(session: &Session<'_>, args: &ImagesArgs) -> Result<()> {
    if let Some(name) = &args.preset {
        if !preset_names().any(|known| known.eq_ignore_ascii_case(name)) {
            return Err(PagewerkError::UnknownPreset(name.clone()).into());
        }
    }

    let config = session.pipeline.config();
    let dpi = render_dpi(args.dpi, session.store.find(session.user), config.default_dpi);
    let max_dimension = args.max_dimension.unwrap_or(config.max_dimension);
    let mut pages = session
        .pipeline
        .rasterize(&args.input, dpi, max_dimension)
        .await
        .with_context(|| format!("Failed to rasterize {}", args.input.display()))?;

    if let Some(name) = &args.preset {
        pages = restyle_pages(pages, name, config.max_image_bytes)?;
    }

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let stem = file_stem(&args.input);

    if args.zip {
        let ceiling = archive_ceiling(args.ceiling_mib, config.archive_ceiling_bytes);
        let payloads = session.pipeline.pack_for_delivery(&pages, ceiling)?;
        let total = payloads.len();
        for (index, payload) in payloads.iter().enumerate() {
            let path = args.output.join(payload.file_name(&stem, index, total));
            write_file(&path, &payload.bytes)?;
            println!(
                "{} (pages {}-{}, {} bytes)",
                path.display(),
                payload.first_page,
                payload.last_page,
                payload.bytes.len()
            );
        }
    } else {
        for page in &pages {
            let path = args.output.join(format!("{stem}_{}", page.file_name()));
            write_file(&path, &page.bytes)?;
            println!("{} ({}x{})", path.display(), page.width, page.height);
        }
    }
    Ok(())
}

pub async fn enhance(session: &Session<'_>, args: &EnhanceArgs) -> Result<()> {
    let stored = session.settings().enhancement();
    let settings = EnhancementSettings::new(
        args.contrast.unwrap_or(stored.contrast),
        args.brightness.unwrap_or(stored.brightness),
        args.auto.unwrap_or(stored.auto_enhance),
    )?;

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let path = session
        .pipeline
        .enhance_and_reassemble(&args.input, &settings, &args.output)
        .await
        .with_context(|| format!("Failed to enhance {}", args.input.display()))?;
    println!("{}", path.display());
    Ok(())
}

pub async fn compress(session: &Session<'_>, args: &CompressArgs) -> Result<()> {
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling compression");
            on_interrupt.cancel();
        }
    });

    let outcome = session
        .pipeline
        .compress_cancellable(&args.input, &args.output, &cancel)
        .await
        .with_context(|| format!("Failed to compress {}", args.input.display()))?;

    if args.json {
        let summary = serde_json::json!({
            "output": outcome.output,
            "compressed": outcome.compressed,
            "original_size": outcome.original_size,
            "final_size": outcome.final_size,
            "method": outcome.method,
            "backend": outcome.backend,
            "profile": outcome.profile,
            "attempts": outcome.attempts,
            "transitions": outcome.transitions,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if outcome.compressed {
        println!(
            "{}: {} -> {} bytes ({:.0}% saved, {} via {})",
            outcome.output.display(),
            outcome.original_size,
            outcome.final_size,
            (1.0 - outcome.ratio()) * 100.0,
            outcome.method.map(|m| m.as_str()).unwrap_or("-"),
            outcome.backend.as_deref().unwrap_or("-"),
        );
    } else {
        println!(
            "{}: no smaller version found after {} attempts, original kept",
            outcome.output.display(),
            outcome.attempts.len()
        );
    }
    Ok(())
}

pub fn pack(session: &Session<'_>, args: &PackArgs) -> Result<()> {
    let max_bytes = session.pipeline.config().max_image_bytes;
    let mut pages = Vec::with_capacity(args.images.len());
    for (index, path) in args.images.iter().enumerate() {
        let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let page = ImageProcessor::from_bytes(index as u32 + 1, &data)
            .and_then(|image| image.encode_within(max_bytes))
            .with_context(|| format!("Failed to load image {}", path.display()))?;
        pages.push(page);
    }

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let path = session.pipeline.pack_document(&pages, &args.output, &args.stem)?;
    println!("{}", path.display());
    Ok(())
}

pub fn settings_show(session: &Session<'_>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&session.settings())?);
    Ok(())
}

pub fn settings_set(session: &Session<'_>, args: &SetArgs) -> Result<()> {
    let update = build_update(&session.settings(), args);
    if update == SettingsUpdate::default() {
        bail!("Nothing to change; pass at least one setting");
    }
    let updated = session.store.update(session.user, update)?;
    info!(user = session.user, "Settings updated");
    println!("{}", serde_json::to_string_pretty(&updated)?);
    Ok(())
}

pub fn presets() {
    for name in preset_names() {
        println!("{name}");
    }
}

// -- Helpers ------------------------------------------------------------------

/// Flag first, then the user's stored record, then the configured default.
fn render_dpi(flag: Option<u32>, stored: Option<UserSettings>, default_dpi: u32) -> u32 {
    flag.or(stored.map(|settings| settings.dpi))
        .unwrap_or(default_dpi)
}

fn archive_ceiling(ceiling_mib: Option<u64>, default_bytes: u64) -> u64 {
    ceiling_mib
        .map(|mib| mib.saturating_mul(MIB))
        .unwrap_or(default_bytes)
}

/// Translate flags and shortcuts into a partial update against `current`.
fn build_update(current: &UserSettings, args: &SetArgs) -> SettingsUpdate {
    let (lo, hi) = UserSettings::BRIGHTNESS_RANGE;
    let brightness = if args.brighter {
        Some((current.brightness + BRIGHTNESS_STEP).clamp(lo, hi))
    } else if args.darker {
        Some((current.brightness - BRIGHTNESS_STEP).clamp(lo, hi))
    } else {
        args.brightness
    };

    SettingsUpdate {
        dpi: args
            .dpi
            .or(args.quality.map(|level| QualityPreset::from(level).dpi())),
        contrast: args
            .contrast
            .or(args.contrast_level.map(|level| ContrastPreset::from(level).contrast())),
        brightness,
        auto_enhance: args.auto_enhance,
    }
}

fn restyle_pages(pages: Vec<PageImage>, preset: &str, max_bytes: u64) -> Result<Vec<PageImage>, PagewerkError> {
    pages
        .into_iter()
        .map(|page| {
            let decoded = ImageProcessor::from_bytes(page.page_number, &page.bytes)?;
            let styled = apply_preset(preset, decoded.as_rgb())?;
            ImageProcessor::from_rgb(page.page_number, styled).encode_within(max_bytes)
        })
        .collect()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Level;

    fn set_args() -> SetArgs {
        SetArgs {
            dpi: None,
            quality: None,
            contrast: None,
            contrast_level: None,
            brightness: None,
            brighter: false,
            darker: false,
            auto_enhance: None,
        }
    }

    #[test]
    fn shortcuts_map_to_values() {
        let args = SetArgs {
            quality: Some(Level::Low),
            contrast_level: Some(Level::High),
            ..set_args()
        };
        let update = build_update(&UserSettings::default(), &args);
        assert_eq!(update.dpi, Some(72));
        assert_eq!(update.contrast, Some(1.3));
        assert_eq!(update.brightness, None);
    }

    #[test]
    fn brighter_steps_and_clamps() {
        let current = UserSettings {
            brightness: 90,
            ..UserSettings::default()
        };
        let args = SetArgs {
            brighter: true,
            ..set_args()
        };
        assert_eq!(build_update(&current, &args).brightness, Some(100));

        let args = SetArgs {
            darker: true,
            ..set_args()
        };
        assert_eq!(build_update(&current, &args).brightness, Some(70));
    }

    #[test]
    fn empty_flags_change_nothing() {
        assert_eq!(build_update(&UserSettings::default(), &set_args()), SettingsUpdate::default());
    }

    #[test]
    fn restyle_keeps_page_numbers() {
        let rgb = image_page(3);
        let styled = restyle_pages(vec![rgb], "grayscale", 5 * MIB).unwrap();
        assert_eq!(styled[0].page_number, 3);
        assert!(restyle_pages(vec![image_page(1)], "sepia-neon", 5 * MIB).is_err());
    }

    fn image_page(page_number: u32) -> PageImage {
        let rgb = ::image::RgbImage::from_pixel(8, 8, ::image::Rgb([10, 120, 200]));
        ImageProcessor::from_rgb(page_number, rgb).to_png().unwrap()
    }

    #[test]
    fn dpi_prefers_flag_then_record_then_config() {
        let stored = UserSettings {
            dpi: 150,
            ..UserSettings::default()
        };
        assert_eq!(render_dpi(Some(96), Some(stored), 200), 96);
        assert_eq!(render_dpi(None, Some(stored), 200), 150);
        assert_eq!(render_dpi(None, None, 200), 200);
    }

    #[test]
    fn huge_ceiling_saturates() {
        assert_eq!(archive_ceiling(Some(40), 1), 40 * MIB);
        assert_eq!(archive_ceiling(Some(u64::MAX), 1), u64::MAX);
        assert_eq!(archive_ceiling(None, 7), 7);
    }

    #[test]
    fn stem_falls_back_for_bare_paths() {
        assert_eq!(file_stem(Path::new("/tmp/scan.pdf")), "scan");
        assert_eq!(file_stem(Path::new("/")), "document");
    }
}
