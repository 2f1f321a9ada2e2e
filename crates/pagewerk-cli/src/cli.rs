// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pagewerk_core::types::{ContrastPreset, QualityPreset};

#[derive(Parser, Debug)]
#[command(name = "pagewerk")]
#[command(
    author,
    version,
    about = "Rasterize, enhance, compress, and package PDF documents",
    long_about = None
)]
pub struct Cli {
    /// Pipeline configuration file (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Per-user settings file (JSON); defaults to the data directory
    #[arg(long, global = true)]
    pub settings_file: Option<PathBuf>,

    /// Settings record to read and update
    #[arg(short, long, global = true, default_value = "local")]
    pub user: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render every page to an image
    Images(ImagesArgs),
    /// Enhance the pages and rebuild the PDF
    Enhance(EnhanceArgs),
    /// Shrink the PDF with the best available method
    Compress(CompressArgs),
    /// Combine image files into one PDF
    Pack(PackArgs),
    /// Show or change stored settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// List the named image presets
    Presets,
}

#[derive(Args, Debug)]
pub struct ImagesArgs {
    /// Input PDF
    pub input: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Render resolution; defaults to the stored setting
    #[arg(long, value_parser = clap::value_parser!(u32).range(72..=600))]
    pub dpi: Option<u32>,

    /// Longest edge in pixels
    #[arg(long)]
    pub max_dimension: Option<u32>,

    /// Apply a named preset to every page (see `pagewerk presets`)
    #[arg(long)]
    pub preset: Option<String>,

    /// Bundle pages into size-bounded ZIP archives
    #[arg(long)]
    pub zip: bool,

    /// Archive size ceiling in MiB
    #[arg(long, requires = "zip")]
    pub ceiling_mib: Option<u64>,
}

#[derive(Args, Debug)]
pub struct EnhanceArgs {
    /// Input PDF
    pub input: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Contrast factor; defaults to the stored setting
    #[arg(long)]
    pub contrast: Option<f32>,

    /// Brightness shift; defaults to the stored setting
    #[arg(long, allow_hyphen_values = true)]
    pub brightness: Option<f32>,

    /// Per-channel auto-levels
    #[arg(long)]
    pub auto: Option<bool>,
}

#[derive(Args, Debug)]
pub struct CompressArgs {
    /// Input PDF
    pub input: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PackArgs {
    /// Image files, one page each, in order
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Output file name without extension
    #[arg(long, default_value = "images")]
    pub stem: String,
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Print the stored settings
    Show,
    /// Change one or more settings
    Set(SetArgs),
}

#[derive(Args, Debug)]
pub struct SetArgs {
    #[arg(long)]
    pub dpi: Option<u32>,

    /// Rendering quality shortcut (sets dpi)
    #[arg(long, value_enum, conflicts_with = "dpi")]
    pub quality: Option<Level>,

    #[arg(long)]
    pub contrast: Option<f32>,

    /// Contrast shortcut
    #[arg(long, value_enum, conflicts_with = "contrast")]
    pub contrast_level: Option<Level>,

    #[arg(long, allow_hyphen_values = true)]
    pub brightness: Option<i32>,

    /// Raise brightness by one step
    #[arg(long, conflicts_with_all = ["brightness", "darker"])]
    pub brighter: bool,

    /// Lower brightness by one step
    #[arg(long, conflicts_with = "brightness")]
    pub darker: bool,

    #[arg(long)]
    pub auto_enhance: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Level {
    High,
    Medium,
    Low,
}

impl From<Level> for QualityPreset {
    fn from(level: Level) -> Self {
        match level {
            Level::High => QualityPreset::High,
            Level::Medium => QualityPreset::Medium,
            Level::Low => QualityPreset::Low,
        }
    }
}

impl From<Level> for ContrastPreset {
    fn from(level: Level) -> Self {
        match level {
            Level::High => ContrastPreset::High,
            Level::Medium => ContrastPreset::Medium,
            Level::Low => ContrastPreset::Low,
        }
    }
}
