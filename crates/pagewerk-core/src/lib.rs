// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pagewerk — Core types, configuration, settings store, and error definitions
// shared across all crates.

pub mod config;
pub mod error;
pub mod human_errors;
pub mod settings;
pub mod types;

pub use config::PipelineConfig;
pub use error::PagewerkError;
pub use settings::{JsonFileSettingsStore, MemorySettingsStore, SettingsStore};
pub use types::*;
