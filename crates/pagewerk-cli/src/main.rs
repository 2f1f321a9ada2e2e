// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pagewerk — adaptive PDF rasterization, enhancement, and compression.
//
// Entry point. Initialises logging, loads configuration and the settings
// store, and dispatches the subcommand.

mod cli;
mod commands;
mod data_dir;

use anyhow::{Context, Result};
use clap::Parser;
use pagewerk_core::config::PipelineConfig;
use pagewerk_core::error::PagewerkError;
use pagewerk_core::human_errors::humanize_error;
use pagewerk_core::settings::JsonFileSettingsStore;
use pagewerk_document::Pipeline;

use cli::{Cli, Command, SettingsAction};
use commands::Session;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = run(cli).await;

    if let Err(err) = &result {
        if let Some(pagewerk_err) = err.downcast_ref::<PagewerkError>() {
            let human = humanize_error(pagewerk_err);
            eprintln!("{}\n{}", human.message, human.suggestion);
        }
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    if let Command::Presets = cli.command {
        commands::presets();
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let settings_path = match &cli.settings_file {
        Some(path) => path.clone(),
        None => data_dir::settings_path().context("Failed to prepare the data directory")?,
    };
    let store = JsonFileSettingsStore::open(&settings_path)
        .with_context(|| format!("Failed to open settings {}", settings_path.display()))?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Pagewerk starting");
    let session = Session {
        pipeline: Pipeline::new(config)?,
        store: &store,
        user: &cli.user,
    };

    match &cli.command {
        Command::Images(args) => commands::images(&session, args).await,
        Command::Enhance(args) => commands::enhance(&session, args).await,
        Command::Compress(args) => commands::compress(&session, args).await,
        Command::Pack(args) => commands::pack(&session, args),
        Command::Settings { action } => match action {
            SettingsAction::Show => commands::settings_show(&session),
            SettingsAction::Set(args) => commands::settings_set(&session, args),
        },
        Command::Presets => Ok(()),
    }
}
