// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution for the settings file.

use std::path::PathBuf;

/// Return the application data directory, creating it if needed.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = base_dir().join("pagewerk");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Default location of the per-user settings file.
pub fn settings_path() -> std::io::Result<PathBuf> {
    Ok(data_dir()?.join("user_settings.json"))
}

fn base_dir() -> PathBuf {
    // XDG data dir, then ~/.local/share
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    std::env::temp_dir()
}
