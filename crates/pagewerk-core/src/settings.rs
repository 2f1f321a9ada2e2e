// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-user settings store.
//
// The pipeline only ever reads a snapshot of a user's settings at request
// start. Writers (the transport layer) go through `update`, which validates
// before anything is persisted.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info, instrument, warn};

use crate::error::{PagewerkError, Result};
use crate::types::{SettingsUpdate, UserSettings};

/// Storage for per-user processing preferences.
pub trait SettingsStore: Send + Sync {
    /// The stored record for `user_id`, if any.
    fn find(&self, user_id: &str) -> Option<UserSettings>;

    /// Settings for `user_id`, or the defaults when none were stored.
    fn get(&self, user_id: &str) -> UserSettings {
        self.find(user_id).unwrap_or_default()
    }

    /// Merge `update` into the user's record, validate, and persist it.
    fn update(&self, user_id: &str, update: SettingsUpdate) -> Result<UserSettings>;

    /// Check a candidate record without storing it.
    fn validate(&self, settings: &UserSettings) -> Result<()> {
        settings.validate()
    }
}

/// Volatile store, used by tests and one-shot CLI runs.
#[derive(Default)]
pub struct MemorySettingsStore {
    records: Mutex<HashMap<String, UserSettings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn find(&self, user_id: &str) -> Option<UserSettings> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(user_id).copied())
    }

    fn update(&self, user_id: &str, update: SettingsUpdate) -> Result<UserSettings> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| PagewerkError::Config("settings store lock poisoned".into()))?;
        let current = records.get(user_id).copied().unwrap_or_default();
        let merged = update.apply_to(&current);
        self.validate(&merged)?;
        records.insert(user_id.to_string(), merged);
        Ok(merged)
    }
}

/// JSON file store: one object mapping user id to settings record.
///
/// All writes are serialised through a mutex and land via an atomic rename,
/// so readers of the file never observe a half-written document.
pub struct JsonFileSettingsStore {
    path: PathBuf,
    records: Mutex<HashMap<String, UserSettings>>,
}

impl JsonFileSettingsStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file yields an empty store. An unreadable or malformed file
    /// is an error rather than a silent reset.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str::<HashMap<String, UserSettings>>(&raw)?
            }
        } else {
            debug!("Settings file absent, starting empty");
            HashMap::new()
        };
        info!(users = records.len(), "Settings store opened");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    fn flush(&self, records: &HashMap<String, UserSettings>) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        let body = serde_json::to_vec_pretty(records)?;
        staged.write_all(&body)?;
        staged.flush()?;
        staged
            .persist(&self.path)
            .map_err(|err| PagewerkError::Io(err.error))?;
        debug!(path = %self.path.display(), "Settings flushed");
        Ok(())
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn find(&self, user_id: &str) -> Option<UserSettings> {
        match self.records.lock() {
            Ok(records) => records.get(user_id).copied(),
            Err(_) => {
                warn!("Settings store lock poisoned, serving defaults");
                None
            }
        }
    }

    #[instrument(skip(self, update))]
    fn update(&self, user_id: &str, update: SettingsUpdate) -> Result<UserSettings> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| PagewerkError::Config("settings store lock poisoned".into()))?;
        let current = records.get(user_id).copied().unwrap_or_default();
        let merged = update.apply_to(&current);
        self.validate(&merged)?;

        let previous = records.insert(user_id.to_string(), merged);
        if let Err(err) = self.flush(&records) {
            // Keep memory and disk in agreement.
            match previous {
                Some(old) => records.insert(user_id.to_string(), old),
                None => records.remove(user_id),
            };
            return Err(err);
        }
        info!(dpi = merged.dpi, contrast = merged.contrast, brightness = merged.brightness, "Settings updated");
        Ok(merged)
    }
}
