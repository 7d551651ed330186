// SPDX-License-Identifier: MPL-2.0

use crate::cache::EvictionPolicy;
use crate::config::{
    APP_ID, AUTHOR_INITIAL_FETCH_SIZE, INITIAL_FETCH_SIZE, LOAD_MORE_SIZE, NOTES_MAX_AGE_HOURS,
    NOTES_MAX_ITEMS, PROFILE_STALE_AFTER_MINUTES, PROFILES_MAX_AGE_HOURS, PROFILES_MAX_ITEMS,
    REACTIONS_MAX_AGE_HOURS, REACTIONS_MAX_ITEMS, REFRESH_FETCH_SIZE,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to write settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize settings: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How many notes a feed asks for at each step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSizes {
    /// First load of the following feed
    pub initial: usize,
    /// First load of a single author's notes
    pub author_initial: usize,
    /// Forward sync when the cache already has notes
    pub refresh: usize,
    pub load_more: usize,
}

impl Default for PageSizes {
    fn default() -> Self {
        Self {
            initial: INITIAL_FETCH_SIZE,
            author_initial: AUTHOR_INITIAL_FETCH_SIZE,
            refresh: REFRESH_FETCH_SIZE,
            load_more: LOAD_MORE_SIZE,
        }
    }
}

/// Persistent cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub notes: EvictionPolicy,
    pub profiles: EvictionPolicy,
    pub reactions: EvictionPolicy,
    /// Cached profiles older than this are served but flagged stale
    pub profile_stale_after_minutes: i64,
    pub pages: PageSizes,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            notes: EvictionPolicy::new(NOTES_MAX_AGE_HOURS, NOTES_MAX_ITEMS),
            profiles: EvictionPolicy::new(PROFILES_MAX_AGE_HOURS, PROFILES_MAX_ITEMS),
            reactions: EvictionPolicy::new(REACTIONS_MAX_AGE_HOURS, REACTIONS_MAX_ITEMS),
            profile_stale_after_minutes: PROFILE_STALE_AFTER_MINUTES,
            pages: PageSizes::default(),
        }
    }
}

impl CacheSettings {
    pub fn profile_stale_after_ms(&self) -> i64 {
        self.profile_stale_after_minutes * 60 * 1000
    }

    /// Get the settings file path (~/.config/io.github.sethcottle.Perch/settings.json)
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push(APP_ID);
            p.push("settings.json");
            p
        })
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "ignoring malformed settings: {}", e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::settings_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;

        Ok(())
    }
}
