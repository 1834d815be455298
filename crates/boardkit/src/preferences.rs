//! View preferences and persistent filters stored as JSON
//!
//! Failures here never reach the user: a missing or corrupt file means
//! defaults, a failed write is logged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use boardkit_api::ViewKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredPreferences {
    #[serde(default)]
    pub view: Option<ViewKind>,
    #[serde(default)]
    pub rows_per_page: Option<u32>,
    #[serde(default)]
    pub filters: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> StoredPreferences {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return StoredPreferences::default();
            }
            Err(e) => {
                tracing::warn!("Failed to read preferences {}: {}", self.path.display(), e);
                return StoredPreferences::default();
            }
        };

        match serde_json::from_str::<StoredPreferences>(&content) {
            Ok(mut prefs) => {
                // a stored page size of zero is invalid
                if prefs.rows_per_page == Some(0) {
                    prefs.rows_per_page = None;
                }
                prefs
            }
            Err(e) => {
                tracing::warn!("Ignoring corrupt preferences {}: {}", self.path.display(), e);
                StoredPreferences::default()
            }
        }
    }

    pub fn save(&self, prefs: &StoredPreferences) {
        if let Err(e) = self.try_save(prefs) {
            tracing::warn!("Failed to save preferences {}: {}", self.path.display(), e);
        }
    }

    fn try_save(&self, prefs: &StoredPreferences) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(prefs)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}
