use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use thiserror::Error;
use tracing::info;

use super::{shared, Settings, SharedSettings};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file error: {0}")]
    Io(#[from] io::Error),
    #[error("settings JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    Shape(String),
}

/// Settings file on disk plus the shared in-memory tree loaded from it.
pub struct SettingsStore {
    path: PathBuf,
    settings: SharedSettings,
}

impl SettingsStore {
    /// Loads `path` when it exists, defaults otherwise.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        let mut settings = Settings::default();
        if path.exists() {
            let raw = fs::read_to_string(&path)?;
            settings.update_from_value(serde_json::from_str(&raw)?)?;
        } else {
            info!(path = %path.display(), "Settings file does not exist, loading defaults");
        }
        Ok(Self { path, settings: shared(settings) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> SharedSettings {
        self.settings.clone()
    }

    pub async fn save(&self) -> Result<(), SettingsError> {
        let value = self.settings.read().await.to_value()?;
        let mut out = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
        value.serialize(&mut serializer)?;
        fs::write(&self.path, out)?;
        info!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}
