use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;

use super::ThemeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeEntry {
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub project_url: String,
    /// Where the theme file is downloaded from when it is missing locally
    #[serde(default)]
    pub theme_url: String,
    pub file_path: String,
}

/// Ordered list of known themes plus the name of the active one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThemeCatalog {
    #[serde(default)]
    pub themes: Vec<ThemeEntry>,
    #[serde(default)]
    pub active_theme: Option<String>,
}

impl ThemeCatalog {
    /// A missing file is an empty catalog.
    pub fn load(path: &Path) -> Result<Self, ThemeError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ThemeError> {
        let mut out = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
        self.serialize(&mut serializer)?;
        fs::write(path, out)?;
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&ThemeEntry> {
        self.themes.iter().find(|t| t.name == name)
    }

    pub fn active(&self) -> Option<&ThemeEntry> {
        self.active_theme.as_deref().and_then(|name| self.find(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_and_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("themes.json");
        assert_eq!(ThemeCatalog::load(&path).unwrap(), ThemeCatalog::default());

        fs::write(&path, r#"{"themes": [{"name": "Dark+", "file_path": "dark.json"}]}"#).unwrap();
        let catalog = ThemeCatalog::load(&path).unwrap();
        assert_eq!(catalog.themes[0].author, "");
        assert!(catalog.active_theme.is_none());
        assert!(catalog.active().is_none());
    }

    #[test]
    fn test_save_writes_both_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("themes.json");
        let catalog = ThemeCatalog { themes: Vec::new(), active_theme: None };
        catalog.save(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["themes"], serde_json::json!([]));
        assert!(value["active_theme"].is_null());
    }
}
