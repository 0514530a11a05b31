use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::catalog::{ThemeCatalog, ThemeEntry};
use super::css::apply_theme_on_css;
use super::ThemeError;

/// The part of a VS Code color theme the stylesheet template uses.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ThemeFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub colors: HashMap<String, String>,
}

/// Owns the theme catalog file. Every catalog mutation is written back to
/// disk immediately; file side effects (download, delete) happen before the
/// catalog is saved and are not rolled back if the save fails.
pub struct ThemeManager {
    catalog_path: PathBuf,
    template_path: PathBuf,
    catalog: ThemeCatalog,
    http: reqwest::Client,
}

impl ThemeManager {
    pub fn new(catalog_path: impl Into<PathBuf>, template_path: impl Into<PathBuf>) -> Result<Self, ThemeError> {
        let catalog_path = catalog_path.into();
        let catalog = ThemeCatalog::load(&catalog_path)?;
        debug!(themes = catalog.themes.len(), path = %catalog_path.display(), "theme catalog loaded");
        Ok(Self {
            catalog_path,
            template_path: template_path.into(),
            catalog,
            http: reqwest::Client::new(),
        })
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn catalog(&self) -> &ThemeCatalog {
        &self.catalog
    }

    pub fn active_theme(&self) -> Option<&str> {
        self.catalog.active_theme.as_deref()
    }

    fn persist(&self) -> Result<(), ThemeError> {
        self.catalog.save(&self.catalog_path)
    }

    pub fn add_theme(&mut self, entry: ThemeEntry) -> Result<(), ThemeError> {
        info!(name = %entry.name, "Theme added");
        self.catalog.themes.push(entry);
        self.persist()
    }

    /// Deletes the theme's file and drops it from the catalog. Returns
    /// `false` for an unknown name.
    pub fn remove_theme(&mut self, name: &str) -> Result<bool, ThemeError> {
        let Some(entry) = self.catalog.find(name).cloned() else {
            warn!(theme = name, "Theme not found");
            return Ok(false);
        };
        let file = Path::new(&entry.file_path);
        if !entry.file_path.is_empty() && file.exists() {
            fs::remove_file(file)?;
            debug!(path = %entry.file_path, "theme file removed");
        }
        self.catalog.themes.retain(|t| t.name != name);
        if self.catalog.active_theme.as_deref() == Some(name) {
            self.catalog.active_theme = None;
        }
        self.persist()?;
        info!(theme = name, "Theme removed");
        Ok(true)
    }

    pub fn set_active_theme(&mut self, name: &str) -> Result<(), ThemeError> {
        self.catalog.active_theme = Some(name.to_string());
        self.persist()?;
        info!(theme = name, "Active theme set");
        Ok(())
    }

    pub fn load_template(&self) -> Result<String, ThemeError> {
        Ok(fs::read_to_string(&self.template_path)?)
    }

    pub fn load_theme(&self, path: &Path) -> Result<ThemeFile, ThemeError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn apply_theme(&self, theme: &ThemeFile) -> Result<String, ThemeError> {
        let template = self.load_template()?;
        Ok(apply_theme_on_css(&template, &theme.colors))
    }

    pub fn save_qss(&self, path: &Path, stylesheet: &str) -> Result<(), ThemeError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, stylesheet)?;
        Ok(())
    }

    pub async fn download_theme(&self, url: &str, path: &Path) -> Result<(), ThemeError> {
        let body = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        fs::write(path, body)?;
        info!(url, path = %path.display(), "Theme downloaded");
        Ok(())
    }

    /// Renders the stylesheet of the active theme, downloading its file first
    /// when it is missing and a URL is known.
    pub async fn load_active_theme(&self) -> Result<String, ThemeError> {
        let name = self.catalog.active_theme.as_deref().ok_or(ThemeError::NoActiveTheme)?;
        let entry = self
            .catalog
            .find(name)
            .ok_or_else(|| ThemeError::ThemeNotFound(name.to_string()))?;

        let file = Path::new(&entry.file_path);
        if !file.exists() {
            if entry.theme_url.is_empty() {
                return Err(ThemeError::MissingThemeFile(entry.file_path.clone()));
            }
            warn!(theme = name, "Theme file missing, downloading");
            self.download_theme(&entry.theme_url, file).await?;
        }

        let theme = self.load_theme(file)?;
        self.apply_theme(&theme)
    }

    /// Writes the active theme's stylesheet to `out`. Failures are logged and
    /// reported as `false`, never raised.
    pub async fn set_stylesheet(&self, out: &Path) -> bool {
        let result = match self.load_active_theme().await {
            Ok(stylesheet) => self.save_qss(out, &stylesheet),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                info!(path = %out.display(), "Stylesheet applied");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to set stylesheet");
                false
            }
        }
    }
}
