//! Theme catalog and stylesheet rendering.

mod catalog;
mod css;
mod manager;

use thiserror::Error;

pub use catalog::{ThemeCatalog, ThemeEntry};
pub use css::apply_theme_on_css;
pub use manager::{ThemeFile, ThemeManager};

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("theme file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("theme JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("theme download failed: {0}")]
    Download(#[from] reqwest::Error),
    #[error("no active theme set")]
    NoActiveTheme,
    #[error("active theme '{0}' not found in catalog")]
    ThemeNotFound(String),
    #[error("theme file '{0}' not found and no URL provided")]
    MissingThemeFile(String),
}
