use std::env;
use std::path::PathBuf;

const DEFAULT_SETTINGS_FILE: &str = "settings.json";
const DEFAULT_THEMES_FILE: &str = "themes.json";
const DEFAULT_THEME_TEMPLATE: &str = "resources/themes/template.qss";
const DEFAULT_STYLESHEET_OUT: &str = "resources/themes/active.qss";

fn path_from_env(key: &str, default: &str) -> PathBuf {
    PathBuf::from(env::var(key).unwrap_or_else(|_| default.to_string()))
}

pub fn settings_file_path() -> PathBuf {
    path_from_env("WORKSTATION_SETTINGS_FILE", DEFAULT_SETTINGS_FILE)
}

pub fn themes_file_path() -> PathBuf {
    path_from_env("WORKSTATION_THEMES_FILE", DEFAULT_THEMES_FILE)
}

pub fn theme_template_path() -> PathBuf {
    path_from_env("WORKSTATION_THEME_TEMPLATE", DEFAULT_THEME_TEMPLATE)
}

pub fn stylesheet_output_path() -> PathBuf {
    path_from_env("WORKSTATION_STYLESHEET_OUT", DEFAULT_STYLESHEET_OUT)
}
