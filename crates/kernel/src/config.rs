//! Configuration and settings file loading.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::query::CompilerSettings;

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "SIEVE_CONFIG";

/// Settings file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    Toml,
    Json,
}

impl SettingsFormat {
    /// Pick the format from the file extension; anything but `.json` is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SettingsFormat::Json,
            _ => SettingsFormat::Toml,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Compiler settings file. When None, built-in defaults apply.
    pub settings_path: Option<PathBuf>,
}

impl Config {
    /// Load the compiler settings this configuration points at.
    pub fn load_settings(&self) -> Result<CompilerSettings> {
        match self.settings_path {
            Some(ref path) => load_settings(path),
            None => Ok(CompilerSettings::default()),
        }
    }
}

/// Read and parse a settings file.
pub fn load_settings(path: &Path) -> Result<CompilerSettings> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    parse_settings(&text, SettingsFormat::from_path(path))
        .with_context(|| format!("failed to parse settings file {}", path.display()))
}

/// Parse settings text in the given format.
pub fn parse_settings(text: &str, format: SettingsFormat) -> Result<CompilerSettings> {
    let settings = match format {
        SettingsFormat::Toml => CompilerSettings::from_toml_str(text)?,
        SettingsFormat::Json => CompilerSettings::from_json_str(text)?,
    };
    Ok(settings)
}
