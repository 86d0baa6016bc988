use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use setenv_core::DEFAULT_TARGET;
use setenv_sources::{dotenv::DEFAULT_NAMES, kaggle::DEFAULT_TIMEOUT};

/// User-level configuration loaded from `~/.config/setenv/config.toml` (platform-specific).
/// Never holds secret values.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Variable resolved when none is given on the command line.
    pub default_target: Option<String>,
    /// Dotenv file names to search for, in priority order.
    pub dotenv_names: Option<Vec<String>>,
    pub kaggle: Option<KaggleConfig>,
    /// Enables the OS keyring as a last resort after the dotenv file.
    pub keyring: Option<KeyringConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct KaggleConfig {
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct KeyringConfig {
    pub service: String,
}

impl Config {
    /// Config written by `setenv config init`.
    pub fn starter() -> Self {
        Self {
            default_target: Some(DEFAULT_TARGET.to_string()),
            dotenv_names: Some(DEFAULT_NAMES.iter().map(|n| n.to_string()).collect()),
            kaggle: Some(KaggleConfig {
                timeout_secs: Some(DEFAULT_TIMEOUT.as_secs()),
            }),
            keyring: None,
        }
    }

    pub fn target(&self) -> &str {
        self.default_target.as_deref().unwrap_or(DEFAULT_TARGET)
    }

    pub fn dotenv_names(&self) -> Vec<String> {
        match &self.dotenv_names {
            Some(names) if !names.is_empty() => names.clone(),
            _ => DEFAULT_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn kaggle_timeout(&self) -> Duration {
        self.kaggle
            .as_ref()
            .and_then(|k| k.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("setenv").join("config.toml"))
}

/// Write the given config to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
