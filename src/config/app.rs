// src/config/app.rs
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Deserialize;
use tracing::{debug, warn};

use super::defaults::*;
use crate::consts::{CONFIG_ENV, DEFAULT_CONFIG_FILE, PROFILE_DIR_ENV};
use crate::error::{Result, SdrError};

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub prompt: Prompt,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Profile {
    /// Key database directory handed to the engine's init
    pub dir: PathBuf,
    pub backend: Backend,
}

/// Which native engine the CLI drives
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Soft,
    Nss,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Prompt {
    pub password: String,
    pub retry: String,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            dir: default_profile_dir(),
            backend: Backend::default(),
        }
    }
}

impl Default for Prompt {
    fn default() -> Self {
        Self {
            password: DEFAULT_PASSWORD_PROMPT.into(),
            retry: DEFAULT_RETRY_PROMPT.into(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SdrError::Config(format!("invalid TOML: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Apply `PWDECRYPT_PROFILE_DIR` on top of whatever was loaded
    pub fn apply_env_overrides(&mut self) {
        if let Some(dir) = std::env::var_os(PROFILE_DIR_ENV) {
            debug!(dir = ?dir, "profile dir overridden from environment");
            self.profile.dir = PathBuf::from(dir);
        }
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load config once — `$PWDECRYPT_CONFIG`, else `pwdecrypt.toml`, else defaults
pub fn load() -> Result<&'static Config> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config_path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut conf = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        warn!(path = %config_path.display(), "config file not found — using built-in defaults");
        Config::default()
    };
    conf.apply_env_overrides();

    Ok(CONFIG.get_or_init(|| conf))
}
