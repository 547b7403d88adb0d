use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Staging,
    Local,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Local => "local",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "local" | "development" | "dev" => Ok(Self::Local),
            other => Err(ConfigError::UnknownEnvironment(other.to_string())),
        }
    }

    /// Rate limits are multiplied by this factor outside production.
    pub fn rate_limit_multiplier(self) -> u32 {
        match self {
            Environment::Production => 1,
            Environment::Staging => 5,
            Environment::Local => 50,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessilistConfig {
    /// Directory holding one `<KEY>.json` per session.
    pub sessions_dir: Option<String>,
    pub environment: Option<Environment>,
    /// Secret for CSRF tokens; a random per-process secret is used when unset.
    pub csrf_secret: Option<String>,
    pub bind: Option<String>,
}

pub fn resolve_user_home_dir() -> Option<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    if let Ok(profile) = std::env::var("USERPROFILE") {
        let trimmed = profile.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    None
}

pub fn resolve_accessilist_home() -> Result<PathBuf> {
    if let Ok(value) = std::env::var("ACCESSILIST_HOME") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
    resolve_user_home_dir()
        .map(|home| home.join(".accessilist"))
        .ok_or_else(|| {
            anyhow!("Unable to resolve home directory; set ACCESSILIST_HOME to an absolute path")
        })
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join("config.toml")
}

pub fn default_sessions_dir(home: &Path) -> PathBuf {
    home.join("sessions")
}

pub fn rate_limit_dir(home: &Path) -> PathBuf {
    home.join("rate-limits")
}

pub fn load_config(home: &Path) -> Result<Option<AccessilistConfig>, ConfigError> {
    let path = config_path(home);
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path)?;
    Ok(Some(toml::from_str::<AccessilistConfig>(&text)?))
}

pub fn write_config(home: &Path, config: &AccessilistConfig) -> Result<PathBuf, ConfigError> {
    fs::create_dir_all(home)?;
    let path = config_path(home);
    let body = toml::to_string_pretty(config)?;
    fs::write(&path, body)?;
    Ok(path)
}

impl AccessilistConfig {
    pub fn sessions_dir(&self, home: &Path) -> PathBuf {
        match self.sessions_dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => {
                let dir = PathBuf::from(dir);
                if dir.is_absolute() {
                    dir
                } else {
                    home.join(dir)
                }
            }
            _ => default_sessions_dir(home),
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment.unwrap_or_default()
    }
}
