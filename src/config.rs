use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::gate::DEFAULT_PREVIEW_LIMIT;
use crate::utils;
use crate::verify::VerifyPolicy;

/// Current configuration version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

pub const DATABASE_ENV: &str = "THINGSDB";
pub const AUTH_TOKEN_ENV: &str = "THINGS_AUTH_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Overrides the auto-discovered Things database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_log_path: Option<String>,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default = "default_config_version")]
    pub config_version: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    #[serde(default = "default_verify_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_verify_interval_ms")]
    pub interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            auth_token: None,
            action_log_path: None,
            default_limit: default_limit(),
            preview_limit: default_preview_limit(),
            verify: VerifyConfig::default(),
            config_version: Some(CURRENT_CONFIG_VERSION),
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_verify_timeout_ms(),
            interval_ms: default_verify_interval_ms(),
        }
    }
}

// Default value functions
fn default_limit() -> usize {
    200
}

fn default_preview_limit() -> usize {
    DEFAULT_PREVIEW_LIMIT
}

fn default_verify_timeout_ms() -> u64 {
    4000
}

fn default_verify_interval_ms() -> u64 {
    200
}

fn default_config_version() -> Option<u32> {
    Some(CURRENT_CONFIG_VERSION)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config directory: {0}")]
    ConfigDirError(String),
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
    #[error("Things database not found; pass --db or set THINGSDB")]
    DatabaseNotFound,
}

impl Config {
    /// Load configuration from file, or create default if missing
    pub fn load_with_profile(profile: utils::Profile) -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path(profile)?;
        Self::load_from(&config_path)
    }

    /// Load from an explicit path, writing defaults there if it is missing
    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)
                .map_err(|e| ConfigError::ReadError(e.to_string()))?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            let mut config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save_to(&mut self, config_path: &Path) -> Result<(), ConfigError> {
        // Ensure config version is set before saving
        self.config_version = Some(CURRENT_CONFIG_VERSION);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::WriteError(format!("Failed to serialize config: {}", e)))?;

        fs::write(config_path, toml_string).map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path(profile: utils::Profile) -> Result<PathBuf, ConfigError> {
        let config_dir = utils::get_config_dir(profile).ok_or_else(|| {
            ConfigError::ConfigDirError("Could not determine config directory".to_string())
        })?;
        Ok(config_dir.join("config.toml"))
    }

    /// Resolve the Things database: flag, then `THINGSDB`, then config,
    /// then the app's group container.
    pub fn resolve_database_path(&self, flag: Option<&str>) -> Result<PathBuf, ConfigError> {
        let env_value = env::var(DATABASE_ENV).ok();
        first_non_empty([flag, env_value.as_deref(), self.database_path.as_deref()])
            .map(utils::expand_path)
            .or_else(utils::discover_things_database)
            .ok_or(ConfigError::DatabaseNotFound)
    }

    /// Resolve the URL-scheme auth token: flag, then `THINGS_AUTH_TOKEN`, then config
    pub fn resolve_auth_token(&self, flag: Option<&str>) -> Option<String> {
        let env_value = env::var(AUTH_TOKEN_ENV).ok();
        first_non_empty([flag, env_value.as_deref(), self.auth_token.as_deref()]).map(str::to_string)
    }

    /// Action log path from config, if one is set
    pub fn action_log_path(&self) -> Option<PathBuf> {
        first_non_empty([self.action_log_path.as_deref()]).map(utils::expand_path)
    }

    pub fn verify_policy(&self) -> VerifyPolicy {
        VerifyPolicy {
            interval: Duration::from_millis(self.verify.interval_ms.max(1)),
            timeout: Duration::from_millis(self.verify.timeout_ms),
        }
    }
}

fn first_non_empty<const N: usize>(candidates: [Option<&str>; N]) -> Option<&str> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
}
