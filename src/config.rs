//! Runtime configuration read from the environment

use std::env;
use std::path::PathBuf;

use thiserror::Error;

/// Environment variable holding the bot token
pub const TOKEN_VAR: &str = "DISCORD_TOKEN";
/// Directory for persisted guild state
pub const DATA_DIR_VAR: &str = "LOCKWARDEN_DATA_DIR";
/// Directory for rolling log files
pub const LOG_DIR_VAR: &str = "LOCKWARDEN_LOG_DIR";
/// Prefix for text commands
pub const PREFIX_VAR: &str = "LOCKWARDEN_PREFIX";

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_PREFIX: &str = "!";
const STATE_FILE: &str = "lockdown.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingVar(&'static str),
}

/// Bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub prefix: String,
}

impl BotConfig {
    /// Read the configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingVar` if the token is unset or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let token = non_empty(TOKEN_VAR).ok_or(ConfigError::MissingVar(TOKEN_VAR))?;
        Ok(Self {
            token,
            data_dir: non_empty(DATA_DIR_VAR)
                .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from),
            log_dir: non_empty(LOG_DIR_VAR)
                .map_or_else(|| PathBuf::from(DEFAULT_LOG_DIR), PathBuf::from),
            prefix: non_empty(PREFIX_VAR).unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
        })
    }

    /// Path of the YAML file holding every guild's lockdown state
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE)
    }
}
