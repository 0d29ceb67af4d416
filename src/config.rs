//! Process configuration read from the environment

use crate::store::StoreKind;
use std::path::PathBuf;
use thiserror::Error;

pub const TOKEN_VAR: &str = "ENTRY_WARDEN_TOKEN";
pub const DATA_DIR_VAR: &str = "ENTRY_WARDEN_DATA_DIR";
pub const STORE_VAR: &str = "ENTRY_WARDEN_STORE";
pub const PREFIX_VAR: &str = "ENTRY_WARDEN_PREFIX";
pub const LOG_DIR_VAR: &str = "ENTRY_WARDEN_LOG_DIR";

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_PREFIX: &str = "$";

/// Errors raised while reading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

/// Everything the binary needs to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub token: String,
    pub data_dir: PathBuf,
    pub store: StoreKind,
    pub prefix: String,
    pub log_dir: PathBuf,
}

impl BotConfig {
    /// Read the configuration from the process environment, after loading a
    /// `.env` file if one exists.
    ///
    /// # Errors
    /// Returns an error if the token is missing or a value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    ///
    /// Blank values count as unset.
    ///
    /// # Errors
    /// Returns an error if the token is missing or a value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let token = get(TOKEN_VAR).ok_or(ConfigError::Missing(TOKEN_VAR))?;

        let data_dir = PathBuf::from(get(DATA_DIR_VAR).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));

        let store = match get(STORE_VAR) {
            Some(value) => value.parse().map_err(|message| ConfigError::Invalid {
                var: STORE_VAR,
                message,
            })?,
            None => StoreKind::default(),
        };

        let prefix = get(PREFIX_VAR).unwrap_or_else(|| DEFAULT_PREFIX.to_string());

        let log_dir = get(LOG_DIR_VAR).map_or_else(|| data_dir.join("logs"), PathBuf::from);

        Ok(Self {
            token,
            data_dir,
            store,
            prefix,
            log_dir,
        })
    }
}
