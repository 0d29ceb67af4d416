//! Guild configuration storage
//!
//! Every backend implements `GuildStore`, so the rest of the bot does not
//! care whether configs live in memory, in a JSON document, or in sqlite.

mod json;
mod memory;
mod sqlite;

pub use json::JsonStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::banner::{BanRecord, GuildConfig, Rule, RuleId, RuleMetadata};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Errors raised by a store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The JSON document could not be encoded or decoded
    #[error("Store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The database rejected a query
    #[error("Store database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored data cannot be turned back into a config
    #[error("Corrupt store data: {0}")]
    Corrupt(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable home of every guild's configuration
#[async_trait::async_trait]
pub trait GuildStore: Send + Sync {
    /// All known configs keyed by guild id.
    ///
    /// The first call reads the medium; later calls return the cached copy.
    async fn load(&self) -> StoreResult<HashMap<u64, GuildConfig>>;

    /// Replace the stored config of one guild.
    ///
    /// Either the whole config is written or nothing is.
    async fn save(&self, config: &GuildConfig) -> StoreResult<()>;

    /// Forget a guild and all of its rules
    async fn delete(&self, guild_id: u64) -> StoreResult<()>;

    /// Release the medium; called once by the process on exit
    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Which backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    Memory,
    Json,
    #[default]
    Sqlite,
}

impl std::str::FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Json => write!(f, "json"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// JSON document file name inside the data directory
pub const JSON_FILE: &str = "entrybanner.json";
/// Sqlite database file name inside the data directory
pub const SQLITE_FILE: &str = "entrywarden.db";

/// Open the configured backend under `data_dir`.
///
/// # Errors
/// Returns an error if the sqlite database cannot be opened or migrated.
pub async fn open(kind: StoreKind, data_dir: &Path) -> StoreResult<Arc<dyn GuildStore>> {
    let store: Arc<dyn GuildStore> = match kind {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Json => Arc::new(JsonStore::new(data_dir.join(JSON_FILE))),
        StoreKind::Sqlite => Arc::new(SqliteStore::connect(&data_dir.join(SQLITE_FILE)).await?),
    };
    Ok(store)
}

/// Rebuild a stored rule for `guild_id`.
///
/// A pattern the regex engine rejects (older data may hold look-around or
/// backreferences) does not fail the load: the rule is kept disabled and a
/// warning is logged.
pub(crate) fn restore_rule(
    guild_id: u64,
    id: RuleId,
    pattern: &str,
    enabled: bool,
    case_fold: bool,
    metadata: RuleMetadata,
    bans: Vec<BanRecord>,
) -> Rule {
    let (rule, error) = Rule::restore_stored(id, pattern, enabled, case_fold, metadata, bans);
    if let Some(e) = error {
        warn!(
            guild_id = %guild_id,
            rule_id = %id,
            "Stored pattern does not compile, rule kept disabled: {e}"
        );
    }
    rule
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339, the `2021-05-01 12:34:56.123456+00:00` form older JSON
/// documents used, and the zone-less form older databases hold (read as UTC).
pub(crate) fn parse_timestamp(text: &str) -> StoreResult<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%:z"] {
        if let Ok(parsed) = DateTime::parse_from_str(text, format) {
            return Ok(parsed.with_timezone(&Utc));
        }
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| StoreError::Corrupt(format!("invalid timestamp '{text}'")))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_kind_parse() {
        assert_eq!("memory".parse::<StoreKind>(), Ok(StoreKind::Memory));
        assert_eq!(" JSON ".parse::<StoreKind>(), Ok(StoreKind::Json));
        assert_eq!("sqlite".parse::<StoreKind>(), Ok(StoreKind::Sqlite));
        assert!("redis".parse::<StoreKind>().is_err());
        assert_eq!(StoreKind::default(), StoreKind::Sqlite);
        assert_eq!(StoreKind::Json.to_string(), "json");
    }

    #[tokio::test]
    async fn test_open_memory_backend() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(StoreKind::Memory, dir.path()).await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_json_backend_uses_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(StoreKind::Json, dir.path()).await.unwrap();
        store.save(&GuildConfig::new(5)).await.unwrap();
        assert!(dir.path().join(JSON_FILE).exists());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-01-01T00:00:00Z").is_ok());
        assert!(parse_timestamp("2024-01-01T00:00:00.5+02:00").is_ok());
        assert!(parse_timestamp("2021-05-01 12:34:56.123456+00:00").is_ok());
        assert!(parse_timestamp("2021-05-01 12:34:56+00:00").is_ok());
        assert!(parse_timestamp("2021-05-01 12:34:56.123456").is_ok());
        assert!(parse_timestamp("2021-05-01 12:34:56").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
