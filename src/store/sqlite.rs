//! Relational store on sqlite
//!
//! Four tables: `guilds`, `entryRegexes`, `entryRegexMeta` and `entryBans`.
//! A save rewrites one guild's rows inside a single transaction. Databases
//! created before stable rule ids get the missing columns on open.

use crate::banner::{BanRecord, GuildConfig, Rule, RuleId, RuleMetadata};
use crate::store::{GuildStore, StoreError, StoreResult, parse_timestamp, restore_rule};
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{info, warn};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS guilds (
        snowflake INTEGER PRIMARY KEY,
        log_channel_snowflake INTEGER,
        entry_banner_enabled BOOLEAN NOT NULL DEFAULT FALSE,
        next_regex_id INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS entryRegexes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        rule_id INTEGER NOT NULL,
        position INTEGER NOT NULL,
        regex TEXT NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        lowercase BOOLEAN NOT NULL,
        guild_snowflake INTEGER NOT NULL REFERENCES guilds(snowflake) ON DELETE CASCADE,
        UNIQUE (guild_snowflake, rule_id)
    )",
    "CREATE TABLE IF NOT EXISTS entryRegexMeta (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        regex_id INTEGER NOT NULL REFERENCES entryRegexes(id) ON DELETE CASCADE,
        created_date TEXT NOT NULL,
        created_name TEXT NOT NULL,
        created_snowflake INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS entryBans (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        regex_id INTEGER NOT NULL REFERENCES entryRegexes(id) ON DELETE CASCADE,
        date TEXT NOT NULL,
        user_name TEXT NOT NULL,
        user_snowflake INTEGER NOT NULL
    )",
];

/// Columns missing from databases created before stable rule ids
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[
    ("guilds", "next_regex_id", "INTEGER NOT NULL DEFAULT 1"),
    ("entryRegexes", "rule_id", "INTEGER"),
    ("entryRegexes", "position", "INTEGER"),
];

/// Number the rules of each guild in row order, as they were listed before
const BACKFILL: &[&str] = &[
    "UPDATE entryRegexes SET rule_id = (
        SELECT COUNT(*) FROM entryRegexes r
        WHERE r.guild_snowflake = entryRegexes.guild_snowflake AND r.id <= entryRegexes.id
    ) WHERE rule_id IS NULL",
    "UPDATE entryRegexes SET position = rule_id - 1 WHERE position IS NULL",
    "CREATE UNIQUE INDEX IF NOT EXISTS entryRegexes_guild_rule
        ON entryRegexes (guild_snowflake, rule_id)",
];

type GuildRow = (i64, Option<i64>, bool, i64);
type RegexRow = (
    i64,
    i64,
    i64,
    String,
    bool,
    bool,
    Option<String>,
    Option<String>,
    Option<i64>,
);
type BanRow = (i64, String, String, i64);

/// Store backed by a sqlite database
#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    cache: Mutex<Option<HashMap<u64, GuildConfig>>>,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or the schema cannot be
    /// created.
    pub async fn connect(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        info!("Sqlite store opened at {}", path.display());
        Self::with_pool(pool).await
    }

    /// A private in-memory database, gone once the store is dropped.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // Every connection to `:memory:` is its own database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        migrate(&pool).await?;
        Ok(Self {
            pool,
            cache: Mutex::new(None),
        })
    }

    async fn read_all(&self) -> StoreResult<HashMap<u64, GuildConfig>> {
        let guilds: Vec<GuildRow> = sqlx::query_as(
            "SELECT snowflake, log_channel_snowflake, entry_banner_enabled, next_regex_id
             FROM guilds",
        )
        .fetch_all(&self.pool)
        .await?;

        let regexes: Vec<RegexRow> = sqlx::query_as(
            "SELECT r.id, r.guild_snowflake, r.rule_id, r.regex, r.enabled, r.lowercase,
                    m.created_date, m.created_name, m.created_snowflake
             FROM entryRegexes r
             LEFT JOIN entryRegexMeta m ON m.regex_id = r.id
             ORDER BY r.guild_snowflake, r.position",
        )
        .fetch_all(&self.pool)
        .await?;

        let bans: Vec<BanRow> = sqlx::query_as(
            "SELECT regex_id, date, user_name, user_snowflake FROM entryBans ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut bans_by_regex: HashMap<i64, Vec<BanRecord>> = HashMap::new();
        for (regex_id, date, user_name, user_snowflake) in bans {
            bans_by_regex.entry(regex_id).or_default().push(BanRecord {
                rule_id: RuleId::UNASSIGNED,
                banned_at: parse_timestamp(&date)?,
                user_name,
                user_id: from_db(user_snowflake)?,
            });
        }

        let mut rules_by_guild: HashMap<u64, Vec<Rule>> = HashMap::new();
        for (row_id, guild, rule_id, regex, enabled, lowercase, date, name, creator) in regexes {
            let (Some(created_at), Some(created_by), Some(created_by_id)) = (date, name, creator)
            else {
                return Err(StoreError::Corrupt(format!(
                    "regex row {row_id} has no metadata"
                )));
            };

            let rule_id = RuleId::new(from_db(rule_id)?);
            let mut bans = bans_by_regex.remove(&row_id).unwrap_or_default();
            for ban in &mut bans {
                ban.rule_id = rule_id;
            }
            let metadata = RuleMetadata {
                created_by,
                created_by_id: from_db(created_by_id)?,
                created_at: parse_timestamp(&created_at)?,
            };

            let guild_id = from_db(guild)?;
            let rule = restore_rule(guild_id, rule_id, &regex, enabled, lowercase, metadata, bans);
            rules_by_guild.entry(guild_id).or_default().push(rule);
        }

        let mut configs = HashMap::with_capacity(guilds.len());
        for (snowflake, log_channel, enabled, next_regex_id) in guilds {
            let guild_id = from_db(snowflake)?;
            let log_channel_id = log_channel.map(from_db).transpose()?;
            let rules = rules_by_guild.remove(&guild_id).unwrap_or_default();
            configs.insert(
                guild_id,
                GuildConfig::restore(
                    guild_id,
                    enabled,
                    log_channel_id,
                    rules,
                    from_db(next_regex_id)?,
                ),
            );
        }

        Ok(configs)
    }

    async fn write_guild(&self, config: &GuildConfig) -> StoreResult<()> {
        let guild_id = to_db(config.guild_id)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO guilds (snowflake, log_channel_snowflake, entry_banner_enabled, next_regex_id)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (snowflake) DO UPDATE SET
                log_channel_snowflake = excluded.log_channel_snowflake,
                entry_banner_enabled = excluded.entry_banner_enabled,
                next_regex_id = excluded.next_regex_id",
        )
        .bind(guild_id)
        .bind(config.log_channel_id().map(to_db).transpose()?)
        .bind(config.is_enabled())
        .bind(to_db(config.next_rule_id())?)
        .execute(&mut *tx)
        .await?;

        delete_rules(&mut tx, guild_id).await?;

        for (position, rule) in config.rules().iter().enumerate() {
            let regex_id = sqlx::query(
                "INSERT INTO entryRegexes (rule_id, position, regex, enabled, lowercase, guild_snowflake)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(to_db(rule.id().get())?)
            .bind(to_db(position as u64)?)
            .bind(rule.pattern())
            .bind(rule.is_enabled())
            .bind(rule.case_fold())
            .bind(guild_id)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            let metadata = rule.metadata();
            sqlx::query(
                "INSERT INTO entryRegexMeta (regex_id, created_date, created_name, created_snowflake)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(regex_id)
            .bind(metadata.created_at)
            .bind(&metadata.created_by)
            .bind(to_db(metadata.created_by_id)?)
            .execute(&mut *tx)
            .await?;

            for ban in rule.bans() {
                sqlx::query(
                    "INSERT INTO entryBans (regex_id, date, user_name, user_snowflake)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(regex_id)
                .bind(ban.banned_at)
                .bind(&ban.user_name)
                .bind(to_db(ban.user_id)?)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl GuildStore for SqliteStore {
    async fn load(&self) -> StoreResult<HashMap<u64, GuildConfig>> {
        let mut cache = self.cache.lock().await;
        if let Some(configs) = cache.as_ref() {
            return Ok(configs.clone());
        }

        let configs = self.read_all().await?;
        *cache = Some(configs.clone());
        Ok(configs)
    }

    async fn save(&self, config: &GuildConfig) -> StoreResult<()> {
        let mut cache = self.cache.lock().await;
        self.write_guild(config).await?;
        if let Some(configs) = cache.as_mut() {
            configs.insert(config.guild_id, config.clone());
        }
        Ok(())
    }

    async fn delete(&self, guild_id: u64) -> StoreResult<()> {
        let mut cache = self.cache.lock().await;
        let snowflake = to_db(guild_id)?;
        let mut tx = self.pool.begin().await?;
        delete_rules(&mut tx, snowflake).await?;
        sqlx::query("DELETE FROM guilds WHERE snowflake = ?")
            .bind(snowflake)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        if let Some(configs) = cache.as_mut() {
            configs.remove(&guild_id);
        }
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        self.pool.close().await;
        info!("Sqlite store closed");
        Ok(())
    }
}

/// Add the columns older databases lack and number their existing rules.
async fn migrate(pool: &SqlitePool) -> StoreResult<()> {
    let mut added = false;
    for (table, column, declaration) in ADDED_COLUMNS {
        let present: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
                .bind(*table)
                .bind(*column)
                .fetch_one(pool)
                .await?;
        if present == 0 {
            sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {declaration}"))
                .execute(pool)
                .await?;
            warn!("Migrated sqlite store: added {table}.{column}");
            added = true;
        }
    }

    if added {
        for statement in BACKFILL {
            sqlx::query(statement).execute(pool).await?;
        }
    }
    Ok(())
}

/// Delete a guild's rules with their metadata and bans.
///
/// Children go first: databases from before stable rule ids have no
/// `ON DELETE CASCADE`.
async fn delete_rules(conn: &mut SqliteConnection, guild_id: i64) -> StoreResult<()> {
    for statement in [
        "DELETE FROM entryBans WHERE regex_id IN
            (SELECT id FROM entryRegexes WHERE guild_snowflake = ?)",
        "DELETE FROM entryRegexMeta WHERE regex_id IN
            (SELECT id FROM entryRegexes WHERE guild_snowflake = ?)",
        "DELETE FROM entryRegexes WHERE guild_snowflake = ?",
    ] {
        sqlx::query(statement).bind(guild_id).execute(&mut *conn).await?;
    }
    Ok(())
}

fn to_db(id: u64) -> StoreResult<i64> {
    i64::try_from(id).map_err(|_| StoreError::Corrupt(format!("id {id} out of i64 range")))
}

fn from_db(value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative id {value}")))
}
