//! Single JSON document store
//!
//! The whole document is rewritten on every save. Documents written by older
//! deployments, which carry no rule ids and only `banned_ids`, still load.

use crate::banner::{BanRecord, GuildConfig, Rule, RuleId, RuleMetadata};
use crate::store::{GuildStore, StoreError, StoreResult, parse_timestamp, restore_rule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// On-disk shape of one guild
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GuildDocument {
    guild_id: u64,
    log_channel_id: Option<u64>,
    enabled: bool,
    #[serde(default)]
    next_rule_id: u64,
    #[serde(default)]
    patterns: Vec<PatternDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PatternDocument {
    #[serde(default)]
    id: Option<u64>,
    pattern: String,
    enabled: bool,
    #[serde(default)]
    lower: bool,
    metadata: MetadataDocument,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MetadataDocument {
    created_by: String,
    created_by_id: Snowflake,
    created_at: String,
    #[serde(default)]
    banned_ids: Vec<u64>,
    #[serde(default)]
    bans: Vec<BanDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BanDocument {
    user_id: u64,
    user_name: String,
    banned_at: DateTime<Utc>,
}

/// Discord id written either as a number or as a string
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Snowflake {
    Number(u64),
    Text(String),
}

impl Snowflake {
    fn get(&self) -> StoreResult<u64> {
        match self {
            Self::Number(id) => Ok(*id),
            Self::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("invalid id '{text}'"))),
        }
    }
}

type Document = BTreeMap<String, GuildDocument>;

/// Store backed by one JSON file
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    cache: Mutex<Option<HashMap<u64, GuildConfig>>>,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> StoreResult<HashMap<u64, GuildConfig>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No entry banner document at {}, starting empty", self.path.display());
                return Ok(HashMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        let document: Document = serde_json::from_str(&content)?;
        let mut configs = HashMap::with_capacity(document.len());
        for (key, guild) in document {
            let guild_id: u64 = key
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("invalid guild key '{key}'")))?;
            configs.insert(guild_id, guild_from_document(guild_id, guild)?);
        }

        debug!("Loaded {} guild(s) from {}", configs.len(), self.path.display());
        Ok(configs)
    }

    async fn write_document(&self, configs: &HashMap<u64, GuildConfig>) -> StoreResult<()> {
        let document: Document = configs
            .values()
            .map(|config| (config.guild_id.to_string(), guild_to_document(config)))
            .collect();
        let json = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Write next to the target and rename, so a crash never leaves half a document.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl GuildStore for JsonStore {
    async fn load(&self) -> StoreResult<HashMap<u64, GuildConfig>> {
        let mut cache = self.cache.lock().await;
        if let Some(configs) = cache.as_ref() {
            return Ok(configs.clone());
        }

        let configs = self.read_document().await?;
        *cache = Some(configs.clone());
        Ok(configs)
    }

    async fn save(&self, config: &GuildConfig) -> StoreResult<()> {
        let mut cache = self.cache.lock().await;
        let mut configs = match cache.as_ref() {
            Some(configs) => configs.clone(),
            None => self.read_document().await?,
        };

        configs.insert(config.guild_id, config.clone());
        self.write_document(&configs).await?;
        *cache = Some(configs);
        Ok(())
    }

    async fn delete(&self, guild_id: u64) -> StoreResult<()> {
        let mut cache = self.cache.lock().await;
        let mut configs = match cache.as_ref() {
            Some(configs) => configs.clone(),
            None => self.read_document().await?,
        };

        if configs.remove(&guild_id).is_some() {
            self.write_document(&configs).await?;
        }
        *cache = Some(configs);
        Ok(())
    }
}

fn guild_to_document(config: &GuildConfig) -> GuildDocument {
    GuildDocument {
        guild_id: config.guild_id,
        log_channel_id: config.log_channel_id(),
        enabled: config.is_enabled(),
        next_rule_id: config.next_rule_id(),
        patterns: config.rules().iter().map(pattern_to_document).collect(),
    }
}

fn pattern_to_document(rule: &Rule) -> PatternDocument {
    let metadata = rule.metadata();
    PatternDocument {
        id: Some(rule.id().get()),
        pattern: rule.pattern().to_string(),
        enabled: rule.is_enabled(),
        lower: rule.case_fold(),
        metadata: MetadataDocument {
            created_by: metadata.created_by.clone(),
            created_by_id: Snowflake::Text(metadata.created_by_id.to_string()),
            created_at: metadata.created_at.to_rfc3339(),
            banned_ids: rule.banned_ids(),
            bans: rule
                .bans()
                .iter()
                .map(|ban| BanDocument {
                    user_id: ban.user_id,
                    user_name: ban.user_name.clone(),
                    banned_at: ban.banned_at,
                })
                .collect(),
        },
    }
}

fn guild_from_document(guild_id: u64, guild: GuildDocument) -> StoreResult<GuildConfig> {
    if guild.guild_id != guild_id {
        return Err(StoreError::Corrupt(format!(
            "guild key {guild_id} holds guild {}",
            guild.guild_id
        )));
    }

    // Patterns from documents without ids get fresh ones after the highest
    // known id, in document order.
    let mut fresh_id = guild
        .patterns
        .iter()
        .filter_map(|pattern| pattern.id)
        .max()
        .unwrap_or(0);

    let mut rules = Vec::with_capacity(guild.patterns.len());
    for pattern in guild.patterns {
        let id = pattern.id.unwrap_or_else(|| {
            fresh_id += 1;
            fresh_id
        });
        rules.push(pattern_from_document(guild_id, RuleId::new(id), pattern)?);
    }

    Ok(GuildConfig::restore(
        guild.guild_id,
        guild.enabled,
        guild.log_channel_id,
        rules,
        guild.next_rule_id,
    ))
}

fn pattern_from_document(
    guild_id: u64,
    id: RuleId,
    pattern: PatternDocument,
) -> StoreResult<Rule> {
    let created_at = parse_timestamp(&pattern.metadata.created_at)?;
    let metadata = RuleMetadata {
        created_by: pattern.metadata.created_by,
        created_by_id: pattern.metadata.created_by_id.get()?,
        created_at,
    };

    let bans = if pattern.metadata.bans.is_empty() {
        // Older documents only kept the banned ids.
        pattern
            .metadata
            .banned_ids
            .into_iter()
            .map(|user_id| BanRecord {
                rule_id: id,
                banned_at: created_at,
                user_name: String::new(),
                user_id,
            })
            .collect()
    } else {
        pattern
            .metadata
            .bans
            .into_iter()
            .map(|ban| BanRecord {
                rule_id: id,
                banned_at: ban.banned_at,
                user_name: ban.user_name,
                user_id: ban.user_id,
            })
            .collect()
    };

    Ok(restore_rule(
        guild_id,
        id,
        &pattern.pattern,
        pattern.enabled,
        pattern.lower,
        metadata,
        bans,
    ))
}
