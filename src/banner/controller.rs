//! Moderation controller
//!
//! Owns the in-memory guild configs, runs join validation and executes bans,
//! and exposes the administrative operations. Every mutation is written to
//! the store before it is acknowledged; a failed write restores the previous
//! config.

use crate::banner::{
    BannerError, BannerResult, GuildConfig, Platform, Rule, RuleId, RuleMetadata,
};
use crate::store::GuildStore;
use crate::MODERATION_TARGET;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// A member that just joined a guild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberJoin {
    pub guild_id: u64,
    pub user_id: u64,
    /// Account name the rules are matched against
    pub user_name: String,
}

/// What happened to a joining member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The guild's entry banner is disabled (or its config is unavailable)
    Ignored,
    /// No rule matched
    Allowed,
    /// The member was banned by this rule
    Banned(RuleId),
    /// A rule matched but the platform refused the ban
    BanFailed(RuleId),
}

/// Overview shown by the `info` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildSummary {
    pub enabled: bool,
    pub log_channel_id: Option<u64>,
    pub rule_count: usize,
    pub enabled_rule_count: usize,
    pub ban_count: usize,
}

impl std::fmt::Display for GuildSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Enabled: {}", self.enabled)?;
        match self.log_channel_id {
            Some(channel_id) => writeln!(f, "Log channel: <#{channel_id}>")?,
            None => writeln!(f, "Log channel: not configured")?,
        }
        writeln!(
            f,
            "Patterns: {} ({} enabled)",
            self.rule_count, self.enabled_rule_count
        )?;
        write!(f, "Bans: {}", self.ban_count)
    }
}

/// Entry banner orchestration for every guild the bot is in
pub struct ModerationController {
    store: Arc<dyn GuildStore>,
    platform: Arc<dyn Platform>,
    guilds: DashMap<u64, Arc<Mutex<GuildConfig>>>,
    /// Serializes first-touch creation of unseen guilds
    creating: Mutex<()>,
}

impl std::fmt::Debug for ModerationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModerationController")
            .field("guilds", &self.guilds.len())
            .finish_non_exhaustive()
    }
}

impl ModerationController {
    /// Build a controller from everything the store currently holds.
    ///
    /// # Errors
    /// Returns `BannerError::Persistence` if the store cannot be read.
    pub async fn load(
        store: Arc<dyn GuildStore>,
        platform: Arc<dyn Platform>,
    ) -> BannerResult<Self> {
        let configs = store.load().await?;
        info!("Loaded entry banner configuration for {} guild(s)", configs.len());

        let guilds = configs
            .into_iter()
            .map(|(guild_id, config)| (guild_id, Arc::new(Mutex::new(config))))
            .collect();

        Ok(Self {
            store,
            platform,
            guilds,
            creating: Mutex::new(()),
        })
    }

    /// The store this controller writes to
    #[must_use]
    pub fn store(&self) -> &Arc<dyn GuildStore> {
        &self.store
    }

    #[must_use]
    pub fn is_known(&self, guild_id: u64) -> bool {
        self.guilds.contains_key(&guild_id)
    }

    /// Look up a guild's config, creating and persisting a disabled one on
    /// first touch.
    async fn guild_entry(&self, guild_id: u64) -> BannerResult<Arc<Mutex<GuildConfig>>> {
        if let Some(entry) = self.guilds.get(&guild_id) {
            return Ok(Arc::clone(entry.value()));
        }

        let _creating = self.creating.lock().await;
        if let Some(entry) = self.guilds.get(&guild_id) {
            return Ok(Arc::clone(entry.value()));
        }

        let config = GuildConfig::new(guild_id);
        self.store.save(&config).await?;
        debug!("Created entry banner configuration for guild {guild_id}");

        let entry = Arc::new(Mutex::new(config));
        self.guilds.insert(guild_id, Arc::clone(&entry));
        Ok(entry)
    }

    /// Apply `op` to a guild's config and persist the result.
    ///
    /// The config is restored when the write fails, so memory never runs
    /// ahead of the store.
    async fn mutate<T, F>(&self, guild_id: u64, op: F) -> BannerResult<T>
    where
        T: Send,
        F: FnOnce(&mut GuildConfig) -> BannerResult<T> + Send,
    {
        let entry = self.guild_entry(guild_id).await?;
        let mut config = entry.lock().await;
        let snapshot = config.clone();

        let value = op(&mut config)?;

        if let Err(e) = self.store.save(&config).await {
            *config = snapshot;
            error!("Failed to persist configuration of guild {guild_id}, change rolled back: {e}");
            return Err(e.into());
        }

        Ok(value)
    }

    async fn read<T, F>(&self, guild_id: u64, op: F) -> BannerResult<T>
    where
        F: FnOnce(&GuildConfig) -> T + Send,
    {
        let entry = self.guild_entry(guild_id).await?;
        let config = entry.lock().await;
        Ok(op(&config))
    }

    /// Validate a joining member and ban them if a rule matches.
    ///
    /// Never fails: every problem is logged and reflected in the outcome.
    pub async fn on_member_join(&self, join: &MemberJoin) -> JoinOutcome {
        let entry = match self.guild_entry(join.guild_id).await {
            Ok(entry) => entry,
            Err(e) => {
                error!(
                    target: MODERATION_TARGET,
                    guild_id = %join.guild_id,
                    "Failed to load entry banner configuration: {e}"
                );
                return JoinOutcome::Ignored;
            }
        };

        // Held through the ban so two joins in one guild cannot interleave
        // their ban records.
        let mut config = entry.lock().await;
        if !config.is_enabled() {
            return JoinOutcome::Ignored;
        }

        let Some(rule_id) = config.validate(&join.user_name) else {
            return JoinOutcome::Allowed;
        };

        let pattern = config
            .rule(rule_id)
            .map(|rule| rule.pattern().to_string())
            .unwrap_or_default();

        info!(
            target: MODERATION_TARGET,
            guild_id = %join.guild_id,
            user_id = %join.user_id,
            user_name = %join.user_name,
            rule_id = %rule_id,
            event = "ban_start",
            "Banning member due to entry pattern"
        );

        let reason = format!("entry banner: name matched pattern {rule_id}");
        if let Err(e) = self
            .platform
            .ban_member(join.guild_id, join.user_id, &reason)
            .await
        {
            error!(
                target: MODERATION_TARGET,
                guild_id = %join.guild_id,
                user_id = %join.user_id,
                rule_id = %rule_id,
                error = %e,
                "Failed to ban member"
            );
            return JoinOutcome::BanFailed(rule_id);
        }

        let snapshot = config.clone();
        let persisted = match config.record_ban(rule_id, join.user_id, &join.user_name) {
            Ok(()) => self.store.save(&config).await.map_err(BannerError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            *config = snapshot;
            error!(
                target: MODERATION_TARGET,
                guild_id = %join.guild_id,
                user_id = %join.user_id,
                rule_id = %rule_id,
                "Member banned but the ban record could not be stored: {e}"
            );
        }

        let log_channel = config.log_channel_id();
        drop(config);

        debug!(
            target: MODERATION_TARGET,
            guild_id = %join.guild_id,
            user_id = %join.user_id,
            rule_id = %rule_id,
            event = "ban_end",
            "Banned member"
        );

        match log_channel {
            Some(channel_id) => {
                let text = format!(
                    "banned {} ({}) due to pattern {rule_id} (`{pattern}`).",
                    join.user_name, join.user_id
                );
                if let Err(e) = self.platform.send_message(channel_id, &text).await {
                    warn!(
                        target: MODERATION_TARGET,
                        guild_id = %join.guild_id,
                        channel_id = %channel_id,
                        "Failed to announce ban in log channel: {e}"
                    );
                }
            }
            None => warn!(
                target: MODERATION_TARGET,
                guild_id = %join.guild_id,
                "No log channel configured, ban not announced"
            ),
        }

        JoinOutcome::Banned(rule_id)
    }

    /// Remember a guild the bot was just added to.
    ///
    /// When the guild has a system channel it becomes the log channel.
    /// Returns `false` when the guild was already known.
    ///
    /// # Errors
    /// Returns `BannerError::Persistence` if the new config cannot be stored.
    pub async fn register_guild(
        &self,
        guild_id: u64,
        system_channel_id: Option<u64>,
    ) -> BannerResult<bool> {
        if self.is_known(guild_id) {
            return Ok(false);
        }

        self.guild_entry(guild_id).await?;
        if let Some(channel_id) = system_channel_id {
            self.mutate(guild_id, |config| {
                config.set_log_channel(channel_id);
                Ok(())
            })
            .await?;
        }

        info!("Registered new guild {guild_id}");
        Ok(true)
    }

    /// # Errors
    /// Returns `BannerError::Persistence` if a new config cannot be stored.
    pub async fn info(&self, guild_id: u64) -> BannerResult<GuildSummary> {
        self.read(guild_id, |config| GuildSummary {
            enabled: config.is_enabled(),
            log_channel_id: config.log_channel_id(),
            rule_count: config.rules().len(),
            enabled_rule_count: config.rules().iter().filter(|rule| rule.is_enabled()).count(),
            ban_count: config.ban_count(),
        })
        .await
    }

    /// Turn join validation on.
    ///
    /// # Errors
    /// Returns `BannerError::LogChannelNotConfigured` when no log channel is
    /// set, or `BannerError::Persistence` if the change cannot be stored.
    pub async fn enable(&self, guild_id: u64) -> BannerResult<()> {
        self.mutate(guild_id, |config| {
            if config.log_channel_id().is_none() {
                return Err(BannerError::LogChannelNotConfigured);
            }
            config.set_enabled(true);
            Ok(())
        })
        .await
    }

    /// # Errors
    /// Returns `BannerError::Persistence` if the change cannot be stored.
    pub async fn disable(&self, guild_id: u64) -> BannerResult<()> {
        self.mutate(guild_id, |config| {
            config.set_enabled(false);
            Ok(())
        })
        .await
    }

    /// Point announcements at a channel of the same guild.
    ///
    /// # Errors
    /// Returns `BannerError::ChannelNotInGuild` for foreign channels,
    /// `BannerError::Platform` if the guild's channels cannot be listed, or
    /// `BannerError::Persistence` if the change cannot be stored.
    pub async fn set_log_channel(&self, guild_id: u64, channel_id: u64) -> BannerResult<()> {
        if !self.platform.channel_in_guild(guild_id, channel_id).await? {
            return Err(BannerError::ChannelNotInGuild {
                channel_id,
                guild_id,
            });
        }

        self.mutate(guild_id, |config| {
            config.set_log_channel(channel_id);
            Ok(())
        })
        .await
    }

    /// Compile and append a rule.
    ///
    /// # Errors
    /// Returns `BannerError::InvalidPattern` if the pattern does not compile,
    /// or `BannerError::Persistence` if the change cannot be stored.
    pub async fn add_rule(
        &self,
        guild_id: u64,
        pattern: &str,
        case_fold: bool,
        metadata: RuleMetadata,
    ) -> BannerResult<RuleId> {
        let rule = Rule::new(pattern, case_fold, metadata)?;
        self.mutate(guild_id, move |config| Ok(config.add_rule(rule)))
            .await
    }

    /// # Errors
    /// Returns `BannerError::RuleNotFound` or `BannerError::Persistence`.
    pub async fn remove_rule(&self, guild_id: u64, rule_id: RuleId) -> BannerResult<Rule> {
        self.mutate(guild_id, |config| config.remove_rule(rule_id))
            .await
    }

    /// # Errors
    /// Returns `BannerError::RuleNotFound` or `BannerError::Persistence`.
    pub async fn set_rule_enabled(
        &self,
        guild_id: u64,
        rule_id: RuleId,
        enabled: bool,
    ) -> BannerResult<()> {
        self.mutate(guild_id, |config| config.set_rule_enabled(rule_id, enabled))
            .await
    }

    /// # Errors
    /// Returns `BannerError::RuleNotFound` when the guild has no such rule.
    pub async fn rule(&self, guild_id: u64, rule_id: RuleId) -> BannerResult<Rule> {
        self.read(guild_id, |config| config.rule(rule_id).cloned())
            .await?
            .ok_or(BannerError::RuleNotFound(rule_id))
    }

    /// # Errors
    /// Returns `BannerError::Persistence` if a new config cannot be stored.
    pub async fn list_rules(&self, guild_id: u64) -> BannerResult<String> {
        self.read(guild_id, GuildConfig::pattern_listing).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banner::{MockPlatform, PlatformError};
    use crate::store::{MemoryStore, StoreError, StoreResult};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    const GUILD: u64 = 100;
    const CHANNEL: u64 = 200;

    /// Memory store whose writes can be made to fail
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_saves: AtomicBool,
    }

    #[async_trait::async_trait]
    impl GuildStore for FlakyStore {
        async fn load(&self) -> StoreResult<HashMap<u64, GuildConfig>> {
            self.inner.load().await
        }

        async fn save(&self, config: &GuildConfig) -> StoreResult<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(StoreError::Corrupt("disk full".to_string()));
            }
            self.inner.save(config).await
        }

        async fn delete(&self, guild_id: u64) -> StoreResult<()> {
            self.inner.delete(guild_id).await
        }
    }

    fn metadata() -> RuleMetadata {
        RuleMetadata::new("admin", 1)
    }

    fn join(name: &str) -> MemberJoin {
        MemberJoin {
            guild_id: GUILD,
            user_id: 555,
            user_name: name.to_string(),
        }
    }

    fn permissive_platform() -> MockPlatform {
        let mut platform = MockPlatform::new();
        platform.expect_channel_in_guild().returning(|_, _| Ok(true));
        platform
    }

    async fn controller(
        store: Arc<FlakyStore>,
        platform: MockPlatform,
    ) -> ModerationController {
        ModerationController::load(store, Arc::new(platform))
            .await
            .unwrap()
    }

    /// Enabled guild with a log channel and the given rules
    async fn configured(controller: &ModerationController, patterns: &[&str]) -> Vec<RuleId> {
        controller.set_log_channel(GUILD, CHANNEL).await.unwrap();
        controller.enable(GUILD).await.unwrap();
        let mut ids = Vec::new();
        for pattern in patterns {
            ids.push(
                controller
                    .add_rule(GUILD, pattern, false, metadata())
                    .await
                    .unwrap(),
            );
        }
        ids
    }

    #[tokio::test]
    async fn test_unseen_guild_is_created_disabled_and_persisted() {
        let store = Arc::new(FlakyStore::default());
        let controller = controller(Arc::clone(&store), MockPlatform::new()).await;

        let outcome = controller.on_member_join(&join("badbot")).await;
        assert_eq!(outcome, JoinOutcome::Ignored);

        let stored = store.load().await.unwrap();
        assert!(!stored[&GUILD].is_enabled());
        assert!(stored[&GUILD].rules().is_empty());
    }

    #[tokio::test]
    async fn test_enable_requires_log_channel() {
        let store = Arc::new(FlakyStore::default());
        let controller = controller(store, permissive_platform()).await;

        let result = controller.enable(GUILD).await;
        assert!(matches!(result, Err(BannerError::LogChannelNotConfigured)));
        assert!(!controller.info(GUILD).await.unwrap().enabled);
    }

    #[tokio::test]
    async fn test_set_log_channel_rejects_foreign_channel() {
        let store = Arc::new(FlakyStore::default());
        let mut platform = MockPlatform::new();
        platform.expect_channel_in_guild().returning(|_, _| Ok(false));
        let controller = controller(store, platform).await;

        let result = controller.set_log_channel(GUILD, 999).await;
        assert!(matches!(
            result,
            Err(BannerError::ChannelNotInGuild { channel_id: 999, guild_id: GUILD })
        ));
        assert_eq!(controller.info(GUILD).await.unwrap().log_channel_id, None);
    }

    #[tokio::test]
    async fn test_matching_join_bans_records_and_announces() {
        let store = Arc::new(FlakyStore::default());
        let mut platform = permissive_platform();
        platform
            .expect_ban_member()
            .withf(|guild_id, user_id, _| *guild_id == GUILD && *user_id == 555)
            .times(1)
            .returning(|_, _, _| Ok(()));
        platform
            .expect_send_message()
            .withf(|channel_id, text| *channel_id == CHANNEL && text.contains("badbot"))
            .times(1)
            .returning(|_, _| Ok(()));
        let controller = controller(Arc::clone(&store), platform).await;
        let ids = configured(&controller, &["^bad.*", "^badbot$"]).await;

        let outcome = controller.on_member_join(&join("badbot")).await;
        assert_eq!(outcome, JoinOutcome::Banned(ids[0]));

        let stored = store.load().await.unwrap();
        let guild = &stored[&GUILD];
        assert_eq!(guild.rule(ids[0]).unwrap().banned_ids(), vec![555]);
        assert!(guild.rule(ids[1]).unwrap().bans().is_empty());
        assert_eq!(guild.ban_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_ban_records_nothing() {
        let store = Arc::new(FlakyStore::default());
        let mut platform = permissive_platform();
        platform
            .expect_ban_member()
            .times(1)
            .returning(|_, _, _| Err(PlatformError::Other("Missing Permissions".to_string())));
        platform.expect_send_message().never();
        let controller = controller(Arc::clone(&store), platform).await;
        let ids = configured(&controller, &["^bad"]).await;

        let outcome = controller.on_member_join(&join("badbot")).await;
        assert_eq!(outcome, JoinOutcome::BanFailed(ids[0]));
        assert_eq!(controller.info(GUILD).await.unwrap().ban_count, 0);
        assert_eq!(store.load().await.unwrap()[&GUILD].ban_count(), 0);
    }

    #[tokio::test]
    async fn test_non_matching_join_is_allowed() {
        let store = Arc::new(FlakyStore::default());
        let mut platform = permissive_platform();
        platform.expect_ban_member().never();
        let controller = controller(store, platform).await;
        configured(&controller, &["^bad"]).await;

        assert_eq!(
            controller.on_member_join(&join("goodbot")).await,
            JoinOutcome::Allowed
        );
    }

    #[tokio::test]
    async fn test_disabled_guild_ignores_joins() {
        let store = Arc::new(FlakyStore::default());
        let mut platform = permissive_platform();
        platform.expect_ban_member().never();
        let controller = controller(store, platform).await;
        configured(&controller, &["^bad"]).await;
        controller.disable(GUILD).await.unwrap();

        assert_eq!(
            controller.on_member_join(&join("badbot")).await,
            JoinOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_ban_without_log_channel_is_not_announced() {
        let store = Arc::new(FlakyStore::default());
        let mut platform = MockPlatform::new();
        platform.expect_ban_member().times(1).returning(|_, _, _| Ok(()));
        platform.expect_send_message().never();

        // Imported configs can be enabled without a log channel.
        let mut legacy = GuildConfig::new(GUILD);
        legacy.set_enabled(true);
        let rule_id = legacy.add_rule(Rule::new("^bad", false, metadata()).unwrap());
        store.save(&legacy).await.unwrap();
        let controller = controller(store, platform).await;

        assert_eq!(
            controller.on_member_join(&join("badbot")).await,
            JoinOutcome::Banned(rule_id)
        );
    }

    #[tokio::test]
    async fn test_failed_announcement_keeps_ban_record() {
        let store = Arc::new(FlakyStore::default());
        let mut platform = permissive_platform();
        platform.expect_ban_member().returning(|_, _, _| Ok(()));
        platform
            .expect_send_message()
            .returning(|_, _| Err(PlatformError::Other("Unknown Channel".to_string())));
        let controller = controller(store, platform).await;
        let ids = configured(&controller, &["^bad"]).await;

        assert_eq!(
            controller.on_member_join(&join("badbot")).await,
            JoinOutcome::Banned(ids[0])
        );
        assert_eq!(controller.info(GUILD).await.unwrap().ban_count, 1);
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back_mutation() {
        let store = Arc::new(FlakyStore::default());
        let controller = controller(Arc::clone(&store), permissive_platform()).await;
        let ids = configured(&controller, &["^bad"]).await;

        store.fail_saves.store(true, Ordering::SeqCst);

        let result = controller.add_rule(GUILD, "^worse", false, metadata()).await;
        assert!(matches!(result, Err(BannerError::Persistence(_))));
        assert!(controller.disable(GUILD).await.is_err());
        assert!(controller.set_rule_enabled(GUILD, ids[0], false).await.is_err());
        assert!(controller.remove_rule(GUILD, ids[0]).await.is_err());

        let summary = controller.info(GUILD).await.unwrap();
        assert!(summary.enabled);
        assert_eq!(summary.rule_count, 1);
        assert_eq!(summary.enabled_rule_count, 1);

        store.fail_saves.store(false, Ordering::SeqCst);
        let next = controller
            .add_rule(GUILD, "^worse", false, metadata())
            .await
            .unwrap();
        assert_eq!(next, RuleId::new(ids[0].get() + 1), "rolled back id is handed out again");
    }

    #[tokio::test]
    async fn test_failed_persist_after_ban_drops_record() {
        let store = Arc::new(FlakyStore::default());
        let mut platform = permissive_platform();
        platform.expect_ban_member().times(1).returning(|_, _, _| Ok(()));
        platform.expect_send_message().returning(|_, _| Ok(()));
        let controller = controller(Arc::clone(&store), platform).await;
        let ids = configured(&controller, &["^bad"]).await;

        store.fail_saves.store(true, Ordering::SeqCst);
        assert_eq!(
            controller.on_member_join(&join("badbot")).await,
            JoinOutcome::Banned(ids[0])
        );
        assert_eq!(controller.info(GUILD).await.unwrap().ban_count, 0);
    }

    #[tokio::test]
    async fn test_invalid_pattern_changes_nothing() {
        let store = Arc::new(FlakyStore::default());
        let controller = controller(store, permissive_platform()).await;

        let result = controller.add_rule(GUILD, "([", false, metadata()).await;
        assert!(matches!(result, Err(BannerError::InvalidPattern { .. })));
        assert_eq!(controller.info(GUILD).await.unwrap().rule_count, 0);
    }

    #[tokio::test]
    async fn test_remove_then_list_keeps_stable_ids() {
        let store = Arc::new(FlakyStore::default());
        let controller = controller(store, permissive_platform()).await;
        let ids = configured(&controller, &["^one", "^two", "^three"]).await;

        let removed = controller.remove_rule(GUILD, ids[0]).await.unwrap();
        assert_eq!(removed.pattern(), "^one");

        let listing = controller.list_rules(GUILD).await.unwrap();
        assert!(!listing.contains("^one"));
        assert!(listing.contains("2. `^two`"));
        assert!(listing.contains("3. `^three`"));

        assert!(matches!(
            controller.remove_rule(GUILD, ids[0]).await,
            Err(BannerError::RuleNotFound(_))
        ));
        assert!(matches!(
            controller.rule(GUILD, ids[0]).await,
            Err(BannerError::RuleNotFound(_))
        ));
        assert_eq!(controller.rule(GUILD, ids[1]).await.unwrap().pattern(), "^two");
    }

    #[tokio::test]
    async fn test_register_guild_adopts_system_channel() {
        let store = Arc::new(FlakyStore::default());
        let controller = controller(Arc::clone(&store), MockPlatform::new()).await;

        assert!(controller.register_guild(GUILD, Some(CHANNEL)).await.unwrap());
        assert!(!controller.register_guild(GUILD, Some(1)).await.unwrap());
        assert_eq!(store.load().await.unwrap()[&GUILD].log_channel_id(), Some(CHANNEL));

        assert!(controller.register_guild(GUILD + 1, None).await.unwrap());
        assert_eq!(controller.info(GUILD + 1).await.unwrap().log_channel_id, None);
    }

    #[tokio::test]
    async fn test_concurrent_joins_in_one_guild_record_every_ban() {
        let store = Arc::new(FlakyStore::default());
        let mut platform = permissive_platform();
        platform.expect_ban_member().times(8).returning(|_, _, _| Ok(()));
        platform.expect_send_message().returning(|_, _| Ok(()));
        let controller = Arc::new(controller(Arc::clone(&store), platform).await);
        let ids = configured(&controller, &["^bad"]).await;

        let mut tasks = Vec::new();
        for user_id in 0..8 {
            let controller = Arc::clone(&controller);
            tasks.push(tokio::spawn(async move {
                controller
                    .on_member_join(&MemberJoin {
                        guild_id: GUILD,
                        user_id,
                        user_name: format!("bad{user_id}"),
                    })
                    .await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), JoinOutcome::Banned(ids[0]));
        }

        let stored = store.load().await.unwrap();
        assert_eq!(stored[&GUILD].ban_count(), 8);
    }

    #[test]
    fn test_summary_display() {
        let summary = GuildSummary {
            enabled: true,
            log_channel_id: Some(5),
            rule_count: 2,
            enabled_rule_count: 1,
            ban_count: 3,
        };
        let text = summary.to_string();
        assert!(text.contains("Enabled: true"));
        assert!(text.contains("<#5>"));
        assert!(text.contains("Patterns: 2 (1 enabled)"));
        assert!(text.contains("Bans: 3"));
    }
}
