//! Per-guild entry banner configuration
//!
//! A `GuildConfig` owns its ordered rule list; insertion order is match
//! priority. Mutators only touch memory, persisting them is the
//! controller's job.

use crate::banner::{BannerError, BannerResult, Rule, RuleId};
use std::fmt::Write as _;

/// Entry banner state of one guild
#[derive(Debug, Clone, PartialEq)]
pub struct GuildConfig {
    pub guild_id: u64,
    enabled: bool,
    log_channel_id: Option<u64>,
    rules: Vec<Rule>,
    next_rule_id: u64,
}

impl GuildConfig {
    /// A freshly seen guild: disabled, no log channel, no rules
    #[must_use]
    pub const fn new(guild_id: u64) -> Self {
        Self {
            guild_id,
            enabled: false,
            log_channel_id: None,
            rules: Vec::new(),
            next_rule_id: 1,
        }
    }

    /// Rebuild a config from persisted parts.
    ///
    /// `next_rule_id` is raised past the highest existing id so ids are never
    /// handed out twice, whatever the stored counter says.
    #[must_use]
    pub fn restore(
        guild_id: u64,
        enabled: bool,
        log_channel_id: Option<u64>,
        rules: Vec<Rule>,
        next_rule_id: u64,
    ) -> Self {
        let highest = rules.iter().map(|rule| rule.id().get()).max().unwrap_or(0);
        Self {
            guild_id,
            enabled,
            log_channel_id,
            rules,
            next_rule_id: next_rule_id.max(highest + 1),
        }
    }

    /// Find the rule that bans `member_name`, if any.
    ///
    /// Returns `None` straight away when the guild is disabled. Otherwise the
    /// first enabled rule in insertion order that matches wins.
    #[must_use]
    pub fn validate(&self, member_name: &str) -> Option<RuleId> {
        if !self.enabled {
            return None;
        }

        self.rules
            .iter()
            .find(|rule| rule.matches(member_name))
            .map(Rule::id)
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub const fn log_channel_id(&self) -> Option<u64> {
        self.log_channel_id
    }

    pub fn set_log_channel(&mut self, channel_id: u64) {
        self.log_channel_id = Some(channel_id);
    }

    /// Append a rule at the lowest priority and assign it the next id
    pub fn add_rule(&mut self, mut rule: Rule) -> RuleId {
        let id = RuleId::new(self.next_rule_id);
        self.next_rule_id += 1;
        rule.assign_id(id);
        self.rules.push(rule);
        id
    }

    /// Remove a rule together with its ban history.
    ///
    /// # Errors
    /// Returns `BannerError::RuleNotFound` when no rule has this id.
    pub fn remove_rule(&mut self, id: RuleId) -> BannerResult<Rule> {
        let position = self.position(id)?;
        Ok(self.rules.remove(position))
    }

    /// # Errors
    /// Returns `BannerError::RuleNotFound` when no rule has this id, or
    /// `BannerError::InvalidPattern` when enabling a rule whose stored
    /// pattern does not compile.
    pub fn set_rule_enabled(&mut self, id: RuleId, enabled: bool) -> BannerResult<()> {
        let position = self.position(id)?;
        let rule = &mut self.rules[position];
        if enabled {
            rule.enable()?;
        } else {
            rule.disable();
        }
        Ok(())
    }

    /// # Errors
    /// Returns `BannerError::RuleNotFound` when no rule has this id.
    pub fn record_ban(&mut self, id: RuleId, user_id: u64, user_name: &str) -> BannerResult<()> {
        let position = self.position(id)?;
        self.rules[position].record_ban(user_id, user_name);
        Ok(())
    }

    #[must_use]
    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.id() == id)
    }

    /// Rules in match-priority order
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[must_use]
    pub const fn next_rule_id(&self) -> u64 {
        self.next_rule_id
    }

    /// Total bans executed by all current rules
    #[must_use]
    pub fn ban_count(&self) -> usize {
        self.rules.iter().map(|rule| rule.bans().len()).sum()
    }

    /// Numbered rule list as shown by `regex list`
    #[must_use]
    pub fn pattern_listing(&self) -> String {
        if self.rules.is_empty() {
            return "no patterns have been added yet.".to_string();
        }

        let mut msg = String::from("Current patterns:");
        for rule in &self.rules {
            let _ = write!(
                msg,
                "\n{}. `{}` ({}{}, {} ban(s))",
                rule.id(),
                rule.pattern(),
                match (rule.is_enabled(), rule.is_supported()) {
                    (true, _) => "enabled",
                    (false, true) => "disabled",
                    (false, false) => "unsupported pattern",
                },
                if rule.case_fold() { ", lowercase" } else { "" },
                rule.bans().len()
            );
        }
        msg
    }

    fn position(&self, id: RuleId) -> BannerResult<usize> {
        self.rules
            .iter()
            .position(|rule| rule.id() == id)
            .ok_or(BannerError::RuleNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banner::RuleMetadata;

    fn rule(pattern: &str) -> Rule {
        Rule::new(pattern, false, RuleMetadata::new("admin", 1)).expect("pattern should compile")
    }

    fn enabled_config(patterns: &[&str]) -> GuildConfig {
        let mut config = GuildConfig::new(10);
        config.set_enabled(true);
        for pattern in patterns {
            config.add_rule(rule(pattern));
        }
        config
    }

    #[test]
    fn test_new_config_defaults() {
        let config = GuildConfig::new(10);
        assert_eq!(config.guild_id, 10);
        assert!(!config.is_enabled());
        assert!(config.log_channel_id().is_none());
        assert!(config.rules().is_empty());
    }

    #[test]
    fn test_validate_without_rules_is_none() {
        let config = enabled_config(&[]);
        assert_eq!(config.validate("anyone"), None);
    }

    #[test]
    fn test_validate_returns_first_match_in_insertion_order() {
        let config = enabled_config(&["^bad.*", "^badbot$"]);
        let first = config.rules()[0].id();
        assert_eq!(config.validate("badbot"), Some(first));
    }

    #[test]
    fn test_validate_skips_disabled_rules() {
        let mut config = enabled_config(&["^bad.*", "^badbot$"]);
        let first = config.rules()[0].id();
        let second = config.rules()[1].id();
        config.set_rule_enabled(first, false).unwrap();
        assert_eq!(config.validate("badbot"), Some(second));
        assert_eq!(config.validate("badman"), None);
    }

    #[test]
    fn test_disabled_config_validates_nothing() {
        let mut config = enabled_config(&["^bad"]);
        config.set_enabled(false);
        assert_eq!(config.validate("badbot"), None);
    }

    #[test]
    fn test_ids_are_stable_after_removal() {
        let mut config = enabled_config(&["a", "b", "c"]);
        let ids: Vec<RuleId> = config.rules().iter().map(Rule::id).collect();
        assert_eq!(ids, vec![RuleId::new(1), RuleId::new(2), RuleId::new(3)]);

        let removed = config.remove_rule(RuleId::new(1)).unwrap();
        assert_eq!(removed.pattern(), "a");

        let remaining: Vec<(RuleId, &str)> = config
            .rules()
            .iter()
            .map(|rule| (rule.id(), rule.pattern()))
            .collect();
        assert_eq!(remaining, vec![(RuleId::new(2), "b"), (RuleId::new(3), "c")]);

        let next = config.add_rule(rule("d"));
        assert_eq!(next, RuleId::new(4), "ids are never reused");
    }

    #[test]
    fn test_unknown_rule_is_not_found() {
        let mut config = enabled_config(&["a"]);
        let missing = RuleId::new(9);
        assert!(matches!(config.remove_rule(missing), Err(BannerError::RuleNotFound(id)) if id == missing));
        assert!(config.set_rule_enabled(missing, true).is_err());
        assert!(config.record_ban(missing, 1, "x").is_err());
        assert_eq!(config.rules().len(), 1);
    }

    #[test]
    fn test_record_ban_lands_on_rule() {
        let mut config = enabled_config(&["a", "b"]);
        config.record_ban(RuleId::new(2), 500, "bob").unwrap();
        assert_eq!(config.rule(RuleId::new(2)).unwrap().banned_ids(), vec![500]);
        assert!(config.rule(RuleId::new(1)).unwrap().bans().is_empty());
        assert_eq!(config.ban_count(), 1);
    }

    #[test]
    fn test_restore_keeps_counter_ahead_of_ids() {
        let mut stored = rule("x");
        stored.assign_id(RuleId::new(7));
        let mut config = GuildConfig::restore(10, true, Some(3), vec![stored], 2);
        assert_eq!(config.next_rule_id(), 8);
        assert_eq!(config.add_rule(rule("y")), RuleId::new(8));
    }

    #[test]
    fn test_pattern_listing() {
        let config = GuildConfig::new(10);
        assert_eq!(config.pattern_listing(), "no patterns have been added yet.");

        let mut config = enabled_config(&["^spam", "^scam"]);
        config.set_rule_enabled(RuleId::new(2), false).unwrap();
        let listing = config.pattern_listing();
        assert!(listing.starts_with("Current patterns:"));
        assert!(listing.contains("1. `^spam` (enabled, 0 ban(s))"));
        assert!(listing.contains("2. `^scam` (disabled, 0 ban(s))"));
    }

    #[test]
    fn test_unsupported_rule_stays_disabled() {
        let (stored, _) = Rule::restore_stored(
            RuleId::new(1),
            "(?!admin)bot",
            true,
            false,
            RuleMetadata::new("admin", 1),
            Vec::new(),
        );
        let mut config = GuildConfig::restore(10, true, None, vec![stored], 2);
        config.add_rule(rule("^bot"));

        assert_eq!(config.validate("bot"), Some(RuleId::new(2)));
        assert!(matches!(
            config.set_rule_enabled(RuleId::new(1), true),
            Err(BannerError::InvalidPattern { .. })
        ));
        assert!(config.set_rule_enabled(RuleId::new(1), false).is_ok());
        assert!(config.pattern_listing().contains("1. `(?!admin)bot` (unsupported pattern, 0 ban(s))"));
    }
}
