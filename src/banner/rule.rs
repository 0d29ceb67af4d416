//! Entry rules
//!
//! A rule is one compiled name pattern together with its switches, who added
//! it, and every member it has banned.

use crate::banner::{BannerError, BannerResult};
use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Stable identifier of a rule within its guild
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RuleId(u64);

impl RuleId {
    /// Id carried by a rule that has not been added to a guild yet
    pub const UNASSIGNED: Self = Self(0);

    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Who created a rule and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMetadata {
    /// Display name of the creating administrator
    pub created_by: String,
    /// User id of the creating administrator
    pub created_by_id: u64,
    pub created_at: DateTime<Utc>,
}

impl RuleMetadata {
    pub fn new(created_by: impl Into<String>, created_by_id: u64) -> Self {
        Self {
            created_by: created_by.into(),
            created_by_id,
            created_at: Utc::now(),
        }
    }
}

/// Audit entry for one executed ban
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    /// Rule that triggered the ban
    pub rule_id: RuleId,
    pub banned_at: DateTime<Utc>,
    pub user_name: String,
    pub user_id: u64,
}

/// A name pattern that bans matching members
#[derive(Debug, Clone)]
pub struct Rule {
    id: RuleId,
    source: String,
    /// Compiled matcher, or the engine's diagnostic for a stored pattern
    /// that no longer compiles
    matcher: Result<Regex, String>,
    enabled: bool,
    case_fold: bool,
    metadata: RuleMetadata,
    bans: Vec<BanRecord>,
}

impl Rule {
    /// Compile a new, enabled rule.
    ///
    /// The rule receives its id when it is added to a guild.
    ///
    /// # Errors
    /// Returns `BannerError::InvalidPattern` carrying the regex engine's
    /// diagnostic when `pattern` does not compile.
    pub fn new(pattern: &str, case_fold: bool, metadata: RuleMetadata) -> BannerResult<Self> {
        Self::restore(RuleId::UNASSIGNED, pattern, true, case_fold, metadata, Vec::new())
    }

    /// Rebuild a rule from stored parts, recompiling its pattern.
    ///
    /// # Errors
    /// Returns `BannerError::InvalidPattern` when the stored pattern no longer
    /// compiles.
    pub fn restore(
        id: RuleId,
        pattern: &str,
        enabled: bool,
        case_fold: bool,
        metadata: RuleMetadata,
        bans: Vec<BanRecord>,
    ) -> BannerResult<Self> {
        let matcher = compile(pattern)?;
        Ok(Self {
            id,
            source: pattern.to_string(),
            matcher: Ok(matcher),
            enabled,
            case_fold,
            metadata,
            bans,
        })
    }

    /// Rebuild a stored rule even when its pattern does not compile.
    ///
    /// An uncompilable rule keeps its id, metadata and ban history but is
    /// disabled, never matches and refuses to be enabled again. The compile
    /// error is handed back for the caller to report.
    pub fn restore_stored(
        id: RuleId,
        pattern: &str,
        enabled: bool,
        case_fold: bool,
        metadata: RuleMetadata,
        bans: Vec<BanRecord>,
    ) -> (Self, Option<BannerError>) {
        let (matcher, enabled, error) = match compile(pattern) {
            Ok(matcher) => (Ok(matcher), enabled, None),
            Err(e) => {
                let message = match &e {
                    BannerError::InvalidPattern { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                (Err(message), false, Some(e))
            }
        };

        let rule = Self {
            id,
            source: pattern.to_string(),
            matcher,
            enabled,
            case_fold,
            metadata,
            bans,
        };
        (rule, error)
    }

    /// Whether `name` matches this rule.
    ///
    /// Disabled rules never match. The match must start at the first
    /// character of the (optionally lowercased) name but may end anywhere.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        let Ok(matcher) = &self.matcher else {
            return false;
        };
        if !self.enabled {
            return false;
        }

        if self.case_fold {
            matcher.is_match(&name.to_lowercase())
        } else {
            matcher.is_match(name)
        }
    }

    /// # Errors
    /// Returns `BannerError::InvalidPattern` for a stored pattern that does
    /// not compile.
    pub fn enable(&mut self) -> BannerResult<()> {
        if let Err(message) = &self.matcher {
            return Err(BannerError::InvalidPattern {
                pattern: self.source.clone(),
                message: message.clone(),
            });
        }
        self.enabled = true;
        Ok(())
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Append a ban to the history; duplicates are kept.
    pub fn record_ban(&mut self, user_id: u64, user_name: impl Into<String>) {
        self.bans.push(BanRecord {
            rule_id: self.id,
            banned_at: Utc::now(),
            user_name: user_name.into(),
            user_id,
        });
    }

    pub(crate) fn assign_id(&mut self, id: RuleId) {
        self.id = id;
        for ban in &mut self.bans {
            ban.rule_id = id;
        }
    }

    #[must_use]
    pub const fn id(&self) -> RuleId {
        self.id
    }

    /// The pattern as the administrator wrote it
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the pattern compiled and the rule can match at all
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        self.matcher.is_ok()
    }

    #[must_use]
    pub const fn case_fold(&self) -> bool {
        self.case_fold
    }

    #[must_use]
    pub const fn metadata(&self) -> &RuleMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn bans(&self) -> &[BanRecord] {
        &self.bans
    }

    /// Ids of every member banned by this rule, oldest first
    #[must_use]
    pub fn banned_ids(&self) -> Vec<u64> {
        self.bans.iter().map(|ban| ban.user_id).collect()
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.source == other.source
            && self.enabled == other.enabled
            && self.case_fold == other.case_fold
            && self.metadata == other.metadata
            && self.bans == other.bans
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// Compile the anchored matcher for `pattern`.
///
/// The bare pattern is compiled first: wrapping can turn an unbalanced
/// pattern such as `a)|(b` into a valid one.
fn compile(pattern: &str) -> BannerResult<Regex> {
    Regex::new(pattern).map_err(|e| invalid_pattern(pattern, &e))?;
    Regex::new(&format!(r"\A(?:{pattern})")).map_err(|e| invalid_pattern(pattern, &e))
}

fn invalid_pattern(pattern: &str, error: &regex::Error) -> BannerError {
    BannerError::InvalidPattern {
        pattern: pattern.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> RuleMetadata {
        RuleMetadata::new("admin", 42)
    }

    fn rule(pattern: &str, case_fold: bool) -> Rule {
        Rule::new(pattern, case_fold, metadata()).expect("pattern should compile")
    }

    #[test]
    fn test_new_rule_is_enabled_and_unassigned() {
        let rule = rule("aaa", false);
        assert!(rule.is_enabled());
        assert_eq!(rule.id(), RuleId::UNASSIGNED);
        assert!(rule.bans().is_empty());
        assert_eq!(rule.pattern(), "aaa");
    }

    #[test]
    fn test_enable_disable_toggle() {
        let mut rule = rule("aaa", false);
        rule.disable();
        assert!(!rule.is_enabled());
        rule.disable();
        assert!(!rule.is_enabled());
        rule.enable().unwrap();
        assert!(rule.is_enabled());
    }

    #[test]
    fn test_matches_is_anchored_prefix_match() {
        let rule = rule("aaa", false);
        assert!(rule.matches("aaa"));
        assert!(rule.matches("aaaa"));
        assert!(!rule.matches("baa"));
        assert!(!rule.matches("Aaa"));
        assert!(!rule.matches("xaaa"));
    }

    #[test]
    fn test_disabled_rule_never_matches() {
        let mut rule = rule("aaa", false);
        rule.disable();
        for name in ["aaa", "aaaa", "baa", "Aaa", ""] {
            assert!(!rule.matches(name), "{name} should not match");
        }
    }

    #[test]
    fn test_alternation_stays_anchored() {
        let rule = rule("foo|bar", false);
        assert!(rule.matches("foobar"));
        assert!(rule.matches("barfoo"));
        assert!(!rule.matches("xbar"));
    }

    #[test]
    fn test_case_fold_lowercases_name_only() {
        let folded = rule("spam", true);
        assert!(folded.matches("SPAMbot"));
        assert!(folded.matches("Spam"));

        let upper = rule("SPAM", true);
        assert!(!upper.matches("SPAM"), "pattern itself is not folded");

        let exact = rule("spam", false);
        assert!(!exact.matches("SPAM"));
    }

    #[test]
    fn test_invalid_pattern_reports_diagnostic() {
        let result = Rule::new("(unclosed", false, metadata());
        match result {
            Err(BannerError::InvalidPattern { pattern, message }) => {
                assert_eq!(pattern, "(unclosed");
                assert!(!message.is_empty());
            }
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn test_pattern_valid_only_when_wrapped_is_rejected() {
        assert!(Rule::new("a)|(b", false, metadata()).is_err());
    }

    #[test]
    fn test_record_ban_appends_without_dedup() {
        let mut rule = rule("bad", false);
        rule.assign_id(RuleId::new(4));
        rule.record_ban(100, "badguy");
        rule.record_ban(100, "badguy");
        assert_eq!(rule.banned_ids(), vec![100, 100]);
        assert!(rule.bans().iter().all(|ban| ban.rule_id == RuleId::new(4)));
    }

    #[test]
    fn test_restore_stored_keeps_uncompilable_rule_disabled() {
        let bans = vec![BanRecord {
            rule_id: RuleId::new(7),
            banned_at: Utc::now(),
            user_name: "adminbot".to_string(),
            user_id: 12,
        }];
        let (mut rule, error) =
            Rule::restore_stored(RuleId::new(7), "(?!admin)bot", true, false, metadata(), bans);

        assert!(matches!(error, Some(BannerError::InvalidPattern { .. })));
        assert_eq!(rule.id(), RuleId::new(7));
        assert_eq!(rule.pattern(), "(?!admin)bot");
        assert_eq!(rule.banned_ids(), vec![12]);
        assert!(!rule.is_enabled());
        assert!(!rule.is_supported());
        assert!(!rule.matches("bot"));

        assert!(matches!(rule.enable(), Err(BannerError::InvalidPattern { .. })));
        assert!(!rule.is_enabled());
    }

    #[test]
    fn test_restore_stored_compiles_valid_pattern() {
        let (rule, error) =
            Rule::restore_stored(RuleId::new(1), "^spam", true, true, metadata(), Vec::new());
        assert!(error.is_none());
        assert!(rule.is_supported());
        assert!(rule.matches("SPAMMER"));
    }
}
