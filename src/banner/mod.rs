//! Entry banner for Entry Warden
//!
//! This module holds the join-time ban logic: rules, the per-guild
//! configuration that orders them, the platform seam used to act on a match,
//! and the controller that ties them to a store.

mod controller;
mod error;
mod guild;
mod platform;
mod rule;

pub use controller::{GuildSummary, JoinOutcome, MemberJoin, ModerationController};
pub use error::{BannerError, BannerResult};
pub use guild::GuildConfig;
#[cfg(test)]
pub use platform::MockPlatform;
pub use platform::{Platform, PlatformError, PlatformResult, SerenityPlatform};
pub use rule::{BanRecord, Rule, RuleId, RuleMetadata};
