//! Error types for the entry banner
//!
//! This module defines the errors that administrative operations and join
//! processing can produce, and how they are worded for the invoking user.

use crate::banner::{PlatformError, RuleId};
use crate::store::StoreError;
use thiserror::Error;

/// Errors that can occur during entry banner operations
#[derive(Debug, Error)]
pub enum BannerError {
    /// The supplied expression does not compile
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// No rule with this id exists in the guild
    #[error("Rule not found: {0}")]
    RuleNotFound(RuleId),

    /// The operation needs a log channel and none is set
    #[error("Log channel not configured")]
    LogChannelNotConfigured,

    /// The channel does not belong to the guild being configured
    #[error("Channel {channel_id} is not part of guild {guild_id}")]
    ChannelNotInGuild { channel_id: u64, guild_id: u64 },

    /// Ban or send failed on the chat platform
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Durable storage rejected a write or read
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl BannerError {
    /// Text shown to the administrator who triggered the error.
    ///
    /// Expected errors are explained; platform and persistence failures get a
    /// generic reply so internal detail never reaches the guild.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidPattern { message, .. } => {
                format!("error; failed to compile the provided regex:\n```\n{message}\n```")
            }
            Self::RuleNotFound(id) => format!("error; there is no pattern with id {id}."),
            Self::LogChannelNotConfigured => {
                "error; no log channel is configured, set one first using `entrybanner set-log-channel`."
                    .to_string()
            }
            Self::ChannelNotInGuild { .. } => "error; invalid channel id.".to_string(),
            Self::Platform(_) | Self::Persistence(_) => {
                "internal error; if this persists please contact the bot developer.".to_string()
            }
        }
    }

    /// Whether the error is an expected user mistake rather than a fault.
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        !matches!(self, Self::Platform(_) | Self::Persistence(_))
    }
}

/// Result type for entry banner operations
pub type BannerResult<T> = Result<T, BannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BannerError::RuleNotFound(RuleId::new(3));
        assert_eq!(error.to_string(), "Rule not found: 3");

        let error = BannerError::LogChannelNotConfigured;
        assert_eq!(error.to_string(), "Log channel not configured");

        let error = BannerError::from(StoreError::Corrupt("bad row".to_string()));
        assert_eq!(error.to_string(), "Persistence error: Corrupt store data: bad row");
    }

    #[test]
    fn test_user_message_hides_internal_failures() {
        let error = BannerError::from(StoreError::Corrupt("secret path".to_string()));
        assert!(!error.is_expected());
        assert!(!error.user_message().contains("secret path"));

        let error = BannerError::from(PlatformError::Other("missing permissions".to_string()));
        assert!(!error.is_expected());
        assert!(error.user_message().starts_with("internal error"));
    }

    #[test]
    fn test_user_message_explains_expected_errors() {
        let error = BannerError::InvalidPattern {
            pattern: "(".to_string(),
            message: "unclosed group".to_string(),
        };
        assert!(error.is_expected());
        assert!(error.user_message().contains("unclosed group"));

        let error = BannerError::LogChannelNotConfigured;
        assert!(error.user_message().contains("set-log-channel"));

        let error = BannerError::RuleNotFound(RuleId::new(7));
        assert!(error.user_message().contains('7'));
    }
}
