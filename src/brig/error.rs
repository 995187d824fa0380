//! Error types for the brig registry
//!
//! This module defines the errors that can occur while brigging or releasing a member.

use thiserror::Error;

/// Errors that can occur during brig operations
#[derive(Debug, Error)]
pub enum BrigError {
    /// The brig role does not exist in the guild
    #[error("Role \"{role}\" does not exist in guild {guild_id}")]
    RoleMissing { role: String, guild_id: u64 },

    /// The member could not be fetched from the guild
    #[error("Member {member_id} not found in guild {guild_id}")]
    MemberNotFound { guild_id: u64, member_id: u64 },

    /// Sentence length was zero, negative or too large to schedule
    #[error("Invalid brig duration: {0} minutes")]
    InvalidDuration(i64),

    /// Discord API error
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<poise::serenity_prelude::Error>),

    /// The brig file could not be read or written
    #[error("Brig file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The brig file is not valid JSON in the expected shape
    #[error("Malformed brig file: {0}")]
    Format(#[from] serde_json::Error),
}

impl From<poise::serenity_prelude::Error> for BrigError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::DiscordApi(Box::new(error))
    }
}

/// Result type for brig operations
pub type BrigResult<T> = Result<T, BrigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BrigError::RoleMissing {
            role: "THE BRIG".to_string(),
            guild_id: 1,
        };
        assert_eq!(
            error.to_string(),
            "Role \"THE BRIG\" does not exist in guild 1"
        );

        let error = BrigError::InvalidDuration(-5);
        assert_eq!(error.to_string(), "Invalid brig duration: -5 minutes");

        let error = BrigError::MemberNotFound {
            guild_id: 1,
            member_id: 42,
        };
        assert_eq!(error.to_string(), "Member 42 not found in guild 1");
    }
}
