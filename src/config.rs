//! Bot configuration
//!
//! Settings and user-facing phrases are read from a YAML file. Every field has
//! a default, so a missing file or a partial file is fine.

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/bot.yaml";

/// Errors that can occur while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A social media platform shown by the `social` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLink {
    pub platform: String,
    pub link: String,
}

/// Top level bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    // Prefix for text commands
    pub prefix: String,
    // Extra bot owners besides the application owner
    pub owners: Vec<u64>,
    // Name of the role given to brigged members
    pub brig_role: String,
    // Name of the role required to use `poke`
    pub poke_role: String,
    // Game shown in the bot's presence
    pub activity: String,
    // JSON file holding the brig registry
    pub data_file: String,
    // Directory for the rolling command log
    pub log_dir: String,
    // Seconds between expiry sweeps
    pub sweep_interval_secs: u64,
    // Offset from UTC, in minutes, used when showing sentence windows
    pub display_utc_offset_minutes: i32,
    // Title of the `social` embed
    pub social_title: String,
    pub social_links: Vec<SocialLink>,
    pub phrases: Phrases,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: ";".to_string(),
            owners: Vec::new(),
            brig_role: "THE BRIG".to_string(),
            poke_role: "Poker".to_string(),
            activity: "bowling :)".to_string(),
            data_file: "data/brig.json".to_string(),
            log_dir: "logs".to_string(),
            sweep_interval_secs: 1,
            // Arizona does not observe DST
            display_utc_offset_minutes: -7 * 60,
            social_title: "Social Media".to_string(),
            social_links: Vec::new(),
            phrases: Phrases::default(),
        }
    }
}

impl BotConfig {
    /// Load the configuration from `path`, falling back to defaults if the file is absent
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or is not valid YAML.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let config = Self::from_yaml(&content)?;
                info!(path = %path.display(), "Loaded configuration");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse a configuration from YAML text
    ///
    /// # Errors
    /// Returns an error if the text is not valid YAML for this structure.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to a map
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Offset used to render sentence windows
    #[must_use]
    pub fn display_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.display_utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }
}

/// User-facing phrases
///
/// Placeholders in braces (`{member}`, `{duration}`, `{role}`, `{command}`)
/// are filled in by [`render`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Phrases {
    pub shutdown: String,
    pub poke: String,
    pub no_dms: String,
    pub not_admin: String,
    pub missing_argument: String,
    pub unknown_command: String,
    pub missing_role: String,
    pub unknown_issue: String,
    pub invalid_num_input: String,
    pub brig_empty: String,
    pub brig_add: String,
    pub brig_remove: String,
    pub not_in_brig: String,
    pub no_role: String,
}

impl Default for Phrases {
    fn default() -> Self {
        Self {
            shutdown: "Shutting down. Bye!".to_string(),
            poke: "Hey! Stop poking me.".to_string(),
            no_dms: "This command can't be used in direct messages.".to_string(),
            not_admin: "You must be an administrator to use this command.".to_string(),
            missing_argument: "Missing or invalid argument for `{command}`.".to_string(),
            unknown_command: "I don't know that command.".to_string(),
            missing_role: "You need the {role} role to use this command.".to_string(),
            unknown_issue: "An unknown issue occurred. Please contact the bot operator."
                .to_string(),
            invalid_num_input: "The duration must be a positive whole number of minutes."
                .to_string(),
            brig_empty: "The brig is empty.".to_string(),
            brig_add: "{member} has been put in the brig {duration}.".to_string(),
            brig_remove: "{member} has been released from the brig.".to_string(),
            not_in_brig: "{member} is not in the brig.".to_string(),
            no_role: "The role {role} doesn't exist, so {command} failed.".to_string(),
        }
    }
}

/// Fill `{name}` placeholders in a phrase
#[must_use]
pub fn render<V: AsRef<str>>(template: &str, values: &[(&str, V)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("{{{name}}}"), value.as_ref())
        })
}
