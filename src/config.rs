//! Configuration and settings management
//!
//! Loads settings from environment variables (optionally layered over
//! `config/*` files). Missing or malformed values are a fatal startup error;
//! `main` refuses to run without a token, an admin list and a database URL.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token (`BOT_TOKEN`)
    pub bot_token: String,

    /// Comma-separated list of administrator Telegram IDs (`ADMIN_ID`)
    #[serde(rename = "admin_id")]
    pub admin_id_str: String,

    /// Public channel every added movie is re-broadcast to (`CHANNEL_ID`)
    pub channel_id: i64,

    /// PostgreSQL connection string (`DATABASE_URL`)
    pub database_url: String,

    /// The bot's own @username, stamped into sanitized captions
    #[serde(default = "default_bot_username")]
    pub bot_username: String,
}

fn default_bot_username() -> String {
    "@kino_gate_bot".to_string()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading or validation fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Environment::default() auto-converts UPPER_SNAKE_CASE to snake_case;
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let settings: Self = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject configurations the bot cannot run with.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token.is_empty() {
            return Err(ConfigError::Message("BOT_TOKEN is empty".into()));
        }
        if self.database_url.is_empty() {
            return Err(ConfigError::Message("DATABASE_URL is empty".into()));
        }
        if self.admin_ids().is_empty() {
            return Err(ConfigError::Message(
                "ADMIN_ID contains no valid Telegram IDs".into(),
            ));
        }
        Ok(())
    }

    /// Returns the set of Telegram IDs with administrator access
    #[must_use]
    pub fn admin_ids(&self) -> HashSet<i64> {
        self.admin_id_str
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .filter_map(|id| id.parse::<i64>().ok())
            .collect()
    }

    /// True if the given Telegram ID belongs to an administrator
    #[must_use]
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids().contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_admins(admin_id: &str) -> Settings {
        Settings {
            bot_token: "dummy".to_string(),
            admin_id_str: admin_id.to_string(),
            channel_id: -100_123_456_789,
            database_url: "postgresql://localhost/kino".to_string(),
            bot_username: default_bot_username(),
        }
    }

    #[test]
    fn test_admin_list_parsing() {
        // Comma
        let settings = settings_with_admins("123,456");
        let admins = settings.admin_ids();
        assert!(admins.contains(&123));
        assert!(admins.contains(&456));
        assert_eq!(admins.len(), 2);

        // Semicolon and mixed whitespace
        let settings = settings_with_admins("333; 444, 555");
        let admins = settings.admin_ids();
        assert!(admins.contains(&333));
        assert!(admins.contains(&444));
        assert!(admins.contains(&555));
        assert_eq!(admins.len(), 3);

        // Bad tokens are skipped
        let settings = settings_with_admins("abc, 777");
        let admins = settings.admin_ids();
        assert!(admins.contains(&777));
        assert_eq!(admins.len(), 1);
    }

    #[test]
    fn test_validate_rejects_empty_admin_list() {
        let settings = settings_with_admins("not-a-number");
        assert!(settings.validate().is_err());

        let settings = settings_with_admins("42");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_is_admin() {
        let settings = settings_with_admins("11, 22");
        assert!(settings.is_admin(11));
        assert!(settings.is_admin(22));
        assert!(!settings.is_admin(33));
    }
}
