// Privacy policy gate - master + per-provider obfuscation decision

use crate::db::Database;
use crate::privacy::PrivacyError;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

/// Providers with an explicit settings toggle, in display order.
pub const KNOWN_PROVIDERS: [&str; 4] = ["ollama", "openrouter", "anthropic", "openai"];

const SETTINGS_KEY: &str = "default";

/// Singleton privacy policy. Local providers default to no obfuscation
/// (data never leaves the machine); cloud providers default to obfuscation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyPolicy {
    pub obfuscation_enabled: bool,
    pub ollama_obfuscation: bool,
    pub openrouter_obfuscation: bool,
    pub anthropic_obfuscation: bool,
    pub openai_obfuscation: bool,
}

impl Default for PrivacyPolicy {
    fn default() -> Self {
        PrivacyPolicy {
            obfuscation_enabled: true,
            ollama_obfuscation: false,
            openrouter_obfuscation: true,
            anthropic_obfuscation: true,
            openai_obfuscation: true,
        }
    }
}

impl PrivacyPolicy {
    /// Load the stored policy, seeding defaults race-safely on first access.
    pub fn load(db: &Database) -> Result<PrivacyPolicy, PrivacyError> {
        let defaults_json = serde_json::to_string(&PrivacyPolicy::default())
            .map_err(|_| PrivacyError::Singleton("privacy_settings"))?;

        let conn = db.get_connection();
        let conn = conn.lock().map_err(|_| PrivacyError::Lock)?;
        conn.execute(
            "INSERT OR IGNORE INTO privacy_settings (id, settings_json) VALUES (?1, ?2)",
            rusqlite::params![SETTINGS_KEY, defaults_json],
        )?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT settings_json FROM privacy_settings WHERE id = ?1",
                [SETTINGS_KEY],
                |row| row.get(0),
            )
            .optional()?;
        drop(conn);

        let json = stored.ok_or(PrivacyError::Singleton("privacy_settings"))?;
        serde_json::from_str(&json).map_err(|_| PrivacyError::Singleton("privacy_settings"))
    }

    pub fn save(&self, db: &Database) -> Result<(), PrivacyError> {
        let json = serde_json::to_string(self)
            .map_err(|_| PrivacyError::Singleton("privacy_settings"))?;
        let conn = db.get_connection();
        let conn = conn.lock().map_err(|_| PrivacyError::Lock)?;
        conn.execute(
            "INSERT OR REPLACE INTO privacy_settings (id, settings_json, updated_at)
             VALUES (?1, ?2, datetime('now'))",
            rusqlite::params![SETTINGS_KEY, json],
        )?;
        Ok(())
    }

    /// Should payloads for `provider` be routed through tokenization?
    /// Unknown providers are treated as cloud providers: obfuscate.
    pub fn should_obfuscate(&self, provider: &str) -> bool {
        if !self.obfuscation_enabled {
            return false;
        }
        match self.provider_flag(provider) {
            Some(enabled) => enabled,
            None => true,
        }
    }

    pub fn provider_flag(&self, provider: &str) -> Option<bool> {
        match provider.to_lowercase().as_str() {
            "ollama" => Some(self.ollama_obfuscation),
            "openrouter" => Some(self.openrouter_obfuscation),
            "anthropic" => Some(self.anthropic_obfuscation),
            "openai" => Some(self.openai_obfuscation),
            _ => None,
        }
    }

    /// Set a provider flag; unknown providers are ignored, matching how the
    /// settings endpoint treats unrecognized entries.
    pub fn set_provider_flag(&mut self, provider: &str, enabled: bool) {
        match provider.to_lowercase().as_str() {
            "ollama" => self.ollama_obfuscation = enabled,
            "openrouter" => self.openrouter_obfuscation = enabled,
            "anthropic" => self.anthropic_obfuscation = enabled,
            "openai" => self.openai_obfuscation = enabled,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_installation_defaults() {
        let db = Database::in_memory().unwrap();
        let policy = PrivacyPolicy::load(&db).unwrap();

        assert!(policy.obfuscation_enabled);
        assert!(!policy.ollama_obfuscation);
        assert!(policy.openrouter_obfuscation);
        assert!(policy.anthropic_obfuscation);
        assert!(policy.openai_obfuscation);
    }

    #[test]
    fn test_master_toggle_overrides_providers() {
        let mut policy = PrivacyPolicy::default();
        policy.obfuscation_enabled = false;

        for provider in KNOWN_PROVIDERS {
            assert!(!policy.should_obfuscate(provider));
        }
        assert!(!policy.should_obfuscate("somecloud"));
    }

    #[test]
    fn test_per_provider_flags() {
        let policy = PrivacyPolicy::default();
        assert!(!policy.should_obfuscate("ollama"));
        assert!(policy.should_obfuscate("openrouter"));
        assert!(policy.should_obfuscate("anthropic"));
        assert!(policy.should_obfuscate("OpenAI"));
    }

    #[test]
    fn test_unknown_provider_fails_safe() {
        let policy = PrivacyPolicy::default();
        assert!(policy.should_obfuscate("somecloud"));
    }

    #[test]
    fn test_changes_persist() {
        let db = Database::in_memory().unwrap();
        let mut policy = PrivacyPolicy::load(&db).unwrap();
        policy.set_provider_flag("ollama", true);
        policy.save(&db).unwrap();

        let reloaded = PrivacyPolicy::load(&db).unwrap();
        assert!(reloaded.ollama_obfuscation);
    }

    #[test]
    fn test_unknown_provider_update_ignored() {
        let mut policy = PrivacyPolicy::default();
        let before = policy.clone();
        policy.set_provider_flag("somecloud", false);
        assert_eq!(policy, before);
    }
}
