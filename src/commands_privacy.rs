// Privacy commands - settings, tokenization preview, and token inspection
// Implementation functions shared by the HTTP handlers

use crate::db::Database;
use crate::privacy::policy::KNOWN_PROVIDERS;
use crate::privacy::{DateShiftOracle, PrivacyPolicy, TokenStore, TokenType, Tokenizer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-provider obfuscation toggle as exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPrivacyConfig {
    pub provider: String,
    pub obfuscation_enabled: bool,
}

/// Token statistics, including the installation's date shift (0 until the
/// first date has been shifted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenStats {
    pub merchants: i64,
    pub accounts: i64,
    pub people: i64,
    pub date_shift_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyStatusResponse {
    pub obfuscation_enabled: bool,
    pub provider_settings: Vec<ProviderPrivacyConfig>,
    pub stats: TokenStats,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrivacySettingsUpdate {
    pub obfuscation_enabled: Option<bool>,
    pub provider_settings: Option<Vec<ProviderPrivacyConfig>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrivacyPreview {
    pub original: String,
    pub tokenized: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    pub token: String,
    pub original: String,
    pub token_type: String,
    pub metadata: Option<Value>,
    pub created_at: String,
}

pub async fn get_privacy_settings_impl(db: &Database) -> Result<PrivacyStatusResponse, String> {
    let policy = PrivacyPolicy::load(db).map_err(|e| e.to_string())?;
    let stats = get_token_stats_impl(db).await?;

    let provider_settings = KNOWN_PROVIDERS
        .iter()
        .map(|provider| ProviderPrivacyConfig {
            provider: provider.to_string(),
            // Flags for known providers are always present
            obfuscation_enabled: policy.provider_flag(provider).unwrap_or(true),
        })
        .collect();

    Ok(PrivacyStatusResponse {
        obfuscation_enabled: policy.obfuscation_enabled,
        provider_settings,
        stats,
    })
}

pub async fn update_privacy_settings_impl(
    db: &Database,
    updates: PrivacySettingsUpdate,
) -> Result<PrivacyStatusResponse, String> {
    let mut policy = PrivacyPolicy::load(db).map_err(|e| e.to_string())?;

    if let Some(enabled) = updates.obfuscation_enabled {
        policy.obfuscation_enabled = enabled;
    }
    if let Some(provider_settings) = &updates.provider_settings {
        for setting in provider_settings {
            policy.set_provider_flag(&setting.provider, setting.obfuscation_enabled);
        }
    }

    policy.save(db).map_err(|e| e.to_string())?;
    get_privacy_settings_impl(db).await
}

/// Tokenize arbitrary text as a merchant, for the settings UI demo.
pub async fn preview_tokenization_impl(
    db: &Database,
    text: String,
) -> Result<PrivacyPreview, String> {
    let tokenizer = Tokenizer::new(db.clone());
    let tokenized = tokenizer
        .tokenize_merchant(&text, None, None)
        .map_err(|e| e.to_string())?;

    Ok(PrivacyPreview {
        original: text,
        tokenized,
    })
}

pub async fn list_tokens_impl(
    db: &Database,
    token_type: Option<TokenType>,
    limit: i64,
    offset: i64,
) -> Result<Vec<TokenInfo>, String> {
    let store = TokenStore::new(db.clone());
    let records = store
        .list(token_type, limit, offset)
        .map_err(|e| e.to_string())?;

    Ok(records
        .into_iter()
        .map(|r| TokenInfo {
            token: r.token,
            original: r.original_value,
            token_type: r.token_type.as_str().to_string(),
            metadata: r.metadata.map(Value::Object),
            created_at: r.created_at,
        })
        .collect())
}

pub async fn get_token_stats_impl(db: &Database) -> Result<TokenStats, String> {
    let store = TokenStore::new(db.clone());
    let counts = store.stats().map_err(|e| e.to_string())?;

    // Read-only: stats must not seed the date shift singleton
    let shift = DateShiftOracle::new(db.clone())
        .current()
        .map_err(|e| e.to_string())?;

    Ok(TokenStats {
        merchants: counts.merchants,
        accounts: counts.accounts,
        people: counts.people,
        date_shift_days: shift.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let db = Database::in_memory().unwrap();

        let status = get_privacy_settings_impl(&db).await.unwrap();
        assert!(status.obfuscation_enabled);
        let ollama = status
            .provider_settings
            .iter()
            .find(|p| p.provider == "ollama")
            .unwrap();
        assert!(!ollama.obfuscation_enabled);

        let updated = update_privacy_settings_impl(
            &db,
            PrivacySettingsUpdate {
                obfuscation_enabled: Some(false),
                provider_settings: Some(vec![ProviderPrivacyConfig {
                    provider: "ollama".to_string(),
                    obfuscation_enabled: true,
                }]),
            },
        )
        .await
        .unwrap();

        assert!(!updated.obfuscation_enabled);
        let ollama = updated
            .provider_settings
            .iter()
            .find(|p| p.provider == "ollama")
            .unwrap();
        assert!(ollama.obfuscation_enabled);
    }

    #[tokio::test]
    async fn test_preview_creates_merchant_token() {
        let db = Database::in_memory().unwrap();
        let preview = preview_tokenization_impl(&db, "Whole Foods".to_string())
            .await
            .unwrap();

        assert_eq!(preview.original, "Whole Foods");
        assert_eq!(preview.tokenized, "MERCHANT_0001");
    }

    #[tokio::test]
    async fn test_preview_rejects_blank_text() {
        let db = Database::in_memory().unwrap();
        assert!(preview_tokenization_impl(&db, "   ".to_string())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_and_stats() {
        let db = Database::in_memory().unwrap();
        let tokenizer = Tokenizer::new(db.clone());
        tokenizer
            .tokenize_merchant("Whole Foods", Some("Groceries"), None)
            .unwrap();
        tokenizer.tokenize_account("Chase Checking", None).unwrap();

        let tokens = list_tokens_impl(&db, None, 50, 0).await.unwrap();
        assert_eq!(tokens.len(), 2);

        let merchants = list_tokens_impl(&db, Some(TokenType::Merchant), 50, 0)
            .await
            .unwrap();
        assert_eq!(merchants.len(), 1);
        assert_eq!(merchants[0].token_type, "merchant");

        let stats = get_token_stats_impl(&db).await.unwrap();
        assert_eq!(stats.merchants, 1);
        assert_eq!(stats.accounts, 1);
        assert_eq!(stats.people, 0);
        // No date has been shifted yet
        assert_eq!(stats.date_shift_days, 0);
    }
}
