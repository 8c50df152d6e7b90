// Token store - persistent registry mapping normalized PII values to stable tokens

use crate::db::Database;
use crate::privacy::PrivacyError;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;

/// Kinds of PII the store pseudonymizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Merchant,
    Account,
    Person,
}

impl TokenType {
    pub const ALL: [TokenType; 3] = [TokenType::Merchant, TokenType::Account, TokenType::Person];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Merchant => "merchant",
            TokenType::Account => "account",
            TokenType::Person => "person",
        }
    }

    pub fn parse(s: &str) -> Option<TokenType> {
        match s {
            "merchant" => Some(TokenType::Merchant),
            "account" => Some(TokenType::Account),
            "person" => Some(TokenType::Person),
            _ => None,
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            TokenType::Merchant => "MERCHANT",
            TokenType::Account => "ACCOUNT",
            TokenType::Person => "PERSON",
        }
    }

    /// Zero-padded width of the sequence number in the token string.
    fn digits(&self) -> usize {
        match self {
            TokenType::Merchant => 4,
            TokenType::Account => 3,
            TokenType::Person => 3,
        }
    }

    fn format_token(&self, number: i64) -> String {
        format!("{}_{:0width$}", self.prefix(), number, width = self.digits())
    }
}

/// One PII value's pseudonym. Append-only: `original_value` and `token`
/// never change after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token_type: TokenType,
    pub original_value: String,
    pub normalized_value: String,
    pub token: String,
    pub metadata: Option<Map<String, Value>>,
    pub created_at: String,
}

/// Per-type token counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenCounts {
    pub merchants: i64,
    pub accounts: i64,
    pub people: i64,
}

/// Persistent token registry. Lookups go through an in-process read-through
/// cache, but the SQLite UNIQUE constraints are the source of truth: other
/// worker processes may be writing to the same database.
pub struct TokenStore {
    db: Database,
    cache: Mutex<HashMap<(TokenType, String), String>>,
    reverse_cache: Mutex<HashMap<String, String>>,
}

const CREATE_ATTEMPTS: usize = 5;

fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}

impl TokenStore {
    pub fn new(db: Database) -> Self {
        TokenStore {
            db,
            cache: Mutex::new(HashMap::new()),
            reverse_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Return the stable token for `raw_value`, creating one on first sight.
    ///
    /// Matching is case- and whitespace-insensitive. New metadata keys are
    /// merged into an existing record; keys already present are never
    /// overwritten. Blank input is a validation error.
    pub fn get_or_create(
        &self,
        token_type: TokenType,
        raw_value: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<String, PrivacyError> {
        if raw_value.trim().is_empty() {
            return Err(PrivacyError::Validation(
                "cannot tokenize an empty value".to_string(),
            ));
        }
        let normalized = normalize(raw_value);

        if let Some(token) = self.cached_token(token_type, &normalized)? {
            if let Some(meta) = &metadata {
                self.merge_metadata(&token, meta)?;
            }
            return Ok(token);
        }

        let conn = self.db.get_connection();
        let conn = conn.lock().map_err(|_| PrivacyError::Lock)?;

        if let Some(existing) = find_record(&conn, token_type, &normalized)? {
            if let Some(meta) = &metadata {
                merge_metadata_locked(&conn, &existing.token, meta)?;
            }
            self.remember(token_type, &normalized, &existing.token, &existing.original_value)?;
            return Ok(existing.token);
        }

        let metadata_json = metadata
            .as_ref()
            .filter(|m| !m.is_empty())
            .map(|m| Value::Object(m.clone()).to_string());

        // Another process may insert the same value (or claim the same
        // sequence number) between our count and our insert. The UNIQUE
        // constraints catch both; re-read and retry rather than erroring.
        for _ in 0..CREATE_ATTEMPTS {
            let next: i64 = conn.query_row(
                "SELECT COUNT(*) FROM token_maps WHERE token_type = ?1",
                [token_type.as_str()],
                |row| row.get(0),
            )?;
            let token = token_type.format_token(next + 1);

            let inserted = conn.execute(
                "INSERT INTO token_maps (token_type, original_value, normalized_value, token, metadata_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    token_type.as_str(),
                    raw_value,
                    normalized,
                    token,
                    metadata_json
                ],
            );

            match inserted {
                Ok(_) => {
                    self.remember(token_type, &normalized, &token, raw_value)?;
                    return Ok(token);
                }
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    if let Some(existing) = find_record(&conn, token_type, &normalized)? {
                        // The same value won the race elsewhere; its token is
                        // authoritative.
                        if let Some(meta) = &metadata {
                            merge_metadata_locked(&conn, &existing.token, meta)?;
                        }
                        self.remember(
                            token_type,
                            &normalized,
                            &existing.token,
                            &existing.original_value,
                        )?;
                        return Ok(existing.token);
                    }
                    // Token number collision with a different value; recount.
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(PrivacyError::AllocationConflict)
    }

    /// Reverse lookup: the first-seen display value for a token.
    pub fn get_original(&self, token: &str) -> Result<Option<String>, PrivacyError> {
        {
            let reverse = self.reverse_cache.lock().map_err(|_| PrivacyError::Lock)?;
            if let Some(original) = reverse.get(token) {
                return Ok(Some(original.clone()));
            }
        }

        let conn = self.db.get_connection();
        let conn = conn.lock().map_err(|_| PrivacyError::Lock)?;
        let original: Option<String> = conn
            .query_row(
                "SELECT original_value FROM token_maps WHERE token = ?1",
                [token],
                |row| row.get(0),
            )
            .optional()?;
        drop(conn);

        if let Some(original) = &original {
            let mut reverse = self.reverse_cache.lock().map_err(|_| PrivacyError::Lock)?;
            reverse.insert(token.to_string(), original.clone());
        }
        Ok(original)
    }

    /// Whether a value already has a token, without creating one.
    pub fn contains(&self, token_type: TokenType, raw_value: &str) -> Result<bool, PrivacyError> {
        let normalized = normalize(raw_value);
        if self.cached_token(token_type, &normalized)?.is_some() {
            return Ok(true);
        }
        let conn = self.db.get_connection();
        let conn = conn.lock().map_err(|_| PrivacyError::Lock)?;
        Ok(find_record(&conn, token_type, &normalized)?.is_some())
    }

    /// Page through records, newest first.
    pub fn list(
        &self,
        token_type: Option<TokenType>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TokenRecord>, PrivacyError> {
        let conn = self.db.get_connection();
        let conn = conn.lock().map_err(|_| PrivacyError::Lock)?;

        let mut records = Vec::new();
        match token_type {
            Some(tt) => {
                let mut stmt = conn.prepare(
                    "SELECT token_type, original_value, normalized_value, token, metadata_json, created_at
                     FROM token_maps WHERE token_type = ?1
                     ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt.query_map(params![tt.as_str(), limit, offset], row_to_record)?;
                for row in rows {
                    records.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT token_type, original_value, normalized_value, token, metadata_json, created_at
                     FROM token_maps
                     ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt.query_map(params![limit, offset], row_to_record)?;
                for row in rows {
                    records.push(row?);
                }
            }
        }
        Ok(records)
    }

    pub fn stats(&self) -> Result<TokenCounts, PrivacyError> {
        let conn = self.db.get_connection();
        let conn = conn.lock().map_err(|_| PrivacyError::Lock)?;

        let mut counts = TokenCounts::default();
        let mut stmt =
            conn.prepare("SELECT token_type, COUNT(*) FROM token_maps GROUP BY token_type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (type_str, count) = row?;
            match TokenType::parse(&type_str) {
                Some(TokenType::Merchant) => counts.merchants = count,
                Some(TokenType::Account) => counts.accounts = count,
                Some(TokenType::Person) => counts.people = count,
                None => {}
            }
        }
        Ok(counts)
    }

    fn cached_token(
        &self,
        token_type: TokenType,
        normalized: &str,
    ) -> Result<Option<String>, PrivacyError> {
        let cache = self.cache.lock().map_err(|_| PrivacyError::Lock)?;
        Ok(cache.get(&(token_type, normalized.to_string())).cloned())
    }

    fn remember(
        &self,
        token_type: TokenType,
        normalized: &str,
        token: &str,
        original: &str,
    ) -> Result<(), PrivacyError> {
        let mut cache = self.cache.lock().map_err(|_| PrivacyError::Lock)?;
        cache.insert((token_type, normalized.to_string()), token.to_string());
        drop(cache);
        let mut reverse = self.reverse_cache.lock().map_err(|_| PrivacyError::Lock)?;
        reverse.insert(token.to_string(), original.to_string());
        Ok(())
    }

    fn merge_metadata(
        &self,
        token: &str,
        metadata: &Map<String, Value>,
    ) -> Result<(), PrivacyError> {
        if metadata.is_empty() {
            return Ok(());
        }
        let conn = self.db.get_connection();
        let conn = conn.lock().map_err(|_| PrivacyError::Lock)?;
        merge_metadata_locked(&conn, token, metadata)
    }
}

fn find_record(
    conn: &Connection,
    token_type: TokenType,
    normalized: &str,
) -> Result<Option<TokenRecord>, PrivacyError> {
    let record = conn
        .query_row(
            "SELECT token_type, original_value, normalized_value, token, metadata_json, created_at
             FROM token_maps WHERE token_type = ?1 AND normalized_value = ?2",
            params![token_type.as_str(), normalized],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TokenRecord> {
    let type_str: String = row.get(0)?;
    let metadata_json: Option<String> = row.get(4)?;
    Ok(TokenRecord {
        token_type: TokenType::parse(&type_str).unwrap_or(TokenType::Merchant),
        original_value: row.get(1)?,
        normalized_value: row.get(2)?,
        token: row.get(3)?,
        metadata: metadata_json
            .as_deref()
            .and_then(|j| serde_json::from_str::<Map<String, Value>>(j).ok()),
        created_at: row.get(5)?,
    })
}

/// Add metadata keys a record does not have yet. Existing keys keep their
/// first-stored values; the record itself stays append-only.
fn merge_metadata_locked(
    conn: &Connection,
    token: &str,
    metadata: &Map<String, Value>,
) -> Result<(), PrivacyError> {
    let stored_json: Option<Option<String>> = conn
        .query_row(
            "SELECT metadata_json FROM token_maps WHERE token = ?1",
            [token],
            |row| row.get(0),
        )
        .optional()?;
    let Some(stored_json) = stored_json else {
        return Ok(());
    };

    let mut stored: Map<String, Value> = stored_json
        .as_deref()
        .and_then(|j| serde_json::from_str(j).ok())
        .unwrap_or_default();

    let mut changed = false;
    for (key, value) in metadata {
        if !stored.contains_key(key) {
            stored.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    if changed {
        conn.execute(
            "UPDATE token_maps SET metadata_json = ?1 WHERE token = ?2",
            params![Value::Object(stored).to_string(), token],
        )?;
    }
    Ok(())
}
