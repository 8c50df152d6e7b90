// Tokenization engine - replaces PII in transaction fields with stable tokens
// and reverses them in AI-authored text for display

use crate::db::Database;
use crate::privacy::date_shift::DateShiftOracle;
use crate::privacy::token_store::{TokenStore, TokenType};
use crate::privacy::PrivacyError;
use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value};

/// Ordered (pattern, service label) rules for peer-payment descriptions.
/// Each pattern captures the trailing person name after the service marker.
/// New services are added by appending a row.
const PERSON_RULES: &[(&str, &str)] = &[
    (r"VENMO\s+(?:PAYMENT\s+)?([A-Z][A-Z\s]+)", "VENMO"),
    (
        r"ZELLE\s+(?:PAYMENT\s+)?(?:TO\s+|FROM\s+)?([A-Z][A-Z\s]+)",
        "ZELLE",
    ),
    (r"PAYPAL\s+\*([A-Z][A-Z\s]+)", "PAYPAL"),
    (r"CASH\s+APP\s+\*([A-Z][A-Z\s]+)", "CASH APP"),
];

struct PersonRule {
    // Matched against the uppercased original text to capture the name
    matcher: Regex,
    // Case-insensitive variant used to substitute in the caller's text
    replacer: Regex,
    service: &'static str,
}

pub struct Tokenizer {
    store: TokenStore,
    dates: DateShiftOracle,
    person_rules: Vec<PersonRule>,
    token_regex: Regex,
}

impl Tokenizer {
    pub fn new(db: Database) -> Self {
        let person_rules = PERSON_RULES
            .iter()
            .map(|(pattern, service)| PersonRule {
                matcher: Regex::new(pattern).unwrap(),
                replacer: Regex::new(&format!("(?i){}", pattern)).unwrap(),
                service,
            })
            .collect();

        Tokenizer {
            store: TokenStore::new(db.clone()),
            dates: DateShiftOracle::new(db),
            person_rules,
            token_regex: Regex::new(r"(MERCHANT_\d{4}|ACCOUNT_\d{3}|PERSON_\d{3})").unwrap(),
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn dates(&self) -> &DateShiftOracle {
        &self.dates
    }

    /// Tokenize a merchant name, e.g. "Whole Foods" -> "MERCHANT_0042".
    /// Category hints are stored as metadata for later prompt annotation.
    pub fn tokenize_merchant(
        &self,
        merchant: &str,
        category: Option<&str>,
        subcategory: Option<&str>,
    ) -> Result<String, PrivacyError> {
        let mut metadata = Map::new();
        if let Some(category) = category {
            metadata.insert("category".to_string(), Value::String(category.to_string()));
        }
        if let Some(subcategory) = subcategory {
            metadata.insert(
                "subcategory".to_string(),
                Value::String(subcategory.to_string()),
            );
        }
        let metadata = if metadata.is_empty() { None } else { Some(metadata) };
        self.store.get_or_create(TokenType::Merchant, merchant, metadata)
    }

    pub fn tokenize_account(
        &self,
        account_name: &str,
        account_type: Option<&str>,
    ) -> Result<String, PrivacyError> {
        let metadata = account_type.map(|t| {
            let mut m = Map::new();
            m.insert("account_type".to_string(), Value::String(t.to_string()));
            m
        });
        self.store.get_or_create(TokenType::Account, account_name, metadata)
    }

    /// Tokenize person names embedded in a description.
    ///
    /// Example: "VENMO JOHN SMITH" -> "VENMO PERSON_001". Rules are checked
    /// against the original text in a fixed order, each at most once per
    /// call; substitution never re-runs on already-substituted text.
    pub fn tokenize_description(&self, description: &str) -> Result<String, PrivacyError> {
        let mut result = description.to_string();
        let upper = description.to_uppercase();

        for rule in &self.person_rules {
            if let Some(captures) = rule.matcher.captures(&upper) {
                let person_name = captures[1].trim().to_string();
                if person_name.is_empty() {
                    continue;
                }
                let token = self
                    .store
                    .get_or_create(TokenType::Person, &person_name, None)?;
                let replacement = format!("{} {}", rule.service, token);
                result = rule
                    .replacer
                    .replace_all(&result, replacement.as_str())
                    .into_owned();
            }
        }

        Ok(result)
    }

    /// Shift a transaction date into the obfuscated calendar.
    pub fn shift_date(&self, date: NaiveDate) -> Result<NaiveDate, PrivacyError> {
        self.dates.shift(date)
    }

    /// Reverse a shifted date for display.
    pub fn unshift_date(&self, date: NaiveDate) -> Result<NaiveDate, PrivacyError> {
        self.dates.unshift(date)
    }

    /// Tokenize a transaction record for an AI prompt.
    ///
    /// Merchant and account fields become tokens (the merchant annotated
    /// with its category when `include_category` is set), descriptions go
    /// through person extraction, the date is shifted, and raw identifying
    /// fields are dropped. Amounts and category labels pass through.
    pub fn tokenize_transaction(
        &self,
        transaction: &Value,
        include_category: bool,
    ) -> Result<Value, PrivacyError> {
        let mut result = transaction
            .as_object()
            .cloned()
            .ok_or_else(|| {
                PrivacyError::Validation("transaction must be a JSON object".to_string())
            })?;

        if result.contains_key("merchant") || result.contains_key("clean_merchant") {
            let merchant = result
                .get("clean_merchant")
                .and_then(Value::as_str)
                .or_else(|| result.get("merchant").and_then(Value::as_str))
                .unwrap_or("")
                .to_string();
            let category = if include_category {
                result
                    .get("category_name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            } else {
                None
            };

            let token = self.tokenize_merchant(&merchant, category.as_deref(), None)?;
            let rendered = match &category {
                // Bracketed annotation is prompt formatting, not part of the token
                Some(category) => format!("{} [{}]", token, category),
                None => token,
            };
            result.insert("merchant".to_string(), Value::String(rendered));
            result.remove("clean_merchant");
            result.remove("raw_description");
        }

        if let Some(description) = result
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string)
        {
            result.insert(
                "description".to_string(),
                Value::String(self.tokenize_description(&description)?),
            );
        }

        if let Some(date_str) = result.get("date").and_then(Value::as_str).map(str::to_string) {
            let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
                PrivacyError::Validation(format!("unparseable transaction date: {}", e))
            })?;
            result.insert(
                "date".to_string(),
                Value::String(self.shift_date(date)?.to_string()),
            );
        }

        if let Some(account_name) = result
            .get("account_name")
            .and_then(Value::as_str)
            .map(str::to_string)
        {
            let account_type = result
                .get("account_type")
                .and_then(Value::as_str)
                .map(str::to_string);
            let token = self.tokenize_account(&account_name, account_type.as_deref())?;
            result.insert("account".to_string(), Value::String(token));
            result.remove("account_name");
            result.remove("account_type");
        }

        Ok(Value::Object(result))
    }

    /// Filter to merchants not yet in the token map, for bulk categorization
    /// flows that only send new merchants to the AI.
    pub fn unknown_merchants(&self, merchants: &[String]) -> Result<Vec<String>, PrivacyError> {
        let mut unknown = Vec::new();
        for merchant in merchants {
            if merchant.trim().is_empty() {
                continue;
            }
            if !self.store.contains(TokenType::Merchant, merchant)? {
                unknown.push(merchant.clone());
            }
        }
        Ok(unknown)
    }

    /// Replace every known token in `text` with its original value.
    ///
    /// Tokens with no record are left verbatim: partial detokenization is
    /// preferable to failing a whole AI response.
    pub fn detokenize(&self, text: &str) -> Result<String, PrivacyError> {
        let mut result = text.to_string();
        for found in self.token_regex.find_iter(text) {
            let token = found.as_str();
            if let Some(original) = self.store.get_original(token)? {
                result = result.replace(token, &original);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tokenizer() -> Tokenizer {
        Tokenizer::new(Database::in_memory().unwrap())
    }

    #[test]
    fn test_merchant_determinism_across_variants() {
        let tok = tokenizer();
        let t1 = tok.tokenize_merchant("whole foods", None, None).unwrap();
        let t2 = tok.tokenize_merchant("WHOLE FOODS ", None, None).unwrap();
        let t3 = tok.tokenize_merchant("Whole Foods", None, None).unwrap();
        assert_eq!(t1, t2);
        assert_eq!(t2, t3);
    }

    #[test]
    fn test_venmo_person_extraction() {
        let tok = tokenizer();
        let result = tok.tokenize_description("VENMO PAYMENT JOHN SMITH").unwrap();

        assert!(result.contains("VENMO"));
        assert!(result.contains("PERSON_"));
        assert!(!result.contains("JOHN SMITH"));
    }

    #[test]
    fn test_zelle_person_extraction() {
        let tok = tokenizer();
        let result = tok.tokenize_description("ZELLE TO JANE DOE").unwrap();

        assert!(result.contains("ZELLE"));
        assert!(result.contains("PERSON_"));
        assert!(!result.contains("JANE DOE"));
    }

    #[test]
    fn test_same_person_same_token_across_services() {
        let tok = tokenizer();
        let venmo = tok.tokenize_description("VENMO JOHN SMITH").unwrap();
        let zelle = tok.tokenize_description("ZELLE TO JOHN SMITH").unwrap();

        let re = Regex::new(r"PERSON_\d+").unwrap();
        let t1 = re.find(&venmo).unwrap().as_str();
        let t2 = re.find(&zelle).unwrap().as_str();
        assert_eq!(t1, t2);
    }

    #[test]
    fn test_description_without_service_passes_through() {
        let tok = tokenizer();
        let text = "POS PURCHASE 1234 GROCERY";
        assert_eq!(tok.tokenize_description(text).unwrap(), text);
    }

    #[test]
    fn test_paypal_and_cash_app_markers() {
        let tok = tokenizer();
        let paypal = tok.tokenize_description("PAYPAL *JANE DOE").unwrap();
        assert!(paypal.contains("PAYPAL PERSON_"));
        assert!(!paypal.contains("JANE DOE"));

        let cash = tok.tokenize_description("CASH APP *BOB JONES").unwrap();
        assert!(cash.contains("CASH APP PERSON_"));
        assert!(!cash.contains("BOB JONES"));
    }

    #[test]
    fn test_detokenize_round_trip() {
        let tok = tokenizer();
        let token = tok.tokenize_merchant("Whole Foods", None, None).unwrap();

        let text = format!("You spent $100 at {} last month.", token);
        let result = tok.detokenize(&text).unwrap();

        assert!(result.contains("Whole Foods"));
        assert!(!result.contains(&token));
    }

    #[test]
    fn test_detokenize_multiple_tokens() {
        let tok = tokenizer();
        let t1 = tok.tokenize_merchant("Whole Foods", None, None).unwrap();
        let t2 = tok.tokenize_merchant("Trader Joes", None, None).unwrap();

        let result = tok.detokenize(&format!("Compare {} vs {}", t1, t2)).unwrap();
        assert!(result.contains("Whole Foods"));
        assert!(result.contains("Trader Joes"));
    }

    #[test]
    fn test_detokenize_unknown_token_left_verbatim() {
        let tok = tokenizer();
        let text = "Charge at MERCHANT_9999 was unusual";
        assert_eq!(tok.detokenize(text).unwrap(), text);
    }

    #[test]
    fn test_tokenize_transaction() {
        let tok = tokenizer();
        let transaction = json!({
            "clean_merchant": "Whole Foods",
            "raw_description": "WHOLEFDS #1234 AUSTIN TX",
            "amount": -187.34,
            "date": "2024-01-15",
            "category_name": "Groceries",
            "account_name": "Chase Checking",
            "account_type": "checking",
        });

        let result = tok.tokenize_transaction(&transaction, true).unwrap();
        let result = result.as_object().unwrap();

        let merchant = result["merchant"].as_str().unwrap();
        assert!(merchant.starts_with("MERCHANT_"));
        assert!(merchant.contains("[Groceries]"));
        assert_eq!(result["amount"], json!(-187.34));
        assert_ne!(result["date"].as_str().unwrap(), "2024-01-15");
        assert!(result["account"].as_str().unwrap().starts_with("ACCOUNT_"));
        assert!(!result.contains_key("clean_merchant"));
        assert!(!result.contains_key("raw_description"));
        assert!(!result.contains_key("account_name"));
        assert!(!result.contains_key("account_type"));
    }

    #[test]
    fn test_tokenize_transaction_without_category_annotation() {
        let tok = tokenizer();
        let transaction = json!({
            "merchant": "Whole Foods",
            "category_name": "Groceries",
        });

        let result = tok.tokenize_transaction(&transaction, false).unwrap();
        let merchant = result["merchant"].as_str().unwrap();
        assert!(merchant.starts_with("MERCHANT_"));
        assert!(!merchant.contains('['));
    }

    #[test]
    fn test_transaction_date_shift_reversible() {
        let tok = tokenizer();
        let transaction = json!({ "date": "2024-01-15" });
        let result = tok.tokenize_transaction(&transaction, true).unwrap();

        let shifted =
            NaiveDate::parse_from_str(result["date"].as_str().unwrap(), "%Y-%m-%d").unwrap();
        let original = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(tok.unshift_date(shifted).unwrap(), original);
    }

    #[test]
    fn test_unknown_merchants_filter() {
        let tok = tokenizer();
        tok.tokenize_merchant("Whole Foods", None, None).unwrap();
        tok.tokenize_merchant("Trader Joes", None, None).unwrap();

        let merchants = vec![
            "Whole Foods".to_string(),
            "Target".to_string(),
            "Costco".to_string(),
            "Trader Joes".to_string(),
        ];
        let unknown = tok.unknown_merchants(&merchants).unwrap();

        assert_eq!(unknown, vec!["Target".to_string(), "Costco".to_string()]);
    }

    #[test]
    fn test_blank_merchant_rejected() {
        let tok = tokenizer();
        assert!(matches!(
            tok.tokenize_merchant("  ", None, None),
            Err(PrivacyError::Validation(_))
        ));
    }
}
