// Privacy module - reversible pseudonymization for AI-bound transaction data
// Tokens stand in for merchant names, account labels, and peer-payment
// recipients so third-party model providers never see the real values.

pub mod date_shift;
pub mod policy;
pub mod redaction;
pub mod token_store;
pub mod tokenizer;

pub use date_shift::DateShiftOracle;
pub use policy::PrivacyPolicy;
pub use redaction::{RedactedSample, StructuralRedactor};
pub use token_store::{TokenCounts, TokenRecord, TokenStore, TokenType};
pub use tokenizer::Tokenizer;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrivacyError {
    /// Caller passed a value that can never be tokenized (empty/blank).
    #[error("validation error: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A singleton row is absent or unreadable after the lazy-create path
    /// should have run. Fatal: silently re-seeding would corrupt every
    /// previously shifted date or stored setting.
    #[error("{0} singleton row missing or corrupt")]
    Singleton(&'static str),

    /// Token numbering kept colliding with concurrent writers.
    #[error("token allocation failed after repeated conflicts")]
    AllocationConflict,

    #[error("database lock poisoned")]
    Lock,
}
