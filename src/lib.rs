// LedgerLens privacy layer - reversible pseudonymization for transaction
// data bound for third-party AI providers

pub mod commands_privacy;
pub mod db;
pub mod http_server;
pub mod privacy;

// Re-export the items the server binary and library consumers need
pub use db::Database;
pub use privacy::{
    DateShiftOracle, PrivacyError, PrivacyPolicy, RedactedSample, StructuralRedactor,
    TokenCounts, TokenRecord, TokenStore, TokenType, Tokenizer,
};
