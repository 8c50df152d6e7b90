// Structural redaction for file-format detection
// Masks cell values while preserving their shape so a format classifier can
// infer column roles. One-shot and irreversible: no token store, no storage.

use chrono::{Duration, Utc};
use regex::Regex;
use serde::Serialize;

/// Headers that mark a column as description/merchant-like.
const DESCRIPTION_HEADERS: [&str; 6] =
    ["description", "merchant", "payee", "memo", "details", "name"];

/// Peer-payment service markers checked inside description cells.
const SERVICE_MARKERS: [&str; 4] = ["VENMO", "ZELLE", "PAYPAL", "CASH APP"];

const MERCHANT_LABELS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Ephemeral result of one redaction pass: same shape as the input sample,
/// values masked. Discarded after the format-detection call returns.
#[derive(Debug, Clone, Serialize)]
pub struct RedactedSample {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub struct StructuralRedactor {
    date_patterns: Vec<Regex>,
    amount_regex: Regex,
    paren_amount_regex: Regex,
    masked_id_regex: Regex,
}

impl Default for StructuralRedactor {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuralRedactor {
    pub fn new() -> Self {
        StructuralRedactor {
            date_patterns: vec![
                Regex::new(r"^\d{1,2}/\d{1,2}/\d{2,4}$").unwrap(),
                Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap(),
                Regex::new(r"^\d{1,2}-\d{1,2}-\d{2,4}$").unwrap(),
            ],
            // Applied after stripping '$' and ',' from the cell
            amount_regex: Regex::new(r"^-?\d+\.\d{2}$").unwrap(),
            paren_amount_regex: Regex::new(r"^\(\d+\.\d{2}\)$").unwrap(),
            masked_id_regex: Regex::new(r"^[\d\-\*]+$").unwrap(),
        }
    }

    /// Redact sample rows while preserving structure.
    ///
    /// Merchant-looking columns get distinct cycling labels
    /// (REDACTED_MERCHANT_A, _B, ...) so the classifier can tell them apart
    /// without seeing content.
    pub fn redact_sample(
        &self,
        headers: &[String],
        rows: &[Vec<String>],
        date_shift_days: i64,
    ) -> RedactedSample {
        let mut merchant_counter = 0usize;
        let redacted_rows = rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, cell)| {
                        let header = headers.get(i).map(String::as_str).unwrap_or("");
                        let label =
                            MERCHANT_LABELS[merchant_counter % MERCHANT_LABELS.len()] as char;
                        let redacted =
                            self.redact_cell(cell.trim(), header, date_shift_days, label);
                        if redacted.contains("REDACTED_MERCHANT") {
                            merchant_counter += 1;
                        }
                        redacted
                    })
                    .collect()
            })
            .collect();

        RedactedSample {
            headers: headers.to_vec(),
            rows: redacted_rows,
        }
    }

    /// Redact a single cell based on its content shape.
    pub fn redact_cell(
        &self,
        cell: &str,
        header: &str,
        date_shift_days: i64,
        merchant_label: char,
    ) -> String {
        if cell.is_empty() {
            return String::new();
        }

        // Dates: a shifted fake date in the same literal format, so the
        // classifier can still infer the format string
        if self.date_patterns.iter().any(|p| p.is_match(cell)) {
            let fake = Utc::now().date_naive() + Duration::days(date_shift_days);
            return if cell.contains('/') {
                fake.format("%m/%d/%Y").to_string()
            } else {
                fake.format("%Y-%m-%d").to_string()
            };
        }

        // Amounts: fixed placeholder preserving sign/parenthesis convention
        let bare = cell.replace(',', "").replace('$', "");
        if self.paren_amount_regex.is_match(&bare) {
            return "(XXX.XX)".to_string();
        }
        if self.amount_regex.is_match(&bare) {
            return if bare.starts_with('-') {
                "-XXX.XX".to_string()
            } else {
                "XXX.XX".to_string()
            };
        }

        let upper = cell.to_uppercase();
        let header_lower = header.to_lowercase();
        if DESCRIPTION_HEADERS.iter().any(|h| header_lower.contains(h)) {
            if let Some(service) = SERVICE_MARKERS.iter().find(|s| upper.contains(*s)) {
                return format!("{} REDACTED_PERSON", service);
            }
            return format!("REDACTED_MERCHANT_{}", merchant_label);
        }

        // Long non-numeric free text reads as a merchant column anyway
        let digits_only = bare.replace('.', "");
        if cell.len() > 10 && !digits_only.chars().all(|c| c.is_ascii_digit()) {
            if let Some(service) = SERVICE_MARKERS.iter().find(|s| upper.contains(*s)) {
                return format!("{} REDACTED_PERSON", service);
            }
            return format!("REDACTED_MERCHANT_{}", merchant_label);
        }

        // Masked identifiers: keep only the trailing four characters
        if cell.len() > 4 && self.masked_id_regex.is_match(cell) {
            return format!("****{}", &cell[cell.len() - 4..]);
        }

        // Short cells are unlikely to identify anything
        if cell.len() <= 3 {
            return cell.to_string();
        }

        "REDACTED".to_string()
    }
}
