//! QR payload parser
//!
//! Converts the comma-delimited text of an invoice QR code into structured
//! fields. Pure and deterministic; the raw payload passes through untouched
//! as the dedup key.
//!
//! Payload layout (0-indexed, at least 6 fields): fields 2 and 3 carry the
//! invoice number/code, field 4 the amount, field 5 the issue date. Fields 0
//! and 1 are ignored.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::models::ParsedInvoice;

static COMPACT_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}$").unwrap());
static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QrParseError {
    #[error("二维码格式不正确")]
    Malformed,
}

/// Parse a raw QR payload into invoice fields.
pub fn parse(raw: &str) -> Result<ParsedInvoice, QrParseError> {
    let fields: Vec<&str> = raw.split(',').collect();
    if fields.len() < 6 {
        return Err(QrParseError::Malformed);
    }

    let part2 = fields[2].trim();
    let part3 = fields[3].trim();
    let combined = if !part2.is_empty() {
        format!("{}+{}", part2, part3)
    } else {
        part3.to_string()
    };

    // When field 2 is empty and field 3 carries no '+', number and code
    // collapse to the same value. Accepted ambiguity.
    let (number, code) = match combined.split_once('+') {
        Some((number, code)) => (number.to_string(), code.to_string()),
        None => (combined.clone(), combined),
    };

    let issue_date = normalize_date(fields[5].trim());
    let amount = fields[4].trim().parse::<f64>().unwrap_or(0.0);

    Ok(ParsedInvoice {
        code,
        number,
        issue_date,
        amount,
        raw_qr: raw.to_string(),
    })
}

/// Accept YYYYMMDD (normalized to YYYY-MM-DD) and YYYY-MM-DD; anything
/// else becomes an empty date.
fn normalize_date(value: &str) -> String {
    if COMPACT_DATE.is_match(value) {
        format!("{}-{}-{}", &value[0..4], &value[4..6], &value[6..8])
    } else if ISO_DATE.is_match(value) {
        value.to_string()
    } else {
        String::new()
    }
}
