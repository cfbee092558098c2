//! JSON parsing and normalization of AI statement responses
//!
//! Models often wrap the payload in prose or code fences, so the JSON object is
//! taken from the first `{` to the last `}`. The payload is then read through a
//! lenient wire shape and normalized into a strict `ParsedStatement`: unknown
//! keys are dropped by construction, amounts may be numbers or strings, and the
//! enum-like fields fall back to sign-derived defaults.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{
    BankEntryType, ParsedStatement, ParsedTransaction, TransactionType, UNCATEGORIZED,
};

/// Truncate model output for error messages
fn truncate_raw(raw: &str) -> String {
    if raw.chars().count() > 200 {
        format!("{}...", raw.chars().take(200).collect::<String>())
    } else {
        raw.to_string()
    }
}

/// Slice out the JSON object embedded in a model response
pub fn extract_json_object(response: &str) -> Result<&str> {
    let response = response.trim();
    match (response.find('{'), response.rfind('}')) {
        (Some(s), Some(e)) if s < e => Ok(&response[s..=e]),
        _ => Err(Error::InvalidData(format!(
            "No JSON found in AI response | Raw: {}",
            truncate_raw(response)
        ))),
    }
}

/// Parse and normalize a statement response
pub fn parse_statement_response(response: &str) -> Result<ParsedStatement> {
    let json_str = extract_json_object(response)?;
    let raw: RawStatement = serde_json::from_str(json_str).map_err(|e| {
        Error::InvalidData(format!(
            "Invalid statement JSON from AI: {} | Raw: {}",
            e,
            truncate_raw(json_str)
        ))
    })?;

    PostProcessor::normalize(raw)
}

#[derive(Debug, Deserialize)]
struct RawStatement {
    #[serde(default)]
    opening_balance: Value,
    #[serde(default)]
    closing_balance: Value,
    transactions: Vec<RawTransaction>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    date: String,
    description: String,
    amount: Value,
    #[serde(default)]
    transaction_type: Option<String>,
    #[serde(default)]
    bank_entry_type: Option<String>,
    #[serde(default)]
    merchant: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    sub_category: Option<String>,
    #[serde(default)]
    raw_text: Option<String>,
    #[serde(default)]
    confidence: Value,
    #[serde(default)]
    category_confidence: Value,
    #[serde(default)]
    transaction_type_confidence: Value,
}

/// Normalization rules for untrusted model output
pub struct PostProcessor;

impl PostProcessor {
    fn normalize(raw: RawStatement) -> Result<ParsedStatement> {
        let transactions = raw
            .transactions
            .into_iter()
            .enumerate()
            .map(|(i, t)| Self::normalize_transaction(t).map_err(|e| {
                Error::InvalidData(format!("transaction {}: {}", i, e))
            }))
            .collect::<Result<Vec<_>>>()?;

        debug!(count = transactions.len(), "Normalized AI transactions");

        Ok(ParsedStatement {
            opening_balance: coerce_amount(&raw.opening_balance),
            closing_balance: coerce_amount(&raw.closing_balance),
            transactions,
            extraction_source: None,
            imported_count: None,
        })
    }

    fn normalize_transaction(raw: RawTransaction) -> Result<ParsedTransaction> {
        let amount = coerce_amount(&raw.amount)
            .ok_or_else(|| Error::InvalidData(format!("amount is not a number: {}", raw.amount)))?;

        let hint = raw
            .transaction_type
            .as_deref()
            .and_then(|t| t.parse::<TransactionType>().ok());

        let category = non_blank(raw.category).unwrap_or_else(|| UNCATEGORIZED.to_string());
        // A sub-category only makes sense under a real category
        let sub_category = if category == UNCATEGORIZED {
            None
        } else {
            non_blank(raw.sub_category)
        };

        Ok(ParsedTransaction {
            date: raw.date.trim().to_string(),
            raw_text: raw.raw_text.unwrap_or_else(|| raw.description.clone()),
            description: raw.description.trim().to_string(),
            amount,
            transaction_type: TransactionType::for_amount(hint, amount < 0.0),
            bank_entry_type: raw
                .bank_entry_type
                .as_deref()
                .and_then(BankEntryType::parse_loose),
            merchant: non_blank(raw.merchant),
            reference: non_blank(raw.reference),
            category,
            sub_category,
            confidence: clamp_confidence(&raw.confidence).unwrap_or(0.0),
            category_confidence: clamp_confidence(&raw.category_confidence),
            transaction_type_confidence: clamp_confidence(&raw.transaction_type_confidence),
        })
    }
}

/// Number or numeric string ("1,234.56", "-89.00", "$ 10") to f64
pub fn coerce_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, ',' | '$' | ' '))
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

fn clamp_confidence(value: &Value) -> Option<f64> {
    coerce_amount(value).map(|v| v.clamp(0.0, 1.0))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}
