//! Deterministic line parser
//!
//! Used when the AI path is disabled or fails. A line is a transaction when it
//! starts with a `DD/MM/YYYY` (or `DD-MM-YYYY`) date and ends with an amount;
//! everything in between is the description.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{
    BankEntryType, ParsedStatement, ParsedTransaction, TransactionType, UNCATEGORIZED,
};

/// Confidence assigned to every line-parsed transaction
pub const LINE_PARSER_CONFIDENCE: f64 = 0.6;

static LEADING_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2})[/-](\d{2})[/-](\d{4})").expect("valid regex"));

static TRAILING_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\(?[-+]?\d[\d.,]*\)?)\s*$").expect("valid regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Line-oriented fallback parser
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericParser;

impl GenericParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse every qualifying line; balances are never inferred
    pub fn parse(&self, text: &str) -> ParsedStatement {
        let transactions: Vec<ParsedTransaction> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(parse_line)
            .collect();

        debug!(count = transactions.len(), "Line parser finished");

        ParsedStatement {
            opening_balance: None,
            closing_balance: None,
            transactions,
            extraction_source: None,
            imported_count: None,
        }
    }
}

fn parse_line(line: &str) -> Option<ParsedTransaction> {
    let date_caps = LEADING_DATE.captures(line)?;
    let date_match = date_caps.get(0)?;
    let date = NaiveDate::from_ymd_opt(
        date_caps[3].parse().ok()?,
        date_caps[2].parse().ok()?,
        date_caps[1].parse().ok()?,
    )?;

    let amount_match = TRAILING_AMOUNT.captures(line)?.get(1)?;
    // The date itself must not double as the amount
    if amount_match.start() < date_match.end() {
        return None;
    }
    let amount = parse_decimal(amount_match.as_str())?;
    let negative = amount.is_sign_negative() && !amount.is_zero();

    let description = WHITESPACE
        .replace_all(line[date_match.end()..amount_match.start()].trim(), " ")
        .into_owned();

    Some(ParsedTransaction {
        date: date.format("%Y-%m-%d").to_string(),
        description,
        amount: amount.round_dp(2).to_f64()?,
        transaction_type: TransactionType::for_amount(None, negative),
        bank_entry_type: Some(BankEntryType::from_sign(negative)),
        merchant: None,
        reference: None,
        category: UNCATEGORIZED.to_string(),
        sub_category: None,
        raw_text: line.to_string(),
        confidence: LINE_PARSER_CONFIDENCE,
        category_confidence: None,
        transaction_type_confidence: None,
    })
}

/// Parse a statement amount: `(1,234.56)` and `-1,234.56` are negative
///
/// With both separators present `,` is the thousands separator; a lone `,`
/// is read as the decimal point.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let mut s = raw.trim();
    let mut negative = false;

    if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        negative = true;
        s = inner;
    }
    let s = s.trim_start_matches('(').trim_end_matches(')');

    let normalized = if s.contains(',') && s.contains('.') {
        s.replace(',', "")
    } else if s.contains(',') {
        s.replace(',', ".")
    } else {
        s.to_string()
    };

    let value: Decimal = normalized.trim_start_matches('+').parse().ok()?;
    Some(if negative { -value.abs() } else { value })
}
