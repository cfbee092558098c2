//! Statement-level financial summary extraction
//!
//! Scans raw statement text with `<label>\s*<amount|date>` regexes built from
//! the bank's `financial_extraction` labels, plus a fixed set of
//! statement-type specific figures. Every field is optional: a label that does
//! not match simply leaves its field empty.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{
    CreditData, NewFinancialSummary, PayrollData, SavingsData, StatementType, StatementTypeData,
};
use crate::patterns::{BankPatternConfig, FinancialPatterns};

const AMOUNT_CAPTURE: &str = r"\s*:?\s*\$?\s*([\d,]+\.\d{2})";
const DATE_CAPTURE: &str =
    r"\s*:?\s*(\d{1,2}[/\- ](?:\d{1,2}|[A-Za-zÁÉÍÓÚáéíóú]{3,10})[/\- ]\d{2,4})";

/// Formats tried in order; month names are normalized to English first
const DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y", "%d-%m-%Y", "%d/%m/%y", "%d-%m-%y", "%d %b %Y", "%d %b %y", "%d-%b-%Y",
    "%d-%b-%y", "%d/%b/%Y", "%d/%b/%y",
];

static KEY_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[:\s]+").expect("valid regex"));
static MONTH_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-zÁÉÍÓÚáéíóú]+").expect("valid regex"));

static AVERAGE_BALANCE: Lazy<Regex> = Lazy::new(|| figure(r"Saldo\s+Promedio"));
static TOTAL_DEPOSITS: Lazy<Regex> = Lazy::new(|| figure(r"(?:Total\s+(?:de\s+)?)?Dep[óo]sitos"));
static TOTAL_WITHDRAWALS: Lazy<Regex> = Lazy::new(|| figure(r"(?:Total\s+(?:de\s+)?)?Retiros"));
static INTEREST_EARNED: Lazy<Regex> =
    Lazy::new(|| figure(r"Intereses\s+(?:Ganados|Devengados)"));
static CREDIT_LIMIT: Lazy<Regex> = Lazy::new(|| figure(r"L[íi]nea\s+de\s+Cr[ée]dito"));
static AVAILABLE_CREDIT: Lazy<Regex> = Lazy::new(|| figure(r"Cr[ée]dito\s+Disponible"));
static PAYMENT_TO_AVOID_INTEREST: Lazy<Regex> =
    Lazy::new(|| figure(r"Pago\s+para\s+No\s+Pagar\s+Intereses"));
static MINIMUM_PAYMENT: Lazy<Regex> = Lazy::new(|| figure(r"Pago\s+M[íi]nimo"));
static TOTAL_CHARGES: Lazy<Regex> = Lazy::new(|| figure(r"(?:Total\s+(?:de\s+)?)?Cargos"));
static TOTAL_PAYMENTS: Lazy<Regex> = Lazy::new(|| figure(r"(?:Total\s+(?:de\s+)?)?Pagos"));
static INTEREST_CHARGED: Lazy<Regex> = Lazy::new(|| figure(r"Intereses\s+Cobrados"));

fn figure(label: &str) -> Regex {
    Regex::new(&format!("(?i){}{}", label, AMOUNT_CAPTURE)).expect("valid regex")
}

/// Everything found in one statement's text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialData {
    pub statement_type: StatementType,
    pub initial_balance: Option<Decimal>,
    pub final_balance: Option<Decimal>,
    /// Label key (`fecha_de_corte`) → date
    pub period_dates: BTreeMap<String, NaiveDate>,
    pub summary_totals: BTreeMap<String, Decimal>,
    pub interest_info: BTreeMap<String, Decimal>,
    pub commission_info: BTreeMap<String, Decimal>,
    pub type_data: StatementTypeData,
}

impl FinancialData {
    /// Validate and convert into a persistable summary
    ///
    /// Requires both balances (non-negative) and at least one period date;
    /// the period runs from the earliest to the latest date found.
    pub fn to_summary(&self) -> Result<NewFinancialSummary> {
        let initial_balance = self
            .initial_balance
            .ok_or_else(|| Error::InvalidData("initial balance not found".into()))?;
        let final_balance = self
            .final_balance
            .ok_or_else(|| Error::InvalidData("final balance not found".into()))?;
        if initial_balance.is_sign_negative() || final_balance.is_sign_negative() {
            return Err(Error::InvalidData("balances must not be negative".into()));
        }

        let period_start = self
            .period_dates
            .values()
            .min()
            .copied()
            .ok_or_else(|| Error::InvalidData("statement period not found".into()))?;
        let period_end = self
            .period_dates
            .values()
            .max()
            .copied()
            .ok_or_else(|| Error::InvalidData("statement period not found".into()))?;
        if period_end <= period_start {
            return Err(Error::InvalidData(format!(
                "period end {} is not after start {}",
                period_end, period_start
            )));
        }

        let days_in_period = (period_end - period_start).num_days() + 1;

        Ok(NewFinancialSummary {
            statement_type: self.statement_type,
            initial_balance,
            final_balance,
            period_start,
            period_end,
            days_in_period,
            total_commissions: sum(self.commission_info.values()),
            total_fees: sum(
                self.summary_totals
                    .iter()
                    .filter(|(key, _)| key.contains("fee") || key.contains("cuota"))
                    .map(|(_, amount)| amount),
            ),
            type_data: self.type_data.clone(),
        })
    }
}

fn sum<'a>(amounts: impl Iterator<Item = &'a Decimal>) -> Option<Decimal> {
    amounts.fold(None, |acc, amount| Some(acc.unwrap_or_default() + *amount))
}

/// Extractor bound to one bank's financial labels
#[derive(Debug, Clone)]
pub struct FinancialDataExtractor {
    bank: String,
    patterns: FinancialPatterns,
}

impl FinancialDataExtractor {
    pub fn for_bank(config: &BankPatternConfig, bank_name: Option<&str>) -> Self {
        let bank = config.resolve_bank(bank_name);
        let patterns = config.financial_extraction(&bank);
        Self { bank, patterns }
    }

    pub fn new(bank: &str, patterns: FinancialPatterns) -> Self {
        Self {
            bank: bank.to_string(),
            patterns,
        }
    }

    pub fn statement_type(&self) -> StatementType {
        self.patterns.statement_type
    }

    /// Extract the summary facts; None when the bank has no financial labels
    pub fn extract(&self, text: &str) -> Option<FinancialData> {
        if self.patterns.is_empty() {
            debug!(bank = %self.bank, "No financial extraction labels");
            return None;
        }

        let statement_type = self.patterns.statement_type;
        Some(FinancialData {
            statement_type,
            initial_balance: first_amount(text, self.patterns.group("initial_balance")),
            final_balance: first_amount(text, self.patterns.group("final_balance")),
            period_dates: dates_by_label(text, self.patterns.group("period_dates")),
            summary_totals: amounts_by_label(text, self.patterns.group("summary_totals")),
            interest_info: amounts_by_label(text, self.patterns.group("interest_info")),
            commission_info: amounts_by_label(text, self.patterns.group("commission_info")),
            type_data: type_data(statement_type, text),
        })
    }
}

fn type_data(statement_type: StatementType, text: &str) -> StatementTypeData {
    match statement_type {
        StatementType::Savings => StatementTypeData::Savings(SavingsData {
            average_balance: capture_amount(&AVERAGE_BALANCE, text),
            total_deposits: capture_amount(&TOTAL_DEPOSITS, text),
            total_withdrawals: capture_amount(&TOTAL_WITHDRAWALS, text),
            interest_earned: capture_amount(&INTEREST_EARNED, text),
        }),
        StatementType::Credit => StatementTypeData::Credit(CreditData {
            credit_limit: capture_amount(&CREDIT_LIMIT, text),
            available_credit: capture_amount(&AVAILABLE_CREDIT, text),
            payment_to_avoid_interest: capture_amount(&PAYMENT_TO_AVOID_INTEREST, text),
            minimum_payment: capture_amount(&MINIMUM_PAYMENT, text),
            total_charges: capture_amount(&TOTAL_CHARGES, text),
            total_payments: capture_amount(&TOTAL_PAYMENTS, text),
            interest_charged: capture_amount(&INTEREST_CHARGED, text),
        }),
        StatementType::Payroll => StatementTypeData::Payroll(PayrollData {
            total_deposits: capture_amount(&TOTAL_DEPOSITS, text),
            total_withdrawals: capture_amount(&TOTAL_WITHDRAWALS, text),
            interest_earned: capture_amount(&INTEREST_EARNED, text),
        }),
    }
}

fn label_regex(label: &str, capture: &str) -> Option<Regex> {
    Regex::new(&format!("(?i){}{}", regex::escape(label), capture)).ok()
}

fn capture_amount(re: &Regex, text: &str) -> Option<Decimal> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_amount(m.as_str()))
}

fn first_amount(text: &str, labels: &[String]) -> Option<Decimal> {
    labels
        .iter()
        .filter_map(|label| label_regex(label, AMOUNT_CAPTURE))
        .find_map(|re| capture_amount(&re, text))
}

fn amounts_by_label(text: &str, labels: &[String]) -> BTreeMap<String, Decimal> {
    labels
        .iter()
        .filter_map(|label| {
            let re = label_regex(label, AMOUNT_CAPTURE)?;
            capture_amount(&re, text).map(|amount| (label_key(label), amount))
        })
        .collect()
}

fn dates_by_label(text: &str, labels: &[String]) -> BTreeMap<String, NaiveDate> {
    labels
        .iter()
        .filter_map(|label| {
            let re = label_regex(label, DATE_CAPTURE)?;
            let raw = re.captures(text)?.get(1)?.as_str().to_string();
            parse_date(&raw).map(|date| (label_key(label), date))
        })
        .collect()
}

/// `Fecha de corte:` → `fecha_de_corte`
pub fn label_key(label: &str) -> String {
    KEY_SEPARATORS
        .replace_all(label, "_")
        .to_lowercase()
        .trim_matches('_')
        .to_string()
}

/// Parse `1,234.56` as an exact decimal
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    Decimal::from_str(&raw.replace(',', "")).ok()
}

/// Parse a statement date, accepting Spanish month names and abbreviations
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let normalized = MONTH_WORD.replace_all(raw.trim(), |caps: &regex::Captures| {
        english_month(&caps[0])
            .map(str::to_string)
            .unwrap_or_else(|| caps[0].to_string())
    });

    // chrono's %Y happily reads "25" as year 25, so pick the year width up front
    let year_digits = normalized
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .count();
    let year_spec = if year_digits <= 2 { "%y" } else { "%Y" };

    DATE_FORMATS
        .iter()
        .filter(|format| format.ends_with(year_spec))
        .find_map(|format| NaiveDate::parse_from_str(&normalized, format).ok())
}

fn english_month(word: &str) -> Option<&'static str> {
    let month = match word.to_lowercase().as_str() {
        "ene" | "enero" | "jan" | "january" => "Jan",
        "feb" | "febrero" | "february" => "Feb",
        "mar" | "marzo" | "march" => "Mar",
        "abr" | "abril" | "apr" | "april" => "Apr",
        "may" | "mayo" => "May",
        "jun" | "junio" | "june" => "Jun",
        "jul" | "julio" | "july" => "Jul",
        "ago" | "agosto" | "aug" | "august" => "Aug",
        "sep" | "sept" | "septiembre" | "setiembre" | "september" => "Sep",
        "oct" | "octubre" | "october" => "Oct",
        "nov" | "noviembre" | "november" => "Nov",
        "dic" | "diciembre" | "dec" | "december" => "Dec",
        _ => return None,
    };
    Some(month)
}
