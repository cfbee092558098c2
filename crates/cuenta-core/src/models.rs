//! Data models for Cuenta

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Token → original value map produced by PII redaction
pub type RedactionMap = BTreeMap<String, String>;

/// Category name used when nothing better is known
pub const UNCATEGORIZED: &str = "Uncategorized";

/// An owner of bank accounts and categories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A bank account statements are uploaded against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: i64,
    pub user_id: i64,
    pub bank_name: String,
    pub account_number: Option<String>,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of an uploaded statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementStatus {
    Pending,
    Processing,
    Parsed,
    Error,
}

impl StatementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Parsed => "parsed",
            Self::Error => "error",
        }
    }

    /// Parsed and error end a pipeline run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Parsed | Self::Error)
    }
}

impl std::str::FromStr for StatementStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "parsed" => Ok(Self::Parsed),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown statement status: {}", s)),
        }
    }
}

impl std::fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An uploaded statement PDF and the result of ingesting it
///
/// The binary content lives in the same row but is only loaded on demand
/// (see `Database::get_statement_blob`).
#[derive(Debug, Clone, Serialize)]
pub struct StatementFile {
    pub id: i64,
    pub bank_account_id: i64,
    pub filename: String,
    pub status: StatementStatus,
    /// Final structured result (`ParsedStatement` as JSON)
    pub parsed_json: Option<String>,
    /// Sensitive: never serialize to API consumers
    #[serde(skip_serializing)]
    pub redaction_map: Option<RedactionMap>,
    pub redaction_hmac: Option<String>,
    pub error_message: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl StatementFile {
    /// Decode the persisted parse result, if any
    pub fn parsed(&self) -> Option<ParsedStatement> {
        self.parsed_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
    }
}

/// Budgeting classification of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Income,
    FixedExpense,
    VariableExpense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::FixedExpense => "fixed_expense",
            Self::VariableExpense => "variable_expense",
        }
    }

    pub fn is_expense(&self) -> bool {
        matches!(self, Self::FixedExpense | Self::VariableExpense)
    }

    /// Canonical type for an amount, keeping the hint only when it agrees with the sign
    ///
    /// Negative amounts are always an expense class (variable unless the hint says fixed),
    /// non-negative amounts are always income.
    pub fn for_amount(hint: Option<TransactionType>, negative: bool) -> Self {
        match (negative, hint) {
            (true, Some(Self::FixedExpense)) => Self::FixedExpense,
            (true, _) => Self::VariableExpense,
            (false, _) => Self::Income,
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "fixed_expense" => Ok(Self::FixedExpense),
            "variable_expense" => Ok(Self::VariableExpense),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The bank's own ledger classification of a movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankEntryType {
    Credit,
    Debit,
}

impl BankEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }

    pub fn from_sign(negative: bool) -> Self {
        if negative {
            Self::Debit
        } else {
            Self::Credit
        }
    }

    /// Canonicalize loose spellings ("CR", "dr", "Credit"); anything else is None
    pub fn parse_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "credit" | "cr" => Some(Self::Credit),
            "debit" | "dr" => Some(Self::Debit),
            _ => None,
        }
    }
}

impl std::str::FromStr for BankEntryType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse_loose(s).ok_or_else(|| format!("Unknown bank entry type: {}", s))
    }
}

impl std::fmt::Display for BankEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the statement text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    Text,
    Ocr,
    TextChunked,
    OcrChunked,
}

impl ExtractionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Ocr => "ocr",
            Self::TextChunked => "text_chunked",
            Self::OcrChunked => "ocr_chunked",
        }
    }

    /// The chunked variant of this source
    pub fn chunked(self) -> Self {
        match self {
            Self::Text | Self::TextChunked => Self::TextChunked,
            Self::Ocr | Self::OcrChunked => Self::OcrChunked,
        }
    }
}

impl std::fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A normalized transaction record produced by the AI or fallback parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTransaction {
    /// YYYY-MM-DD
    pub date: String,
    pub description: String,
    pub amount: f64,
    pub transaction_type: TransactionType,
    pub bank_entry_type: Option<BankEntryType>,
    pub merchant: Option<String>,
    pub reference: Option<String>,
    pub category: String,
    pub sub_category: Option<String>,
    pub raw_text: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_type_confidence: Option<f64>,
}

/// The structured result of parsing one statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedStatement {
    pub opening_balance: Option<f64>,
    pub closing_balance: Option<f64>,
    pub transactions: Vec<ParsedTransaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_source: Option<ExtractionSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_count: Option<usize>,
}

impl ParsedStatement {
    /// Reassemble chunk results: transactions in chunk order, opening balance
    /// from the first chunk and closing balance from the last
    pub fn merge(chunks: Vec<ParsedStatement>) -> ParsedStatement {
        let opening_balance = chunks.first().and_then(|c| c.opening_balance);
        let closing_balance = chunks.last().and_then(|c| c.closing_balance);
        let transactions = chunks.into_iter().flat_map(|c| c.transactions).collect();

        ParsedStatement {
            opening_balance,
            closing_balance,
            transactions,
            extraction_source: None,
            imported_count: None,
        }
    }
}

/// A persisted transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub bank_account_id: i64,
    pub statement_file_id: Option<i64>,
    pub category_id: Option<i64>,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub bank_entry_type: Option<BankEntryType>,
    pub merchant: Option<String>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A transaction ready to insert
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub bank_account_id: i64,
    pub statement_file_id: Option<i64>,
    pub category_id: Option<i64>,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub bank_entry_type: Option<BankEntryType>,
    pub merchant: Option<String>,
    pub reference: Option<String>,
}

/// Owner-scoped category (two levels: parent and child)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
}

/// A parent category with the names of its children, as shown to the AI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub name: String,
    pub subcategories: Vec<String>,
}

/// Kind of statement, which decides the type-specific summary fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementType {
    #[default]
    Savings,
    Credit,
    Payroll,
}

impl StatementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Savings => "savings",
            Self::Credit => "credit",
            Self::Payroll => "payroll",
        }
    }
}

impl std::str::FromStr for StatementType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "savings" => Ok(Self::Savings),
            "credit" => Ok(Self::Credit),
            "payroll" => Ok(Self::Payroll),
            _ => Err(format!("Unknown statement type: {}", s)),
        }
    }
}

impl std::fmt::Display for StatementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Type-specific figures for savings statements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavingsData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_balance: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_deposits: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_withdrawals: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_earned: Option<Decimal>,
}

/// Type-specific figures for credit card statements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_limit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_credit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_to_avoid_interest: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_payment: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_charges: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_payments: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_charged: Option<Decimal>,
}

/// Type-specific figures for payroll statements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayrollData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_deposits: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_withdrawals: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_earned: Option<Decimal>,
}

/// Statement-type specific summary figures
///
/// Stored as a plain JSON object; the statement type column decides how it is read back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatementTypeData {
    Savings(SavingsData),
    Credit(CreditData),
    Payroll(PayrollData),
}

impl StatementTypeData {
    pub fn statement_type(&self) -> StatementType {
        match self {
            Self::Savings(_) => StatementType::Savings,
            Self::Credit(_) => StatementType::Credit,
            Self::Payroll(_) => StatementType::Payroll,
        }
    }

    /// Decode a stored JSON object for the given statement type
    pub fn from_json(statement_type: StatementType, json: &str) -> serde_json::Result<Self> {
        Ok(match statement_type {
            StatementType::Savings => Self::Savings(serde_json::from_str(json)?),
            StatementType::Credit => Self::Credit(serde_json::from_str(json)?),
            StatementType::Payroll => Self::Payroll(serde_json::from_str(json)?),
        })
    }
}

/// Persisted statement-level financial summary (one per statement)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialSummary {
    pub id: i64,
    pub statement_file_id: i64,
    pub statement_type: StatementType,
    pub initial_balance: Decimal,
    pub final_balance: Decimal,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub days_in_period: i64,
    pub total_commissions: Option<Decimal>,
    pub total_fees: Option<Decimal>,
    pub type_data: StatementTypeData,
}

/// A validated summary ready to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewFinancialSummary {
    pub statement_type: StatementType,
    pub initial_balance: Decimal,
    pub final_balance: Decimal,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub days_in_period: i64,
    pub total_commissions: Option<Decimal>,
    pub total_fees: Option<Decimal>,
    pub type_data: StatementTypeData,
}

impl FinancialSummary {
    pub fn net_movement(&self) -> Decimal {
        self.final_balance - self.initial_balance
    }

    /// Money in: deposits for savings/payroll, payments for credit cards
    pub fn total_deposits(&self) -> Decimal {
        match &self.type_data {
            StatementTypeData::Savings(d) => d.total_deposits,
            StatementTypeData::Payroll(d) => d.total_deposits,
            StatementTypeData::Credit(d) => d.total_payments,
        }
        .unwrap_or_default()
    }

    /// Money out: withdrawals for savings/payroll, charges for credit cards
    pub fn total_withdrawals(&self) -> Decimal {
        match &self.type_data {
            StatementTypeData::Savings(d) => d.total_withdrawals,
            StatementTypeData::Payroll(d) => d.total_withdrawals,
            StatementTypeData::Credit(d) => d.total_charges,
        }
        .unwrap_or_default()
    }

    /// Interest in the owner's favour; interest charged on a credit card counts negative
    pub fn interest_earned(&self) -> Decimal {
        match &self.type_data {
            StatementTypeData::Savings(d) => d.interest_earned.unwrap_or_default(),
            StatementTypeData::Payroll(d) => d.interest_earned.unwrap_or_default(),
            StatementTypeData::Credit(d) => -d.interest_charged.unwrap_or_default(),
        }
    }

    pub fn average_daily_balance(&self) -> Option<Decimal> {
        match &self.type_data {
            StatementTypeData::Savings(d) => d.average_balance,
            _ => None,
        }
    }
}
