//! Bank statement pattern registry
//!
//! Loaded once with a two-layer resolution, like the prompt library:
//! 1. `~/.local/share/cuenta/config/bank_patterns.toml` if present
//! 2. The embedded default (`config/bank_patterns.toml`)
//!
//! The registry is an immutable value: construct it at startup and hand it to
//! the text filter and financial extractor. A missing or broken file never
//! fails ingestion; it degrades to an empty registry and every lookup falls
//! through to the generic behaviour.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::StatementType;

/// Embedded default pattern file (compiled into binary)
const DEFAULT_PATTERNS: &str = include_str!("../../../config/bank_patterns.toml");

/// Key used for banks we have no patterns for
pub const GENERIC_BANK: &str = "generic";

/// Pattern list categories shared by every layout variation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternCategory {
    TransactionKeywords,
    NonTransaction,
    TableIdentifiers,
    DatePatterns,
    AmountColumns,
    TransactionCodes,
}

/// Which "previous line" conditions open a multi-line continuation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContinuationRule {
    /// Previous line has a date but no amount
    Date,
    /// Previous line has a transaction code but no amount
    Code,
    /// Previous line has a transaction keyword but no amount
    Keyword,
}

/// Patterns that apply regardless of bank
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalPatterns {
    #[serde(default)]
    pub date_formats: Vec<String>,
    #[serde(default)]
    pub amount_formats: Vec<String>,
}

/// Financial-summary extraction labels for one bank
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinancialPatterns {
    pub statement_type: StatementType,
    /// Group name (initial_balance, period_dates, ...) → labels
    pub groups: BTreeMap<String, Vec<String>>,
}

impl FinancialPatterns {
    pub fn is_empty(&self) -> bool {
        self.groups.values().all(|labels| labels.is_empty())
    }

    pub fn group(&self, name: &str) -> &[String] {
        self.groups.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PatternFile {
    #[serde(default)]
    global: GlobalPatterns,
    #[serde(default)]
    banks: BTreeMap<String, BankEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BankEntry {
    display_name: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    continuation: Vec<ContinuationRule>,
    #[serde(default)]
    variations: Vec<Variation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Variation {
    #[serde(default)]
    transaction_keywords: Vec<String>,
    #[serde(default)]
    non_transaction_patterns: Vec<String>,
    #[serde(default)]
    table_identifiers: Vec<String>,
    #[serde(default)]
    date_patterns: Vec<String>,
    #[serde(default)]
    amount_columns: Vec<String>,
    #[serde(default)]
    transaction_codes: Vec<String>,
    #[serde(default)]
    header_extraction: BTreeMap<String, Vec<String>>,
    financial_extraction: Option<FinancialSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FinancialSection {
    statement_type: Option<StatementType>,
    #[serde(flatten)]
    groups: BTreeMap<String, Vec<String>>,
}

impl Variation {
    fn list(&self, category: PatternCategory) -> &[String] {
        match category {
            PatternCategory::TransactionKeywords => &self.transaction_keywords,
            PatternCategory::NonTransaction => &self.non_transaction_patterns,
            PatternCategory::TableIdentifiers => &self.table_identifiers,
            PatternCategory::DatePatterns => &self.date_patterns,
            PatternCategory::AmountColumns => &self.amount_columns,
            PatternCategory::TransactionCodes => &self.transaction_codes,
        }
    }
}

/// Immutable per-bank pattern registry
#[derive(Debug, Clone, Default)]
pub struct BankPatternConfig {
    file: PatternFile,
}

impl BankPatternConfig {
    /// Load from the override file if present, else the embedded default
    ///
    /// Never fails: unreadable or invalid files are logged and yield an empty registry.
    pub fn load() -> Self {
        if let Some(path) = default_override_path() {
            if path.exists() {
                return match fs::read_to_string(&path)
                    .map_err(Error::from)
                    .and_then(|content| Self::from_toml_str(&content))
                {
                    Ok(config) => {
                        info!(path = %path.display(), "Loaded bank pattern overrides");
                        config
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Invalid bank pattern file, using empty registry");
                        Self::empty()
                    }
                };
            }
        }

        Self::embedded()
    }

    /// The embedded default registry
    pub fn embedded() -> Self {
        Self::from_toml_str(DEFAULT_PATTERNS).unwrap_or_else(|e| {
            warn!(error = %e, "Embedded bank patterns failed to parse, using empty registry");
            Self::empty()
        })
    }

    /// Parse a registry from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: PatternFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid bank pattern file: {}", e)))?;

        let banks = file
            .banks
            .into_iter()
            .map(|(name, entry)| (normalize_bank_name(&name), entry))
            .collect();

        Ok(Self {
            file: PatternFile {
                global: file.global,
                banks,
            },
        })
    }

    /// A registry with no banks and no global patterns
    pub fn empty() -> Self {
        Self::default()
    }

    /// Map a free-form bank name ("BBVA México", "Bancomer", None) to a registry key
    ///
    /// Matches configured keys and aliases as substrings of the lowercased name;
    /// anything unrecognized resolves to [`GENERIC_BANK`].
    pub fn resolve_bank(&self, bank_name: Option<&str>) -> String {
        let Some(name) = bank_name else {
            return GENERIC_BANK.to_string();
        };
        let name = normalize_bank_name(name);

        for (key, entry) in &self.file.banks {
            if key == GENERIC_BANK {
                continue;
            }
            if name.contains(key.as_str())
                || entry
                    .aliases
                    .iter()
                    .any(|alias| name.contains(&normalize_bank_name(alias)))
            {
                return key.clone();
            }
        }

        GENERIC_BANK.to_string()
    }

    /// Whether the registry has an entry for this (normalized) bank name
    pub fn has_bank(&self, bank: &str) -> bool {
        self.file.banks.contains_key(&normalize_bank_name(bank))
    }

    /// De-duplicated union of a pattern category across a bank's variations
    ///
    /// Unknown banks yield an empty list.
    pub fn patterns(&self, bank: &str, category: PatternCategory) -> Vec<String> {
        let mut patterns: Vec<String> = Vec::new();
        if let Some(entry) = self.bank(bank) {
            for variation in &entry.variations {
                for pattern in variation.list(category) {
                    if !patterns.contains(pattern) {
                        patterns.push(pattern.clone());
                    }
                }
            }
        }
        patterns
    }

    /// Header label groups (account_info, statement_period, ...) merged across variations
    pub fn header_extraction(&self, bank: &str) -> BTreeMap<String, Vec<String>> {
        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if let Some(entry) = self.bank(bank) {
            for variation in &entry.variations {
                for (group, labels) in &variation.header_extraction {
                    let merged = headers.entry(group.clone()).or_default();
                    for label in labels {
                        if !merged.contains(label) {
                            merged.push(label.clone());
                        }
                    }
                }
            }
        }
        headers
    }

    /// Financial-summary labels merged across variations
    ///
    /// The statement type is the last one declared, defaulting to savings.
    pub fn financial_extraction(&self, bank: &str) -> FinancialPatterns {
        let mut financial = FinancialPatterns::default();
        if let Some(entry) = self.bank(bank) {
            for section in entry
                .variations
                .iter()
                .filter_map(|v| v.financial_extraction.as_ref())
            {
                if let Some(statement_type) = section.statement_type {
                    financial.statement_type = statement_type;
                }
                for (group, labels) in &section.groups {
                    let merged = financial.groups.entry(group.clone()).or_default();
                    for label in labels {
                        if !merged.contains(label) {
                            merged.push(label.clone());
                        }
                    }
                }
            }
        }
        financial
    }

    /// Continuation rules for a bank; date-without-amount when unspecified
    pub fn continuation_rules(&self, bank: &str) -> Vec<ContinuationRule> {
        match self.bank(bank) {
            Some(entry) if !entry.continuation.is_empty() => entry.continuation.clone(),
            _ => vec![ContinuationRule::Date],
        }
    }

    pub fn global(&self) -> &GlobalPatterns {
        &self.file.global
    }

    /// Registry keys, including "generic"
    pub fn supported_banks(&self) -> Vec<&str> {
        self.file.banks.keys().map(String::as_str).collect()
    }

    /// Human-readable name, or the normalized key for unknown banks
    pub fn display_name(&self, bank: &str) -> String {
        let key = normalize_bank_name(bank);
        self.file
            .banks
            .get(&key)
            .and_then(|entry| entry.display_name.clone())
            .unwrap_or(key)
    }

    fn bank(&self, bank: &str) -> Option<&BankEntry> {
        self.file.banks.get(&normalize_bank_name(bank))
    }
}

/// Lowercase and trim a bank name
pub fn normalize_bank_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Default pattern override location
pub fn default_override_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| {
        d.join("cuenta")
            .join("config")
            .join("bank_patterns.toml")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BankPatternConfig {
        BankPatternConfig::embedded()
    }

    #[test]
    fn test_embedded_config_parses() {
        let config = config();
        let banks = config.supported_banks();
        for bank in ["bbva", "banamex", "banorte", "santander", "hsbc", "scotiabank", "generic"] {
            assert!(banks.contains(&bank), "missing {}", bank);
        }
    }

    #[test]
    fn test_bbva_patterns_union_across_variations() {
        let config = config();

        let keywords = config.patterns("BBVA", PatternCategory::TransactionKeywords);
        assert!(keywords.contains(&"PAGO DE NOMINA".to_string()));
        assert!(keywords.contains(&"SPEI ENVIADO".to_string()));
        assert!(keywords.contains(&"DEPOSITO DE TERCERO".to_string()));
        // only in the second variation
        assert!(keywords.contains(&"COMPRA EN".to_string()));
        // de-duplicated
        assert_eq!(
            keywords.iter().filter(|k| k.as_str() == "PAGO DE NOMINA").count(),
            1
        );

        let codes = config.patterns("bbva", PatternCategory::TransactionCodes);
        for code in ["R01", "T16", "W02", "N06"] {
            assert!(codes.contains(&code.to_string()));
        }

        let noise = config.patterns("bbva", PatternCategory::NonTransaction);
        assert!(noise.contains(&"Estado de Cuenta".to_string()));
        assert!(noise.contains(&"Saldo Promedio".to_string()));
    }

    #[test]
    fn test_unknown_bank_has_no_patterns() {
        let config = config();
        assert!(config
            .patterns("unknown_bank", PatternCategory::TransactionKeywords)
            .is_empty());
        assert!(config.header_extraction("unknown_bank").is_empty());
        assert_eq!(
            config.continuation_rules("unknown_bank"),
            vec![ContinuationRule::Date]
        );
    }

    #[test]
    fn test_resolve_bank() {
        let config = config();
        assert_eq!(config.resolve_bank(Some("BBVA")), "bbva");
        assert_eq!(config.resolve_bank(Some("Bancomer")), "bbva");
        assert_eq!(config.resolve_bank(Some("BBVA México")), "bbva");
        assert_eq!(config.resolve_bank(Some("Banamex")), "banamex");
        assert_eq!(config.resolve_bank(Some("Banorte")), "banorte");
        assert_eq!(config.resolve_bank(Some("Santander")), "santander");
        assert_eq!(config.resolve_bank(Some("HSBC")), "hsbc");
        assert_eq!(config.resolve_bank(Some("Scotiabank")), "scotiabank");
        assert_eq!(config.resolve_bank(Some("Unknown Bank")), GENERIC_BANK);
        assert_eq!(config.resolve_bank(None), GENERIC_BANK);
    }

    #[test]
    fn test_header_extraction_groups() {
        let headers = config().header_extraction("bbva");
        assert!(headers["account_info"].contains(&"Cuenta:".to_string()));
        assert!(headers["statement_period"].contains(&"Periodo:".to_string()));
        assert!(headers["balance_info"].contains(&"Saldo Inicial:".to_string()));
    }

    #[test]
    fn test_financial_extraction_statement_type() {
        let config = config();
        assert_eq!(
            config.financial_extraction("banorte").statement_type,
            StatementType::Payroll
        );
        assert_eq!(
            config.financial_extraction("bbva").statement_type,
            StatementType::Savings
        );
        let unknown = config.financial_extraction("unknown_bank");
        assert_eq!(unknown.statement_type, StatementType::Savings);
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_display_name() {
        let config = config();
        assert_eq!(config.display_name("bbva"), "BBVA Bancomer");
        assert_eq!(config.display_name("unknown_bank"), "unknown_bank");
    }

    #[test]
    fn test_global_patterns() {
        let global = config().global().clone();
        assert!(global
            .amount_formats
            .contains(&r"\d{1,3}(?:,\d{3})*\.\d{2}".to_string()));
        assert!(!global.date_formats.is_empty());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(BankPatternConfig::from_toml_str("banks = [").is_err());
        let empty = BankPatternConfig::empty();
        assert!(empty.supported_banks().is_empty());
        assert_eq!(empty.resolve_bank(Some("BBVA")), GENERIC_BANK);
    }

    #[test]
    fn test_continuation_rules_from_config() {
        let config = config();
        assert_eq!(
            config.continuation_rules("bbva"),
            vec![ContinuationRule::Date, ContinuationRule::Code]
        );
        assert_eq!(
            config.continuation_rules("banorte"),
            vec![ContinuationRule::Date, ContinuationRule::Keyword]
        );
    }
}
