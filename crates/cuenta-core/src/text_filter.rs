//! Transaction line filter
//!
//! Reduces full statement text to the lines likely to encode a transaction
//! before it is sent to the AI backend. Per non-blank (trimmed) line:
//!
//! 1. Drop if it matches a bank noise pattern and either matches a strong
//!    boilerplate pattern or carries no transaction evidence.
//! 2. Keep if it matches a transaction keyword, contains a transaction code,
//!    or carries evidence (date-like or amount-like token).
//! 3. Keep if it continues the previous kept line (see [`ContinuationRule`]).
//! 4. Drop otherwise.
//!
//! Pattern lookup is two-tier: the bank's own keyword/noise lists, or the
//! generic tables below when the bank defines neither.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::patterns::{BankPatternConfig, ContinuationRule, PatternCategory};

/// Noise patterns used when a bank has no lists of its own
const GENERIC_NON_TRANSACTION: &[&str] = &[
    "Estado de Cuenta",
    "PAGINA",
    r"No\. Cuenta",
    r"No\. Cliente",
    "Saldo Promedio",
    "Saldo de Liquidación",
    "Días del Periodo",
    "Tasa Bruta Anual",
];

/// Keywords used when a bank has no lists of its own
const GENERIC_TRANSACTION: &[&str] = &[
    "PAGO",
    "TRANSFERENCIA",
    "DEPOSITO",
    "RETIRO",
    "NOMINA",
    "INTERESES",
    "SPEI",
    "TRASPASO",
];

/// Evidence patterns when the registry has no global section
const DEFAULT_DATE_FORMATS: &[&str] = &[
    r"\d{2}/\d{2}/\d{4}",
    r"\d{2}-\d{2}-\d{4}",
    r"\d{2}/[A-Z]{3}",
    r"\d{2}-[A-Z]{3}-\d{2}",
];
const DEFAULT_AMOUNT_FORMATS: &[&str] = &[r"[\d,]+\.\d{2}"];

/// Boilerplate that is dropped even when it carries an amount
static STRONG_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^ESTADO DE CUENTA",
        r"(?i)^BANORTE$",
        r"(?i)^BANCO",
        r"(?i)^PAGINA \d+/\d+",
        r"(?i)^INFORMACIÓN DEL PERIODO",
        r"(?i)^Producto:",
        r"(?i)^Saldo anterior:",
        r"(?i)^Saldo al corte:",
        r"(?i)^Saldo Final:",
        r"(?i)^Saldo Promedio:",
        r"(?i)^Intereses devengados:",
        r"(?i)^Saldo no disponible al día:",
        r"(?i)^Advertencia:",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static PERIOD_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^En el Periodo \d+ \w+ al \d+ \w+:\s*").expect("valid regex")
});

/// Line filter compiled for one bank
#[derive(Debug, Clone)]
pub struct TransactionTextFilter {
    bank: String,
    non_transaction: Vec<Regex>,
    keywords: Vec<Regex>,
    codes: Vec<String>,
    dates: Vec<Regex>,
    amounts: Vec<Regex>,
    continuation: Vec<ContinuationRule>,
    headers: BTreeMap<String, Vec<Regex>>,
}

impl TransactionTextFilter {
    /// Compile the filter for a free-form bank name (None → generic)
    pub fn for_bank(config: &BankPatternConfig, bank_name: Option<&str>) -> Self {
        let bank = config.resolve_bank(bank_name);

        let mut non_transaction = config.patterns(&bank, PatternCategory::NonTransaction);
        let mut keywords = config.patterns(&bank, PatternCategory::TransactionKeywords);
        if non_transaction.is_empty() && keywords.is_empty() {
            non_transaction = GENERIC_NON_TRANSACTION.iter().map(|s| s.to_string()).collect();
            keywords = GENERIC_TRANSACTION.iter().map(|s| s.to_string()).collect();
        }

        let global = config.global();
        let dates = if global.date_formats.is_empty() {
            compile(DEFAULT_DATE_FORMATS.iter().copied(), false)
        } else {
            compile(global.date_formats.iter().map(String::as_str), false)
        };
        let amounts = if global.amount_formats.is_empty() {
            compile(DEFAULT_AMOUNT_FORMATS.iter().copied(), false)
        } else {
            compile(global.amount_formats.iter().map(String::as_str), false)
        };

        let headers = config
            .header_extraction(&bank)
            .into_iter()
            .map(|(group, labels)| {
                let regexes = labels
                    .iter()
                    .filter_map(|label| compile_one(&format!(r"(?i){}\s*(.+)", label)))
                    .collect();
                (group, regexes)
            })
            .collect();

        debug!(bank = %bank, keywords = keywords.len(), noise = non_transaction.len(), "Compiled text filter");

        Self {
            non_transaction: compile(non_transaction.iter().map(String::as_str), true),
            keywords: compile(keywords.iter().map(String::as_str), true),
            codes: config.patterns(&bank, PatternCategory::TransactionCodes),
            continuation: config.continuation_rules(&bank),
            dates,
            amounts,
            headers,
            bank,
        }
    }

    /// The registry key this filter was compiled for
    pub fn bank(&self) -> &str {
        &self.bank
    }

    /// Keep only transaction-bearing lines, trimmed and newline-joined
    pub fn filter(&self, text: &str) -> String {
        let mut kept: Vec<&str> = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || self.is_noise(line) {
                continue;
            }
            if self.is_transaction_line(line) || self.is_continuation(line, kept.last().copied())
            {
                kept.push(line);
            }
        }

        kept.join("\n")
    }

    /// Values following each configured header label, per header group
    ///
    /// Banks without header labels yield an empty map.
    pub fn extract_headers(&self, text: &str) -> BTreeMap<String, Vec<String>> {
        self.headers
            .iter()
            .map(|(group, regexes)| {
                let values = regexes
                    .iter()
                    .flat_map(|re| re.captures_iter(text))
                    .filter_map(|caps| caps.get(1))
                    .map(|m| clean_header_value(m.as_str()))
                    .collect();
                (group.clone(), values)
            })
            .collect()
    }

    /// Whether `line` continues the previously kept line
    pub fn is_continuation(&self, line: &str, previous: Option<&str>) -> bool {
        let Some(previous) = previous else {
            return false;
        };
        if self.has_amount(previous) || self.has_date(line) {
            return false;
        }

        self.continuation.iter().any(|rule| match rule {
            ContinuationRule::Date => self.has_date(previous),
            ContinuationRule::Code => self.has_code(previous),
            ContinuationRule::Keyword => self.has_keyword(previous),
        })
    }

    fn is_noise(&self, line: &str) -> bool {
        if !self.non_transaction.iter().any(|re| re.is_match(line)) {
            return false;
        }
        STRONG_PATTERNS.iter().any(|re| re.is_match(line)) || !self.has_evidence(line)
    }

    fn is_transaction_line(&self, line: &str) -> bool {
        self.has_keyword(line) || self.has_code(line) || self.has_evidence(line)
    }

    fn has_evidence(&self, line: &str) -> bool {
        self.has_date(line) || self.has_amount(line)
    }

    fn has_date(&self, line: &str) -> bool {
        self.dates.iter().any(|re| re.is_match(line))
    }

    fn has_amount(&self, line: &str) -> bool {
        self.amounts.iter().any(|re| re.is_match(line))
    }

    fn has_keyword(&self, line: &str) -> bool {
        self.keywords.iter().any(|re| re.is_match(line))
    }

    fn has_code(&self, line: &str) -> bool {
        self.codes.iter().any(|code| line.contains(code.as_str()))
    }
}

fn clean_header_value(value: &str) -> String {
    let value = value.trim();
    let value = PERIOD_PREFIX.replace(value, "");
    let value: &str = value.as_ref();
    value.strip_prefix('$').unwrap_or(value).trim().to_string()
}

fn compile<'a>(patterns: impl Iterator<Item = &'a str>, case_insensitive: bool) -> Vec<Regex> {
    patterns
        .filter_map(|p| {
            if case_insensitive {
                compile_one(&format!("(?i){}", p))
            } else {
                compile_one(p)
            }
        })
        .collect()
}

fn compile_one(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern, error = %e, "Skipping invalid bank pattern");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BBVA_TEXT: &str = "\
Estado de Cuenta BBVA Bancomer
Cuenta: 0123456789
Cliente: JUAN PEREZ
RFC: ABC123456DEF
Periodo: Mayo 2021
Saldo Promedio: 316,031.10

24/MAY W02 DEPOSITO DE TERCERO 3,778.00
25/MAY R01 PAGO DE NOMINA 15,000.00
26/MAY T16 SPEI ENVIADO BANSI -71,897.81

Saldo Final: 250,000.00
";

    const GENERIC_TEXT: &str = "\
Estado de Cuenta
No. Cuenta: 123456789
No. Cliente: 987654321

01/01 PAGO NOMINA 5,000.00
02/01 TRANSFERENCIA -1,000.00

Saldo Promedio: 4,000.00
";

    fn filter(bank: Option<&str>) -> TransactionTextFilter {
        TransactionTextFilter::for_bank(&BankPatternConfig::embedded(), bank)
    }

    #[test]
    fn test_bbva_keeps_transactions_and_drops_boilerplate() {
        let filtered = filter(Some("BBVA")).filter(BBVA_TEXT);

        assert!(filtered.contains("24/MAY W02 DEPOSITO DE TERCERO 3,778.00"));
        assert!(filtered.contains("25/MAY R01 PAGO DE NOMINA 15,000.00"));
        assert!(filtered.contains("26/MAY T16 SPEI ENVIADO BANSI -71,897.81"));

        assert!(!filtered.contains("Estado de Cuenta BBVA Bancomer"));
        assert!(!filtered.contains("Cuenta: 0123456789"));
        assert!(!filtered.contains("Saldo Promedio: 316,031.10"));
        assert!(!filtered.contains("Saldo Final: 250,000.00"));
    }

    #[test]
    fn test_unknown_bank_uses_generic_tables() {
        for bank in [Some("unknown_bank"), None] {
            let filtered = filter(bank).filter(GENERIC_TEXT);

            assert!(filtered.contains("01/01 PAGO NOMINA 5,000.00"));
            assert!(filtered.contains("02/01 TRANSFERENCIA -1,000.00"));

            assert!(!filtered.contains("Estado de Cuenta"));
            assert!(!filtered.contains("No. Cuenta: 123456789"));
            assert!(!filtered.contains("Saldo Promedio: 4,000.00"));
        }
    }

    #[test]
    fn test_noise_line_with_amount_survives_unless_strong() {
        let f = filter(None);
        // noise pattern, not strong, has an amount
        assert_eq!(f.filter("Comisión PAGINA 1,000.00"), "Comisión PAGINA 1,000.00");
        // strong boilerplate always goes
        assert_eq!(f.filter("ESTADO DE CUENTA 1,000.00"), "");
    }

    #[test]
    fn test_continuation_lines() {
        let previous = Some("24/MAY W02 DEPOSITO DE TERCERO");

        assert!(filter(Some("bbva")).is_continuation("BANCO AZTECA", previous));
        assert!(filter(None).is_continuation("BANCO AZTECA", previous));
        assert!(!filter(Some("bbva"))
            .is_continuation("25/MAY R01 PAGO DE NOMINA 15,000.00", previous));
        assert!(!filter(Some("bbva")).is_continuation("BANCO AZTECA", None));
    }

    #[test]
    fn test_code_opens_continuation_only_when_configured() {
        let previous = Some("W02 DEPOSITO SIN FECHA");
        assert!(filter(Some("bbva")).is_continuation("REF 99812", previous));
        // generic only continues after a dated line
        assert!(!filter(None).is_continuation("REF 99812", previous));
    }

    #[test]
    fn test_multiline_description_is_kept() {
        // only the line right after the opener continues it
        let text = "24/MAY W02 DEPOSITO DE TERCERO\nBANCO AZTECA\nHOJA SUELTA\n25/MAY R01 PAGO DE NOMINA 15,000.00";
        let filtered = filter(Some("BBVA")).filter(text);
        let lines: Vec<&str> = filtered.lines().collect();
        assert_eq!(
            lines,
            vec![
                "24/MAY W02 DEPOSITO DE TERCERO",
                "BANCO AZTECA",
                "25/MAY R01 PAGO DE NOMINA 15,000.00",
            ]
        );
    }

    #[test]
    fn test_extract_headers_bbva() {
        let headers = filter(Some("BBVA")).extract_headers(BBVA_TEXT);

        let account = &headers["account_info"];
        assert!(account.contains(&"0123456789".to_string()));
        assert!(account.contains(&"JUAN PEREZ".to_string()));
        assert!(account.contains(&"ABC123456DEF".to_string()));
        assert!(headers["statement_period"].contains(&"Mayo 2021".to_string()));
        assert!(headers["balance_info"].contains(&"316,031.10".to_string()));
    }

    #[test]
    fn test_extract_headers_unknown_bank_is_empty() {
        assert!(filter(Some("unknown_bank"))
            .extract_headers(GENERIC_TEXT)
            .is_empty());
    }

    #[test]
    fn test_header_cleanup() {
        assert_eq!(clean_header_value("$1,234.56"), "1,234.56");
        assert_eq!(
            clean_header_value("En el Periodo 01 ENE al 31 ENE: $500.00"),
            "500.00"
        );
    }

    #[test]
    fn test_empty_registry_falls_back_to_generic() {
        let f = TransactionTextFilter::for_bank(&BankPatternConfig::empty(), Some("BBVA"));
        assert_eq!(f.bank(), "generic");
        let filtered = f.filter(GENERIC_TEXT);
        assert!(filtered.contains("01/01 PAGO NOMINA 5,000.00"));
        assert!(!filtered.contains("Estado de Cuenta"));
    }
}
