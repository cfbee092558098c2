//! Debugging commands that never touch the database
//!
//! `inspect` shows each stage of extraction for a PDF, `redact` shows what
//! the AI backend would receive for a piece of text.

use std::path::Path;

use anyhow::{Context, Result};
use cuenta_core::patterns::PatternCategory;
use cuenta_core::text_extractor::is_valid_text;
use cuenta_core::{
    BankPatternConfig, FinancialDataExtractor, OcrEngine, PdfTextExtractor, PiiRedactor,
    Redaction, TesseractOcr, TextLayerExtractor, TransactionTextFilter,
};

pub fn cmd_banks() -> Result<()> {
    let patterns = BankPatternConfig::load();

    println!();
    println!("🏦 Supported banks");
    for bank in patterns.supported_banks() {
        println!("   {:<12} {}", bank, patterns.display_name(bank));
    }
    println!();
    println!("   Unknown bank names use the 'generic' patterns.");

    Ok(())
}

pub async fn cmd_inspect(file: &Path, bank: Option<&str>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }
    let path = file.to_path_buf();

    let (text, source) = tokio::task::spawn_blocking(move || {
        let text = PdfTextExtractor::new().extract(&path);
        if is_valid_text(&text) {
            return (text, "text");
        }
        (TesseractOcr::from_env().extract_text(&path), "ocr")
    })
    .await
    .context("Extraction task failed")?;

    let patterns = BankPatternConfig::load();
    let resolved = patterns.resolve_bank(bank);
    println!("🔎 {} ({})", file.display(), patterns.display_name(&resolved));
    println!(
        "   Source: {} │ {} chars │ valid: {}",
        source,
        text.chars().count(),
        is_valid_text(&text)
    );

    section("Extracted text");
    println!("{}", text);

    let filter = TransactionTextFilter::for_bank(&patterns, Some(&resolved));
    section("Transaction lines");
    println!("{}", filter.filter(&text));

    section("Headers");
    for (category, values) in filter.extract_headers(&text) {
        println!("   {}: {}", category, values.join(" | "));
    }

    section("Financial summary");
    match FinancialDataExtractor::for_bank(&patterns, Some(&resolved)).extract(&text) {
        Some(data) => {
            println!("{}", serde_json::to_string_pretty(&data)?);
            if let Err(e) = data.to_summary() {
                println!("   ⚠️  Not storable: {}", e);
            }
        }
        None => println!("   (no financial labels for this bank)"),
    }

    Ok(())
}

pub fn cmd_redact(file: &Path, bank: Option<&str>, secret: Option<&str>) -> Result<()> {
    let secret = secret.context("Set CUENTA_SECRET_KEY to redact")?;
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let redaction = redact_text(&text, bank, secret)?;

    section("Redacted text");
    println!("{}", redaction.text);
    section("Tokens");
    for (token, original) in &redaction.map {
        println!("   {} = {}", token, original);
    }
    section("HMAC");
    println!("   {}", redaction.hmac);

    Ok(())
}

/// Preserving-mode redaction when a bank is given, plain redaction otherwise
pub fn redact_text(text: &str, bank: Option<&str>, secret: &str) -> Result<Redaction> {
    let redactor = PiiRedactor::new(secret)?;
    let redaction = match bank {
        Some(bank) => {
            let patterns = BankPatternConfig::load();
            let resolved = patterns.resolve_bank(Some(bank));
            redactor
                .with_protected_terms(&patterns.patterns(&resolved, PatternCategory::TransactionCodes))
                .redact_preserving_transactions(text)?
        }
        None => redactor.redact(text)?,
    };
    Ok(redaction)
}

fn section(title: &str) {
    println!();
    println!("── {} {}", title, "─".repeat(50usize.saturating_sub(title.len())));
}
