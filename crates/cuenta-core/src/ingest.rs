//! Statement ingestion pipeline
//!
//! Drives one `StatementFile` from `pending` to `parsed` or `error`:
//!
//! 1. materialize the stored PDF to a temp file (removed on every exit path)
//! 2. text layer, falling back to OCR; no valid text is a terminal error
//! 3. financial summary from the unfiltered text (never fatal)
//! 4. AI path: prefilter, redact, chunk, parse, verify HMAC, restore
//! 5. deterministic line parser when the AI path is off or fails
//! 6. import transactions and persist the result in one transaction
//!
//! Any error is recorded on the statement (`status = error`) before it is returned.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::ai::{chunk_lines, AIBackend, StatementContext};
use crate::config::IngestConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::financial::FinancialDataExtractor;
use crate::models::{
    BankAccount, ExtractionSource, NewFinancialSummary, ParsedStatement, RedactionMap,
    StatementFile, StatementStatus,
};
use crate::ocr::{OcrEngine, TesseractOcr};
use crate::parser::GenericParser;
use crate::patterns::{BankPatternConfig, PatternCategory};
use crate::redact::{restore_value, PiiRedactor};
use crate::text_extractor::{is_valid_text, PdfTextExtractor, TextLayerExtractor};
use crate::text_filter::TransactionTextFilter;

/// Longest `error_message` stored on a statement, in characters
pub const MAX_ERROR_MESSAGE_CHARS: usize = 1000;

/// What one ingestion run did
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub statement_id: i64,
    pub status: StatementStatus,
    pub extraction_source: ExtractionSource,
    pub transactions_imported: usize,
    /// Whether the transactions came from the AI backend
    pub used_ai: bool,
    /// Number of AI requests made (0 when the AI path was skipped)
    pub chunks: usize,
    pub summary_saved: bool,
}

/// Redaction state carried from the outbound payload to restoration
struct Redacted {
    redactor: PiiRedactor,
    map: RedactionMap,
}

/// Result of a successful AI pass
struct AiParse {
    parsed: ParsedStatement,
    chunks: usize,
}

/// Sequences extraction, parsing and persistence for uploaded statements
#[derive(Clone)]
pub struct IngestionOrchestrator {
    db: Database,
    patterns: Arc<BankPatternConfig>,
    text_extractor: Arc<dyn TextLayerExtractor>,
    ocr: Arc<dyn OcrEngine>,
    ai: Option<Arc<dyn AIBackend>>,
    config: IngestConfig,
}

impl IngestionOrchestrator {
    /// Orchestrator with the PDF/Tesseract engines and no AI backend
    pub fn new(db: Database, patterns: Arc<BankPatternConfig>, config: IngestConfig) -> Self {
        Self {
            db,
            patterns,
            text_extractor: Arc::new(PdfTextExtractor::new()),
            ocr: Arc::new(TesseractOcr::from_env()),
            ai: None,
            config,
        }
    }

    /// Everything configured from the environment (AI only if enabled there)
    pub fn from_env(db: Database) -> Self {
        let orchestrator = Self::new(
            db,
            Arc::new(BankPatternConfig::load()),
            IngestConfig::from_env(),
        );
        match crate::ai::AIClient::from_env() {
            Some(client) => orchestrator.with_ai(Arc::new(client)),
            None => orchestrator,
        }
    }

    pub fn with_ai(mut self, ai: Arc<dyn AIBackend>) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn with_text_extractor(mut self, extractor: Arc<dyn TextLayerExtractor>) -> Self {
        self.text_extractor = extractor;
        self
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = ocr;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Run the pipeline for one statement
    ///
    /// On failure the statement is left in `error` with a truncated message
    /// and the error is returned as well.
    pub async fn ingest(&self, statement_id: i64) -> Result<IngestReport> {
        match self.run(statement_id).await {
            Ok(report) => Ok(report),
            Err(e) => {
                let message = truncate_chars(&e.to_string(), MAX_ERROR_MESSAGE_CHARS);
                error!(statement_id, error = %e, "Statement ingestion failed");
                if let Err(mark_err) = self.db.mark_statement_error(statement_id, &message) {
                    error!(statement_id, error = %mark_err, "Failed to record statement error");
                }
                Err(e)
            }
        }
    }

    async fn run(&self, statement_id: i64) -> Result<IngestReport> {
        let statement = self
            .db
            .get_statement_file(statement_id)?
            .ok_or_else(|| Error::NotFound(format!("statement file {}", statement_id)))?;
        let account = self
            .db
            .get_bank_account(statement.bank_account_id)?
            .ok_or_else(|| {
                Error::NotFound(format!("bank account {}", statement.bank_account_id))
            })?;
        let user_id = account.user_id;

        self.db.begin_statement_processing(statement_id)?;
        info!(statement_id, filename = %statement.filename, "Processing statement");

        let (text, source) = self.extract(&statement).await?;
        let bank = self.patterns.resolve_bank(Some(&account.bank_name));
        info!(statement_id, bank = %bank, source = %source, chars = text.len(), "Extracted statement text");

        let summary = if self.config.financial_summary {
            self.financial_summary(statement_id, &bank, &text)
        } else {
            None
        };

        let (mut parsed, used_ai, chunks) = match self
            .parse_with_ai(statement_id, user_id, &account, &bank, &text)
            .await?
        {
            Some(ai) => {
                let source = if ai.chunks > 1 { source.chunked() } else { source };
                let mut parsed = ai.parsed;
                parsed.extraction_source = Some(source);
                (parsed, true, ai.chunks)
            }
            None => {
                let mut parsed = GenericParser::new().parse(&text);
                parsed.extraction_source = Some(source);
                (parsed, false, 0)
            }
        };
        let extraction_source = parsed.extraction_source.unwrap_or(source);

        let finalized = self
            .db
            .finalize_statement(statement_id, &mut parsed, summary.as_ref())?;

        info!(
            statement_id,
            source = %extraction_source,
            imported = finalized.imported,
            used_ai,
            "Statement parsed"
        );

        Ok(IngestReport {
            statement_id,
            status: StatementStatus::Parsed,
            extraction_source,
            transactions_imported: finalized.imported,
            used_ai,
            chunks,
            summary_saved: finalized.summary_saved,
        })
    }

    /// Text layer first, then OCR; both run off the async runtime
    async fn extract(&self, statement: &StatementFile) -> Result<(String, ExtractionSource)> {
        let blob = self.db.get_statement_blob(statement.id)?;

        // Lives until the end of this function; dropping it removes the file
        let mut pdf = tempfile::Builder::new()
            .prefix("cuenta-statement-")
            .suffix(".pdf")
            .tempfile()?;
        pdf.write_all(&blob)?;
        pdf.flush()?;
        let path = pdf.path().to_path_buf();

        let extractor = Arc::clone(&self.text_extractor);
        let text = run_blocking(path.clone(), move |p| extractor.extract(p)).await?;
        if is_valid_text(&text) {
            return Ok((text, ExtractionSource::Text));
        }

        info!(statement_id = statement.id, "No valid text layer, falling back to OCR");
        let ocr = Arc::clone(&self.ocr);
        let text = run_blocking(path, move |p| ocr.extract_text(p)).await?;
        if is_valid_text(&text) {
            return Ok((text, ExtractionSource::Ocr));
        }

        Err(Error::Extraction(format!(
            "no valid text extracted from '{}' (text layer and OCR)",
            statement.filename
        )))
    }

    fn financial_summary(
        &self,
        statement_id: i64,
        bank: &str,
        text: &str,
    ) -> Option<NewFinancialSummary> {
        let data = FinancialDataExtractor::for_bank(&self.patterns, Some(bank)).extract(text)?;
        match data.to_summary() {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(statement_id, error = %e, "Skipping financial summary");
                None
            }
        }
    }

    /// The AI path; `Ok(None)` means "use the line parser"
    ///
    /// Backend failures fall back; redaction and integrity failures do not.
    async fn parse_with_ai(
        &self,
        statement_id: i64,
        user_id: i64,
        account: &BankAccount,
        bank: &str,
        text: &str,
    ) -> Result<Option<AiParse>> {
        let Some(ai) = &self.ai else {
            debug!(statement_id, "AI path disabled");
            return Ok(None);
        };

        let ai_text = if self.config.prefilter {
            let filtered = TransactionTextFilter::for_bank(&self.patterns, Some(bank)).filter(text);
            if filtered.trim().is_empty() {
                debug!(statement_id, "Filter kept nothing, sending the full text");
                text.to_string()
            } else {
                filtered
            }
        } else {
            text.to_string()
        };

        let mut context = StatementContext {
            bank_name: account.bank_name.clone(),
            account_number: account.account_number.clone(),
            taxonomy: self.db.category_taxonomy(user_id)?,
        };

        let (payload, redacted) = if self.config.redaction_enabled {
            let redactor = self.redactor(bank)?;
            let redaction = redactor.redact_preserving_transactions(&ai_text)?;
            if !redaction.map.is_empty() {
                self.db
                    .save_redaction(statement_id, &redaction.map, &redaction.hmac)?;
            }
            info!(statement_id, tokens = redaction.map.len(), "Redacted outbound text");
            context.account_number = context.account_number.as_deref().map(mask_account_number);
            (
                redaction.text,
                Some(Redacted {
                    redactor,
                    map: redaction.map,
                }),
            )
        } else {
            (ai_text.clone(), None)
        };

        let chunks = chunk_lines(&payload, self.config.chunk_max_chars);
        let mut results = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            match ai.parse_statement(chunk, &context).await {
                Ok(parsed) => {
                    debug!(statement_id, chunk = i + 1, transactions = parsed.transactions.len(), "Parsed chunk");
                    results.push(parsed);
                }
                Err(e) => {
                    warn!(
                        statement_id,
                        chunk = i + 1,
                        chunks = chunks.len(),
                        model = ai.model(),
                        error = %e,
                        "AI parsing failed, falling back to line parser"
                    );
                    return Ok(None);
                }
            }
        }
        let mut parsed = ParsedStatement::merge(results);

        if let Some(redacted) = redacted.filter(|r| !r.map.is_empty()) {
            self.verify_integrity(statement_id, &redacted.redactor, &ai_text)?;
            let value = restore_value(serde_json::to_value(&parsed)?, &redacted.map);
            parsed = serde_json::from_value(value)?;
        }

        Ok(Some(AiParse {
            parsed,
            chunks: chunks.len(),
        }))
    }

    fn redactor(&self, bank: &str) -> Result<PiiRedactor> {
        let secret = self
            .config
            .secret_key
            .as_deref()
            .ok_or_else(|| Error::Redaction("redaction enabled but no secret key configured".into()))?;
        let codes = self.patterns.patterns(bank, PatternCategory::TransactionCodes);
        Ok(PiiRedactor::new(secret)?.with_protected_terms(&codes))
    }

    /// Re-redact the source text and check it against the stored tag
    fn verify_integrity(&self, statement_id: i64, redactor: &PiiRedactor, source: &str) -> Result<()> {
        let stored = self.db.get_redaction_hmac(statement_id)?;
        let recomputed = redactor.redact_preserving_transactions(source)?;
        let valid = stored
            .as_deref()
            .is_some_and(|tag| redactor.valid_hmac(&recomputed.text, tag));

        if valid {
            return Ok(());
        }
        if self.config.hmac_strict {
            return Err(Error::Integrity(
                "redacted payload changed between redaction and restoration".into(),
            ));
        }
        warn!(statement_id, "Redaction HMAC mismatch, restoring anyway");
        Ok(())
    }
}

async fn run_blocking<F>(path: PathBuf, f: F) -> Result<String>
where
    F: FnOnce(&Path) -> String + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&path))
        .await
        .map_err(|e| Error::Extraction(format!("extraction task failed: {}", e)))
}

/// Keep only the last four digits: `****1234`
pub fn mask_account_number(account_number: &str) -> String {
    let digits: Vec<char> = account_number.chars().filter(|c| c.is_ascii_digit()).collect();
    let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    format!("****{}", tail)
}

/// Truncate to at most `max` characters without splitting a code point
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
