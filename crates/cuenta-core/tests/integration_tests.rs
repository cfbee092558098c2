//! Integration tests for cuenta-core
//!
//! These tests exercise the full upload → extract → parse → import workflow
//! with stub text/OCR engines and the mock AI backend.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cuenta_core::{
    ai::{AIBackend, MockBackend, StatementContext},
    db::Database,
    models::{
        BankEntryType, ExtractionSource, ParsedStatement, StatementStatus, StatementType,
        TransactionType,
    },
    BankPatternConfig, Error, IngestConfig, IngestionOrchestrator, OcrEngine, PiiRedactor,
    Result, TextLayerExtractor,
};
use rust_decimal::Decimal;

const SECRET: &str = "integration-secret";

/// A statement whose text layer is fine
fn statement_text() -> &'static str {
    "ESTADO DE CUENTA\n\
     Saldo Inicial: 1,000.00\n\
     Saldo Final: 1,200.50\n\
     Periodo DEL 01/05/2021 AL 31/05/2021\n\
     Fecha de Corte 31/05/2021\n\
     03/05/2021 SPEI RECIBIDO juan@example.com 15,000.00\n\
     07/05/2021 OXXO Compra -89.00\n\
     10/05/2021 PAGO TELMEX (1,599.50)\n"
}

/// Text layer stub returning fixed text
struct FixedText(String);

impl TextLayerExtractor for FixedText {
    fn extract(&self, _path: &Path) -> String {
        self.0.clone()
    }
}

/// OCR stub returning fixed text and counting calls
struct FixedOcr {
    text: String,
    calls: AtomicUsize,
}

impl FixedOcr {
    fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

impl OcrEngine for FixedOcr {
    fn extract_text(&self, path: &Path) -> String {
        assert!(path.exists(), "temp PDF must exist while OCR runs");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.text.clone()
    }
}

/// Backend that rewrites the stored HMAC while "the model" is working
struct TamperingBackend {
    db: Database,
    statement_id: i64,
    inner: MockBackend,
}

#[async_trait]
impl AIBackend for TamperingBackend {
    async fn parse_statement(
        &self,
        text: &str,
        context: &StatementContext,
    ) -> Result<ParsedStatement> {
        let conn = self.db.conn()?;
        conn.execute(
            "UPDATE statement_files SET redaction_hmac = ? WHERE id = ?",
            rusqlite::params!["00ff", self.statement_id],
        )?;
        self.inner.parse_statement(text, context).await
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn model(&self) -> &str {
        "tampering"
    }

    fn host(&self) -> &str {
        "mock://tampering"
    }
}

struct Fixture {
    db: Database,
    statement_id: i64,
    user_id: i64,
}

fn fixture() -> Fixture {
    let db = Database::in_memory().expect("Failed to create in-memory database");
    let user_id = db.upsert_user("juan@example.com").unwrap();
    let account = db
        .create_bank_account(user_id, "BBVA", Some("0123456789"), "MXN")
        .unwrap();
    let statement_id = db
        .create_statement_file(account, "mayo.pdf", b"%PDF-1.4 stub")
        .unwrap();
    Fixture {
        db,
        statement_id,
        user_id,
    }
}

fn orchestrator(db: &Database, text: &str, config: IngestConfig) -> IngestionOrchestrator {
    IngestionOrchestrator::new(db.clone(), Arc::new(BankPatternConfig::embedded()), config)
        .with_text_extractor(Arc::new(FixedText(text.to_string())))
        .with_ocr(FixedOcr::new(""))
}

fn assert_sign_invariant(db: &Database, statement_id: i64) {
    for tx in db.list_statement_transactions(statement_id).unwrap() {
        if tx.amount < Decimal::ZERO {
            assert!(tx.transaction_type.is_expense(), "{:?}", tx);
        } else {
            assert_eq!(tx.transaction_type, TransactionType::Income, "{:?}", tx);
        }
    }
}

// =============================================================================
// Fallback path
// =============================================================================

#[tokio::test]
async fn test_line_parser_path_without_ai() {
    let f = fixture();
    let report = orchestrator(&f.db, statement_text(), IngestConfig::default())
        .ingest(f.statement_id)
        .await
        .unwrap();

    assert_eq!(report.status, StatementStatus::Parsed);
    assert_eq!(report.extraction_source, ExtractionSource::Text);
    assert_eq!(report.transactions_imported, 3);
    assert!(!report.used_ai);
    assert_eq!(report.chunks, 0);

    let statement = f.db.get_statement_file(f.statement_id).unwrap().unwrap();
    assert_eq!(statement.status, StatementStatus::Parsed);
    assert!(statement.processed_at.is_some());
    assert!(statement.redaction_map.is_none());
    assert!(statement.redaction_hmac.is_none());

    let parsed = statement.parsed().unwrap();
    assert_eq!(parsed.extraction_source, Some(ExtractionSource::Text));
    assert_eq!(parsed.imported_count, Some(3));
    assert!(parsed.transactions.iter().all(|t| t.confidence == 0.6));

    let txs = f.db.list_statement_transactions(f.statement_id).unwrap();
    assert_eq!(txs[2].amount, Decimal::new(-159950, 2));
    assert_eq!(txs[2].bank_entry_type, Some(BankEntryType::Debit));
    assert_sign_invariant(&f.db, f.statement_id);
}

#[tokio::test]
async fn test_ai_network_error_falls_back_to_line_parser() {
    let f = fixture();
    let report = orchestrator(&f.db, statement_text(), IngestConfig::default())
        .with_ai(Arc::new(MockBackend::failing("connection refused")))
        .ingest(f.statement_id)
        .await
        .unwrap();

    assert_eq!(report.status, StatementStatus::Parsed);
    assert!(!report.used_ai);
    assert_eq!(report.extraction_source, ExtractionSource::Text);
    assert_eq!(report.transactions_imported, 3);

    let statement = f.db.get_statement_file(f.statement_id).unwrap().unwrap();
    assert_eq!(statement.status, StatementStatus::Parsed);
    assert!(statement.error_message.is_none());
}

// =============================================================================
// Extraction
// =============================================================================

#[tokio::test]
async fn test_text_without_dates_goes_to_ocr() {
    let f = fixture();
    let ocr = FixedOcr::new("03/05/2021 DEPOSITO EFECTIVO 500.00");
    let long_dateless = "SALDO ANTERIOR 12,500.00\n".repeat(200);

    let report = orchestrator(&f.db, &long_dateless, IngestConfig::default())
        .with_ocr(ocr.clone())
        .ingest(f.statement_id)
        .await
        .unwrap();

    assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.extraction_source, ExtractionSource::Ocr);
    assert_eq!(report.transactions_imported, 1);
}

#[tokio::test]
async fn test_valid_text_layer_skips_ocr() {
    let f = fixture();
    let ocr = FixedOcr::new("03/05/2021 DEPOSITO EFECTIVO 500.00");

    orchestrator(&f.db, statement_text(), IngestConfig::default())
        .with_ocr(ocr.clone())
        .ingest(f.statement_id)
        .await
        .unwrap();

    assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_no_valid_text_marks_statement_error() {
    let f = fixture();
    let ai = MockBackend::new();

    let err = orchestrator(&f.db, "", IngestConfig::default())
        .with_ocr(FixedOcr::new("page without any dates"))
        .with_ai(Arc::new(ai.clone()))
        .ingest(f.statement_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Extraction(_)));

    let statement = f.db.get_statement_file(f.statement_id).unwrap().unwrap();
    assert_eq!(statement.status, StatementStatus::Error);
    assert!(statement.processed_at.is_some());
    assert!(statement
        .error_message
        .as_deref()
        .unwrap()
        .contains("no valid text"));
    // Nothing after extraction ran
    assert!(ai.seen_texts().is_empty());
    assert_eq!(f.db.count_statement_transactions(f.statement_id).unwrap(), 0);
}

#[tokio::test]
async fn test_missing_statement_is_an_error() {
    let f = fixture();
    let err = orchestrator(&f.db, statement_text(), IngestConfig::default())
        .ingest(f.statement_id + 100)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

// =============================================================================
// AI path
// =============================================================================

#[tokio::test]
async fn test_ai_output_is_reclassified_by_sign() {
    let f = fixture();
    let ai = MockBackend::with_response(
        r#"{
            "opening_balance": 1000.0,
            "closing_balance": 1200.5,
            "transactions": [
                {"date": "2021-05-03", "description": "SPEI RECIBIDO", "amount": "15,000.00",
                 "transaction_type": "variable_expense", "bank_entry_type": "dr",
                 "category": "Ingresos", "sub_category": "Nómina", "confidence": 1.7},
                {"date": "2021-05-07", "description": "OXXO", "amount": -89,
                 "transaction_type": "income", "category": "Comida", "sub_category": "Mandado"},
                {"date": "2021-05-10", "description": "TELMEX", "amount": -1599.5,
                 "transaction_type": "fixed_expense", "category": "Uncategorized"}
            ]
        }"#,
    );

    let report = orchestrator(&f.db, statement_text(), IngestConfig::default())
        .with_ai(Arc::new(ai))
        .ingest(f.statement_id)
        .await
        .unwrap();

    assert!(report.used_ai);
    assert_eq!(report.chunks, 1);
    assert_eq!(report.transactions_imported, 3);
    assert_sign_invariant(&f.db, f.statement_id);

    let txs = f.db.list_statement_transactions(f.statement_id).unwrap();
    assert_eq!(txs[0].transaction_type, TransactionType::Income);
    assert_eq!(txs[0].bank_entry_type, Some(BankEntryType::Credit));
    assert_eq!(txs[2].transaction_type, TransactionType::FixedExpense);
    assert!(txs[2].category_id.is_none());

    let child = f.db.get_category(txs[1].category_id.unwrap()).unwrap().unwrap();
    assert_eq!(child.name, "Mandado");
    let parent = f.db.get_category(child.parent_id.unwrap()).unwrap().unwrap();
    assert_eq!(parent.name, "Comida");
    assert_eq!(parent.user_id, f.user_id);

    let parsed = f
        .db
        .get_statement_file(f.statement_id)
        .unwrap()
        .unwrap()
        .parsed()
        .unwrap();
    assert_eq!(parsed.opening_balance, Some(1000.0));
    assert_eq!(parsed.transactions[0].confidence, 1.0);
}

#[tokio::test]
async fn test_long_text_is_chunked_and_merged() {
    let f = fixture();
    let ai = MockBackend::new();
    let config = IngestConfig {
        chunk_max_chars: 60,
        prefilter: false,
        ..IngestConfig::default()
    };

    let report = orchestrator(&f.db, statement_text(), config)
        .with_ai(Arc::new(ai.clone()))
        .ingest(f.statement_id)
        .await
        .unwrap();

    let seen = ai.seen_texts();
    assert!(seen.len() > 1);
    assert!(seen.iter().all(|chunk| chunk.chars().count() <= 60));
    assert_eq!(report.chunks, seen.len());
    assert_eq!(report.extraction_source, ExtractionSource::TextChunked);
    assert_eq!(report.transactions_imported, 3);

    // Chunk order is statement order
    let txs = f.db.list_statement_transactions(f.statement_id).unwrap();
    let descriptions: Vec<_> = txs.iter().map(|t| t.description.as_str()).collect();
    assert_eq!(
        descriptions,
        vec!["SPEI RECIBIDO juan@example.com", "OXXO Compra", "PAGO TELMEX"]
    );
}

#[tokio::test]
async fn test_financial_summary_is_saved() {
    let f = fixture();
    let report = orchestrator(&f.db, statement_text(), IngestConfig::default())
        .ingest(f.statement_id)
        .await
        .unwrap();
    assert!(report.summary_saved);

    let summary = f.db.get_financial_summary(f.statement_id).unwrap().unwrap();
    assert_eq!(summary.statement_type, StatementType::Savings);
    assert_eq!(summary.initial_balance, Decimal::new(100000, 2));
    assert_eq!(summary.final_balance, Decimal::new(120050, 2));
    assert_eq!(summary.days_in_period, 31);
}

#[tokio::test]
async fn test_financial_summary_can_be_disabled() {
    let f = fixture();
    let config = IngestConfig {
        financial_summary: false,
        ..IngestConfig::default()
    };
    let report = orchestrator(&f.db, statement_text(), config)
        .ingest(f.statement_id)
        .await
        .unwrap();
    assert!(!report.summary_saved);
    assert!(f.db.get_financial_summary(f.statement_id).unwrap().is_none());
}

// =============================================================================
// Redaction
// =============================================================================

fn redacting_config() -> IngestConfig {
    IngestConfig {
        prefilter: false,
        ..IngestConfig::default().with_redaction(SECRET)
    }
}

#[tokio::test]
async fn test_redacted_text_leaves_and_is_restored() {
    let f = fixture();
    let ai = MockBackend::new();

    let report = orchestrator(&f.db, statement_text(), redacting_config())
        .with_ai(Arc::new(ai.clone()))
        .ingest(f.statement_id)
        .await
        .unwrap();
    assert!(report.used_ai);

    let sent = ai.seen_texts().join("\n");
    assert!(!sent.contains("juan@example.com"));
    assert!(sent.contains("⟪PII:EMAIL:1⟫"));
    // Transaction vocabulary and amounts still reach the model
    assert!(sent.contains("SPEI RECIBIDO"));
    assert!(sent.contains("15,000.00"));

    let statement = f.db.get_statement_file(f.statement_id).unwrap().unwrap();
    let map = statement.redaction_map.unwrap();
    assert_eq!(map["⟪PII:EMAIL:1⟫"], "juan@example.com");
    let hmac = statement.redaction_hmac.unwrap();
    assert!(PiiRedactor::new(SECRET).unwrap().valid_hmac(&sent, &hmac));

    let txs = f.db.list_statement_transactions(f.statement_id).unwrap();
    assert_eq!(txs[0].description, "SPEI RECIBIDO juan@example.com");
    assert!(!statement.parsed_json.unwrap().contains("⟪PII:"));
}

#[tokio::test]
async fn test_redaction_without_pii_stores_nothing() {
    let f = fixture();
    let text = "03/05/2021 OXXO Compra -89.00\n07/05/2021 DEPOSITO 500.00";

    orchestrator(&f.db, text, redacting_config())
        .with_ai(Arc::new(MockBackend::new()))
        .ingest(f.statement_id)
        .await
        .unwrap();

    let statement = f.db.get_statement_file(f.statement_id).unwrap().unwrap();
    assert_eq!(statement.status, StatementStatus::Parsed);
    assert!(statement.redaction_map.is_none());
    assert!(statement.redaction_hmac.is_none());
}

#[tokio::test]
async fn test_keyword_email_never_reaches_the_model() {
    let f = fixture();
    let ai = MockBackend::new();
    let text = format!("{}\nAclaraciones: nomina@empresa.com", statement_text());

    orchestrator(&f.db, &text, redacting_config())
        .with_ai(Arc::new(ai.clone()))
        .ingest(f.statement_id)
        .await
        .unwrap();

    let sent = ai.seen_texts().join("\n");
    assert!(!sent.contains("nomina@empresa.com"), "{}", sent);

    let map = f
        .db
        .get_statement_file(f.statement_id)
        .unwrap()
        .unwrap()
        .redaction_map
        .unwrap();
    assert!(map.values().any(|original| original == "nomina@empresa.com"));
}

#[tokio::test]
async fn test_rerun_without_redaction_drops_previous_tag() {
    let f = fixture();

    orchestrator(&f.db, statement_text(), redacting_config())
        .with_ai(Arc::new(MockBackend::new()))
        .ingest(f.statement_id)
        .await
        .unwrap();
    assert!(f.db.get_redaction_hmac(f.statement_id).unwrap().is_some());

    // Straight re-ingest, no reset in between
    orchestrator(&f.db, statement_text(), IngestConfig::default())
        .ingest(f.statement_id)
        .await
        .unwrap();

    let statement = f.db.get_statement_file(f.statement_id).unwrap().unwrap();
    assert_eq!(statement.status, StatementStatus::Parsed);
    assert!(statement.redaction_map.is_none());
    assert!(statement.redaction_hmac.is_none());
}

#[tokio::test]
async fn test_redaction_without_secret_is_fatal() {
    let f = fixture();
    let ai = MockBackend::new();
    let config = IngestConfig {
        redaction_enabled: true,
        secret_key: None,
        ..IngestConfig::default()
    };

    let err = orchestrator(&f.db, statement_text(), config)
        .with_ai(Arc::new(ai.clone()))
        .ingest(f.statement_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Redaction(_)));
    assert!(ai.seen_texts().is_empty());

    let statement = f.db.get_statement_file(f.statement_id).unwrap().unwrap();
    assert_eq!(statement.status, StatementStatus::Error);
}

#[tokio::test]
async fn test_hmac_mismatch_aborts_when_strict() {
    let f = fixture();
    let backend = TamperingBackend {
        db: f.db.clone(),
        statement_id: f.statement_id,
        inner: MockBackend::new(),
    };

    let err = orchestrator(&f.db, statement_text(), redacting_config())
        .with_ai(Arc::new(backend))
        .ingest(f.statement_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));

    let statement = f.db.get_statement_file(f.statement_id).unwrap().unwrap();
    assert_eq!(statement.status, StatementStatus::Error);
    assert!(statement.parsed_json.is_none());
    assert_eq!(f.db.count_statement_transactions(f.statement_id).unwrap(), 0);
}

#[tokio::test]
async fn test_hmac_mismatch_is_logged_when_lenient() {
    let f = fixture();
    let backend = TamperingBackend {
        db: f.db.clone(),
        statement_id: f.statement_id,
        inner: MockBackend::new(),
    };
    let config = IngestConfig {
        hmac_strict: false,
        ..redacting_config()
    };

    let report = orchestrator(&f.db, statement_text(), config)
        .with_ai(Arc::new(backend))
        .ingest(f.statement_id)
        .await
        .unwrap();
    assert_eq!(report.status, StatementStatus::Parsed);

    let txs = f.db.list_statement_transactions(f.statement_id).unwrap();
    assert_eq!(txs[0].description, "SPEI RECIBIDO juan@example.com");
}

// =============================================================================
// Reprocessing
// =============================================================================

#[tokio::test]
async fn test_reprocess_replaces_transactions() {
    let f = fixture();
    let pipeline = orchestrator(&f.db, statement_text(), IngestConfig::default());

    pipeline.ingest(f.statement_id).await.unwrap();
    let first = f.db.list_statement_transactions(f.statement_id).unwrap();
    let categories_before = f.db.list_categories(f.user_id).unwrap().len();

    f.db.reset_statement_for_reprocess(f.statement_id).unwrap();
    let report = pipeline.ingest(f.statement_id).await.unwrap();

    assert_eq!(report.transactions_imported, first.len());
    assert_eq!(
        f.db.count_statement_transactions(f.statement_id).unwrap() as usize,
        first.len()
    );
    assert_eq!(f.db.list_categories(f.user_id).unwrap().len(), categories_before);
}
