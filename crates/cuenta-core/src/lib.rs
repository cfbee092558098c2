//! Cuenta Core Library
//!
//! Bank statement ingestion for the Cuenta finance tool:
//! - Database access and migrations (SQLCipher-encrypted SQLite)
//! - PDF text-layer extraction with an OCR fallback
//! - Per-bank pattern registry driving line filtering and summary extraction
//! - Reversible PII redaction with an HMAC integrity tag
//! - Pluggable AI backends for statement parsing, with a deterministic line parser fallback
//! - Prompt library for customizable AI prompts
//! - Transaction import into an owner-scoped category hierarchy

pub mod ai;
pub mod config;
pub mod db;
pub mod error;
pub mod financial;
pub mod importer;
pub mod ingest;
pub mod models;
pub mod ocr;
pub mod parser;
pub mod patterns;
pub mod prompts;
pub mod redact;
pub mod text_extractor;
pub mod text_filter;

/// Test utilities including mock chat-completions server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIBackend, AIClient, MockBackend, OpenAICompatibleBackend, StatementContext};
pub use config::{IngestConfig, OcrConfig};
pub use db::{Database, Finalized};
pub use error::{Error, Result};
pub use financial::{FinancialData, FinancialDataExtractor};
pub use importer::{ImportTarget, TransactionImporter};
pub use ingest::{IngestReport, IngestionOrchestrator};
pub use ocr::{OcrEngine, TesseractOcr};
pub use parser::GenericParser;
pub use patterns::{BankPatternConfig, PatternCategory};
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use redact::{PiiRedactor, Redaction};
pub use text_extractor::{is_valid_text, PdfTextExtractor, TextLayerExtractor};
pub use text_filter::TransactionTextFilter;
