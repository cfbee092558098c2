//! Environment-driven pipeline configuration
//!
//! # Environment variables
//!
//! Ingestion:
//! - `PII_REDACTION_ENABLED`: redact text before it is sent to the AI backend (default: off)
//! - `CUENTA_SECRET_KEY`: HMAC secret, required when redaction is enabled
//! - `PII_HMAC_STRICT`: abort on integrity mismatch (default: on)
//! - `AI_PREFILTER`: drop boilerplate lines before the AI call (default: on)
//! - `AI_CHUNK_MAX_CHARS`: chunk size for AI requests (default: 12000)
//! - `FINANCIAL_SUMMARY_ENABLED`: extract the statement summary (default: on)
//!
//! OCR:
//! - `OCR_LANG` (default: `eng+spa`), `OCR_DPI` (default: 300)
//! - `OCR_DEBUG`: keep rasterized page images, `OCR_DEBUG_DIR` sets where
//! - `OCR_CONVERT_BIN`, `OCR_TESSERACT_BIN`: tool paths

use std::path::PathBuf;

/// Default AI chunk size in characters
pub const DEFAULT_CHUNK_MAX_CHARS: usize = 12_000;

/// Orchestrator switches
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub redaction_enabled: bool,
    pub secret_key: Option<String>,
    pub hmac_strict: bool,
    pub prefilter: bool,
    pub chunk_max_chars: usize,
    pub financial_summary: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            redaction_enabled: false,
            secret_key: None,
            hmac_strict: true,
            prefilter: true,
            chunk_max_chars: DEFAULT_CHUNK_MAX_CHARS,
            financial_summary: true,
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redaction_enabled: env_flag("PII_REDACTION_ENABLED", defaults.redaction_enabled),
            secret_key: std::env::var("CUENTA_SECRET_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            hmac_strict: env_flag("PII_HMAC_STRICT", defaults.hmac_strict),
            prefilter: env_flag("AI_PREFILTER", defaults.prefilter),
            chunk_max_chars: std::env::var("AI_CHUNK_MAX_CHARS")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.chunk_max_chars),
            financial_summary: env_flag("FINANCIAL_SUMMARY_ENABLED", defaults.financial_summary),
        }
    }

    /// Redaction on, with the given secret
    pub fn with_redaction(mut self, secret: &str) -> Self {
        self.redaction_enabled = true;
        self.secret_key = Some(secret.to_string());
        self
    }
}

/// Rasterization and OCR settings
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub lang: String,
    pub dpi: u32,
    pub debug: bool,
    pub debug_dir: PathBuf,
    pub convert_bin: String,
    pub tesseract_bin: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            lang: "eng+spa".to_string(),
            dpi: 300,
            debug: false,
            debug_dir: std::env::temp_dir(),
            convert_bin: "convert".to_string(),
            tesseract_bin: "tesseract".to_string(),
        }
    }
}

impl OcrConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            lang: std::env::var("OCR_LANG")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.lang),
            dpi: std::env::var("OCR_DPI")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .filter(|dpi: &u32| *dpi > 0)
                .unwrap_or(defaults.dpi),
            debug: env_flag("OCR_DEBUG", false),
            debug_dir: std::env::var("OCR_DEBUG_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.debug_dir),
            convert_bin: std::env::var("OCR_CONVERT_BIN").unwrap_or(defaults.convert_bin),
            tesseract_bin: std::env::var("OCR_TESSERACT_BIN").unwrap_or(defaults.tesseract_bin),
        }
    }
}

/// Read a boolean switch; unset or unrecognized values use the default
fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
