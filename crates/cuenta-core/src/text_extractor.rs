//! PDF text-layer extraction
//!
//! The primary engine is `pdf_extract`; when it yields nothing (or errors) we
//! fall back to `lopdf`'s per-page extraction. Whether the result is usable is
//! decided separately by [`is_valid_text`], which is the only signal the
//! orchestrator uses to decide on OCR.

use std::path::Path;

use lopdf::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Date-shaped token: `01/02/2025`, `01-02-2025` or `01-ENE-25` style
static DATE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{2}[/-]\d{2}[/-]\d{4}\b|\b\d{2}[/-][A-Za-z]{3,}[/-]\d{2}\b")
        .expect("date token regex is valid")
});

/// Something that can pull a text layer out of a PDF
///
/// Implementations return an empty string rather than failing: a missing text
/// layer is a normal condition that OCR handles.
pub trait TextLayerExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> String;
}

/// Text layer extraction via `pdf_extract`, then `lopdf`
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }

    fn primary(path: &Path) -> String {
        match pdf_extract::extract_text(path) {
            Ok(text) => text,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "pdf_extract failed");
                String::new()
            }
        }
    }

    fn secondary(path: &Path) -> String {
        let doc = match Document::load(path) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "lopdf could not load PDF");
                return String::new();
            }
        };

        let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
        let mut text = String::new();
        for page in pages {
            match doc.extract_text(&[page]) {
                Ok(page_text) => {
                    text.push_str(&page_text);
                    text.push('\n');
                }
                Err(e) => debug!(page, error = %e, "lopdf page extraction failed"),
            }
        }
        text
    }
}

impl TextLayerExtractor for PdfTextExtractor {
    fn extract(&self, path: &Path) -> String {
        let text = Self::primary(path);
        if !text.trim().is_empty() {
            return text;
        }

        debug!(path = %path.display(), "Primary extraction empty, trying lopdf");
        Self::secondary(path)
    }
}

/// A text layer is usable only if it is non-blank and contains a date-shaped token
pub fn is_valid_text(text: &str) -> bool {
    !text.trim().is_empty() && DATE_TOKEN.is_match(text)
}
