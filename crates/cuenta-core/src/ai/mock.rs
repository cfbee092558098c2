//! Mock backend for testing
//!
//! By default the mock answers with what the deterministic line parser finds
//! in the text it is given, so a pipeline run against it behaves like a very
//! literal model. Tests can pin a canned response or force a failure, and can
//! inspect every text the mock was asked to parse.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::ParsedStatement;
use crate::parser::GenericParser;

use super::parsing::parse_statement_response;
use super::types::StatementContext;
use super::AIBackend;

#[derive(Clone, Default)]
enum MockReply {
    /// Run the line parser over the text
    #[default]
    LineParser,
    /// Raw model output, parsed like a real response
    Canned(String),
    /// Fail every call
    Fail(String),
}

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    reply: MockReply,
    seen: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    /// Answer every call with this raw model output
    pub fn with_response(response: &str) -> Self {
        Self {
            reply: MockReply::Canned(response.to_string()),
            ..Self::new()
        }
    }

    /// Fail every call, as an unreachable API would
    pub fn failing(message: &str) -> Self {
        Self {
            healthy: false,
            reply: MockReply::Fail(message.to_string()),
            ..Default::default()
        }
    }

    /// Create a new instance with a different model (no-op for mock)
    pub fn with_model(&self, _model: &str) -> Self {
        self.clone()
    }

    /// Statement texts received so far, in call order
    pub fn seen_texts(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn parse_statement(
        &self,
        text: &str,
        _context: &StatementContext,
    ) -> Result<ParsedStatement> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(text.to_string());
        }

        match &self.reply {
            MockReply::LineParser => Ok(GenericParser::new().parse(text)),
            MockReply::Canned(response) => parse_statement_response(response),
            MockReply::Fail(message) => Err(Error::Ai(message.clone())),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
