//! Pluggable AI backend abstraction for statement parsing
//!
//! # Architecture
//!
//! - `AIBackend` trait: defines the interface for all AI operations
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `MockBackend`
//! - `prompt`: statement prompt rendering and line-aligned chunking
//! - `parsing`: JSON extraction and normalization of model output
//!
//! # Usage
//!
//! ```rust,ignore
//! let ai = AIClient::from_env();
//!
//! if let Some(ref client) = ai {
//!     let parsed = client.parse_statement(&text, &context).await?;
//!     println!("{} transactions", parsed.transactions.len());
//! }
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (openai_compatible, mock). Default: openai_compatible
//! - `AI_API_KEY`, `AI_BASE_URL`, `AI_MODEL`, `AI_TEMPERATURE`: see `OpenAICompatibleBackend`

mod mock;
mod openai_compatible;
pub mod parsing;
pub mod prompt;
pub mod types;

pub use mock::MockBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use prompt::{build_statement_prompt, chunk_lines};
pub use types::*;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ParsedStatement;

/// Trait defining the interface for all AI backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Parse one chunk of statement text into normalized transactions
    ///
    /// Network, HTTP and malformed-JSON failures are all errors; there is no
    /// retry at this level.
    async fn parse_statement(
        &self,
        text: &str,
        context: &StatementContext,
    ) -> Result<ParsedStatement>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// Hosted OpenAI or any server with the same chat completions API
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use:
    /// - `openai_compatible` (default): needs `AI_API_KEY`
    /// - `mock`: Creates a mock backend for testing
    ///
    /// Returns None when the AI path is disabled (no API key).
    pub fn from_env() -> Option<Self> {
        let backend =
            std::env::var("AI_BACKEND").unwrap_or_else(|_| "openai_compatible".to_string());

        match backend.to_lowercase().as_str() {
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(
                    backend = %backend,
                    "Unknown AI_BACKEND, falling back to openai_compatible"
                );
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
        }
    }

    /// Create an OpenAI-compatible backend directly
    pub fn openai_compatible(base_url: &str, model: &str, api_key: &str) -> Self {
        AIClient::OpenAICompatible(OpenAICompatibleBackend::with_api_key(
            base_url, model, api_key,
        ))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            AIClient::OpenAICompatible(b) => AIClient::OpenAICompatible(b.with_model(model)),
            AIClient::Mock(b) => AIClient::Mock(b.with_model(model)),
        }
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn parse_statement(
        &self,
        text: &str,
        context: &StatementContext,
    ) -> Result<ParsedStatement> {
        match self {
            AIClient::OpenAICompatible(b) => b.parse_statement(text, context).await,
            AIClient::Mock(b) => b.parse_statement(text, context).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::{BankEntryType, TransactionType};

    #[tokio::test]
    async fn test_ai_client_mock() {
        let client = AIClient::mock();
        assert!(client.health_check().await);
        assert_eq!(client.model(), "mock-model");

        let parsed = client
            .parse_statement(
                "03/01/2025 Pago Nomina EMPRESA SA 15,000.00\nSALDO FINAL",
                &StatementContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(parsed.transactions.len(), 1);
        assert_eq!(parsed.transactions[0].bank_entry_type, Some(BankEntryType::Credit));
    }

    #[tokio::test]
    async fn test_mock_canned_response_and_recording() {
        let mock = MockBackend::with_response(
            r#"{"transactions": [{"date": "2025-01-07", "description": "OXXO", "amount": "-89.00"}]}"#,
        );
        let client = AIClient::Mock(mock.clone());

        let parsed = client
            .parse_statement("chunk one", &StatementContext::default())
            .await
            .unwrap();

        assert_eq!(
            parsed.transactions[0].transaction_type,
            TransactionType::VariableExpense
        );
        assert_eq!(mock.seen_texts(), vec!["chunk one".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let client = AIClient::Mock(MockBackend::failing("connection refused"));
        assert!(!client.health_check().await);

        let err = client
            .parse_statement("text", &StatementContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Ai(_)));
    }
}
