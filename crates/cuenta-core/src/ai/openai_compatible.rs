//! OpenAI-compatible backend implementation
//!
//! Works with the hosted OpenAI API and any server that implements the chat
//! completions API (vLLM, LocalAI, llama-server, ...).
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_API_KEY`: API key (required; its absence disables the AI path)
//! - `AI_BASE_URL`: Server URL (default: https://api.openai.com)
//! - `AI_MODEL`: Model name (default: gpt-4o-mini)
//! - `AI_TEMPERATURE`: Sampling temperature (optional, server default if unset)

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::ParsedStatement;
use crate::prompts::PromptLibrary;

use super::parsing::parse_statement_response;
use super::prompt::build_statement_prompt;
use super::types::StatementContext;
use super::AIBackend;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Upper bound for one chat-completion request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI-compatible backend
///
/// # Example
///
/// ```rust,ignore
/// export AI_API_KEY="sk-..."
/// export AI_MODEL="gpt-4o-mini"
///
/// // Self-hosted vLLM
/// export AI_BASE_URL="http://192.168.1.100:8000"
/// ```
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    timeout: Duration,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: http_client(DEFAULT_TIMEOUT),
            timeout: DEFAULT_TIMEOUT,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            temperature: None,
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
        }
    }

    /// Create with an API key
    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        let mut backend = Self::new(base_url, model);
        backend.api_key = Some(api_key.to_string());
        backend
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_client = http_client(timeout);
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Use a specific prompt library (tests, custom override dirs)
    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = Arc::new(RwLock::new(prompts));
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    /// Create from environment variables
    ///
    /// Required: `AI_API_KEY`
    /// Optional: `AI_BASE_URL`, `AI_MODEL`, `AI_TEMPERATURE`
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("AI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        let base_url =
            std::env::var("AI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let temperature = std::env::var("AI_TEMPERATURE").ok().and_then(|t| {
            t.trim()
                .parse::<f32>()
                .map_err(|_| warn!(value = %t, "Ignoring invalid AI_TEMPERATURE"))
                .ok()
        });

        Some(Self::with_api_key(&base_url, &model, &api_key).with_temperature(temperature))
    }

    /// Make a chat completion request
    async fn chat_completion(&self, system: &str, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.temperature,
            stream: false,
        };

        let mut req_builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Ai(format!("AI HTTP {}: {}", status, body)));
        }

        let chat_response: ChatCompletionResponse = response.json().await?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| Error::Ai("No choices in chat completion response".into()))
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// Chat completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Chat response message
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
    async fn parse_statement(
        &self,
        text: &str,
        context: &StatementContext,
    ) -> Result<ParsedStatement> {
        let prompt = {
            let mut prompts = self
                .prompts
                .write()
                .map_err(|_| Error::Ai("Failed to acquire prompt library lock".into()))?;
            build_statement_prompt(&mut prompts, text, context)?
        };

        debug!(
            model = %self.model,
            prompt_chars = prompt.user.chars().count(),
            "Sending statement to chat completion API"
        );

        let content = self.chat_completion(&prompt.system, &prompt.user).await?;
        parse_statement_response(&content)
    }

    async fn health_check(&self) -> bool {
        let mut req = self
            .http_client
            .get(format!("{}/v1/models", self.base_url));
        if let Some(ref api_key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        matches!(req.send().await, Ok(resp) if resp.status().is_success())
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Could not build HTTP client with timeout, using defaults");
            Client::new()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionType;
    use crate::test_utils::MockChatServer;

    fn backend(url: &str) -> OpenAICompatibleBackend {
        OpenAICompatibleBackend::with_api_key(url, "test-model", "sk-test")
            .with_prompts(PromptLibrary::embedded_only())
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let backend = OpenAICompatibleBackend::new("http://localhost:8000/", DEFAULT_MODEL);
        assert_eq!(backend.host(), "http://localhost:8000");
        assert_eq!(backend.with_model("other").model(), "other");
    }

    #[tokio::test]
    async fn test_parse_statement_over_http() {
        let server = MockChatServer::start(
            r#"```json
{"opening_balance": "100.00", "closing_balance": null, "transactions": [
  {"date": "2025-01-07", "description": "OXXO", "amount": "-89.00", "transaction_type": "variable_expense", "bank_entry_type": "debit", "category": "Comida", "raw_text": "07-01-2025 OXXO -89.00", "confidence": 0.9}
]}
```"#,
        )
        .await;

        let parsed = backend(&server.url())
            .parse_statement("07-01-2025 OXXO -89.00", &StatementContext::default())
            .await
            .unwrap();

        assert_eq!(parsed.opening_balance, Some(100.0));
        assert_eq!(parsed.transactions.len(), 1);
        assert_eq!(
            parsed.transactions[0].transaction_type,
            TransactionType::VariableExpense
        );

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer sk-test"));
        assert_eq!(requests[0].body["model"], "test-model");
        assert_eq!(requests[0].body["messages"][0]["role"], "system");
        assert!(requests[0].body["messages"][1]["content"]
            .as_str()
            .unwrap()
            .contains("07-01-2025 OXXO -89.00"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockChatServer::start_failing(500).await;

        let err = backend(&server.url())
            .parse_statement("text", &StatementContext::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Ai(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_prose_response_is_an_error() {
        let server = MockChatServer::start("I could not find any transactions.").await;

        let result = backend(&server.url())
            .parse_statement("text", &StatementContext::default())
            .await;

        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // Accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let backend = backend(&url).with_timeout(Duration::from_millis(200));
        assert_eq!(backend.timeout(), Duration::from_millis(200));

        let started = std::time::Instant::now();
        let result = backend
            .parse_statement("text", &StatementContext::default())
            .await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(10));
        drop(listener);
    }
}
