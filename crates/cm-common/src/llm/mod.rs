use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Runtime configuration for the structured-output LLM client. Built once at
/// startup from CLI/env and validated before any call site sees it.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".into(),
            endpoint: "https://api.openai.com/v1".into(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_secs(5),
            temperature: 0.7,
        }
    }
}

impl LlmConfig {
    /// Fail fast on configuration that would only surface mid-iteration.
    pub fn validated(self) -> Result<Self, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        Ok(self)
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm api key is not configured")]
    MissingApiKey,
    #[error("llm call timed out")]
    Timeout,
    #[error("llm transport error: {0}")]
    Transport(String),
    #[error("llm returned http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("llm returned an empty response")]
    EmptyResponse,
    #[error("llm output failed schema validation: {diagnostics}")]
    Schema { raw: String, diagnostics: String },
}

impl LlmError {
    /// Timeouts and transient upstream failures may be retried; malformed
    /// output may not (it needs a prompt or schema fix, not a retry).
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout | LlmError::Transport(_) => true,
            LlmError::Http { status, .. } => *status == 429 || *status >= 500,
            LlmError::MissingApiKey | LlmError::EmptyResponse | LlmError::Schema { .. } => false,
        }
    }
}

/// Single structured-output call against a chat model: one system prompt, one
/// user prompt, JSON object back. Object-safe so the API can hold any
/// implementation behind a trait object.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete_json(&self, system: &str, user: &str) -> Result<Value, LlmError>;
}

/// Deserialize an LLM JSON payload into a concrete type, tagging failures as
/// schema errors that carry the raw output for diagnosis.
pub fn parse_structured<T: DeserializeOwned>(value: Value) -> Result<T, LlmError> {
    let raw = value.to_string();
    serde_json::from_value(value).map_err(|err| LlmError::Schema {
        raw,
        diagnostics: err.to_string(),
    })
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Client for OpenAI-compatible chat-completions endpoints with per-call
/// timeout and bounded retry on transient failures.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let config = config.validated()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| LlmError::Transport(err.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn attempt(&self, system: &str, user: &str) -> Result<Value, LlmError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.endpoint))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)?;

        serde_json::from_str(&content).map_err(|err| LlmError::Schema {
            raw: content,
            diagnostics: format!("model output is not valid JSON: {err}"),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete_json(&self, system: &str, user: &str) -> Result<Value, LlmError> {
        let mut attempt = 0;
        loop {
            match self.attempt(system, user).await {
                Ok(value) => {
                    debug!(model = %self.config.model, attempt, "llm call succeeded");
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        model = %self.config.model,
                        attempt,
                        max_retries = self.config.max_retries,
                        error = %err,
                        "retrying llm call"
                    );
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_fails_validation() {
        let err = LlmConfig::default().validated().unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
    }

    #[test]
    fn retryability_distinguishes_timeout_from_schema() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(LlmError::Http {
            status: 429,
            message: String::new()
        }
        .is_retryable());
        assert!(LlmError::Http {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!LlmError::Http {
            status: 401,
            message: String::new()
        }
        .is_retryable());
        assert!(!LlmError::Schema {
            raw: String::new(),
            diagnostics: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn parse_structured_tags_schema_failures_with_raw_output() {
        #[derive(Debug, serde::Deserialize)]
        struct Expected {
            #[allow(dead_code)]
            confidence: f32,
        }

        let err =
            parse_structured::<Expected>(serde_json::json!({ "confidence": "high" })).unwrap_err();
        match err {
            LlmError::Schema { raw, diagnostics } => {
                assert!(raw.contains("high"));
                assert!(!diagnostics.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
