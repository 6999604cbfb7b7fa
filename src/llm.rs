//! # Language Model Backend Module
//!
//! Chat message types shared by the history store, the reading workflow and
//! the OpenAI-compatible chat-completions client used to talk to Groq.

use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{BackendConfig, RecoveryConfig};
use crate::errors::{BackendError, BackendErrorKind};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a completion request (wire-compatible with chat completions)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Client for an OpenAI-compatible chat-completions endpoint
pub struct GroqClient {
    http: reqwest::Client,
    config: BackendConfig,
    breaker: CircuitBreaker,
}

impl GroqClient {
    pub fn new(config: BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        let breaker = CircuitBreaker::new(&config.recovery);
        Ok(Self {
            http,
            config,
            breaker,
        })
    }

    /// Run a completion for `messages` with `model`, retrying transient failures
    pub async fn complete_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, BackendError> {
        if self.breaker.is_open() {
            warn!(model = %model, "Circuit breaker open, rejecting completion request");
            return Err(BackendError::new(
                BackendErrorKind::CircuitOpen,
                "too many consecutive backend failures",
            ));
        }

        let mut attempt = 0;
        loop {
            match self.send_once(model, messages).await {
                Ok(content) => {
                    self.breaker.record_success();
                    debug!(model = %model, attempt, chars = content.len(), "Completion succeeded");
                    return Ok(content);
                }
                Err(e) if e.is_retryable() && attempt < self.config.recovery.max_retries => {
                    let delay = retry_delay(&self.config.recovery, attempt);
                    warn!(
                        model = %model,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.breaker.record_failure();
                    return Err(e);
                }
            }
        }
    }

    async fn send_once(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, BackendError> {
        let body = CompletionRequest {
            model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
        };
        let timeout = Duration::from_secs(self.config.recovery.operation_timeout_secs);

        let exchange = async {
            let response = self
                .http
                .post(&self.config.api_url)
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
                .await
                .map_err(classify_transport_error)?;

            let status = response.status().as_u16();
            let text = response.text().await.map_err(|e| {
                BackendError::new(BackendErrorKind::Network, format!("Failed to read response: {e}"))
            })?;

            if !(200..300).contains(&status) {
                return Err(classify_status(status, &text));
            }
            parse_completion(&text)
        };

        tokio::time::timeout(timeout, exchange).await.map_err(|_| {
            BackendError::new(
                BackendErrorKind::Timeout,
                format!("no response within {}s", timeout.as_secs()),
            )
        })?
    }
}

fn classify_transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::new(BackendErrorKind::Timeout, format!("Request timeout: {e}"))
    } else if e.is_connect() || e.is_request() {
        BackendError::new(BackendErrorKind::Network, format!("Connection failed: {e}"))
    } else {
        BackendError::new(BackendErrorKind::InvalidResponse, format!("Request failed: {e}"))
    }
}

/// Map a non-success HTTP status and body to a backend error
pub fn classify_status(status: u16, body: &str) -> BackendError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|resp| resp.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());

    let kind = match status {
        401 | 403 => BackendErrorKind::Auth,
        429 => BackendErrorKind::RateLimited,
        500..=599 => BackendErrorKind::Server,
        _ => BackendErrorKind::InvalidResponse,
    };
    BackendError::new(kind, format!("HTTP {status}: {message}"))
}

/// Extract the first choice's content from a completion response body
pub fn parse_completion(body: &str) -> Result<String, BackendError> {
    let response: CompletionResponse = serde_json::from_str(body).map_err(|e| {
        BackendError::new(
            BackendErrorKind::InvalidResponse,
            format!("Failed to parse response: {e}"),
        )
    })?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| BackendError::new(BackendErrorKind::InvalidResponse, "response has no content"))
}

/// Exponential backoff with random jitter, capped at `max_retry_delay_ms`
pub fn retry_delay(recovery: &RecoveryConfig, attempt: u32) -> Duration {
    let exponential = recovery
        .base_retry_delay_ms
        .saturating_mul(1u64 << attempt.min(16))
        .min(recovery.max_retry_delay_ms);
    let jitter = rand::thread_rng().gen_range(0..=exponential / 4);
    Duration::from_millis(exponential.saturating_add(jitter).min(recovery.max_retry_delay_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let messages = vec![ChatMessage::system("使用繁體中文回答"), ChatMessage::user("hi")];
        let body = CompletionRequest {
            model: "llama",
            messages: &messages,
            temperature: 0.5,
            max_tokens: 1024,
            top_p: 1.0,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "llama");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 1024);
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"你好"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "你好");

        let empty = r#"{"choices":[]}"#;
        assert_eq!(
            parse_completion(empty).unwrap_err().kind,
            BackendErrorKind::InvalidResponse
        );

        assert_eq!(
            parse_completion("not json").unwrap_err().kind,
            BackendErrorKind::InvalidResponse
        );
    }

    #[test]
    fn test_classify_status() {
        let body = r#"{"error":{"message":"slow down"}}"#;
        let err = classify_status(429, body);
        assert_eq!(err.kind, BackendErrorKind::RateLimited);
        assert!(err.message.contains("slow down"));

        assert_eq!(classify_status(401, "").kind, BackendErrorKind::Auth);
        assert_eq!(classify_status(503, "oops").kind, BackendErrorKind::Server);
        assert_eq!(classify_status(404, "").kind, BackendErrorKind::InvalidResponse);
    }

    #[test]
    fn test_retry_delay_bounds() {
        let recovery = RecoveryConfig::default();
        for attempt in 0..8 {
            let delay = retry_delay(&recovery, attempt).as_millis() as u64;
            assert!(delay >= recovery.base_retry_delay_ms.min(recovery.max_retry_delay_ms));
            assert!(delay <= recovery.max_retry_delay_ms);
        }
    }
}
