//! LLM Client (§4.1): a request/response chat-completion endpoint with a
//! shared rate limiter, bounded retry, and JSON-mode parsing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{DocforgeError, Result};
use crate::json_utils::extract_json_block;
use crate::orchestrator::{ProgressTracker, RateLimiter};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
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

/// Per-call overrides for temperature and max tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], options: CompletionOptions) -> Result<String>;
}

/// `complete_json` from §4.1: calls `complete`, strips decorations, parses
/// JSON, and retries up to three times with an appended corrective
/// instruction before raising `MalformedModelOutput`.
pub async fn complete_json<T: DeserializeOwned>(
    client: &dyn LlmClient,
    mut messages: Vec<ChatMessage>,
    schema_hint: &str,
) -> Result<T> {
    const MAX_ATTEMPTS: usize = 3;
    let mut last_detail = String::new();

    for attempt in 0..MAX_ATTEMPTS {
        let raw = client.complete(&messages, CompletionOptions::default()).await?;
        match extract_json_block(&raw).and_then(|block| serde_json::from_str::<T>(block).ok()) {
            Some(parsed) => return Ok(parsed),
            None => {
                last_detail = format!("attempt {}: could not parse JSON from: {raw}", attempt + 1);
                warn!(attempt, schema_hint, "model output failed JSON parse");
                messages.push(ChatMessage::assistant(raw));
                messages.push(ChatMessage::user(format!(
                    "Return JSON only matching {schema_hint}"
                )));
            }
        }
    }

    Err(DocforgeError::MalformedModelOutput {
        schema_hint: schema_hint.to_string(),
        detail: last_detail,
    })
}

/// Reqwest-backed implementation of `LlmClient` against the chat-completion
/// contract described in §6.
pub struct HttpLlmClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    default_max_tokens: u32,
    default_temperature: f32,
    max_retries: u32,
    rate_limiter: Arc<RateLimiter>,
    progress: Arc<ProgressTracker>,
}

impl HttpLlmClient {
    pub fn new(
        endpoint: String,
        api_key: String,
        model: String,
        default_max_tokens: u32,
        default_temperature: f32,
        timeout: Duration,
        max_retries: u32,
        rate_limiter: Arc<RateLimiter>,
        progress: Arc<ProgressTracker>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocforgeError::ConfigurationInvalid(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint,
            api_key,
            model,
            default_max_tokens,
            default_temperature,
            max_retries,
            rate_limiter,
            progress,
        })
    }

    fn body(&self, messages: &[ChatMessage], options: CompletionOptions) -> Value {
        json!({
            "model": self.model,
            "messages": messages.iter().map(|m| json!({
                "role": role_str(m.role),
                "content": m.content,
            })).collect::<Vec<_>>(),
            "temperature": options.temperature.unwrap_or(self.default_temperature),
            "max_tokens": options.max_tokens.unwrap_or(self.default_max_tokens),
        })
    }

    async fn send_once(&self, body: &Value) -> Result<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|source| DocforgeError::TransientNetwork {
                endpoint: self.endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(DocforgeError::TransientNetwork {
                endpoint: self.endpoint.clone(),
                source: response
                    .error_for_status()
                    .expect_err("status already known to be an error"),
            });
        }
        if status.is_client_error() {
            return Err(DocforgeError::FatalHttpStatus {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        let payload: Value = response.json().await.map_err(|source| DocforgeError::TransientNetwork {
            endpoint: self.endpoint.clone(),
            source,
        })?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| DocforgeError::MalformedModelOutput {
                schema_hint: "choices[0].message.content".to_string(),
                detail: payload.to_string(),
            })
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, messages: &[ChatMessage], options: CompletionOptions) -> Result<String> {
        let body = self.body(messages, options);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            self.rate_limiter.acquire().await;
            match self.send_once(&body).await {
                Ok(text) => {
                    self.progress.record_llm_call("llm_client", None);
                    return Ok(text);
                }
                Err(DocforgeError::TransientNetwork { endpoint, source }) => {
                    let err = DocforgeError::TransientNetwork { endpoint, source };
                    warn!(attempt, %err, "transient LLM error, retrying");
                    last_err = Some(err);
                    if attempt < self.max_retries {
                        let backoff = backoff_with_jitter(attempt);
                        debug!(?backoff, "backing off before retry");
                        tokio::time::sleep(backoff).await;
                    }
                }
                Err(other) => return Err(other),
            }
        }

        Err(last_err.expect("loop always sets last_err before exhausting retries"))
    }
}

/// Exponential backoff capped at 10s, with up to 25% jitter, matching the
/// pattern used across the example pack's provider retry loops.
fn backoff_with_jitter(attempt: u32) -> Duration {
    let base_ms = (500_u64 * 2_u64.pow(attempt)).min(10_000);
    let jitter_ms = (base_ms as f64 * 0.25 * fastrand::f64()) as u64;
    Duration::from_millis(base_ms + jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedClient {
        responses: Vec<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, _messages: &[ChatMessage], _options: CompletionOptions) -> Result<String> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.responses[idx.min(self.responses.len() - 1)].to_string())
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Parsed {
        key: String,
    }

    #[tokio::test]
    async fn complete_json_parses_first_valid_response() {
        let client = ScriptedClient {
            responses: vec![r#"```json
{"key": "value"}
```"#],
            calls: AtomicUsize::new(0),
        };
        let parsed: Parsed = complete_json(&client, vec![ChatMessage::user("go")], "{key}")
            .await
            .unwrap();
        assert_eq!(parsed, Parsed { key: "value".into() });
    }

    #[tokio::test]
    async fn complete_json_retries_then_raises_malformed_output() {
        let client = ScriptedClient {
            responses: vec!["not json at all", "still not json", "nope"],
            calls: AtomicUsize::new(0),
        };
        let result: Result<Parsed> =
            complete_json(&client, vec![ChatMessage::user("go")], "{key}").await;
        assert!(matches!(result, Err(DocforgeError::MalformedModelOutput { .. })));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn complete_json_recovers_after_one_bad_attempt() {
        let client = ScriptedClient {
            responses: vec!["garbage", r#"{"key": "recovered"}"#],
            calls: AtomicUsize::new(0),
        };
        let parsed: Parsed = complete_json(&client, vec![ChatMessage::user("go")], "{key}")
            .await
            .unwrap();
        assert_eq!(parsed.key, "recovered");
    }
}
