//! Retrieval Client (§4.2): a keyword-to-snippets lookup that degrades to an
//! empty result on any failure — it never raises, because retrieval is
//! best-effort and the pipeline must make progress even when the retrieval
//! service is degraded.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::models::Snippet;

#[async_trait]
pub trait RetrievalClient: Send + Sync {
    async fn search(&self, keywords: &[String]) -> Vec<Snippet>;
}

pub struct HttpRetrievalClient {
    http: reqwest::Client,
    endpoint: Option<String>,
    snippet_path: String,
}

impl HttpRetrievalClient {
    pub fn new(endpoint: Option<String>, timeout: Duration, snippet_path: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint,
            snippet_path,
        }
    }

    /// Extract snippets from the response body at the configured path.
    /// Only the one shape named in the spec (`results[].content`) is
    /// understood; any other shape yields an empty list.
    fn extract_snippets(&self, body: &Value) -> Vec<Snippet> {
        if self.snippet_path != "results[].content" {
            warn!(path = %self.snippet_path, "unsupported snippet path, returning empty result");
            return Vec::new();
        }
        body.get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .filter_map(|r| {
                        let text = r.get("content")?.as_str()?.to_string();
                        let source = r.get("source").and_then(Value::as_str).map(str::to_string);
                        let score = r.get("score").and_then(Value::as_f64).map(|s| s as f32);
                        Some(Snippet { text, source, score })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl RetrievalClient for HttpRetrievalClient {
    async fn search(&self, keywords: &[String]) -> Vec<Snippet> {
        let Some(endpoint) = &self.endpoint else {
            warn!("no retrieval endpoint configured, returning empty result");
            return Vec::new();
        };
        let query = keywords.join(",");

        let response = match self.http.get(endpoint).query(&[("query", query)]).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(%e, "retrieval request failed, degrading to empty result");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "retrieval returned non-2xx, degrading to empty result");
            return Vec::new();
        }

        match response.json::<Value>().await {
            Ok(body) => self.extract_snippets(&body),
            Err(e) => {
                warn!(%e, "retrieval response was not valid JSON, degrading to empty result");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_snippets_reads_results_array() {
        let client = HttpRetrievalClient::new(None, Duration::from_secs(1), "results[].content".into());
        let body = serde_json::json!({
            "results": [
                {"content": "first snippet", "source": "docA", "score": 0.9},
                {"content": "second snippet"},
            ]
        });
        let snippets = client.extract_snippets(&body);
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].text, "first snippet");
        assert_eq!(snippets[0].source.as_deref(), Some("docA"));
        assert_eq!(snippets[1].source, None);
    }

    #[test]
    fn extract_snippets_returns_empty_for_unexpected_shape() {
        let client = HttpRetrievalClient::new(None, Duration::from_secs(1), "results[].content".into());
        let body = serde_json::json!({"unexpected": "shape"});
        assert!(client.extract_snippets(&body).is_empty());
    }

    #[tokio::test]
    async fn search_returns_empty_when_no_endpoint_configured() {
        let client = HttpRetrievalClient::new(None, Duration::from_secs(1), "results[].content".into());
        let snippets = client.search(&["a".into(), "b".into()]).await;
        assert!(snippets.is_empty());
    }
}
