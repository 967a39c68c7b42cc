//! OpenAI-compatible embeddings client.
//!
//! Targets DashScope's compatible mode by default, which speaks the same
//! `/embeddings` protocol as OpenAI.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EmbedError, Embedder};

/// Default OpenAI-compatible base URL (DashScope compatible mode).
pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// Default embedding model identifier.
pub const DEFAULT_MODEL: &str = "text-embedding-v4";

/// Async embeddings client that talks to OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimension: Option<usize>,
    max_batch: usize,
}

impl OpenAiEmbedder {
    /// Builds a new embeddings client.
    ///
    /// `dimension`, when set, is checked against every returned vector so a
    /// model/collection mismatch fails at embedding time rather than at insert.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: impl Into<String>,
        dimension: Option<usize>,
        timeout: Duration,
        max_batch: usize,
    ) -> Result<Self> {
        let model = model.into();
        anyhow::ensure!(!api_key.trim().is_empty(), "missing embedding API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");
        anyhow::ensure!(
            base_url.starts_with("http://") || base_url.starts_with("https://"),
            "embedding base URL must be an http(s) URL"
        );
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid embedding API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build embedding HTTP client")?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model,
            dimension,
            max_batch: max_batch.max(1),
        })
    }

    /// Model identifier sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Maximum number of inputs accepted per call.
    pub fn max_batch(&self) -> usize {
        self.max_batch
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        if inputs.len() > self.max_batch {
            return Err(EmbedError::BatchTooLarge {
                len: inputs.len(),
                max: self.max_batch,
            });
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            encoding_format: "float",
        };
        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(EmbedError::Status { status, body });
        }
        let parsed: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|err| EmbedError::Malformed(format!("invalid JSON payload: {err}")))?;
        let vectors = parsed.into_vectors(inputs.len(), self.dimension)?;
        debug!(
            model = %self.model,
            inputs = inputs.len(),
            "embedding batch completed"
        );
        Ok(vectors)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    encoding_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl EmbeddingResponse {
    /// Restores input order from the per-item `index` tags.
    fn into_vectors(
        mut self,
        expected_len: usize,
        dimension: Option<usize>,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        if self.data.len() != expected_len {
            return Err(EmbedError::Malformed(format!(
                "returned {} embeddings for {} inputs",
                self.data.len(),
                expected_len
            )));
        }
        self.data.sort_by_key(|entry| entry.index);
        for (position, entry) in self.data.iter().enumerate() {
            if entry.index != position {
                return Err(EmbedError::Malformed(format!(
                    "embedding indices do not cover 0..{expected_len} exactly once"
                )));
            }
            if let Some(dimension) = dimension {
                if entry.embedding.len() != dimension {
                    return Err(EmbedError::Malformed(format!(
                        "embedding {} has dimension {}, expected {}",
                        position,
                        entry.embedding.len(),
                        dimension
                    )));
                }
            }
        }
        Ok(self
            .data
            .into_iter()
            .map(|entry| entry.embedding)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake embedding server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("fake server");
        });
        format!("http://{addr}")
    }

    fn client(base_url: &str, dimension: Option<usize>) -> OpenAiEmbedder {
        OpenAiEmbedder::new(
            "sk-test",
            base_url,
            "text-embedding-v4",
            dimension,
            Duration::from_secs(5),
            10,
        )
        .expect("client builds")
    }

    /// Echoes each input's length as a one-element vector, listed in reverse order.
    async fn reversed_embeddings(
        headers: AxumHeaders,
        Json(body): Json<Value>,
    ) -> Result<Json<Value>, StatusCode> {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer sk-test") {
            return Err(StatusCode::UNAUTHORIZED);
        }
        if body["encoding_format"] != "float" || body["model"] != "text-embedding-v4" {
            return Err(StatusCode::UNPROCESSABLE_ENTITY);
        }
        let inputs = body["input"].as_array().cloned().unwrap_or_default();
        let data: Vec<Value> = inputs
            .iter()
            .enumerate()
            .rev()
            .map(|(index, text)| {
                let len = text.as_str().map(|s| s.chars().count()).unwrap_or(0);
                json!({"object": "embedding", "index": index, "embedding": [len as f32]})
            })
            .collect();
        Ok(Json(json!({"object": "list", "data": data, "model": "text-embedding-v4"})))
    }

    #[test]
    fn reorders_shuffled_response_by_index() {
        let response: EmbeddingResponse = serde_json::from_value(json!({
            "data": [
                {"index": 2, "embedding": [2.0, 2.0]},
                {"index": 0, "embedding": [0.0, 0.0]},
                {"index": 1, "embedding": [1.0, 1.0]}
            ]
        }))
        .expect("response parses");
        let vectors = response.into_vectors(3, Some(2)).expect("valid response");
        assert_eq!(vectors, vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 2.0]]);
    }

    #[test]
    fn rejects_duplicate_indices() {
        let response: EmbeddingResponse = serde_json::from_value(json!({
            "data": [
                {"index": 0, "embedding": [0.0]},
                {"index": 0, "embedding": [1.0]}
            ]
        }))
        .expect("response parses");
        let err = response.into_vectors(2, None).expect_err("duplicate index");
        assert!(matches!(err, EmbedError::Malformed(_)));
    }

    #[test]
    fn rejects_wrong_count_and_dimension() {
        let short: EmbeddingResponse =
            serde_json::from_value(json!({"data": [{"index": 0, "embedding": [0.0]}]}))
                .expect("response parses");
        assert!(matches!(
            short.into_vectors(2, None),
            Err(EmbedError::Malformed(_))
        ));

        let wrong_dim: EmbeddingResponse =
            serde_json::from_value(json!({"data": [{"index": 0, "embedding": [0.0]}]}))
                .expect("response parses");
        let err = wrong_dim.into_vectors(1, Some(1024)).expect_err("dimension");
        assert!(err.to_string().contains("expected 1024"));
    }

    #[test]
    fn rejects_blank_credentials() {
        let err = OpenAiEmbedder::new(
            "  ",
            DEFAULT_BASE_URL,
            DEFAULT_MODEL,
            None,
            Duration::from_secs(1),
            10,
        )
        .err()
        .expect("blank key rejected");
        assert!(err.to_string().contains("API key"));
    }

    #[tokio::test]
    async fn embeds_batch_in_input_order() {
        let base = spawn_server(Router::new().route("/embeddings", post(reversed_embeddings))).await;
        let embedder = client(&base, Some(1));
        let vectors = embedder
            .embed(&["a", "bbb", "cc"])
            .await
            .expect("embedding succeeds");
        assert_eq!(vectors, vec![vec![1.0], vec![3.0], vec![2.0]]);
    }

    #[tokio::test]
    async fn embed_one_returns_single_vector() {
        let base = spawn_server(Router::new().route("/embeddings", post(reversed_embeddings))).await;
        let embedder = client(&format!("{base}/"), None);
        let vector = embedder.embed_one("资本主义").await.expect("embedding succeeds");
        assert_eq!(vector, vec![4.0]);
    }

    #[tokio::test]
    async fn non_success_status_fails_whole_batch() {
        let router = Router::new().route(
            "/embeddings",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = spawn_server(router).await;
        let err = client(&base, None)
            .embed(&["a", "b"])
            .await
            .expect_err("429 surfaces");
        match err {
            EmbedError::Status { status, body } => {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(body, "slow down");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_reported() {
        let router = Router::new().route("/embeddings", post(|| async { "not json" }));
        let base = spawn_server(router).await;
        let err = client(&base, None)
            .embed(&["a"])
            .await
            .expect_err("bad payload");
        assert!(matches!(err, EmbedError::Malformed(_)));
    }

    #[tokio::test]
    async fn oversized_batch_never_hits_the_network() {
        // Nothing listens on this address; a network attempt would be a transport error.
        let embedder = client("http://127.0.0.1:9", None);
        let inputs = vec!["x"; 11];
        let err = embedder.embed(&inputs).await.expect_err("too many inputs");
        assert!(matches!(err, EmbedError::BatchTooLarge { len: 11, max: 10 }));
        assert!(embedder.embed(&[]).await.expect("empty batch").is_empty());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let embedder = client("http://127.0.0.1:9", None);
        let err = embedder.embed(&["x"]).await.expect_err("nothing listening");
        assert!(matches!(err, EmbedError::Transport(_)));
    }
}
