//! Embedding backends that turn passage and query text into dense vectors.

pub mod openai;

use async_trait::async_trait;
use reqwest::StatusCode;

pub use openai::OpenAiEmbedder;

/// Failure of a whole embedding call. Batches never partially succeed.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The request never produced an HTTP response (connect, timeout, TLS).
    #[error("embedding request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The API answered with a non-success status.
    #[error("embedding request failed ({status}): {body}")]
    Status {
        /// HTTP status returned by the API.
        status: StatusCode,
        /// Response body, kept for diagnostics.
        body: String,
    },
    /// The API answered 2xx but the payload is unusable.
    #[error("embedding request failed: malformed response: {0}")]
    Malformed(String),
    /// The caller submitted more inputs than the client accepts per call.
    #[error("embedding batch of {len} exceeds configured max {max}")]
    BatchTooLarge {
        /// Submitted input count.
        len: usize,
        /// Configured per-call maximum.
        max: usize,
    },
}

/// Turns texts into vectors, one per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds every input in a single upstream call.
    async fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embeds one string, for query-time lookups.
    async fn embed_one(&self, input: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed(&[input]).await?;
        match (vectors.pop(), vectors.is_empty()) {
            (Some(vector), true) => Ok(vector),
            _ => Err(EmbedError::Malformed(
                "expected exactly one embedding for a single input".to_string(),
            )),
        }
    }
}
