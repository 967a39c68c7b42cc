//! Environment-backed settings shared by the binaries.
//!
//! Every flag falls back to an environment variable, so a deployment can be
//! configured entirely through its environment.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing_subscriber::EnvFilter;

use crate::embedder::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::embedder::OpenAiEmbedder;
use crate::milvus::MilvusClient;
use crate::vector_store::CollectionName;

/// Default collection holding the passages.
pub const DEFAULT_COLLECTION: &str = "classic_books";

/// Embedding API settings.
#[derive(Args, Debug, Clone)]
pub struct EmbeddingArgs {
    /// API key for the embedding service
    #[arg(long = "embedding-api-key", env = "DASHSCOPE_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Base URL of the OpenAI-compatible embedding API
    #[arg(long = "embedding-base-url", env = "EMBEDDING_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Embedding model identifier
    #[arg(long = "embedding-model", env = "EMBEDDING_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Vector dimension produced by the model
    #[arg(long = "embedding-dimension", env = "EMBEDDING_DIMENSION", default_value_t = 1024)]
    pub dimension: usize,

    /// Seconds before an embedding request times out
    #[arg(
        long = "embedding-timeout-secs",
        env = "EMBEDDING_TIMEOUT_SECS",
        default_value_t = 30
    )]
    pub embedding_timeout_secs: u64,

    /// Max inputs per embedding request accepted by the API
    #[arg(long = "embedding-max-batch", env = "EMBEDDING_MAX_BATCH", default_value_t = 10)]
    pub max_batch: usize,
}

impl EmbeddingArgs {
    /// Builds the embedding client described by these settings.
    pub fn build(&self) -> Result<OpenAiEmbedder> {
        OpenAiEmbedder::new(
            &self.api_key,
            &self.base_url,
            self.model.clone(),
            Some(self.dimension),
            Duration::from_secs(self.embedding_timeout_secs.max(1)),
            self.max_batch,
        )
    }
}

/// Vector store settings.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Milvus / Zilliz Cloud endpoint URI
    #[arg(long = "vector-store-uri", env = "ZILLIZ_CLOUD_URI")]
    pub uri: String,

    /// Access token (API key or user:password)
    #[arg(long = "vector-store-token", env = "ZILLIZ_CLOUD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Collection holding the passages
    #[arg(long, env = "MILVUS_COLLECTION_NAME", default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    /// Seconds before a vector store request times out
    #[arg(
        long = "vector-store-timeout-secs",
        env = "VECTOR_STORE_TIMEOUT_SECS",
        default_value_t = 30
    )]
    pub store_timeout_secs: u64,
}

impl StoreArgs {
    /// Validated collection name.
    pub fn collection_name(&self) -> Result<CollectionName> {
        CollectionName::new(self.collection.clone())
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs.max(1))
    }

    /// Builds a client without contacting the store, validating the URI and token.
    pub fn build(&self) -> Result<MilvusClient> {
        MilvusClient::new(&self.uri, self.token.as_deref(), self.timeout())
    }

    /// Builds a client and checks the store answers.
    pub async fn connect(&self) -> Result<MilvusClient> {
        MilvusClient::connect(&self.uri, self.token.as_deref(), self.timeout()).await
    }
}

/// Installs the global tracing subscriber, honouring `RUST_LOG` (default `info`).
///
/// Logs go to stderr so stdout stays free for command output.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
