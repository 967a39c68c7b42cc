//! Vector store seam shared by the importer and the query service.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embeddings::EmbeddedPassage;
use crate::provision::CollectionSchema;

/// Longest collection name the store accepts.
pub const MAX_COLLECTION_NAME_LEN: usize = 255;

/// Validated collection identifier.
///
/// Names start with a letter or underscore and contain only ASCII letters,
/// digits and underscores, which keeps them safe to embed in request paths and
/// log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionName(String);

impl CollectionName {
    /// Validates and wraps a collection name.
    pub fn new(name: impl Into<String>) -> anyhow::Result<Self> {
        let name = name.into();
        let mut chars = name.chars();
        let Some(first) = chars.next() else {
            anyhow::bail!("collection name is required");
        };
        anyhow::ensure!(
            first.is_ascii_alphabetic() || first == '_',
            "collection name {name:?} must start with a letter or underscore"
        );
        anyhow::ensure!(
            chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_'),
            "collection name {name:?} may only contain letters, digits and underscores"
        );
        anyhow::ensure!(
            name.len() <= MAX_COLLECTION_NAME_LEN,
            "collection name exceeds {MAX_COLLECTION_NAME_LEN} characters"
        );
        Ok(Self(name))
    }

    /// Returns the raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One nearest neighbour returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Stored passage text.
    pub content: String,
    /// Stored page key.
    pub page: String,
    /// Stored book title.
    pub book: String,
    /// Cosine similarity reported by the store, unchanged.
    pub score: f64,
}

/// Row statistics for one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    /// Number of stored records.
    pub row_count: u64,
}

/// Parameters of a single-vector similarity search.
#[derive(Debug, Clone, Copy)]
pub struct SearchQuery<'a> {
    /// Query embedding.
    pub vector: &'a [f32],
    /// Maximum neighbours to return.
    pub limit: usize,
    /// Optional boolean expression over scalar fields.
    pub filter: Option<&'a str>,
}

/// Errors surfaced by vector store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached (connect failure, timeout, TLS).
    #[error("vector store unavailable: {0}")]
    Unavailable(String),
    /// The named collection does not exist.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),
    /// The store rejected the request.
    #[error("vector store request failed (code {code}): {message}")]
    Api {
        /// Store-specific error code, or the HTTP status when no body code exists.
        code: i64,
        /// Store-provided message.
        message: String,
    },
    /// The store answered with a payload this client cannot interpret.
    #[error("vector store returned a malformed response: {0}")]
    Malformed(String),
}

/// Operations consumed from the external vector database.
///
/// One handle is created at process start and shared by every request; the
/// store serializes concurrent access itself.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Reports whether the collection exists.
    async fn has_collection(&self, name: &CollectionName) -> Result<bool, StoreError>;

    /// Drops the collection and every record in it.
    async fn drop_collection(&self, name: &CollectionName) -> Result<(), StoreError>;

    /// Creates an empty collection with the given schema and vector index.
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError>;

    /// Inserts rows and returns how many the store accepted.
    async fn insert(
        &self,
        name: &CollectionName,
        rows: &[EmbeddedPassage],
    ) -> Result<usize, StoreError>;

    /// Runs a cosine-similarity search, best match first.
    async fn search(
        &self,
        name: &CollectionName,
        query: SearchQuery<'_>,
    ) -> Result<Vec<SearchHit>, StoreError>;

    /// Lists every collection name.
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Returns row statistics for one collection.
    async fn collection_stats(&self, name: &CollectionName) -> Result<CollectionStats, StoreError>;
}
