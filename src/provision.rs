//! Destructive collection provisioning.
//!
//! There is no incremental path: every import starts from an empty collection,
//! so [`provision`] drops whatever already exists under the name before
//! creating the schema again.

use tracing::{info, warn};

use crate::vector_store::{CollectionName, StoreError, VectorStore};

/// Largest vector dimension the store supports.
pub const MAX_DIMENSION: usize = 32_768;

/// Field holding the embedding vector.
pub const VECTOR_FIELD: &str = "embedding";

/// Scalar fields returned with every search hit.
pub const OUTPUT_FIELDS: [&str; 3] = ["content", "page", "book"];

/// Similarity metric used by the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Cosine similarity, higher is closer.
    Cosine,
}

impl Metric {
    /// Store-side metric name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "COSINE",
        }
    }
}

/// Layout of the passage collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    /// Collection name.
    pub name: CollectionName,
    /// Embedding dimension.
    pub dimension: usize,
    /// Max length of the `content` field.
    pub content_max_length: usize,
    /// Max length of the `page` field.
    pub page_max_length: usize,
    /// Max length of the `book` field.
    pub book_max_length: usize,
    /// Vector index metric.
    pub metric: Metric,
}

impl CollectionSchema {
    /// Schema for passages embedded at `dimension`, with the default field bounds.
    pub fn new(name: CollectionName, dimension: usize) -> Result<Self, ProvisionError> {
        if dimension == 0 || dimension > MAX_DIMENSION {
            return Err(ProvisionError::InvalidDimension(dimension));
        }
        Ok(Self {
            name,
            dimension,
            content_max_length: 65_535,
            page_max_length: 50,
            book_max_length: 255,
            metric: Metric::Cosine,
        })
    }
}

/// Fatal setup failures. Importing must not continue after any of these.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// The dimension is outside `1..=MAX_DIMENSION`.
    #[error("invalid vector dimension {0}; expected 1..={max}", max = MAX_DIMENSION)]
    InvalidDimension(usize),
    /// The store refused to drop or create the collection.
    #[error("failed to provision collection: {0}")]
    Store(#[from] StoreError),
}

/// Drops `schema.name` if present, then creates it empty.
///
/// Repeated calls converge on the same empty collection. Never call this on a
/// collection whose data must survive.
pub async fn provision(
    store: &dyn VectorStore,
    schema: &CollectionSchema,
) -> Result<(), ProvisionError> {
    if store.has_collection(&schema.name).await? {
        warn!(collection = %schema.name, "collection exists; dropping before recreate");
        store.drop_collection(&schema.name).await?;
    }
    store.create_collection(schema).await?;
    info!(
        collection = %schema.name,
        dimension = schema.dimension,
        metric = schema.metric.as_str(),
        "collection created"
    );
    Ok(())
}
