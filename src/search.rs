//! Query service: embed a question, search the collection, shape the hits.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::embedder::{EmbedError, Embedder};
use crate::vector_store::{CollectionName, SearchHit, SearchQuery, StoreError, VectorStore};

/// Neighbours returned when the request does not say.
pub const DEFAULT_TOP_K: usize = 10;

/// Inbound search request.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    /// Free-text question.
    pub query: String,
    /// Requested neighbour count.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Restricts hits to one book when set and non-empty.
    #[serde(default)]
    pub book_filter: Option<String>,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl SearchRequest {
    /// Request for `query` with default options.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: DEFAULT_TOP_K,
            book_filter: None,
        }
    }
}

/// Search results in store ranking order plus the echoed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Hits, most similar first.
    pub results: Vec<SearchHit>,
    /// The query as submitted.
    pub query: String,
}

/// Reasons a search fails. Nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Query text was empty after trimming.
    #[error("query must not be empty")]
    EmptyQuery,
    /// The embedding API failed or answered nonsense.
    #[error("upstream embedding failure: {0}")]
    Embedding(#[from] EmbedError),
    /// No vector store handle, or the store cannot be reached.
    #[error("search backend unavailable: {0}")]
    BackendUnavailable(String),
    /// Anything else, with the underlying detail kept for operators.
    #[error("search failed: {0}")]
    Failed(String),
}

impl From<StoreError> for SearchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(detail) => SearchError::BackendUnavailable(detail),
            other => SearchError::Failed(other.to_string()),
        }
    }
}

/// Builds the scalar filter restricting hits to one book.
pub fn book_filter_expr(book: &str) -> String {
    let escaped = book.replace('\\', "\\\\").replace('"', "\\\"");
    format!("book == \"{escaped}\"")
}

/// Stateless query path over a shared embedder and store handle.
#[derive(Clone)]
pub struct SearchService {
    embedder: Arc<dyn Embedder>,
    store: Option<Arc<dyn VectorStore>>,
    collection: CollectionName,
    max_top_k: usize,
}

impl SearchService {
    /// Creates the service. A `None` store answers every search as unavailable.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Option<Arc<dyn VectorStore>>,
        collection: CollectionName,
        max_top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            collection,
            max_top_k: max_top_k.max(1),
        }
    }

    /// Collection searched by this service.
    pub fn collection(&self) -> &CollectionName {
        &self.collection
    }

    /// Runs one search.
    ///
    /// Empty queries are rejected before any network call. Hits keep the
    /// store's order and scores.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, SearchError> {
        if request.query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let store = self.store.as_ref().ok_or_else(|| {
            SearchError::BackendUnavailable("vector store is not connected".to_string())
        })?;
        let top_k = request.top_k.clamp(1, self.max_top_k);
        let filter = request
            .book_filter
            .as_deref()
            .filter(|book| !book.is_empty())
            .map(book_filter_expr);

        let start = Instant::now();
        let vector = self.embedder.embed_one(&request.query).await?;
        let results = store
            .search(
                &self.collection,
                SearchQuery {
                    vector: &vector,
                    limit: top_k,
                    filter: filter.as_deref(),
                },
            )
            .await?;
        info!(
            collection = %self.collection,
            top_k,
            filtered = filter.is_some(),
            hits = results.len(),
            latency_ms = start.elapsed().as_secs_f64() * 1000.0,
            "search completed"
        );
        Ok(SearchResponse {
            results,
            query: request.query,
        })
    }
}
