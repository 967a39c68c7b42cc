#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use classic_index::embedder::{EmbedError, Embedder};
use classic_index::vector_store::SearchQuery;
use classic_index::{
    CollectionName, CollectionSchema, CollectionStats, EmbeddedPassage, Passage, SearchHit,
    StoreError, VectorStore,
};
use reqwest::StatusCode;

/// Deterministic embedder: each vector is `[chars, 1.0, 0.0, ...]`.
pub struct FakeEmbedder {
    dimension: usize,
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
    drop_last: bool,
}

impl FakeEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            fail_on_call: None,
            drop_last: false,
        }
    }

    /// Fails the `call`-th invocation (one-based) with a 500.
    pub fn failing_on(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Returns one vector fewer than requested.
    pub fn dropping_last(mut self) -> Self {
        self.drop_last = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        vector[0] = text.chars().count() as f32;
        if self.dimension > 1 {
            vector[1] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(EmbedError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "upstream exploded".to_string(),
            });
        }
        let mut vectors: Vec<Vec<f32>> = inputs.iter().map(|text| self.vector_for(text)).collect();
        if self.drop_last {
            vectors.pop();
        }
        Ok(vectors)
    }
}

struct FakeCollection {
    dimension: usize,
    rows: Vec<EmbeddedPassage>,
}

#[derive(Default)]
struct FakeState {
    collections: BTreeMap<String, FakeCollection>,
    insert_calls: usize,
    fail_insert_on: Option<usize>,
    short_insert_on: Option<usize>,
    reject_create: bool,
    unavailable: bool,
    search_error: Option<String>,
    hits: Vec<SearchHit>,
    searches: Vec<RecordedSearch>,
}

/// Search parameters observed by [`FakeStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSearch {
    pub collection: String,
    pub limit: usize,
    pub filter: Option<String>,
    pub vector: Vec<f32>,
}

/// In-memory stand-in for the managed vector database.
///
/// Searches return the scripted hits (truncated to the limit) rather than
/// computing similarity; ranking belongs to the real store.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<FakeState>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(self, hits: Vec<SearchHit>) -> Self {
        self.state.lock().expect("fake store lock").hits = hits;
        self
    }

    pub fn failing_insert_on(self, call: usize) -> Self {
        self.state.lock().expect("fake store lock").fail_insert_on = Some(call);
        self
    }

    /// The `call`-th insert silently keeps every row but the last.
    pub fn short_inserting_on(self, call: usize) -> Self {
        self.state.lock().expect("fake store lock").short_insert_on = Some(call);
        self
    }

    pub fn rejecting_create(self) -> Self {
        self.state.lock().expect("fake store lock").reject_create = true;
        self
    }

    pub fn unavailable(self) -> Self {
        self.state.lock().expect("fake store lock").unavailable = true;
        self
    }

    pub fn failing_search(self, message: &str) -> Self {
        self.state.lock().expect("fake store lock").search_error = Some(message.to_string());
        self
    }

    /// Creates a collection directly, bypassing provisioning.
    pub fn seed_collection(&self, name: &str, dimension: usize, rows: Vec<EmbeddedPassage>) {
        self.state
            .lock()
            .expect("fake store lock")
            .collections
            .insert(name.to_string(), FakeCollection { dimension, rows });
    }

    pub fn collection_names(&self) -> Vec<String> {
        let state = self.state.lock().expect("fake store lock");
        state.collections.keys().cloned().collect()
    }

    pub fn rows(&self, name: &str) -> Vec<EmbeddedPassage> {
        let state = self.state.lock().expect("fake store lock");
        state
            .collections
            .get(name)
            .map(|c| c.rows.clone())
            .unwrap_or_default()
    }

    pub fn searches(&self) -> Vec<RecordedSearch> {
        self.state.lock().expect("fake store lock").searches.clone()
    }

    fn check_available(state: &FakeState) -> Result<(), StoreError> {
        if state.unavailable {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for FakeStore {
    async fn has_collection(&self, name: &CollectionName) -> Result<bool, StoreError> {
        let state = self.state.lock().expect("fake store lock");
        Self::check_available(&state)?;
        Ok(state.collections.contains_key(name.as_str()))
    }

    async fn drop_collection(&self, name: &CollectionName) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("fake store lock");
        Self::check_available(&state)?;
        state.collections.remove(name.as_str());
        Ok(())
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("fake store lock");
        Self::check_available(&state)?;
        if state.reject_create {
            return Err(StoreError::Api {
                code: 1100,
                message: "invalid dimension".to_string(),
            });
        }
        if state.collections.contains_key(schema.name.as_str()) {
            return Err(StoreError::Api {
                code: 65535,
                message: format!("collection {} already exists", schema.name),
            });
        }
        state.collections.insert(
            schema.name.to_string(),
            FakeCollection {
                dimension: schema.dimension,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn insert(
        &self,
        name: &CollectionName,
        rows: &[EmbeddedPassage],
    ) -> Result<usize, StoreError> {
        let mut state = self.state.lock().expect("fake store lock");
        Self::check_available(&state)?;
        state.insert_calls += 1;
        if state.fail_insert_on == Some(state.insert_calls) {
            return Err(StoreError::Api {
                code: 1,
                message: "insert rejected".to_string(),
            });
        }
        let short = state.short_insert_on == Some(state.insert_calls);
        let collection = state
            .collections
            .get_mut(name.as_str())
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        if let Some(row) = rows.iter().find(|r| r.embedding.len() != collection.dimension) {
            return Err(StoreError::Api {
                code: 1100,
                message: format!("dimension {} mismatch", row.embedding.len()),
            });
        }
        let kept = if short { rows.len().saturating_sub(1) } else { rows.len() };
        collection.rows.extend(rows[..kept].iter().cloned());
        Ok(kept)
    }

    async fn search(
        &self,
        name: &CollectionName,
        query: SearchQuery<'_>,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let mut state = self.state.lock().expect("fake store lock");
        Self::check_available(&state)?;
        state.searches.push(RecordedSearch {
            collection: name.to_string(),
            limit: query.limit,
            filter: query.filter.map(str::to_string),
            vector: query.vector.to_vec(),
        });
        if let Some(message) = &state.search_error {
            return Err(StoreError::Api {
                code: 1100,
                message: message.clone(),
            });
        }
        Ok(state.hits.iter().take(query.limit).cloned().collect())
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().expect("fake store lock");
        Self::check_available(&state)?;
        Ok(state.collections.keys().cloned().collect())
    }

    async fn collection_stats(&self, name: &CollectionName) -> Result<CollectionStats, StoreError> {
        let state = self.state.lock().expect("fake store lock");
        Self::check_available(&state)?;
        state
            .collections
            .get(name.as_str())
            .map(|c| CollectionStats {
                row_count: c.rows.len() as u64,
            })
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }
}

pub fn collection(name: &str) -> CollectionName {
    CollectionName::new(name).expect("valid collection name")
}

pub fn hit(content: &str, page: &str, book: &str, score: f64) -> SearchHit {
    SearchHit {
        content: content.to_string(),
        page: page.to_string(),
        book: book.to_string(),
        score,
    }
}

pub fn passages(count: usize, book: &str) -> Vec<Passage> {
    (1..=count)
        .map(|page| Passage {
            page: page.to_string(),
            content: format!("passage text for page {page}"),
            book: book.to_string(),
        })
        .collect()
}

/// Groups rows by page for order-insensitive assertions.
pub fn rows_by_page(rows: &[EmbeddedPassage]) -> HashMap<String, EmbeddedPassage> {
    rows.iter().map(|r| (r.page.clone(), r.clone())).collect()
}
