//! Sequential embed-and-insert pipeline.
//!
//! Batches run strictly one after another. When batch N fails, batches before
//! it stay inserted and nothing after it is attempted; the error reports how
//! many records made it in.

use tracing::{debug, info};

use crate::corpus::Passage;
use crate::embedder::{EmbedError, Embedder};
use crate::embeddings::attach_embeddings;
use crate::vector_store::{CollectionName, StoreError, VectorStore};

/// Passages per embedding request when nothing else is configured.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Progress snapshot handed to the caller after each inserted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// One-based index of the batch just inserted.
    pub batch: usize,
    /// Total batches in this run.
    pub total_batches: usize,
    /// Records inserted by this batch.
    pub batch_inserted: usize,
    /// Records inserted so far.
    pub inserted: usize,
    /// Passages submitted to this run.
    pub total: usize,
}

/// A batch failed; the run stopped there.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Embedding the batch failed.
    #[error("batch {batch}/{total_batches} failed to embed ({inserted} records already inserted): {source}")]
    Embed {
        /// One-based failing batch.
        batch: usize,
        /// Total batches in the run.
        total_batches: usize,
        /// Records inserted before the failure.
        inserted: usize,
        /// Underlying embedding error.
        #[source]
        source: EmbedError,
    },
    /// The embedding API returned a different number of vectors than passages.
    #[error("batch {batch}/{total_batches} returned {vectors} embeddings for {passages} passages ({inserted} records already inserted)")]
    CountMismatch {
        /// One-based failing batch.
        batch: usize,
        /// Total batches in the run.
        total_batches: usize,
        /// Records inserted before the failure.
        inserted: usize,
        /// Vectors returned.
        vectors: usize,
        /// Passages submitted.
        passages: usize,
    },
    /// Inserting the batch failed.
    #[error("batch {batch}/{total_batches} failed to insert ({inserted} records already inserted): {source}")]
    Insert {
        /// One-based failing batch.
        batch: usize,
        /// Total batches in the run.
        total_batches: usize,
        /// Records inserted before the failure.
        inserted: usize,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
    /// The store accepted fewer rows than the batch carried.
    #[error("batch {batch}/{total_batches} inserted {accepted} of {submitted} records ({inserted} records inserted in total)")]
    ShortInsert {
        /// One-based failing batch.
        batch: usize,
        /// Total batches in the run.
        total_batches: usize,
        /// Records inserted so far, including the rows this batch did land.
        inserted: usize,
        /// Rows the store reported as inserted.
        accepted: usize,
        /// Rows submitted in the batch.
        submitted: usize,
    },
}

impl ImportError {
    /// Records durably inserted before the failing batch.
    pub fn inserted(&self) -> usize {
        match self {
            ImportError::Embed { inserted, .. }
            | ImportError::CountMismatch { inserted, .. }
            | ImportError::Insert { inserted, .. }
            | ImportError::ShortInsert { inserted, .. } => *inserted,
        }
    }
}

/// Drives passages through an embedder into one collection.
pub struct Importer<'a> {
    embedder: &'a dyn Embedder,
    store: &'a dyn VectorStore,
    collection: &'a CollectionName,
    batch_size: usize,
}

impl<'a> Importer<'a> {
    /// Creates an importer. A zero batch size is treated as one.
    pub fn new(
        embedder: &'a dyn Embedder,
        store: &'a dyn VectorStore,
        collection: &'a CollectionName,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            collection,
            batch_size: batch_size.max(1),
        }
    }

    /// Number of batches `passage_count` passages split into.
    pub fn batch_count(&self, passage_count: usize) -> usize {
        passage_count.div_ceil(self.batch_size)
    }

    /// Embeds and inserts every passage, returning the inserted record count.
    ///
    /// `on_batch` runs after each successful insert.
    pub async fn run<F>(&self, passages: &[Passage], mut on_batch: F) -> Result<usize, ImportError>
    where
        F: FnMut(&BatchProgress),
    {
        let total_batches = self.batch_count(passages.len());
        let mut inserted = 0usize;
        for (index, batch) in passages.chunks(self.batch_size).enumerate() {
            let batch_no = index + 1;
            let inputs: Vec<&str> = batch.iter().map(|p| p.content.as_str()).collect();
            debug!(batch = batch_no, total_batches, size = batch.len(), "embedding batch");
            let vectors =
                self.embedder
                    .embed(&inputs)
                    .await
                    .map_err(|source| ImportError::Embed {
                        batch: batch_no,
                        total_batches,
                        inserted,
                        source,
                    })?;
            let vector_count = vectors.len();
            let rows = attach_embeddings(batch, vectors).ok_or(ImportError::CountMismatch {
                batch: batch_no,
                total_batches,
                inserted,
                vectors: vector_count,
                passages: batch.len(),
            })?;
            let batch_inserted = self
                .store
                .insert(self.collection, &rows)
                .await
                .map_err(|source| ImportError::Insert {
                    batch: batch_no,
                    total_batches,
                    inserted,
                    source,
                })?;
            inserted += batch_inserted;
            if batch_inserted != rows.len() {
                return Err(ImportError::ShortInsert {
                    batch: batch_no,
                    total_batches,
                    inserted,
                    accepted: batch_inserted,
                    submitted: rows.len(),
                });
            }
            on_batch(&BatchProgress {
                batch: batch_no,
                total_batches,
                batch_inserted,
                inserted,
                total: passages.len(),
            });
        }
        info!(
            collection = %self.collection,
            inserted,
            batches = total_batches,
            "import completed"
        );
        Ok(inserted)
    }
}
