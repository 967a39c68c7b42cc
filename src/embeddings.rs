//! Rows produced by the embedding stage and consumed by vector stores.

use serde::{Deserialize, Serialize};

use crate::corpus::Passage;

/// Insert payload for one passage: its vector plus the scalar fields stored beside it.
///
/// The primary key is assigned by the store and never appears here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedPassage {
    /// Model embedding vector.
    pub embedding: Vec<f32>,
    /// Passage text submitted to the embedding model.
    pub content: String,
    /// Page key of the passage.
    pub page: String,
    /// Book title.
    pub book: String,
}

impl EmbeddedPassage {
    /// Pairs a passage with its embedding.
    pub fn new(passage: &Passage, embedding: Vec<f32>) -> Self {
        Self {
            embedding,
            content: passage.content.clone(),
            page: passage.page.clone(),
            book: passage.book.clone(),
        }
    }
}

/// Zips passages with the vectors embedded from their content.
///
/// Returns `None` when the counts disagree; vectors are matched positionally so
/// a short or long response can never be paired safely.
pub fn attach_embeddings(
    passages: &[Passage],
    embeddings: Vec<Vec<f32>>,
) -> Option<Vec<EmbeddedPassage>> {
    if passages.len() != embeddings.len() {
        return None;
    }
    Some(
        passages
            .iter()
            .zip(embeddings)
            .map(|(passage, vector)| EmbeddedPassage::new(passage, vector))
            .collect(),
    )
}
