#![warn(missing_docs)]
//! Semantic search over a corpus of classic texts.
//!
//! The import side folds raw extraction fragments into per-page passages,
//! embeds them through an OpenAI-compatible API and stores them in a Milvus
//! collection. The query side embeds a question and returns the nearest
//! passages by cosine similarity.

pub mod config;
pub mod corpus;
pub mod embedder;
pub mod embeddings;
pub mod import;
pub mod milvus;
pub mod provision;
pub mod search;
pub mod server;
pub mod vector_store;

pub use corpus::{preprocess, FieldNames, Passage, RawFragment};
pub use embedder::{EmbedError, Embedder, OpenAiEmbedder};
pub use embeddings::EmbeddedPassage;
pub use import::{BatchProgress, ImportError, Importer};
pub use milvus::MilvusClient;
pub use provision::{provision, CollectionSchema, ProvisionError};
pub use search::{SearchError, SearchRequest, SearchResponse, SearchService};
pub use vector_store::{CollectionName, CollectionStats, SearchHit, StoreError, VectorStore};
