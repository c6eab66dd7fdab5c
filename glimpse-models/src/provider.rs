//! Capability traits consumed by the indexing and retrieval pipelines
//!
//! Each model the system depends on is exposed as one narrow trait:
//!
//! - [`CaptionProvider`]: raw item → descriptive text
//! - [`NormalizeProvider`]: free-form text → canonical keyword text
//! - [`EmbedProvider`]: text → fixed-dimension vector
//! - [`RerankProvider`]: (query, item locations) → relevance scores
//!
//! Batch calls return one [`ItemResult`] per input so a single bad item
//! never aborts the batch; callers substitute a placeholder and keep
//! going. Concrete implementations live in [`crate::remote`] (HTTP
//! model servers) and [`crate::mock`] (deterministic, for tests).

use crate::error::{ItemResult, Result};
use async_trait::async_trait;
use half::f16;
use std::path::PathBuf;

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result, inferring the dimension from the
    /// first vector (0 if empty).
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Generates descriptive text for raw catalog items.
#[async_trait]
pub trait CaptionProvider: Send + Sync {
    /// Generate captions for a batch of items, one outcome per input in
    /// input order. A failed item is an `Err` entry, not a call failure.
    async fn caption_batch(&self, items: &[PathBuf]) -> Result<Vec<ItemResult<String>>>;
}

/// Reduces free-form text to canonical keyword text.
///
/// The same capability serves both captions during indexing and raw
/// user queries during retrieval.
#[async_trait]
pub trait NormalizeProvider: Send + Sync {
    /// Normalize a single text.
    async fn normalize_text(&self, text: &str) -> Result<String>;

    /// Normalize a batch of texts, one outcome per input in input order.
    async fn normalize_batch(&self, texts: &[String]) -> Result<Vec<ItemResult<String>>>;
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbedProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Scores shortlisted items against the original query text.
///
/// This is the second, independent similarity signal: it sees the raw
/// (un-normalized) query and each item's locatable content, and returns
/// one score per item in input order.
#[async_trait]
pub trait RerankProvider: Send + Sync {
    /// Score each item against the query, one outcome per input in
    /// input order. A failed item is an `Err` entry, not a call failure.
    async fn rerank(&self, query: &str, items: &[PathBuf]) -> Result<Vec<ItemResult<f32>>>;
}
