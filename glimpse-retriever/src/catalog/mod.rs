//! Catalog storage: metadata rows and the vector index
//!
//! Two coupled stores back the catalog:
//!
//! - **[`MetadataStore`]**: SQLite map from a stable integer id to
//!   (source path, normalized text), ids issued monotonically on first
//!   insertion of a path
//! - **[`VectorStore`]**: in-memory flat similarity index plus a
//!   parallel id list, persisted to disk as a matched pair of files
//!
//! Both are opened once at process start and handed by reference to
//! whichever orchestrator drives them; nothing here assumes concurrent
//! writers.

use chrono::{DateTime, Utc};

pub mod metadata_store;
pub mod vector_store;

pub use metadata_store::MetadataStore;
pub use vector_store::VectorStore;

/// Stable integer identifier for a catalog item.
pub type ItemId = i64;

/// One fully hydrated catalog row.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: ItemId,
    pub path: String,
    pub normalized_text: String,
    pub created_at: DateTime<Utc>,
}

/// (id, semantic score) pair produced by vector search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: ItemId,
    pub score: f32,
}

/// Errors from the catalog stores.
///
/// Fatal conditions (connect failure, corrupt persisted pair, save
/// failure) surface here and propagate; orchestrators never retry them.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Underlying database failure; per-call and per-batch writes roll
    /// back before this is returned.
    #[error("metadata store error: {source}")]
    Database {
        #[from]
        source: sqlx::Error,
    },

    /// IO failure reading or writing the vector-store companion files
    #[error("vector store IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Persisted vector-store pair exists but cannot be trusted
    #[error("vector store corrupt: {message}")]
    Corrupt { message: String },

    /// Caller violated a store precondition
    #[error("precondition violated: {message}")]
    Mismatch { message: String },
}

impl StorageError {
    pub(crate) fn corrupt<S: Into<String>>(message: S) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    pub(crate) fn mismatch<S: Into<String>>(message: S) -> Self {
        Self::Mismatch {
            message: message.into(),
        }
    }
}
