//! # glimpse-models
//!
//! Capability layer for the glimpse image-search system. The core
//! pipelines never talk to a model directly; they consume the four
//! narrow traits defined here and get implementations injected at
//! process start.
//!
//! ## Capabilities
//!
//! - **Caption**: raw item → descriptive text
//! - **Normalize**: free-form text → canonical keyword text
//! - **Embed**: text → fixed-dimension f16 vector (single and batched)
//! - **Rerank**: (original query, item locations) → relevance scores
//!
//! ## Implementations
//!
//! - [`remote`]: HTTP clients against a model-serving API, one JSON
//!   endpoint per capability
//! - [`mock`]: deterministic in-process stand-ins for tests and demos
//!
//! ## Error Handling
//!
//! Whole-call failures use [`ModelError`]; batch calls additionally
//! carry one [`ItemResult`] per input so a single bad item degrades
//! locally instead of aborting the batch.

pub mod error;
pub mod mock;
pub mod provider;
pub mod remote;

pub use error::{ItemResult, ModelError, Result};
pub use provider::{
    CaptionProvider, EmbedProvider, EmbeddingResult, NormalizeProvider, RerankProvider,
};
pub use remote::{
    RemoteCaptionProvider, RemoteEmbedProvider, RemoteModelClient, RemoteModelConfig,
    RemoteNormalizeProvider, RemoteRerankProvider,
};
