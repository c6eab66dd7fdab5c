//! Configuration file handling
//!
//! One TOML file (`glimpse.toml` by default) configures the whole
//! process; every field has a default so a partial file works. Paths
//! are taken as written — relative paths resolve against the working
//! directory.

use crate::indexing::IndexingConfig;
use crate::retrieval::RetrievalConfig;
use anyhow::{Context, Result};
use glimpse_models::RemoteModelConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Directory holding the source items
    pub root: PathBuf,
    /// File extensions treated as indexable
    pub extensions: Vec<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            extensions: vec!["jpg".into(), "jpeg".into(), "png".into(), "webp".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file for catalog metadata
    pub db_path: PathBuf,
    /// Vector index file; the id list lives next to it as `.ids`
    pub vector_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("glimpse.db"),
            vector_path: PathBuf::from("glimpse.vec"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    pub batch_size: usize,
    pub checkpoint_interval: usize,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            batch_size: 8,
            checkpoint_interval: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorSection {
    pub dimension: usize,
    /// L2-normalize vectors on insert and queries on search, making
    /// inner-product scores cosine similarities
    pub normalize: bool,
}

impl Default for VectorSection {
    fn default() -> Self {
        Self {
            dimension: 1024,
            normalize: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// Recall width of the semantic stage
    pub top_n: usize,
    /// Final result count after reranking
    pub top_k: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self { top_n: 20, top_k: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsSection {
    /// Base URL of the model-serving API
    pub api_base: String,
    pub api_key: Option<String>,
}

impl Default for ModelsSection {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8191".into(),
            api_key: None,
        }
    }
}

/// Top-level process configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GlimpseConfig {
    pub dataset: DatasetConfig,
    pub storage: StorageConfig,
    pub index: IndexSection,
    pub vectors: VectorSection,
    pub search: SearchSection,
    pub models: ModelsSection,
}

impl GlimpseConfig {
    /// Read and validate a TOML config file.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check field ranges, clamping `top_k` to `top_n`.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.index.batch_size > 0, "index.batch_size must be positive");
        anyhow::ensure!(
            self.index.checkpoint_interval > 0,
            "index.checkpoint_interval must be positive"
        );
        anyhow::ensure!(self.vectors.dimension > 0, "vectors.dimension must be positive");
        anyhow::ensure!(self.search.top_n > 0, "search.top_n must be positive");
        anyhow::ensure!(self.search.top_k > 0, "search.top_k must be positive");
        if self.search.top_k > self.search.top_n {
            tracing::warn!(
                "search.top_k ({}) exceeds top_n ({}); results are capped at top_n",
                self.search.top_k,
                self.search.top_n
            );
        }
        Ok(())
    }

    pub fn indexing_config(&self) -> IndexingConfig {
        IndexingConfig {
            dataset_root: self.dataset.root.clone(),
            extensions: self.dataset.extensions.clone(),
            batch_size: self.index.batch_size,
            checkpoint_interval: self.index.checkpoint_interval,
        }
    }

    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            top_n: self.search.top_n,
            top_k: self.search.top_k.min(self.search.top_n),
            dataset_root: self.dataset.root.clone(),
        }
    }

    pub fn remote_model_config(&self) -> RemoteModelConfig {
        RemoteModelConfig {
            api_base: self.models.api_base.clone(),
            api_key: self.models.api_key.clone(),
            embedding_dimension: self.vectors.dimension,
        }
    }
}
