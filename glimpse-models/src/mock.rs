//! Deterministic in-process capability implementations
//!
//! These stand in for the real models in tests and demos: no downloads,
//! no network, fully reproducible. The hash embedder maps token overlap
//! to cosine similarity, which is enough structure for retrieval tests
//! to make meaningful assertions about ranking.

use crate::error::{ItemResult, ModelError, Result};
use crate::provider::{
    CaptionProvider, EmbedProvider, EmbeddingResult, NormalizeProvider, RerankProvider,
};
use async_trait::async_trait;
use fnv::FnvHasher;
use half::f16;
use std::collections::{HashMap, HashSet};
use std::hash::Hasher;
use std::path::{Path, PathBuf};

/// Captioner that derives a caption from the file name.
///
/// Paths registered via [`MockCaptionProvider::with_failure`] produce a
/// per-item error, for exercising the degrade-to-placeholder policy.
#[derive(Debug, Clone, Default)]
pub struct MockCaptionProvider {
    fail_paths: HashSet<PathBuf>,
}

impl MockCaptionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self, path: impl Into<PathBuf>) -> Self {
        self.fail_paths.insert(path.into());
        self
    }

    fn caption_for(path: &Path) -> String {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let words = stem.replace(['_', '-'], " ");
        format!("a photo of {words}")
    }
}

#[async_trait]
impl CaptionProvider for MockCaptionProvider {
    async fn caption_batch(&self, items: &[PathBuf]) -> Result<Vec<ItemResult<String>>> {
        Ok(items
            .iter()
            .map(|path| {
                if self.fail_paths.contains(path) {
                    Err(ModelError::generation(format!(
                        "caption failed for {}",
                        path.display()
                    )))
                } else {
                    Ok(Self::caption_for(path))
                }
            })
            .collect())
    }
}

/// Normalizer that lowercases and strips everything but word characters.
#[derive(Debug, Clone, Default)]
pub struct MockNormalizeProvider {
    fail_texts: HashSet<String>,
}

impl MockNormalizeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self, text: impl Into<String>) -> Self {
        self.fail_texts.insert(text.into());
        self
    }

    fn normalize(text: &str) -> String {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl NormalizeProvider for MockNormalizeProvider {
    async fn normalize_text(&self, text: &str) -> Result<String> {
        if self.fail_texts.contains(text) {
            return Err(ModelError::generation("normalization failed"));
        }
        Ok(Self::normalize(text))
    }

    async fn normalize_batch(&self, texts: &[String]) -> Result<Vec<ItemResult<String>>> {
        Ok(texts
            .iter()
            .map(|text| {
                if self.fail_texts.contains(text) {
                    Err(ModelError::generation("normalization failed"))
                } else {
                    Ok(Self::normalize(text))
                }
            })
            .collect())
    }
}

/// Embedder that hashes tokens into a fixed-dimension unit vector.
///
/// Each token contributes ±1 to an fnv-chosen component, so texts that
/// share tokens land closer together under inner product. Deterministic
/// across runs and platforms.
#[derive(Debug, Clone)]
pub struct HashEmbedProvider {
    dimension: usize,
}

impl HashEmbedProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed(&self, text: &str) -> Vec<f16> {
        let mut accum = vec![0.0f32; self.dimension];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = FnvHasher::default();
            hasher.write(token.as_bytes());
            let hash = hasher.finish();
            let index = (hash % self.dimension as u64) as usize;
            let sign = if hash & (1u64 << 63) == 0 { 1.0 } else { -1.0 };
            accum[index] += sign;
        }

        let norm: f32 = accum.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut accum {
                *value /= norm;
            }
        }
        accum.into_iter().map(f16::from_f32).collect()
    }
}

#[async_trait]
impl EmbedProvider for HashEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        Ok(self.embed(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        Ok(EmbeddingResult::new(
            texts.iter().map(|text| self.embed(text)).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hash-mock"
    }
}

/// Reranker scripted by file name, with a token-overlap fallback.
///
/// Tests that need a specific final order register scores with
/// [`MockRerankProvider::with_score`]; unscripted items score by how
/// many query tokens appear in the file name.
#[derive(Debug, Clone, Default)]
pub struct MockRerankProvider {
    scores: HashMap<String, f32>,
    fail_items: HashSet<PathBuf>,
}

impl MockRerankProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the score returned for any item whose file name matches.
    pub fn with_score(mut self, file_name: impl Into<String>, score: f32) -> Self {
        self.scores.insert(file_name.into(), score);
        self
    }

    pub fn with_failure(mut self, path: impl Into<PathBuf>) -> Self {
        self.fail_items.insert(path.into());
        self
    }

    fn overlap_score(query: &str, item: &Path) -> f32 {
        let name = item
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        query
            .to_lowercase()
            .split_whitespace()
            .filter(|token| name.contains(*token))
            .count() as f32
    }
}

#[async_trait]
impl RerankProvider for MockRerankProvider {
    async fn rerank(&self, query: &str, items: &[PathBuf]) -> Result<Vec<ItemResult<f32>>> {
        Ok(items
            .iter()
            .map(|item| {
                if self.fail_items.contains(item) {
                    return Err(ModelError::generation(format!(
                        "rerank failed for {}",
                        item.display()
                    )));
                }
                let name = item
                    .file_name()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                Ok(self
                    .scores
                    .get(&name)
                    .copied()
                    .unwrap_or_else(|| Self::overlap_score(query, item)))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_caption_and_failure() -> anyhow::Result<()> {
        let provider =
            MockCaptionProvider::new().with_failure(PathBuf::from("imgs/broken_file.jpg"));
        let items = vec![
            PathBuf::from("imgs/yellow_raincoat.jpg"),
            PathBuf::from("imgs/broken_file.jpg"),
        ];

        let results = provider.caption_batch(&items).await?;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), "a photo of yellow raincoat");
        assert!(results[1].is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_mock_normalize() -> anyhow::Result<()> {
        let provider = MockNormalizeProvider::new();
        let out = provider
            .normalize_text("A Person, in a BRIGHT-yellow raincoat!")
            .await?;
        assert_eq!(out, "a person in a bright yellow raincoat");
        Ok(())
    }

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic_and_normalized() -> anyhow::Result<()> {
        let provider = HashEmbedProvider::new(64);
        let a = provider.embed_text("yellow raincoat").await?;
        let b = provider.embed_text("yellow raincoat").await?;
        assert_eq!(a, b);

        let norm: f32 = a.iter().map(|x| x.to_f32() * x.to_f32()).sum::<f32>();
        assert!((norm - 1.0).abs() < 0.01);
        Ok(())
    }

    #[tokio::test]
    async fn test_hash_embedder_token_overlap_orders_similarity() -> anyhow::Result<()> {
        let provider = HashEmbedProvider::new(64);
        let query = provider.embed_text("yellow raincoat").await?;
        let close = provider.embed_text("bright yellow raincoat").await?;
        let far = provider.embed_text("black leather boots").await?;

        let dot = |a: &[f16], b: &[f16]| -> f32 {
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| x.to_f32() * y.to_f32())
                .sum()
        };
        assert!(dot(&query, &close) > dot(&query, &far));
        Ok(())
    }

    #[tokio::test]
    async fn test_scripted_rerank() -> anyhow::Result<()> {
        let provider = MockRerankProvider::new()
            .with_score("a.jpg", 0.2)
            .with_score("b.jpg", 0.9);
        let items = vec![PathBuf::from("data/a.jpg"), PathBuf::from("data/b.jpg")];

        let scores = provider.rerank("anything", &items).await?;
        assert_eq!(*scores[0].as_ref().unwrap(), 0.2);
        assert_eq!(*scores[1].as_ref().unwrap(), 0.9);
        Ok(())
    }
}
