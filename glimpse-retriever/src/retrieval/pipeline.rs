//! Two-stage retrieval pipeline
//!
//! ```text
//! query → Normalize → Embed → VectorStore.search (top-N recall)
//!       → dedup (max score per id) → MetadataStore hydrate
//!       → Rerank (original query, top-K) → final ordered results
//! ```
//!
//! The first stage recalls a wide shortlist by semantic similarity over
//! normalized text; the second re-scores that shortlist with an
//! independent cross-modal signal against the *original* query and
//! produces the final order. The pipeline holds no state across calls
//! beyond the two shared stores.

use crate::catalog::{Candidate, ItemId, MetadataStore, VectorStore};
use anyhow::Result;
use glimpse_models::{EmbedProvider, NormalizeProvider, RerankProvider};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for the retrieval pipeline.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Recall width of the first (semantic) stage
    pub top_n: usize,
    /// Final result count after reranking; clamped to `top_n`
    pub top_k: usize,
    /// Root used to absolutize relative catalog paths for the reranker
    pub dataset_root: PathBuf,
}

/// One final, fully scored search result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub id: ItemId,
    pub path: String,
    pub normalized_text: String,
    /// First-stage similarity from the vector search
    pub semantic_score: f32,
    /// Second-stage relevance from the reranker
    pub rerank_score: f32,
    /// 1-based, contiguous position in the final order
    pub final_rank: usize,
}

/// Stateless query orchestrator over the shared stores.
pub struct SearchPipeline {
    config: RetrievalConfig,
    normalize: Arc<dyn NormalizeProvider>,
    embed: Arc<dyn EmbedProvider>,
    rerank: Arc<dyn RerankProvider>,
}

/// Collapse duplicate ids to their best score, preserving first-seen
/// order among ties, then re-sort descending and truncate.
fn dedup_candidates(raw: Vec<Candidate>, top_n: usize) -> Vec<Candidate> {
    let mut best: Vec<Candidate> = Vec::with_capacity(raw.len());
    let mut seen: HashMap<ItemId, usize> = HashMap::new();

    for candidate in raw {
        match seen.get(&candidate.id) {
            Some(&slot) => {
                if candidate.score > best[slot].score {
                    best[slot].score = candidate.score;
                }
            }
            None => {
                seen.insert(candidate.id, best.len());
                best.push(candidate);
            }
        }
    }

    best.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    best.truncate(top_n);
    best
}

impl SearchPipeline {
    pub fn new(
        config: RetrievalConfig,
        normalize: Arc<dyn NormalizeProvider>,
        embed: Arc<dyn EmbedProvider>,
        rerank: Arc<dyn RerankProvider>,
    ) -> Self {
        Self {
            config,
            normalize,
            embed,
            rerank,
        }
    }

    /// Run the full two-stage search for one query.
    pub async fn search(
        &self,
        metadata: &MetadataStore,
        vectors: &VectorStore,
        query: &str,
    ) -> Result<Vec<SearchHit>> {
        info!("Searching: {query}");

        let normalized_query = self.normalize.normalize_text(query).await?;
        debug!("Normalized query: {normalized_query}");

        let query_vector = self.embed.embed_text(&normalized_query).await?;

        let raw = vectors.search(&query_vector, self.config.top_n)?;
        debug!("Semantic recall: {} raw candidates", raw.len());

        let candidates = dedup_candidates(raw, self.config.top_n);

        let ids: Vec<ItemId> = candidates.iter().map(|c| c.id).collect();
        let entries = metadata.get_by_ids(&ids).await?;

        // Keep semantic order; an id the metadata store cannot hydrate
        // points at a store inconsistency, so warn and drop it.
        let mut shortlist = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match entries.get(&candidate.id) {
                Some(entry) => shortlist.push((candidate, entry.clone())),
                None => warn!(
                    "Dropping candidate {}: no metadata row (index/catalog out of sync?)",
                    candidate.id
                ),
            }
        }

        let item_paths: Vec<PathBuf> = shortlist
            .iter()
            .map(|(_, entry)| self.locate(&entry.path))
            .collect();
        // The reranker sees the original query, not the normalized one
        let rerank_outcomes = self.rerank.rerank(query, &item_paths).await?;

        let mut hits: Vec<SearchHit> = shortlist
            .into_iter()
            .zip(rerank_outcomes)
            .map(|((candidate, entry), outcome)| {
                let rerank_score = match outcome {
                    Ok(score) => score,
                    Err(e) => {
                        warn!("Rerank failed for {}, scoring neutral: {e}", entry.path);
                        0.0
                    }
                };
                SearchHit {
                    id: entry.id,
                    path: entry.path,
                    normalized_text: entry.normalized_text,
                    semantic_score: candidate.score,
                    rerank_score,
                    final_rank: 0,
                }
            })
            .collect();

        // Final order is the reranker's; ties keep the semantic order
        hits.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(self.config.top_k.min(self.config.top_n));
        for (index, hit) in hits.iter_mut().enumerate() {
            hit.final_rank = index + 1;
        }

        info!("Search complete: {} results", hits.len());
        Ok(hits)
    }

    fn locate(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.dataset_root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glimpse_models::mock::{HashEmbedProvider, MockNormalizeProvider, MockRerankProvider};

    const DIM: usize = 32;

    fn candidate(id: ItemId, score: f32) -> Candidate {
        Candidate { id, score }
    }

    #[test]
    fn test_dedup_keeps_max_score_per_id() {
        let raw = vec![candidate(7, 0.9), candidate(7, 0.95), candidate(3, 0.8)];
        let deduped = dedup_candidates(raw, 10);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, 7);
        assert!((deduped[0].score - 0.95).abs() < f32::EPSILON);
        assert_eq!(deduped[1].id, 3);
        assert!((deduped[1].score - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_dedup_truncates_to_top_n() {
        let raw = vec![candidate(1, 0.5), candidate(2, 0.9), candidate(3, 0.7)];
        let deduped = dedup_candidates(raw, 2);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, 2);
        assert_eq!(deduped[1].id, 3);
    }

    fn pipeline(top_n: usize, top_k: usize, rerank: MockRerankProvider) -> SearchPipeline {
        SearchPipeline::new(
            RetrievalConfig {
                top_n,
                top_k,
                dataset_root: PathBuf::from("/data"),
            },
            Arc::new(MockNormalizeProvider::new()),
            Arc::new(HashEmbedProvider::new(DIM)),
            Arc::new(rerank),
        )
    }

    /// Seed both stores with items whose normalized text matches their
    /// file name, embedded with the same hash embedder the pipeline uses.
    async fn seed(
        texts: &[(&str, &str)],
    ) -> Result<(MetadataStore, VectorStore)> {
        let metadata = MetadataStore::open_memory().await?;
        let mut vectors = VectorStore::new("unused.vec", DIM, true);
        let embedder = HashEmbedProvider::new(DIM);

        for (path, text) in texts {
            let id = metadata.upsert(path, text).await?;
            let embedding = embedder.embed_text(text).await?;
            vectors.add_batch(&[id], &[embedding])?;
        }
        Ok((metadata, vectors))
    }

    #[tokio::test]
    async fn test_rerank_reorders_and_ranks_contiguously() -> Result<()> {
        let (metadata, vectors) = seed(&[
            ("a.jpg", "yellow raincoat person"),
            ("b.jpg", "yellow coat"),
            ("c.jpg", "yellow jacket rain"),
        ])
        .await?;

        let rerank = MockRerankProvider::new()
            .with_score("a.jpg", 0.2)
            .with_score("b.jpg", 0.9)
            .with_score("c.jpg", 0.5);
        let pipeline = pipeline(10, 10, rerank);

        let hits = pipeline
            .search(&metadata, &vectors, "yellow raincoat")
            .await?;
        assert_eq!(hits.len(), 3);

        let order: Vec<&str> = hits.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(order, vec!["b.jpg", "c.jpg", "a.jpg"]);
        let ranks: Vec<usize> = hits.iter().map(|h| h.final_rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        Ok(())
    }

    #[tokio::test]
    async fn test_top_k_truncation() -> Result<()> {
        let (metadata, vectors) = seed(&[
            ("a.jpg", "yellow raincoat"),
            ("b.jpg", "yellow coat"),
            ("c.jpg", "yellow jacket"),
        ])
        .await?;

        let pipeline = pipeline(10, 2, MockRerankProvider::new());
        let hits = pipeline.search(&metadata, &vectors, "yellow").await?;

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].final_rank, 1);
        assert_eq!(hits[1].final_rank, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_unhydratable_candidate_is_dropped() -> Result<()> {
        let (metadata, mut vectors) = seed(&[("a.jpg", "yellow raincoat")]).await?;

        // A vector whose id has no catalog row
        let embedder = HashEmbedProvider::new(DIM);
        let stray = embedder.embed_text("yellow raincoat").await?;
        vectors.add_batch(&[9999], &[stray])?;

        let pipeline = pipeline(10, 10, MockRerankProvider::new());
        let hits = pipeline
            .search(&metadata, &vectors, "yellow raincoat")
            .await?;

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "a.jpg");
        Ok(())
    }

    #[tokio::test]
    async fn test_rerank_failure_scores_neutral() -> Result<()> {
        let (metadata, vectors) = seed(&[
            ("a.jpg", "yellow raincoat"),
            ("b.jpg", "yellow coat"),
        ])
        .await?;

        let rerank = MockRerankProvider::new()
            .with_score("a.jpg", 0.8)
            .with_failure(PathBuf::from("/data/b.jpg"));
        let pipeline = pipeline(10, 10, rerank);

        let hits = pipeline.search(&metadata, &vectors, "yellow").await?;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].path, "a.jpg");
        assert_eq!(hits[1].path, "b.jpg");
        assert_eq!(hits[1].rerank_score, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_semantic_scores_survive_into_hits() -> Result<()> {
        let (metadata, vectors) = seed(&[("a.jpg", "yellow raincoat")]).await?;
        let pipeline = pipeline(10, 10, MockRerankProvider::new());

        let hits = pipeline
            .search(&metadata, &vectors, "yellow raincoat")
            .await?;
        assert_eq!(hits.len(), 1);
        // Same text, same embedder: cosine of a vector with itself
        assert!(hits[0].semantic_score > 0.98);
        Ok(())
    }

    #[test]
    fn test_locate_joins_relative_paths() {
        let pipeline = pipeline(5, 5, MockRerankProvider::new());
        assert_eq!(pipeline.locate("imgs/a.jpg"), PathBuf::from("/data/imgs/a.jpg"));
        assert_eq!(pipeline.locate("/abs/a.jpg"), PathBuf::from("/abs/a.jpg"));
    }
}
