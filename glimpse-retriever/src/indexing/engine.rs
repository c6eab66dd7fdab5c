//! Indexing orchestrator
//!
//! Drives the full ingest pipeline for one run:
//!
//! ```text
//! Scanner → Caption → Normalize → MetadataStore → Embed → VectorStore
//! ```
//!
//! The run is resumable: paths already present in the metadata store
//! are skipped, so re-running over an unchanged dataset processes zero
//! items. Resumption is keyed on path equality only — two distinct
//! paths with identical bytes are two items.
//!
//! Failure policy:
//! - empty scan, embed-call failure, vector-store write/save failure:
//!   fatal, propagated
//! - caption/normalize failure for one item: that item degrades to an
//!   empty placeholder, is counted, and the batch continues
//! - metadata batch write failure: the batch rolls back and is skipped
//!   whole (no vectors written for it), the run continues
//!
//! The vector store is checkpointed whenever the running processed
//! total crosses a multiple of the checkpoint interval, and saved once
//! more unconditionally at the end. A crash between a checkpoint and
//! the next one loses only unsaved vectors; the metadata rows for those
//! items survive and the next run re-processes nothing (their paths are
//! considered done), so checkpoint intervals bound that exposure.

use crate::batching::batches;
use crate::catalog::{MetadataStore, VectorStore};
use crate::indexing::scanner::DatasetScanner;
use anyhow::Result;
use glimpse_models::{CaptionProvider, EmbedProvider, ItemResult, NormalizeProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Configuration for one indexing run.
#[derive(Debug, Clone)]
pub struct IndexingConfig {
    /// Directory scanned for source items
    pub dataset_root: PathBuf,
    /// File extensions treated as indexable
    pub extensions: Vec<String>,
    /// Items per pipeline batch
    pub batch_size: usize,
    /// Processed-item count between vector-store checkpoints
    pub checkpoint_interval: usize,
}

/// Outcome counts for a completed run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IndexingReport {
    /// Items found by the scanner
    pub total_found: usize,
    /// Items skipped because their path was already cataloged
    pub already_indexed: usize,
    /// Items processed this run
    pub processed: usize,
    /// Items whose caption degraded to the empty placeholder
    pub caption_failures: usize,
    /// Items whose normalization degraded to the empty placeholder
    pub normalize_failures: usize,
    /// Batches dropped whole after a metadata write failure
    pub failed_batches: usize,
    /// Mid-run checkpoint saves (the final save is not counted)
    pub checkpoints: usize,
}

/// Orchestrates scanning, captioning, normalization, and storage.
pub struct IndexingEngine {
    config: IndexingConfig,
    caption: Arc<dyn CaptionProvider>,
    normalize: Arc<dyn NormalizeProvider>,
    embed: Arc<dyn EmbedProvider>,
}

impl IndexingEngine {
    pub fn new(
        config: IndexingConfig,
        caption: Arc<dyn CaptionProvider>,
        normalize: Arc<dyn NormalizeProvider>,
        embed: Arc<dyn EmbedProvider>,
    ) -> Self {
        Self {
            config,
            caption,
            normalize,
            embed,
        }
    }

    /// Run the pipeline to completion.
    ///
    /// The metadata store is closed on the way out (both the nothing-new
    /// early exit and the full path); the vector store is left loaded in
    /// memory and persisted on disk.
    pub async fn run(
        &self,
        metadata: &MetadataStore,
        vectors: &mut VectorStore,
    ) -> Result<IndexingReport> {
        let mut report = IndexingReport::default();

        let scanner = DatasetScanner::new(&self.config.dataset_root, &self.config.extensions);
        let scanned = scanner.scan().await?;
        if scanned.is_empty() {
            anyhow::bail!(
                "no indexable items found under {}",
                self.config.dataset_root.display()
            );
        }
        report.total_found = scanned.len();
        info!("Scanned {} items", scanned.len());

        let seen = metadata.list_all_paths().await?;
        let unprocessed: Vec<PathBuf> = scanned
            .into_iter()
            .filter(|path| !seen.contains(path.to_string_lossy().as_ref()))
            .collect();
        report.already_indexed = report.total_found - unprocessed.len();

        if unprocessed.is_empty() {
            info!("All {} items already indexed, nothing to do", report.total_found);
            metadata.close().await;
            return Ok(report);
        }
        info!(
            "Indexing {} of {} items ({} already done)",
            unprocessed.len(),
            report.total_found,
            report.already_indexed
        );

        let mut checkpoint_marker = 0;
        for (batch_idx, batch) in batches(&unprocessed, self.config.batch_size).enumerate() {
            tracing::debug!("Batch {} ({} items)", batch_idx + 1, batch.len());

            let captions = Self::degrade_to_placeholder(
                self.caption.caption_batch(batch).await?,
                batch,
                "caption",
                &mut report.caption_failures,
            );

            let texts = Self::degrade_to_placeholder(
                self.normalize.normalize_batch(&captions).await?,
                batch,
                "normalize",
                &mut report.normalize_failures,
            );

            let records: Vec<(String, String)> = batch
                .iter()
                .map(|path| path.to_string_lossy().to_string())
                .zip(texts.iter().cloned())
                .collect();
            let ids = match metadata.upsert_batch(&records).await {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::error!("Metadata write failed, dropping batch {}: {e}", batch_idx + 1);
                    report.failed_batches += 1;
                    continue;
                }
            };

            let embedded = self.embed.embed_texts(&texts).await?;
            vectors.add_batch(&ids, &embedded.embeddings)?;

            report.processed += batch.len();
            info!(
                "Processed {}/{} items",
                report.processed,
                unprocessed.len()
            );

            if self.config.checkpoint_interval > 0 {
                let marker = report.processed / self.config.checkpoint_interval;
                if marker > checkpoint_marker {
                    vectors.save()?;
                    checkpoint_marker = marker;
                    report.checkpoints += 1;
                    info!("Checkpointed vector index at {} items", report.processed);
                }
            }
        }

        vectors.save()?;
        metadata.close().await;

        info!(
            "Indexing complete: {} processed, {} caption failures, {} normalize failures, {} failed batches",
            report.processed,
            report.caption_failures,
            report.normalize_failures,
            report.failed_batches
        );
        Ok(report)
    }

    /// Map per-item capability failures to the empty placeholder,
    /// counting and logging each one. The placeholder is only ever
    /// produced on failure, so the failure count is the record of which
    /// empties are degradations.
    fn degrade_to_placeholder(
        outcomes: Vec<ItemResult<String>>,
        batch: &[PathBuf],
        stage: &str,
        failures: &mut usize,
    ) -> Vec<String> {
        outcomes
            .into_iter()
            .zip(batch)
            .map(|(outcome, path)| match outcome {
                Ok(text) => text,
                Err(e) => {
                    warn!("{stage} failed for {}, using placeholder: {e}", path.display());
                    *failures += 1;
                    String::new()
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glimpse_models::mock::{HashEmbedProvider, MockCaptionProvider, MockNormalizeProvider};
    use tempfile::tempdir;

    const DIM: usize = 32;

    fn engine_for(root: &std::path::Path, batch_size: usize, interval: usize) -> IndexingEngine {
        IndexingEngine::new(
            IndexingConfig {
                dataset_root: root.to_path_buf(),
                extensions: vec!["jpg".to_string()],
                batch_size,
                checkpoint_interval: interval,
            },
            Arc::new(MockCaptionProvider::new()),
            Arc::new(MockNormalizeProvider::new()),
            Arc::new(HashEmbedProvider::new(DIM)),
        )
    }

    async fn write_items(root: &std::path::Path, names: &[&str]) -> Result<()> {
        for name in names {
            tokio::fs::write(root.join(name), b"pixels").await?;
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_scan_is_fatal() -> Result<()> {
        let data = tempdir()?;
        let state = tempdir()?;
        let metadata = MetadataStore::open(&state.path().join("catalog.db")).await?;
        let mut vectors = VectorStore::new(state.path().join("catalog.vec"), DIM, true);

        let engine = engine_for(data.path(), 4, 8);
        assert!(engine.run(&metadata, &mut vectors).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_first_run_indexes_everything() -> Result<()> {
        let data = tempdir()?;
        let state = tempdir()?;
        write_items(data.path(), &["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"]).await?;

        let metadata = MetadataStore::open(&state.path().join("catalog.db")).await?;
        let mut vectors = VectorStore::new(state.path().join("catalog.vec"), DIM, true);

        let engine = engine_for(data.path(), 2, 100);
        let report = engine.run(&metadata, &mut vectors).await?;

        assert_eq!(report.total_found, 5);
        assert_eq!(report.processed, 5);
        assert_eq!(report.already_indexed, 0);
        assert_eq!(vectors.size(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_rerun_processes_zero_items() -> Result<()> {
        let data = tempdir()?;
        let state = tempdir()?;
        write_items(data.path(), &["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"]).await?;

        let db_path = state.path().join("catalog.db");
        let vec_path = state.path().join("catalog.vec");

        let metadata = MetadataStore::open(&db_path).await?;
        let mut vectors = VectorStore::new(&vec_path, DIM, true);
        vectors.load().await?;
        engine_for(data.path(), 2, 100)
            .run(&metadata, &mut vectors)
            .await?;
        assert_eq!(vectors.size(), 5);

        // Fresh handles, same persisted state: the second run finds
        // nothing unprocessed and never touches the vector store.
        let metadata = MetadataStore::open(&db_path).await?;
        let mut vectors = VectorStore::new(&vec_path, DIM, true);
        vectors.load().await?;
        let report = engine_for(data.path(), 2, 100)
            .run(&metadata, &mut vectors)
            .await?;

        assert_eq!(report.processed, 0);
        assert_eq!(report.already_indexed, 5);
        assert_eq!(vectors.size(), 5);

        let metadata = MetadataStore::open(&db_path).await?;
        assert_eq!(metadata.count().await?, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_checkpoint_boundary() -> Result<()> {
        let data = tempdir()?;
        let state = tempdir()?;
        let names: Vec<String> = (0..12).map(|i| format!("item{i:02}.jpg")).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        write_items(data.path(), &name_refs).await?;

        let metadata = MetadataStore::open(&state.path().join("catalog.db")).await?;
        let mut vectors = VectorStore::new(state.path().join("catalog.vec"), DIM, true);

        // batch_size=4, interval=8, 12 items: one checkpoint at item 8,
        // plus the mandatory final save
        let report = engine_for(data.path(), 4, 8)
            .run(&metadata, &mut vectors)
            .await?;
        assert_eq!(report.processed, 12);
        assert_eq!(report.checkpoints, 1);
        Ok(())
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_caption_failure_degrades_to_placeholder() -> Result<()> {
        let data = tempdir()?;
        let state = tempdir()?;
        write_items(data.path(), &["good.jpg", "bad.jpg"]).await?;

        let db_path = state.path().join("catalog.db");
        let metadata = MetadataStore::open(&db_path).await?;
        let mut vectors = VectorStore::new(state.path().join("catalog.vec"), DIM, true);

        let engine = IndexingEngine::new(
            IndexingConfig {
                dataset_root: data.path().to_path_buf(),
                extensions: vec!["jpg".to_string()],
                batch_size: 4,
                checkpoint_interval: 100,
            },
            Arc::new(MockCaptionProvider::new().with_failure(data.path().join("bad.jpg"))),
            Arc::new(MockNormalizeProvider::new()),
            Arc::new(HashEmbedProvider::new(DIM)),
        );
        let report = engine.run(&metadata, &mut vectors).await?;

        // The failed item is still indexed, with empty text, and counted
        assert_eq!(report.processed, 2);
        assert_eq!(report.caption_failures, 1);
        assert_eq!(vectors.size(), 2);
        assert!(logs_contain("caption failed"));

        let metadata = MetadataStore::open(&db_path).await?;
        let ids: Vec<i64> = vectors.ids().to_vec();
        let entries = metadata.get_by_ids(&ids).await?;
        let bad_path = data.path().join("bad.jpg").to_string_lossy().to_string();
        let bad_entry = entries
            .values()
            .find(|e| e.path == bad_path)
            .expect("degraded item still cataloged");
        assert_eq!(bad_entry.normalized_text, "");
        Ok(())
    }
}
