//! Flat vector similarity index with a parallel identifier list
//!
//! The store is an arena of fixed-dimension f16 vectors plus a
//! same-length list of item ids: position `i` in the id list belongs to
//! the `i`-th vector ever inserted. Both structures live behind this
//! one type so no caller can move them out of step.
//!
//! Search is exact: every stored vector is scanned per query (O(N·d)),
//! which is the right trade for catalogs up to a few hundred thousand
//! items. Scores are inner products, i.e. cosine similarity when the
//! configured normalization flag is on.
//!
//! ## Persistence
//!
//! Two companion files, replaced together on save via temp-file rename:
//! `<path>` holds the encoded vector arena, `<path with .ids>` the flat
//! id array. A pair where only one file exists, or whose lengths
//! disagree, is corruption and refuses to load; only a fully absent
//! pair falls back to a fresh empty store.

use super::{Candidate, ItemId, StorageError};
use half::f16;
use std::io::Write;
use std::path::{Path, PathBuf};

const FORMAT_VERSION: u32 = 1;

#[derive(bincode::Encode, bincode::Decode)]
struct IndexFile {
    version: u32,
    dimension: u64,
    /// f16 vector data, row-major, little-endian bytes
    data: Vec<u8>,
}

#[derive(bincode::Encode, bincode::Decode)]
struct IdsFile {
    version: u32,
    ids: Vec<i64>,
}

/// In-memory flat index over unit (or raw) vectors, disk-backed.
#[derive(Debug)]
pub struct VectorStore {
    index_path: PathBuf,
    ids_path: PathBuf,
    dimension: usize,
    normalize: bool,
    data: Vec<f16>,
    ids: Vec<ItemId>,
}

impl VectorStore {
    /// Create an empty store. `index_path` names the vector file; the
    /// id list lives next to it with an `.ids` extension.
    pub fn new(index_path: impl Into<PathBuf>, dimension: usize, normalize: bool) -> Self {
        let index_path = index_path.into();
        let ids_path = index_path.with_extension("ids");
        Self {
            index_path,
            ids_path,
            dimension,
            normalize,
            data: Vec::new(),
            ids: Vec::new(),
        }
    }

    /// Load the persisted pair if present.
    ///
    /// Both files absent: start empty. Exactly one present, or any
    /// decode/length/dimension problem: [`StorageError::Corrupt`] —
    /// a readable-but-wrong pair never silently degrades to empty.
    pub async fn load(&mut self) -> Result<(), StorageError> {
        let have_index = self.index_path.exists();
        let have_ids = self.ids_path.exists();

        match (have_index, have_ids) {
            (false, false) => {
                tracing::info!(
                    "No existing vector index at {}, starting empty",
                    self.index_path.display()
                );
                return Ok(());
            }
            (true, false) => {
                return Err(StorageError::corrupt(format!(
                    "index file {} exists but id file {} is missing",
                    self.index_path.display(),
                    self.ids_path.display()
                )));
            }
            (false, true) => {
                return Err(StorageError::corrupt(format!(
                    "id file {} exists but index file {} is missing",
                    self.ids_path.display(),
                    self.index_path.display()
                )));
            }
            (true, true) => {}
        }

        let index_bytes = tokio::fs::read(&self.index_path).await?;
        let ids_bytes = tokio::fs::read(&self.ids_path).await?;

        let (index, _): (IndexFile, usize) =
            bincode::decode_from_slice(&index_bytes, bincode::config::standard())
                .map_err(|e| StorageError::corrupt(format!("undecodable index file: {e}")))?;
        let (ids, _): (IdsFile, usize) =
            bincode::decode_from_slice(&ids_bytes, bincode::config::standard())
                .map_err(|e| StorageError::corrupt(format!("undecodable id file: {e}")))?;

        if index.version != FORMAT_VERSION || ids.version != FORMAT_VERSION {
            return Err(StorageError::corrupt(format!(
                "unsupported format version {}/{}",
                index.version, ids.version
            )));
        }
        if index.dimension as usize != self.dimension {
            return Err(StorageError::corrupt(format!(
                "index dimension {} does not match configured dimension {}",
                index.dimension, self.dimension
            )));
        }
        if index.data.len() % 2 != 0 {
            return Err(StorageError::corrupt("odd index payload length"));
        }

        let data: Vec<f16> = bytemuck::pod_collect_to_vec::<u8, f16>(&index.data);
        if data.len() != ids.ids.len() * self.dimension {
            return Err(StorageError::corrupt(format!(
                "index holds {} vectors but id list holds {} entries",
                data.len() / self.dimension.max(1),
                ids.ids.len()
            )));
        }

        self.data = data;
        self.ids = ids.ids;
        tracing::info!(
            "Loaded vector index: {} vectors of dimension {}",
            self.ids.len(),
            self.dimension
        );
        Ok(())
    }

    /// Append vectors and their ids, in matching order.
    ///
    /// `ids` and `vectors` must have equal length and every vector must
    /// have the configured dimension; both are checked before anything
    /// is appended, so a rejected call leaves the store untouched.
    pub fn add_batch(&mut self, ids: &[ItemId], vectors: &[Vec<f16>]) -> Result<(), StorageError> {
        if ids.len() != vectors.len() {
            return Err(StorageError::mismatch(format!(
                "{} ids for {} vectors",
                ids.len(),
                vectors.len()
            )));
        }
        for vector in vectors {
            if vector.len() != self.dimension {
                return Err(StorageError::mismatch(format!(
                    "vector dimension {} does not match configured dimension {}",
                    vector.len(),
                    self.dimension
                )));
            }
        }

        for (id, vector) in ids.iter().zip(vectors) {
            let row = self.prepare(vector);
            self.data.extend(row.into_iter().map(f16::from_f32));
            self.ids.push(*id);
        }
        debug_assert_eq!(self.data.len(), self.ids.len() * self.dimension);
        tracing::debug!("Added {} vectors to index", ids.len());
        Ok(())
    }

    /// Exact nearest-neighbor search over all stored vectors.
    ///
    /// Results come back ordered by descending score; equal scores keep
    /// insertion order (earlier-inserted wins). At most `top_n` results,
    /// fewer if the store is smaller — never padded.
    pub fn search(&self, query: &[f16], top_n: usize) -> Result<Vec<Candidate>, StorageError> {
        if query.len() != self.dimension {
            return Err(StorageError::mismatch(format!(
                "query dimension {} does not match configured dimension {}",
                query.len(),
                self.dimension
            )));
        }
        if self.ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = self.prepare(query);
        let mut candidates: Vec<Candidate> = self
            .data
            .chunks_exact(self.dimension)
            .zip(&self.ids)
            .map(|(row, &id)| {
                let score = row
                    .iter()
                    .zip(&query)
                    .map(|(a, b)| a.to_f32() * b)
                    .sum::<f32>();
                Candidate { id, score }
            })
            .collect();

        // Stable sort keeps insertion order for equal scores
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_n);
        Ok(candidates)
    }

    /// Write the vector file and id file as a matched pair.
    ///
    /// Both payloads are written to temp files in the target directory
    /// first, then renamed into place, so a crash mid-save leaves the
    /// previous pair intact rather than a half-written one.
    pub fn save(&self) -> Result<(), StorageError> {
        let index = IndexFile {
            version: FORMAT_VERSION,
            dimension: self.dimension as u64,
            data: bytemuck::cast_slice::<f16, u8>(&self.data).to_vec(),
        };
        let ids = IdsFile {
            version: FORMAT_VERSION,
            ids: self.ids.clone(),
        };

        let index_bytes = bincode::encode_to_vec(&index, bincode::config::standard())
            .map_err(|e| StorageError::corrupt(format!("encoding index failed: {e}")))?;
        let ids_bytes = bincode::encode_to_vec(&ids, bincode::config::standard())
            .map_err(|e| StorageError::corrupt(format!("encoding ids failed: {e}")))?;

        let dir = self
            .index_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut index_tmp = tempfile::NamedTempFile::new_in(dir)?;
        index_tmp.write_all(&index_bytes)?;
        let mut ids_tmp = tempfile::NamedTempFile::new_in(dir)?;
        ids_tmp.write_all(&ids_bytes)?;

        index_tmp
            .persist(&self.index_path)
            .map_err(|e| StorageError::Io { source: e.error })?;
        ids_tmp
            .persist(&self.ids_path)
            .map_err(|e| StorageError::Io { source: e.error })?;

        tracing::info!(
            "Saved vector index: {} vectors to {}",
            self.ids.len(),
            self.index_path.display()
        );
        Ok(())
    }

    /// Total vector count.
    pub fn size(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identifier list, aligned with vector insertion order.
    pub fn ids(&self) -> &[ItemId] {
        &self.ids
    }

    /// Drop all in-memory vectors and remove both companion files.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.data.clear();
        self.ids.clear();
        for path in [&self.index_path, &self.ids_path] {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Convert to f32, applying L2 normalization when configured.
    fn prepare(&self, vector: &[f16]) -> Vec<f32> {
        let mut out: Vec<f32> = vector.iter().map(|x| x.to_f32()).collect();
        if self.normalize {
            let norm: f32 = out.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for value in &mut out {
                    *value /= norm;
                }
            }
        }
        out
    }
}
