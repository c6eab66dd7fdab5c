//! SQLite-backed catalog metadata store
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE catalog_items (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,  -- stable item identifier
//!     path TEXT UNIQUE NOT NULL,             -- source path, the upsert key
//!     normalized_text TEXT NOT NULL,         -- canonical keyword text
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//! ```
//!
//! Ids are issued by SQLite on first insertion of a path and never
//! change afterwards; re-indexing a path only replaces its text. Batch
//! writes run in one transaction so a failure leaves no partial rows.

use super::{CatalogEntry, ItemId, StorageError};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Durable map from item id to (path, normalized text).
#[derive(Clone, Debug)]
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    /// Open the store with persistent SQLite storage, creating the
    /// database file and schema if missing. Connect failure is fatal.
    pub async fn open(db_path: &Path) -> Result<Self, StorageError> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .create_if_missing(true),
        )
        .await?;
        Self::new_with_pool(pool).await
    }

    /// Open the store with in-memory SQLite storage for testing.
    pub async fn open_memory() -> Result<Self, StorageError> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS catalog_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT UNIQUE NOT NULL,
                normalized_text TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_catalog_items_path ON catalog_items(path)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Insert a row for an unseen path (issuing a new id) or replace the
    /// normalized text of an existing one (id unchanged). Atomic per call.
    pub async fn upsert(&self, path: &str, normalized_text: &str) -> Result<ItemId, StorageError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO catalog_items (path, normalized_text)
            VALUES (?1, ?2)
            ON CONFLICT(path) DO UPDATE SET normalized_text = excluded.normalized_text
            RETURNING id
            "#,
        )
        .bind(path)
        .bind(normalized_text)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Upsert a batch of (path, normalized text) records in one
    /// transaction, returning ids in input order. Any failure rolls the
    /// whole batch back; callers never observe a partial commit.
    pub async fn upsert_batch(
        &self,
        records: &[(String, String)],
    ) -> Result<Vec<ItemId>, StorageError> {
        let mut tx = self.pool.begin().await?;

        let mut ids = Vec::with_capacity(records.len());
        for (path, normalized_text) in records {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO catalog_items (path, normalized_text)
                VALUES (?1, ?2)
                ON CONFLICT(path) DO UPDATE SET normalized_text = excluded.normalized_text
                RETURNING id
                "#,
            )
            .bind(path)
            .bind(normalized_text)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await?;
        tracing::debug!("Committed {} catalog rows", ids.len());
        Ok(ids)
    }

    /// All paths committed so far, as of this call.
    pub async fn list_all_paths(&self) -> Result<HashSet<String>, StorageError> {
        let rows = sqlx::query("SELECT path FROM catalog_items")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("path")).collect())
    }

    /// Fetch rows for the given ids. Missing ids are silently omitted.
    pub async fn get_by_ids(
        &self,
        ids: &[ItemId],
    ) -> Result<HashMap<ItemId, CatalogEntry>, StorageError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = ids
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "SELECT id, path, normalized_text, created_at FROM catalog_items WHERE id IN ({placeholders})"
        );

        let mut query_builder = sqlx::query(&query);
        for id in ids {
            query_builder = query_builder.bind(id);
        }
        let rows = query_builder.fetch_all(&self.pool).await?;

        let mut entries = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let created_at: chrono::NaiveDateTime = row.get("created_at");
            entries.insert(
                id,
                CatalogEntry {
                    id,
                    path: row.get("path"),
                    normalized_text: row.get("normalized_text"),
                    created_at: created_at.and_utc(),
                },
            );
        }
        Ok(entries)
    }

    /// Total row count, for reporting.
    pub async fn count(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Delete every row, returning how many were removed.
    pub async fn clear_all(&self) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM catalog_items")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Close the underlying pool. Idempotent.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
