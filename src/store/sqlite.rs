//! SQLite-backed store implementations.
//!
//! Each store owns its own database file so that either can be lost or
//! damaged independently; the integrity checker is what notices when they
//! disagree.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{IndexError, Result};
use crate::models::{Chunk, FileRecord, SearchHit};

use super::{ContentStore, MetadataStore};

/// SQLite implementation of [`MetadataStore`] over the `file_records` table.
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get(&self, path: &str) -> Result<Option<i64>> {
        let ts: Option<i64> =
            sqlx::query_scalar("SELECT last_updated FROM file_records WHERE path = ?")
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;
        Ok(ts)
    }

    async fn put(&self, path: &str, last_updated_ns: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO file_records (path, last_updated) VALUES (?, ?)
            ON CONFLICT(path) DO UPDATE SET last_updated = excluded.last_updated
            "#,
        )
        .bind(path)
        .bind(last_updated_ns)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, paths: &[String]) -> Result<u64> {
        if paths.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;
        for path in paths {
            removed += sqlx::query("DELETE FROM file_records WHERE path = ?")
                .bind(path)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn all_paths(&self) -> Result<HashSet<String>> {
        let paths: Vec<String> = sqlx::query_scalar("SELECT path FROM file_records")
            .fetch_all(&self.pool)
            .await?;
        Ok(paths.into_iter().collect())
    }

    async fn clear_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM file_records")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn row_count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    async fn records(&self) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query("SELECT path, last_updated FROM file_records ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| FileRecord {
                path: row.get("path"),
                last_updated_ns: row.get("last_updated"),
            })
            .collect())
    }
}

/// SQLite implementation of [`ContentStore`] over `chunks` and
/// `chunk_vectors`.
///
/// Similarity search is a brute-force cosine scan over every stored vector.
pub struct SqliteContentStore {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteContentStore {
    /// `dims` is the vector width every stored embedding must have.
    pub fn new(pool: SqlitePool, dims: usize) -> Self {
        Self { pool, dims }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source_path, chunk_index, text, hash)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    source_path = excluded.source_path,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    hash = excluded.hash
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source_path)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            if !chunk.embedding.is_empty() {
                sqlx::query(
                    r#"
                    INSERT INTO chunk_vectors (chunk_id, source_path, embedding)
                    VALUES (?, ?, ?)
                    ON CONFLICT(chunk_id) DO UPDATE SET
                        source_path = excluded.source_path,
                        embedding = excluded.embedding
                    "#,
                )
                .bind(&chunk.id)
                .bind(&chunk.source_path)
                .bind(vec_to_blob(&chunk.embedding))
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_path(&self, paths: &[String]) -> Result<u64> {
        if paths.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;
        for path in paths {
            sqlx::query("DELETE FROM chunk_vectors WHERE source_path = ?")
                .bind(path)
                .execute(&mut *tx)
                .await?;
            removed += sqlx::query("DELETE FROM chunks WHERE source_path = ?")
                .bind(path)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let rows = sqlx::query(
            r#"
            SELECT cv.chunk_id, c.source_path, c.text, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            if blob.len() != self.dims * 4 {
                let chunk_id: String = row.get("chunk_id");
                return Err(IndexError::CorruptionDetected(format!(
                    "vector for chunk {} has {} bytes, expected {}",
                    chunk_id,
                    blob.len(),
                    self.dims * 4
                )));
            }
            let vec = blob_to_vec(&blob);
            hits.push(SearchHit {
                chunk_id: row.get("chunk_id"),
                source_path: row.get("source_path"),
                text: row.get("text"),
                score: cosine_similarity(query_vec, &vec),
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    async fn indexed_count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    async fn chunks_for_path(&self, path: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.source_path, c.chunk_index, c.text, c.hash, cv.embedding
            FROM chunks c
            LEFT JOIN chunk_vectors cv ON cv.chunk_id = c.id
            WHERE c.source_path = ?
            ORDER BY c.chunk_index
            "#,
        )
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Option<Vec<u8>> = row.get("embedding");
                Chunk {
                    id: row.get("id"),
                    source_path: row.get("source_path"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    hash: row.get("hash"),
                    embedding: blob.map(|b| blob_to_vec(&b)).unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn all_source_paths(&self) -> Result<HashSet<String>> {
        let paths: Vec<String> = sqlx::query_scalar("SELECT DISTINCT source_path FROM chunks")
            .fetch_all(&self.pool)
            .await?;
        Ok(paths.into_iter().collect())
    }
}
