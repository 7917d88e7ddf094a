//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Chunks are stored with their embedding as a little-endian f32 BLOB.
//! Similarity search is a brute-force cosine scan over every stored row,
//! which is fine at the scale of a single user's uploaded documents.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use rag_chat_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use rag_chat_core::models::{Chunk, ScoredChunk};
use rag_chat_core::store::{rank, VectorIndex};

/// SQLite implementation of the [`VectorIndex`] trait.
pub struct SqliteIndex {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
}

impl SqliteIndex {
    /// Wrap an already-migrated pool.
    pub fn new(pool: SqlitePool, embedder: Arc<dyn Embedder>) -> Self {
        Self { pool, embedder }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn add(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let now = chrono::Utc::now().timestamp();
        let model = self.embedder.model_name().to_string();
        let mut tx = self.pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(&vectors) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source, chunk_index, text, hash, model, dims, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(&model)
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn top_k(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_vec = self.embedder.embed_query(query).await?;

        let rows = sqlx::query(
            "SELECT id, source, chunk_index, text, hash, embedding FROM chunks ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let candidates: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ScoredChunk {
                    score: cosine_similarity(&query_vec, &blob_to_vec(&blob)),
                    chunk: Chunk {
                        id: row.get("id"),
                        source: row.get("source"),
                        chunk_index: row.get("chunk_index"),
                        text: row.get("text"),
                        hash: row.get("hash"),
                    },
                }
            })
            .collect();

        Ok(rank(candidates, k))
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM chunks").execute(&self.pool).await?;
        Ok(())
    }
}
