//! In-memory [`VectorIndex`] implementation for tests and ephemeral runs.
//!
//! Chunks and their vectors live in a `Vec` behind `std::sync::RwLock`.
//! Search is brute-force cosine similarity over all stored vectors.

use std::sync::{Arc, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::{cosine_similarity, Embedder};
use crate::models::{Chunk, ScoredChunk};

use super::{rank, VectorIndex};

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory index; contents are lost when the process exits.
pub struct InMemoryIndex {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<StoredChunk>>,
}

impl InMemoryIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }
}

fn poisoned() -> anyhow::Error {
    anyhow::anyhow!("in-memory index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
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

        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            entries.push(StoredChunk {
                chunk: chunk.clone(),
                vector,
            });
        }
        Ok(())
    }

    async fn top_k(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_vec = self.embedder.embed_query(query).await?;
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let candidates = entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(&query_vec, &e.vector),
            })
            .collect();
        Ok(rank(candidates, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().map_err(|_| poisoned())?.len())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}
