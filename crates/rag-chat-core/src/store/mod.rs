//! Vector index abstraction for RAG Chat.
//!
//! The [`VectorIndex`] trait is the retrieval capability consumed by the
//! ingestion pipeline and the query orchestrator. Backends own their
//! embedding step: callers hand over raw chunk text and query strings.
//!
//! Implementations must be `Send + Sync` and safe under concurrent calls
//! from many sessions; no extra locking is layered on top of them.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, ScoredChunk};

/// Abstract similarity-search index over [`Chunk`]s.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](VectorIndex::add) | Embed and store chunks (appends, never dedups) |
/// | [`top_k`](VectorIndex::top_k) | The `k` chunks most similar to a query |
/// | [`count`](VectorIndex::count) | Number of stored chunks |
/// | [`clear`](VectorIndex::clear) | Remove every stored chunk |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embed and store `chunks`.
    async fn add(&self, chunks: &[Chunk]) -> Result<()>;

    /// Return at most `k` chunks ranked by descending similarity to `query`.
    async fn top_k(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>>;

    /// Number of chunks currently stored.
    async fn count(&self) -> Result<usize>;

    /// Remove every stored chunk.
    async fn clear(&self) -> Result<()>;
}

/// Sort candidates by descending score and keep the first `k`.
pub fn rank(mut candidates: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(k);
    candidates
}
