//! Wiring: build the process-wide services from configuration.
//!
//! The index, ingestor and query engine are created once and shared by
//! every HTTP handler and WebSocket session.

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::info;

use rag_chat_core::chunk::RecursiveChunker;
use rag_chat_core::ingest::Ingestor;
use rag_chat_core::query::QueryEngine;
use rag_chat_core::store::memory::InMemoryIndex;
use rag_chat_core::store::VectorIndex;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::extract::FileLoader;
use crate::llm::create_generator;
use crate::sqlite_store::SqliteIndex;
use crate::{db, migrate};

/// Open the configured vector index backend.
pub async fn open_index(config: &Config) -> Result<Arc<dyn VectorIndex>> {
    let embedder = create_embedder(&config.embedding)?;
    info!(
        backend = %config.index.backend,
        embedder = embedder.model_name(),
        dims = embedder.dims(),
        "opening vector index"
    );

    match config.index.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryIndex::new(embedder))),
        "sqlite" => {
            let pool = db::connect(&config.index.path).await?;
            migrate::run_migrations(&pool).await?;
            Ok(Arc::new(SqliteIndex::new(pool, embedder)))
        }
        other => bail!("Unknown index backend: {}", other),
    }
}

/// Build the ingestion pipeline over `index`.
pub fn ingestor(config: &Config, index: Arc<dyn VectorIndex>) -> Ingestor {
    Ingestor::new(
        Arc::new(FileLoader::new()),
        Arc::new(RecursiveChunker::new(
            config.chunking.chunk_size,
            config.chunking.chunk_overlap,
        )),
        index,
    )
}

/// Build the query engine over `index`. Fails if the LLM API key is missing.
pub fn query_engine(config: &Config, index: Arc<dyn VectorIndex>) -> Result<Arc<QueryEngine>> {
    let generator = create_generator(&config.llm)?;
    Ok(Arc::new(QueryEngine::new(
        index,
        generator,
        config.retrieval.top_k,
    )))
}
