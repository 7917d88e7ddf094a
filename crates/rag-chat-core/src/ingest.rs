//! Ingestion pipeline: load → chunk → embed-and-store.
//!
//! Re-ingesting the same document appends a second copy of its chunks;
//! nothing is deduplicated across runs.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::chunk::Chunker;
use crate::error::RagError;
use crate::loader::DocumentLoader;
use crate::store::VectorIndex;

/// Orchestrates one document's trip into the vector index.
pub struct Ingestor {
    loader: Arc<dyn DocumentLoader>,
    chunker: Arc<dyn Chunker>,
    index: Arc<dyn VectorIndex>,
}

impl Ingestor {
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        chunker: Arc<dyn Chunker>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            loader,
            chunker,
            index,
        }
    }

    /// Ingest the document at `path`, returning the number of chunks stored.
    ///
    /// Chunks are tagged with the file's base name as their source.
    pub async fn ingest(&self, path: &Path) -> Result<usize, RagError> {
        let text = self.loader.load(path).await?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let chunks = self.chunker.split(&text, &source);
        self.index.add(&chunks).await.map_err(RagError::retrieval)?;

        info!(source = %source, chunks = chunks.len(), "document ingested");
        Ok(chunks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::RecursiveChunker;
    use crate::embedding::HashEmbedder;
    use crate::loader::file_extension;
    use crate::store::memory::InMemoryIndex;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;

    /// Serves documents from a map keyed by path; only `.txt` is supported.
    struct MapLoader(HashMap<PathBuf, String>);

    #[async_trait]
    impl DocumentLoader for MapLoader {
        async fn load(&self, path: &Path) -> Result<String, RagError> {
            let name = path.to_string_lossy();
            let ext = file_extension(&name);
            if ext != ".txt" {
                return Err(RagError::UnsupportedFormat { extension: ext });
            }
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| RagError::Load(format!("{} not found", name)))
        }
    }

    fn setup() -> (Ingestor, Arc<InMemoryIndex>) {
        let mut docs = HashMap::new();
        docs.insert(
            PathBuf::from("uploads/notes.txt"),
            (0..60)
                .map(|i| format!("Sentence number {} about deployment", i))
                .collect::<Vec<_>>()
                .join(". "),
        );
        let index = Arc::new(InMemoryIndex::new(Arc::new(HashEmbedder::new(64))));
        let ingestor = Ingestor::new(
            Arc::new(MapLoader(docs)),
            Arc::new(RecursiveChunker::new(200, 40)),
            index.clone(),
        );
        (ingestor, index)
    }

    #[tokio::test]
    async fn ingest_returns_chunk_count_and_grows_index() {
        let (ingestor, index) = setup();
        let before = index.count().await.unwrap();
        let n = ingestor.ingest(Path::new("uploads/notes.txt")).await.unwrap();
        assert!(n > 1);
        assert_eq!(index.count().await.unwrap(), before + n);
    }

    #[tokio::test]
    async fn reingest_appends() {
        let (ingestor, index) = setup();
        let first = ingestor.ingest(Path::new("uploads/notes.txt")).await.unwrap();
        let second = ingestor.ingest(Path::new("uploads/notes.txt")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(index.count().await.unwrap(), first + second);
    }

    #[tokio::test]
    async fn chunks_carry_base_filename() {
        let (ingestor, index) = setup();
        ingestor.ingest(Path::new("uploads/notes.txt")).await.unwrap();
        let hits = index.top_k("deployment", 1).await.unwrap();
        assert_eq!(hits[0].chunk.source, "notes.txt");
    }

    #[tokio::test]
    async fn unsupported_extension_leaves_index_untouched() {
        let (ingestor, index) = setup();
        let err = ingestor.ingest(Path::new("uploads/tool.exe")).await.unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFormat { .. }));
        assert_eq!(index.count().await.unwrap(), 0);
    }
}
