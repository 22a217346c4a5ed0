//! Indexer driver: glob markdown files under a directory, chunk each one,
//! embed in batches, and upsert into the store.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::chunk::chunk_document;
use crate::embedding::EmbeddingClient;
use crate::models::Chunk;
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexStats {
    pub files_indexed: usize,
    pub chunks_indexed: usize,
}

pub struct Indexer {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingClient>,
    batch_size: usize,
}

impl Indexer {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<dyn EmbeddingClient>, batch_size: usize) -> Self {
        Self {
            store,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn index_directory(&self, dir: &Path, clear_first: bool) -> Result<IndexStats> {
        anyhow::ensure!(
            dir.is_dir(),
            "corpus directory does not exist or is not a directory: {}",
            dir.display()
        );

        if clear_first {
            self.store.clear().await.context("failed to clear collection before reindex")?;
        }

        let files: Vec<_> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "md"))
            .map(|entry| entry.into_path())
            .collect();

        let mut stats = IndexStats::default();
        let mut pending: Vec<Chunk> = Vec::new();

        for path in &files {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let chunks = chunk_document(&raw);
            if chunks.is_empty() {
                continue;
            }
            stats.files_indexed += 1;
            stats.chunks_indexed += chunks.len();
            pending.extend(chunks);

            while pending.len() >= self.batch_size {
                let batch: Vec<Chunk> = pending.drain(..self.batch_size).collect();
                self.embed_and_upsert(batch).await?;
            }
        }

        if !pending.is_empty() {
            self.embed_and_upsert(pending).await?;
        }

        Ok(stats)
    }

    async fn embed_and_upsert(&self, batch: Vec<Chunk>) -> Result<()> {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let embeddings = self
            .embedder
            .embed(&texts)
            .await
            .context("embedding failed during indexing, aborting")?;
        self.store.upsert(&batch, &embeddings).await
    }
}
