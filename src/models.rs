//! Core data types shared across the chunker, store, and search pipeline.

use serde::Serialize;

/// Metadata attached to a chunk at chunk time, before storage.
///
/// The `hierarchy` field stays a `Vec<String>` here — the `" > "`-joined
/// string form is a storage-boundary concern, applied only when a chunk is
/// handed to a [`crate::store::Store`] implementation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChunkMetadata {
    pub source_url: String,
    pub page_title: Option<String>,
    pub section: Option<String>,
    pub hierarchy: Vec<String>,
    pub has_code: bool,
}

impl ChunkMetadata {
    pub fn hierarchy_joined(&self) -> String {
        self.hierarchy.join(" > ")
    }
}

/// A semantically coherent unit of text produced by the chunker, ready for
/// embedding and storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// The deterministic, globally unique identity of this chunk:
    /// `SHA256(source_url + ":" + content)`, lowercase hex.
    pub fn id(&self) -> String {
        content_id(&self.metadata.source_url, &self.content)
    }
}

/// Compute the deterministic chunk/document ID used throughout the store.
pub fn content_id(source_url: &str, content: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(source_url.as_bytes());
    hasher.update(b":");
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// A single hit returned from a search, ready for display or further
/// processing by a reranker.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub score: f64,
    pub content: String,
    pub source_url: String,
    pub page_title: Option<String>,
    pub section: Option<String>,
    /// 1-based rank within the lexical modality, if this result had a
    /// lexical hit. `None` on the semantic-only path or for fused
    /// multi-query results, which lose per-modality ranks.
    pub keyword_rank: Option<i64>,
    /// 1-based rank within the semantic modality, if this result had a
    /// vector hit.
    pub semantic_rank: Option<i64>,
}
