//! Storage abstraction: the persistent hybrid index.
//!
//! A [`Store`] owns one collection's worth of state across three
//! rowid-sharing tables (documents, lexical FTS5 index, vector index). See
//! [`sqlite::SqliteStore`] for the only implementation — the spec calls for
//! keeping just the SQLite-with-FTS-and-vector backend.

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Chunk;

/// A candidate from the lexical (BM25) index, ordered ascending by `bm25`
/// (lower is more relevant, matching SQLite FTS5's rank convention).
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub id: String,
    pub content: String,
    pub source_url: String,
    pub page_title: Option<String>,
    pub section: Option<String>,
    pub bm25: f64,
}

/// A candidate from the vector index, ordered ascending by `distance` (L2).
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub content: String,
    pub source_url: String,
    pub page_title: Option<String>,
    pub section: Option<String>,
    pub distance: f64,
}

/// A full stored row, for browsing/debug reads.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub collection: String,
    pub content: String,
    pub source_url: String,
    pub section: Option<String>,
    pub metadata: serde_json::Value,
}

/// The persistent hybrid index contract. Each `Store` instance is bound to
/// one collection. Cross-collection enumeration
/// (`list_collections`/`collection_count_of`) lives as inherent methods on
/// [`sqlite::SqliteStore`] rather than on this trait, since it addresses the
/// whole database rather than the bound collection.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or update chunks with their embeddings. `chunks` and
    /// `embeddings` must be the same length. Deduplicates by ID within the
    /// batch; re-indexing an existing ID overwrites content, metadata, and
    /// embedding without creating a second row.
    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()>;

    /// Up to `pool_size` lexical candidates, ordered ascending by BM25 rank.
    /// Returns an empty vector if `bm25_query` is empty.
    async fn keyword_search(&self, bm25_query: &str, pool_size: i64) -> Result<Vec<KeywordHit>>;

    /// Up to `pool_size` vector candidates, ordered ascending by L2 distance.
    async fn vector_search(
        &self,
        query_embedding: &[f32],
        pool_size: i64,
    ) -> Result<Vec<VectorHit>>;

    /// Delete every row (and its lexical/vector entries) in this collection.
    async fn clear(&self) -> Result<()>;

    /// Delete every chunk whose `source_url` matches, in this collection.
    async fn delete_by_source(&self, source_url: &str) -> Result<()>;

    async fn get_by_source(&self, source_url: &str) -> Result<Vec<StoredDocument>>;

    async fn get_all_documents(&self) -> Result<Vec<StoredDocument>>;

    /// Number of distinct chunk IDs stored in this collection.
    async fn collection_count(&self) -> Result<i64>;
}
