//! SQLite-backed implementation of [`Store`]: one `documents` table plus an
//! FTS5 lexical index and a flat BLOB vector index, all three keyed by the
//! same SQLite rowid so that any CRUD operation can keep them in lockstep
//! inside a single transaction.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashSet;
use std::str::FromStr;

use super::{KeywordHit, Store, StoredDocument, VectorHit};
use crate::config::Config;
use crate::embedding::{blob_to_vec, l2_distance, vec_to_blob};
use crate::models::Chunk;

pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
    dims: usize,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `config.db.path` and bind
    /// this store to `collection`. Runs [`init`] if the schema is not yet
    /// present. `config.embedding.dims` becomes this store's declared
    /// dimension D; every embedding written or queried against it must
    /// match, per the data model's dimension invariant.
    pub async fn open(config: &Config, collection: impl Into<String>) -> Result<Self> {
        let pool = connect(config).await?;
        init(&pool).await?;
        Ok(Self {
            pool,
            collection: collection.into(),
            dims: config.embedding.dims,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Enumerate every collection with at least one stored chunk.
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT collection FROM documents ORDER BY collection")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("collection")).collect())
    }

    /// Count distinct chunk IDs in an arbitrary collection (not necessarily
    /// the one this store is bound to).
    pub async fn collection_count_of(&self, collection: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = ?")
                .bind(collection)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    // SQLite serializes writers regardless of pool size; a small pool lets
    // reads proceed concurrently while writes still take their own
    // connection and run inside an exclusive transaction.
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Idempotent schema creation: safe to call on every startup.
pub async fn init(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            rowid INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            collection TEXT NOT NULL,
            content TEXT NOT NULL,
            source_url TEXT NOT NULL,
            page_title TEXT,
            section TEXT,
            metadata_json TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_source_url ON documents(source_url)")
        .execute(pool)
        .await?;

    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_fts'",
    )
    .fetch_one(pool)
    .await?;
    if !fts_exists {
        sqlx::query("CREATE VIRTUAL TABLE documents_fts USING fts5(content, section)")
            .execute(pool)
            .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents_vec (
            rowid INTEGER PRIMARY KEY,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn row_to_stored(row: &sqlx::sqlite::SqliteRow) -> StoredDocument {
    let metadata_json: String = row.get("metadata_json");
    StoredDocument {
        id: row.get("id"),
        collection: row.get("collection"),
        content: row.get("content"),
        source_url: row.get("source_url"),
        section: row.get("section"),
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({})),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        anyhow::ensure!(
            chunks.len() == embeddings.len(),
            "chunks and embeddings must have equal length ({} vs {})",
            chunks.len(),
            embeddings.len()
        );
        for embedding in embeddings {
            anyhow::ensure!(
                embedding.len() == self.dims,
                "embedding has {} dimensions, collection '{}' declares {}",
                embedding.len(),
                self.collection,
                self.dims
            );
        }

        let mut tx = self.pool.begin().await?;
        let mut seen = HashSet::new();

        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            let id = chunk.id();
            if !seen.insert(id.clone()) {
                continue;
            }

            let metadata = serde_json::json!({
                "source_url": chunk.metadata.source_url,
                "page_title": chunk.metadata.page_title,
                "section": chunk.metadata.section,
                "hierarchy": chunk.metadata.hierarchy_joined(),
                "has_code": chunk.metadata.has_code,
            });
            let metadata_json = serde_json::to_string(&metadata)?;
            let blob = vec_to_blob(embedding);

            let existing_rowid: Option<i64> =
                sqlx::query_scalar("SELECT rowid FROM documents WHERE id = ?")
                    .bind(&id)
                    .fetch_optional(&mut *tx)
                    .await?;

            let rowid = if let Some(rowid) = existing_rowid {
                sqlx::query(
                    r#"
                    UPDATE documents
                    SET content = ?, collection = ?, source_url = ?, page_title = ?, section = ?,
                        metadata_json = ?, embedding = ?
                    WHERE rowid = ?
                    "#,
                )
                .bind(&chunk.content)
                .bind(&self.collection)
                .bind(&chunk.metadata.source_url)
                .bind(&chunk.metadata.page_title)
                .bind(&chunk.metadata.section)
                .bind(&metadata_json)
                .bind(&blob)
                .bind(rowid)
                .execute(&mut *tx)
                .await?;

                sqlx::query("DELETE FROM documents_fts WHERE rowid = ?")
                    .bind(rowid)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM documents_vec WHERE rowid = ?")
                    .bind(rowid)
                    .execute(&mut *tx)
                    .await?;

                rowid
            } else {
                let result = sqlx::query(
                    r#"
                    INSERT INTO documents
                        (id, collection, content, source_url, page_title, section, metadata_json, embedding)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&id)
                .bind(&self.collection)
                .bind(&chunk.content)
                .bind(&chunk.metadata.source_url)
                .bind(&chunk.metadata.page_title)
                .bind(&chunk.metadata.section)
                .bind(&metadata_json)
                .bind(&blob)
                .execute(&mut *tx)
                .await?;

                result.last_insert_rowid()
            };

            sqlx::query("INSERT INTO documents_fts(rowid, content, section) VALUES (?, ?, ?)")
                .bind(rowid)
                .bind(&chunk.content)
                .bind(&chunk.metadata.section)
                .execute(&mut *tx)
                .await?;

            sqlx::query("INSERT INTO documents_vec(rowid, embedding) VALUES (?, ?)")
                .bind(rowid)
                .bind(&blob)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn keyword_search(&self, bm25_query: &str, pool_size: i64) -> Result<Vec<KeywordHit>> {
        if bm25_query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT d.id, d.content, d.source_url, d.page_title, d.section, documents_fts.rank AS rank
            FROM documents_fts
            JOIN documents d ON d.rowid = documents_fts.rowid
            WHERE documents_fts MATCH ? AND d.collection = ?
            ORDER BY documents_fts.rank
            LIMIT ?
            "#,
        )
        .bind(bm25_query)
        .bind(&self.collection)
        .bind(pool_size)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| KeywordHit {
                id: row.get("id"),
                content: row.get("content"),
                source_url: row.get("source_url"),
                page_title: row.get("page_title"),
                section: row.get("section"),
                bm25: row.get::<f64, _>("rank"),
            })
            .collect())
    }

    async fn vector_search(
        &self,
        query_embedding: &[f32],
        pool_size: i64,
    ) -> Result<Vec<VectorHit>> {
        anyhow::ensure!(
            query_embedding.len() == self.dims,
            "query embedding has {} dimensions, collection '{}' declares {}",
            query_embedding.len(),
            self.collection,
            self.dims
        );

        let rows = sqlx::query(
            r#"
            SELECT d.rowid AS rowid, d.id, d.content, d.source_url, d.page_title, d.section, v.embedding
            FROM documents_vec v
            JOIN documents d ON d.rowid = v.rowid
            WHERE d.collection = ?
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<(i64, VectorHit)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                let distance = l2_distance(query_embedding, &vector);
                (
                    row.get::<i64, _>("rowid"),
                    VectorHit {
                        id: row.get("id"),
                        content: row.get("content"),
                        source_url: row.get("source_url"),
                        page_title: row.get("page_title"),
                        section: row.get("section"),
                        distance,
                    },
                )
            })
            .collect();

        hits.sort_by(|a, b| {
            a.1.distance
                .partial_cmp(&b.1.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(pool_size.max(0) as usize);

        Ok(hits.into_iter().map(|(_, hit)| hit).collect())
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let rowids: Vec<i64> =
            sqlx::query_scalar("SELECT rowid FROM documents WHERE collection = ?")
                .bind(&self.collection)
                .fetch_all(&mut *tx)
                .await?;

        for rowid in rowids {
            sqlx::query("DELETE FROM documents_fts WHERE rowid = ?")
                .bind(rowid)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM documents_vec WHERE rowid = ?")
                .bind(rowid)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM documents WHERE collection = ?")
            .bind(&self.collection)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_source(&self, source_url: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let rowids: Vec<i64> = sqlx::query_scalar(
            "SELECT rowid FROM documents WHERE collection = ? AND source_url = ?",
        )
        .bind(&self.collection)
        .bind(source_url)
        .fetch_all(&mut *tx)
        .await?;

        for rowid in rowids {
            sqlx::query("DELETE FROM documents_fts WHERE rowid = ?")
                .bind(rowid)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM documents_vec WHERE rowid = ?")
                .bind(rowid)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM documents WHERE collection = ? AND source_url = ?")
            .bind(&self.collection)
            .bind(source_url)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_by_source(&self, source_url: &str) -> Result<Vec<StoredDocument>> {
        let rows = sqlx::query(
            "SELECT id, collection, content, source_url, section, metadata_json \
             FROM documents WHERE collection = ? AND source_url = ? ORDER BY rowid",
        )
        .bind(&self.collection)
        .bind(source_url)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_stored).collect())
    }

    async fn get_all_documents(&self) -> Result<Vec<StoredDocument>> {
        let rows = sqlx::query(
            "SELECT id, collection, content, source_url, section, metadata_json \
             FROM documents WHERE collection = ? ORDER BY rowid",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_stored).collect())
    }

    async fn collection_count(&self) -> Result<i64> {
        self.collection_count_of(&self.collection).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    async fn test_config() -> (Config, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            db: crate::config::DbConfig {
                path: dir.path().join("docs.db"),
            },
            embedding: crate::config::EmbeddingConfig {
                url: "http://localhost:11434".to_string(),
                model: "nomic-embed-text".to_string(),
                dims: 4,
                timeout_secs: 30,
                max_retries: 0,
                batch_size: 20,
            },
            generation: Default::default(),
            rerank: Default::default(),
            retrieval: Default::default(),
        };
        (cfg, dir)
    }

    fn chunk(source_url: &str, content: &str, section: Option<&str>) -> Chunk {
        Chunk {
            content: content.to_string(),
            metadata: ChunkMetadata {
                source_url: source_url.to_string(),
                page_title: Some("Title".to_string()),
                section: section.map(str::to_string),
                hierarchy: section.map(|s| vec![s.to_string()]).unwrap_or_default(),
                has_code: false,
            },
        }
    }

    #[tokio::test]
    async fn upsert_then_count() {
        let (cfg, _dir) = test_config().await;
        let store = SqliteStore::open(&cfg, "docs").await.unwrap();
        let c = chunk("https://x/a", "hello world", Some("Intro"));
        store.upsert(&[c], &[vec![0.1, 0.2, 0.3, 0.4]]).await.unwrap();
        assert_eq!(store.collection_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_same_id() {
        let (cfg, _dir) = test_config().await;
        let store = SqliteStore::open(&cfg, "docs").await.unwrap();
        let c = chunk("https://x/a", "hello world", Some("Intro"));
        store
            .upsert(&[c.clone()], &[vec![0.1, 0.2, 0.3, 0.4]])
            .await
            .unwrap();
        store.upsert(&[c], &[vec![0.9, 0.9, 0.9, 0.9]]).await.unwrap();
        assert_eq!(store.collection_count().await.unwrap(), 1);

        let docs = store.get_all_documents().await.unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[tokio::test]
    async fn collection_isolation() {
        let (cfg, _dir) = test_config().await;
        let a = SqliteStore::open(&cfg, "a").await.unwrap();
        let b = SqliteStore::open(&cfg, "b").await.unwrap();

        a.upsert(
            &[chunk("https://x/a", "content a", None)],
            &[vec![0.1, 0.2, 0.3, 0.4]],
        )
        .await
        .unwrap();

        assert_eq!(a.collection_count().await.unwrap(), 1);
        assert_eq!(b.collection_count().await.unwrap(), 0);

        a.clear().await.unwrap();
        assert_eq!(a.collection_count().await.unwrap(), 0);
        assert_eq!(b.collection_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_by_source_only_removes_matching_rows() {
        let (cfg, _dir) = test_config().await;
        let store = SqliteStore::open(&cfg, "docs").await.unwrap();
        store
            .upsert(
                &[
                    chunk("https://x/a", "content a", None),
                    chunk("https://x/b", "content b", None),
                ],
                &[vec![0.1, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]],
            )
            .await
            .unwrap();

        store.delete_by_source("https://x/a").await.unwrap();
        let remaining = store.get_all_documents().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].source_url, "https://x/b");
    }

    #[tokio::test]
    async fn vector_search_orders_by_l2_distance() {
        let (cfg, _dir) = test_config().await;
        let store = SqliteStore::open(&cfg, "docs").await.unwrap();
        store
            .upsert(
                &[
                    chunk("https://x/close", "near", None),
                    chunk("https://x/far", "far", None),
                ],
                &[vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 0.0, 0.0, 1.0]],
            )
            .await
            .unwrap();

        let hits = store
            .vector_search(&[0.9, 0.1, 0.0, 0.0], 10)
            .await
            .unwrap();
        assert_eq!(hits[0].source_url, "https://x/close");
    }

    #[tokio::test]
    async fn keyword_search_empty_query_returns_empty() {
        let (cfg, _dir) = test_config().await;
        let store = SqliteStore::open(&cfg, "docs").await.unwrap();
        let hits = store.keyword_search("", 10).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn tripartite_consistency_after_upsert_and_delete() {
        let (cfg, _dir) = test_config().await;
        let store = SqliteStore::open(&cfg, "docs").await.unwrap();
        store
            .upsert(
                &[chunk("https://x/a", "alpha content", None)],
                &[vec![1.0, 0.0, 0.0, 0.0]],
            )
            .await
            .unwrap();

        let doc_rowids: Vec<i64> = sqlx::query_scalar("SELECT rowid FROM documents")
            .fetch_all(store.pool())
            .await
            .unwrap();
        let fts_rowids: Vec<i64> = sqlx::query_scalar("SELECT rowid FROM documents_fts")
            .fetch_all(store.pool())
            .await
            .unwrap();
        let vec_rowids: Vec<i64> = sqlx::query_scalar("SELECT rowid FROM documents_vec")
            .fetch_all(store.pool())
            .await
            .unwrap();
        assert_eq!(doc_rowids, fts_rowids);
        assert_eq!(doc_rowids, vec_rowids);

        store.delete_by_source("https://x/a").await.unwrap();
        let fts_rowids: Vec<i64> = sqlx::query_scalar("SELECT rowid FROM documents_fts")
            .fetch_all(store.pool())
            .await
            .unwrap();
        let vec_rowids: Vec<i64> = sqlx::query_scalar("SELECT rowid FROM documents_vec")
            .fetch_all(store.pool())
            .await
            .unwrap();
        assert!(fts_rowids.is_empty());
        assert!(vec_rowids.is_empty());
    }

    #[tokio::test]
    async fn upsert_rejects_embedding_with_wrong_dims() {
        let (cfg, _dir) = test_config().await;
        let store = SqliteStore::open(&cfg, "docs").await.unwrap();
        let c = chunk("https://x/a", "hello world", None);
        let err = store.upsert(&[c], &[vec![0.1, 0.2]]).await.unwrap_err();
        assert!(err.to_string().contains("dimensions"));
    }

    #[tokio::test]
    async fn vector_search_rejects_query_with_wrong_dims() {
        let (cfg, _dir) = test_config().await;
        let store = SqliteStore::open(&cfg, "docs").await.unwrap();
        store
            .upsert(
                &[chunk("https://x/a", "hello world", None)],
                &[vec![0.1, 0.2, 0.3, 0.4]],
            )
            .await
            .unwrap();
        let err = store.vector_search(&[0.1, 0.2], 10).await.unwrap_err();
        assert!(err.to_string().contains("dimensions"));
    }
}
