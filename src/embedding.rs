//! Embedding client: wraps an Ollama-compatible `/api/embed` endpoint and
//! the little-endian f32 blob format used to persist vectors in SQLite.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::EmbeddingConfig;

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a batch of documents for storage.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string for search.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed(std::slice::from_ref(&text.to_string())).await?;
        batch
            .pop()
            .context("embedding provider returned no vectors for a single-text batch")
    }
}

pub struct OllamaEmbeddingClient {
    http: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build embedding HTTP client")?;
        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let endpoint = format!("{}/api/embed", self.url);
        let mut attempt = 0;
        loop {
            let result = self
                .http
                .post(&endpoint)
                .json(&serde_json::json!({ "model": self.model, "input": texts }))
                .send()
                .await
                .and_then(|r| r.error_for_status());

            match result {
                Ok(response) => {
                    let parsed: EmbedResponse = response
                        .json()
                        .await
                        .context("failed to parse embedding response")?;
                    anyhow::ensure!(
                        parsed.embeddings.len() == texts.len(),
                        "embedding provider returned {} vectors for {} inputs",
                        parsed.embeddings.len(),
                        texts.len()
                    );
                    for vector in &parsed.embeddings {
                        anyhow::ensure!(
                            vector.len() == self.dims,
                            "embedding provider returned dim {} but config expects {}",
                            vector.len(),
                            self.dims
                        );
                    }
                    return Ok(parsed.embeddings);
                }
                Err(err) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %err,
                        "embedding request failed, retrying"
                    );
                }
                Err(err) => {
                    return Err(err).context("embedding request failed after all retries");
                }
            }
        }
    }
}

/// Serialize a vector as little-endian f32 bytes, the on-disk format for
/// both the `documents.embedding` and `documents_vec.embedding` columns.
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Inverse of [`vec_to_blob`]. Ignores a trailing partial element, which
/// should never occur for well-formed blobs.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Euclidean distance between two vectors, the ranking metric for the
/// vector index. Callers must validate that both vectors have the
/// collection's declared dimension before calling this — a mismatch is a
/// configuration error that must fail loudly at the store boundary, not
/// silently degrade a ranking score.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "l2_distance called with mismatched vector lengths");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x - *y) as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}
