//! Cross-encoder reranker client: a second-pass (query, content) scorer over
//! a candidate pool. Pluggable by design — the searcher holds an
//! `Option<Arc<dyn Reranker>>` and falls back to RRF scores on any failure.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::RerankConfig;

#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub id: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct RerankedResult {
    pub id: String,
    pub score: f64,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score every candidate against `query` and return them sorted
    /// descending by cross-encoder score.
    async fn rerank(&self, query: &str, candidates: &[RerankCandidate]) -> Result<Vec<RerankedResult>>;
}

pub struct HttpReranker {
    http: reqwest::Client,
    url: String,
    model: String,
}

impl HttpReranker {
    pub fn new(config: &RerankConfig) -> Result<Option<Self>> {
        let Some(model) = config.model.clone() else {
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build rerank HTTP client")?;
        Ok(Some(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            model,
        }))
    }
}

#[derive(Deserialize)]
struct RerankResponseRow {
    index: usize,
    score: f64,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResponseRow>,
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, candidates: &[RerankCandidate]) -> Result<Vec<RerankedResult>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Cross-encoder max input is 512 tokens; truncate the document side
        // and leave the query intact, since the query is almost always the
        // shorter of the pair.
        const MAX_CONTENT_CHARS: usize = 2000;
        let documents: Vec<&str> = candidates
            .iter()
            .map(|c| {
                if c.content.len() > MAX_CONTENT_CHARS {
                    &c.content[..MAX_CONTENT_CHARS]
                } else {
                    c.content.as_str()
                }
            })
            .collect();

        let endpoint = format!("{}/api/rerank", self.url);
        let response = self
            .http
            .post(&endpoint)
            .json(&serde_json::json!({
                "model": self.model,
                "query": query,
                "documents": documents,
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("rerank request failed")?;

        let parsed: RerankResponse = response
            .json()
            .await
            .context("failed to parse rerank response")?;

        let mut results: Vec<RerankedResult> = parsed
            .results
            .into_iter()
            .filter_map(|row| {
                candidates.get(row.index).map(|c| RerankedResult {
                    id: c.id.clone(),
                    score: row.score,
                })
            })
            .collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(results)
    }
}
