//! Hybrid searcher: BM25 query construction, weighted Reciprocal Rank
//! Fusion, multi-query expansion fusion, and optional cross-encoder
//! reranking. The RRF constants below are pinned by the design and are
//! deliberately not part of [`crate::config::RetrievalConfig`].

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingClient;
use crate::expand::Expander;
use crate::models::SearchResult;
use crate::rerank::{RerankCandidate, Reranker};
use crate::store::Store;

const RRF_K: f64 = 60.0;
const W_SEM: f64 = 1.0;
const W_KW: f64 = 1.2;
const SECTION_BOOST: f64 = 2.0;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is",
    "it", "its", "of", "on", "or", "that", "the", "to", "was", "were", "will", "with", "how",
    "what", "when", "where", "which", "who", "why", "can", "do", "does", "should", "would",
];

fn is_stop_word(term: &str) -> bool {
    STOP_WORDS.contains(&term)
}

/// Split `text` into lowercase alphanumeric/hyphen tokens, dropping stop
/// words and empty fragments. Used both for BM25 term extraction and for
/// the section-match check.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|s| !s.is_empty())
        .filter(|s| !is_stop_word(s))
        .map(|s| s.to_string())
        .collect()
}

/// Build a BM25 MATCH query from free-text, per the phrase/prefix rules.
/// Returns `None` if nothing survives (pure stop words, or empty text).
fn build_bm25_query(query_text: &str) -> Option<String> {
    let mut parts = Vec::new();
    let mut remainder = String::new();

    let mut in_quote = false;
    let mut quote_start = 0;
    let mut plain_start = 0;
    let bytes = query_text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'"' {
            continue;
        }
        if !in_quote {
            remainder.push_str(&query_text[plain_start..i]);
            remainder.push(' ');
            quote_start = i + 1;
            in_quote = true;
        } else {
            let phrase_terms = tokenize(&query_text[quote_start..i]);
            if !phrase_terms.is_empty() {
                parts.push(format!("\"{}\"", phrase_terms.join(" ")));
            }
            plain_start = i + 1;
            in_quote = false;
        }
    }
    remainder.push_str(&query_text[plain_start..]);

    for term in tokenize(&remainder) {
        if term.len() >= 3 {
            parts.push(format!("{}*", term));
        } else if term.len() == 2 {
            parts.push(term);
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" OR "))
    }
}

fn clamp_pool(top_k: i64, min: i64, max: i64) -> i64 {
    top_k.saturating_mul(10).clamp(min, max)
}

#[derive(Debug, Clone, Default)]
struct Candidate {
    content: String,
    source_url: String,
    page_title: Option<String>,
    section: Option<String>,
    score: f64,
    keyword_rank: Option<i64>,
    semantic_rank: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    pub semantic_only: bool,
    pub no_expand: bool,
    pub no_rerank: bool,
}

pub struct Searcher {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingClient>,
    expander: Option<Expander>,
    reranker: Option<Arc<dyn Reranker>>,
    retrieval: RetrievalConfig,
}

impl Searcher {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingClient>,
        expander: Option<Expander>,
        reranker: Option<Arc<dyn Reranker>>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            expander,
            reranker,
            retrieval,
        }
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: i64,
        options: SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let queries = match (&self.expander, options.no_expand) {
            (Some(expander), false) => expander.expand(query).await,
            _ => vec![query.to_string()],
        };

        let mut candidates: HashMap<String, Candidate> = if queries.len() == 1 {
            let pool_size = if !options.no_rerank && self.reranker.is_some() {
                self.retrieval.rerank_pool_cap
            } else {
                clamp_pool(top_k, self.retrieval.pool_min, self.retrieval.pool_max)
            };
            self.score_single_query(&queries[0], pool_size, options.semantic_only)
                .await?
        } else {
            let pool_size = (top_k.saturating_mul(3)).max(20);
            let mut fused: HashMap<String, Candidate> = HashMap::new();
            for variant in &queries {
                let scored = self
                    .score_single_query(variant, pool_size, options.semantic_only)
                    .await?;
                for (id, candidate) in scored {
                    let entry = fused.entry(id).or_insert_with(|| Candidate {
                        content: candidate.content.clone(),
                        source_url: candidate.source_url.clone(),
                        page_title: candidate.page_title.clone(),
                        section: candidate.section.clone(),
                        score: 0.0,
                        keyword_rank: None,
                        semantic_rank: None,
                    });
                    entry.score += candidate.score;
                }
            }
            fused
        };

        let mut ranked: Vec<(String, Candidate)> = candidates.drain().collect();
        ranked.sort_by(|a, b| b.1.score.partial_cmp(&a.1.score).unwrap_or(std::cmp::Ordering::Equal));

        if !options.no_rerank {
            if let Some(reranker) = &self.reranker {
                let rerank_candidates: Vec<RerankCandidate> = ranked
                    .iter()
                    .map(|(id, c)| RerankCandidate {
                        id: id.clone(),
                        content: c.content.clone(),
                    })
                    .collect();
                match reranker.rerank(query, &rerank_candidates).await {
                    Ok(reranked) => {
                        let by_id: HashMap<String, Candidate> = ranked.into_iter().collect();
                        ranked = reranked
                            .into_iter()
                            .filter_map(|r| by_id.get(&r.id).cloned().map(|mut c| {
                                c.score = r.score;
                                (r.id, c)
                            }))
                            .collect();
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "reranker unavailable, falling back to RRF scores");
                    }
                }
            }
        }

        ranked.truncate(top_k.max(0) as usize);

        Ok(ranked
            .into_iter()
            .map(|(id, c)| SearchResult {
                id,
                score: c.score,
                content: c.content,
                source_url: c.source_url,
                page_title: c.page_title,
                section: c.section,
                keyword_rank: c.keyword_rank,
                semantic_rank: c.semantic_rank,
            })
            .collect())
    }

    async fn score_single_query(
        &self,
        query_text: &str,
        pool_size: i64,
        semantic_only: bool,
    ) -> Result<HashMap<String, Candidate>> {
        let mut candidates: HashMap<String, Candidate> = HashMap::new();

        let query_embedding = self.embedder.embed_query(query_text).await?;
        let semantic_hits = self.store.vector_search(&query_embedding, pool_size).await?;
        for (idx, hit) in semantic_hits.iter().enumerate() {
            let rank = (idx + 1) as i64;
            let entry = candidates.entry(hit.id.clone()).or_insert_with(|| Candidate {
                content: hit.content.clone(),
                source_url: hit.source_url.clone(),
                page_title: hit.page_title.clone(),
                section: hit.section.clone(),
                ..Default::default()
            });
            entry.semantic_rank = Some(rank);
            entry.score += W_SEM / (RRF_K + rank as f64);
        }

        if semantic_only || query_text.trim().is_empty() {
            return Ok(candidates);
        }

        let Some(bm25_query) = build_bm25_query(query_text) else {
            return Ok(candidates);
        };

        let query_terms: Vec<String> = tokenize(query_text);
        let keyword_hits = self.store.keyword_search(&bm25_query, pool_size).await?;
        for (idx, hit) in keyword_hits.iter().enumerate() {
            let rank = (idx + 1) as i64;
            let section_match = hit
                .section
                .as_deref()
                .map(|section| {
                    let section_lower = section.to_lowercase();
                    query_terms.iter().any(|term| section_lower.contains(term.as_str()))
                })
                .unwrap_or(false);
            let boost = if section_match { SECTION_BOOST } else { 1.0 };

            let entry = candidates.entry(hit.id.clone()).or_insert_with(|| Candidate {
                content: hit.content.clone(),
                source_url: hit.source_url.clone(),
                page_title: hit.page_title.clone(),
                section: hit.section.clone(),
                ..Default::default()
            });
            entry.keyword_rank = Some(rank);
            entry.score += (W_KW / (RRF_K + rank as f64)) * boost;
        }

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bm25_query_builds_prefix_terms() {
        let query = build_bm25_query("webhook signatures").unwrap();
        assert_eq!(query, "webhook* signatures*");
    }

    #[test]
    fn bm25_query_extracts_quoted_phrase() {
        let query = build_bm25_query("\"webhook signatures\" verification").unwrap();
        assert!(query.contains("\"webhook signatures\""));
        assert!(query.contains("verification*"));
    }

    #[test]
    fn bm25_query_drops_stop_words() {
        let query = build_bm25_query("how do I configure the server").unwrap();
        assert!(!query.contains("how"));
        assert!(query.contains("configure*"));
        assert!(query.contains("server*"));
    }

    #[test]
    fn bm25_query_all_stop_words_returns_none() {
        assert!(build_bm25_query("the a an").is_none());
    }

    #[test]
    fn bm25_query_two_char_term_is_exact_not_prefix() {
        let query = build_bm25_query("ok go").unwrap();
        assert!(query.contains("ok"));
        assert!(!query.contains("ok*"));
    }

    #[test]
    fn clamp_pool_respects_bounds() {
        assert_eq!(clamp_pool(1, 100, 200), 100);
        assert_eq!(clamp_pool(5, 100, 200), 100);
        assert_eq!(clamp_pool(100, 100, 200), 200);
    }
}
