//! Query expansion: turn one query into a short list of paraphrases using a
//! small generative model, for multi-query fusion in [`crate::search`].
//! Expansion failure must never fail a search — any error here degrades to
//! `[original]`.

use std::sync::Arc;

use crate::generation::{GenerationClient, GenerationParams};

const PROMPT_TEMPLATE: &str = "Rewrite the following search query as {n} alternative \
phrasings that preserve its meaning. Reply with exactly one phrasing per line, no \
numbering, no extra commentary.\n\nQuery: {query}";

const META_PREFIXES: &[&str] = &["here", "alternative", "variation", "query"];

pub struct Expander {
    generator: Arc<dyn GenerationClient>,
    num_variations: usize,
}

impl Expander {
    pub fn new(generator: Arc<dyn GenerationClient>, num_variations: usize) -> Self {
        Self {
            generator,
            num_variations,
        }
    }

    /// `expand(q)[0] == q` always holds, even on total failure.
    pub async fn expand(&self, query: &str) -> Vec<String> {
        let prompt = PROMPT_TEMPLATE
            .replace("{n}", &self.num_variations.to_string())
            .replace("{query}", query);

        let response = match self
            .generator
            .generate(&prompt, GenerationParams::default())
            .await
        {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "query expansion failed, using original query only");
                return vec![query.to_string()];
            }
        };

        let mut variants = parse_variants(&response, query, self.num_variations);
        let mut result = vec![query.to_string()];
        result.append(&mut variants);
        result
    }
}

fn parse_variants(response: &str, original: &str, num_variations: usize) -> Vec<String> {
    let original_lower = original.trim().to_lowercase();
    let mut seen = std::collections::HashSet::new();
    let mut variants = Vec::new();

    for line in response.lines() {
        let cleaned = strip_line_decoration(line);
        if cleaned.is_empty() {
            continue;
        }
        let lower = cleaned.to_lowercase();
        if lower == original_lower {
            continue;
        }
        if META_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
            continue;
        }
        if !seen.insert(lower) {
            continue;
        }
        variants.push(cleaned);
        if variants.len() >= num_variations {
            break;
        }
    }

    variants
}

fn strip_line_decoration(line: &str) -> String {
    let mut text = line.trim();

    if let Some(rest) = text.strip_prefix(|c: char| c.is_ascii_digit()) {
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            text = rest.trim_start();
        }
    }

    text = text.trim_start_matches(['-', '*', '•']).trim_start();
    text = text.trim_matches('"').trim_matches('\'').trim();
    text.to_string()
}
