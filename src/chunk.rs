//! Markdown-aware chunker.
//!
//! Splits a markdown document into semantically coherent chunks along `##`/`###`
//! section boundaries, further splitting oversized sections on paragraph
//! boundaries while keeping fenced code blocks indivisible.

use crate::models::{Chunk, ChunkMetadata};

/// Target maximum chunk size in characters. Sections at or under this size
/// are emitted whole; larger sections are split on paragraph boundaries.
const TARGET_MAX_CHARS: usize = 2000;

/// Parse one markdown document into an ordered list of chunks.
///
/// `raw` is the full file content, including an optional leading
/// `<!-- Source: URL -->` comment. Returns an empty vector for an empty or
/// whitespace-only document.
pub fn chunk_document(raw: &str) -> Vec<Chunk> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    let source_url = extract_source_url(raw).unwrap_or_default();
    let page_title = extract_page_title(raw);
    let sections = split_sections(raw);

    let mut chunks = Vec::new();
    for section in sections {
        let body = section.body.trim();
        if body.is_empty() {
            continue;
        }

        if body.len() <= TARGET_MAX_CHARS {
            chunks.push(build_chunk(
                body.to_string(),
                &source_url,
                &page_title,
                section.title.clone(),
                &section.hierarchy,
            ));
            continue;
        }

        let parts = split_on_paragraphs(body, TARGET_MAX_CHARS);
        let n = parts.len();
        for (i, part) in parts.into_iter().enumerate() {
            let label = match &section.title {
                Some(title) => format!("{} (part {}/{})", title, i + 1, n),
                None => format!("Part {}/{}", i + 1, n),
            };
            chunks.push(build_chunk(
                part,
                &source_url,
                &page_title,
                Some(label),
                &section.hierarchy,
            ));
        }
    }

    chunks
}

fn build_chunk(
    content: String,
    source_url: &str,
    page_title: &Option<String>,
    section: Option<String>,
    hierarchy: &[String],
) -> Chunk {
    let has_code = contains_code(&content);
    Chunk {
        content,
        metadata: ChunkMetadata {
            source_url: source_url.to_string(),
            page_title: page_title.clone(),
            section,
            hierarchy: hierarchy.to_vec(),
            has_code,
        },
    }
}

fn extract_source_url(raw: &str) -> Option<String> {
    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("<!-- Source:") {
            return rest.trim().strip_suffix("-->").map(|s| s.trim().to_string());
        }
    }
    None
}

fn extract_page_title(raw: &str) -> Option<String> {
    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("# ") {
            return Some(rest.trim().to_string());
        }
    }
    None
}

/// Classify a line as a heading, returning `(level, title)` if it is one.
/// Headings are recognized at any level 1-6, but only levels 2-3 create
/// section boundaries. The heading line itself stays part of the section
/// body it opens (or, for H1/H4-H6, the body it falls within).
fn heading(line: &str) -> Option<(usize, &str)> {
    let trimmed_start = line.trim_start();
    if trimmed_start != line {
        // Headings must sit at column 0.
        return None;
    }
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') && !rest.is_empty() {
        return None;
    }
    Some((hashes, rest.trim()))
}

struct Section {
    title: Option<String>,
    hierarchy: Vec<String>,
    body: String,
}

/// Split the (source-comment-stripped) document into sections at `##`/`###`
/// boundaries. Each section's body includes the heading line that opens it
/// (the intro section's body includes the H1, if present).
fn split_sections(raw: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();

    let mut current_title: Option<String> = None;
    let mut current_hierarchy: Vec<String> = Vec::new();
    let mut current_body = String::new();

    for line in raw.lines() {
        if line.trim().starts_with("<!-- Source:") {
            continue;
        }
        match heading(line) {
            Some((level, title)) if level == 2 || level == 3 => {
                sections.push(Section {
                    title: current_title.take(),
                    hierarchy: current_hierarchy.clone(),
                    body: std::mem::take(&mut current_body),
                });

                while stack.last().is_some_and(|(l, _)| *l >= level) {
                    stack.pop();
                }
                stack.push((level, title.to_string()));
                current_hierarchy = stack.iter().map(|(_, t)| t.clone()).collect();
                current_title = Some(title.to_string());

                current_body.push_str(line);
                current_body.push('\n');
            }
            Some(_) => {
                // H1 or H4-H6: does not break the current section, but the
                // heading line stays part of its body.
                current_body.push_str(line);
                current_body.push('\n');
            }
            None => {
                current_body.push_str(line);
                current_body.push('\n');
            }
        }
    }

    sections.push(Section {
        title: current_title,
        hierarchy: current_hierarchy,
        body: current_body,
    });

    sections
}

/// Identify byte ranges of fenced code blocks (```...```) so paragraph
/// splitting never breaks inside one.
fn code_block_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut open: Option<usize> = None;
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches('\n').trim_start();
        if trimmed.starts_with("```") {
            match open {
                None => open = Some(offset),
                Some(start) => {
                    ranges.push((start, offset + line.len()));
                    open = None;
                }
            }
        }
        offset += line.len();
    }
    if let Some(start) = open {
        ranges.push((start, text.len()));
    }
    ranges
}

/// Split `text` into ordered paragraph units on `\n\n+` boundaries, treating
/// each fenced code block as a single indivisible paragraph.
fn extract_paragraphs(text: &str) -> Vec<String> {
    let code_ranges = code_block_ranges(text);
    let mut paragraphs = Vec::new();
    let mut cursor = 0usize;

    for (start, end) in &code_ranges {
        if *start > cursor {
            paragraphs.extend(split_plain_paragraphs(&text[cursor..*start]));
        }
        paragraphs.push(text[*start..*end].to_string());
        cursor = *end;
    }
    if cursor < text.len() {
        paragraphs.extend(split_plain_paragraphs(&text[cursor..]));
    }

    paragraphs.retain(|p| !p.trim().is_empty());
    paragraphs
}

fn split_plain_paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut blank_run = 0usize;

    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if blank_run > 0 && !buf.is_empty() {
            out.push(buf.trim().to_string());
            buf.clear();
        }
        blank_run = 0;
        buf.push_str(line);
        buf.push('\n');
    }
    if !buf.trim().is_empty() {
        out.push(buf.trim().to_string());
    }
    out
}

/// Greedily pack paragraphs into chunks not exceeding `max_chars`, never
/// splitting an individual paragraph (oversize paragraphs are emitted whole).
fn split_on_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let paragraphs = extract_paragraphs(text);
    let mut parts = Vec::new();
    let mut current = String::new();

    for p in paragraphs {
        if !current.is_empty() && current.len() + 2 + p.len() > max_chars {
            parts.push(current.clone());
            current.clear();
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(&p);
    }
    if !current.is_empty() {
        parts.push(current);
    }

    if parts.is_empty() {
        parts.push(text.to_string());
    }
    parts
}

fn contains_code(content: &str) -> bool {
    if content.contains("```") {
        return true;
    }
    let mut consecutive_indented = 0;
    for line in content.lines() {
        if line.starts_with("    ") || line.starts_with('\t') {
            consecutive_indented += 1;
            if consecutive_indented >= 2 {
                return true;
            }
        } else if !line.trim().is_empty() {
            consecutive_indented = 0;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_no_chunks() {
        assert!(chunk_document("").is_empty());
        assert!(chunk_document("   \n\n  ").is_empty());
    }

    #[test]
    fn no_headings_yields_single_chunk() {
        let doc = "<!-- Source: https://x/y -->\nJust some plain prose.\n\nMore prose.";
        let chunks = chunk_document(doc);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].metadata.hierarchy.is_empty());
        assert!(chunks[0].metadata.section.is_none());
        assert_eq!(chunks[0].metadata.source_url, "https://x/y");
        assert!(!chunks[0].content.contains("<!-- Source"));
    }

    #[test]
    fn source_comment_is_stripped_and_title_extracted() {
        let doc = "<!-- Source: https://example.com/doc -->\n# My Page\n\nIntro text.\n\n## Setup\n\nSetup body.\n";
        let chunks = chunk_document(doc);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.page_title.as_deref(), Some("My Page"));
        assert_eq!(chunks[0].metadata.section, None);
        assert_eq!(chunks[0].content, "# My Page\n\nIntro text.");
        assert_eq!(chunks[1].metadata.section.as_deref(), Some("Setup"));
        assert_eq!(chunks[1].metadata.hierarchy, vec!["Setup".to_string()]);
        assert_eq!(chunks[1].content, "## Setup\n\nSetup body.");
    }

    #[test]
    fn h3_inherits_h2_hierarchy() {
        let doc = "# Title\n\n## Guide\n\nguide body\n\n### Install\n\ninstall body\n";
        let chunks = chunk_document(doc);
        let install = chunks.iter().find(|c| c.content.contains("install body")).unwrap();
        assert_eq!(install.metadata.hierarchy, vec!["Guide".to_string(), "Install".to_string()]);
        assert_eq!(install.metadata.section.as_deref(), Some("Install"));
    }

    #[test]
    fn sibling_h2_resets_hierarchy() {
        let doc = "## A\n\nbody a\n\n### A1\n\nbody a1\n\n## B\n\nbody b\n";
        let chunks = chunk_document(doc);
        let b = chunks.iter().find(|c| c.content.contains("body b")).unwrap();
        assert_eq!(b.metadata.hierarchy, vec!["B".to_string()]);
    }

    #[test]
    fn oversize_section_without_paragraph_breaks_is_not_split() {
        let big = "x".repeat(5000);
        let doc = format!("## Section\n\n{}\n", big);
        let chunks = chunk_document(&doc);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.len() >= 2000);
    }

    #[test]
    fn oversize_section_splits_on_paragraphs_with_part_labels() {
        let para = "y".repeat(900);
        let doc = format!("## Big\n\n{}\n\n{}\n\n{}\n", para, para, para);
        let chunks = chunk_document(&doc);
        assert!(chunks.len() >= 2);
        for (i, c) in chunks.iter().enumerate() {
            assert!(c.content.len() <= 2000 || c.content.len() == para.len());
            assert_eq!(
                c.metadata.section.as_deref(),
                Some(format!("Big (part {}/{})", i + 1, chunks.len()).as_str())
            );
        }
    }

    #[test]
    fn fenced_code_block_is_never_split_and_sets_has_code() {
        let code = "```rust\nfn main() {}\n```";
        let doc = format!("## Code\n\n{}\n", code);
        let chunks = chunk_document(&doc);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("```rust"));
        assert!(chunks[0].metadata.has_code);
    }

    #[test]
    fn indented_code_sets_has_code() {
        let doc = "## Code\n\n    line one\n    line two\n";
        let chunks = chunk_document(doc);
        assert!(chunks[0].metadata.has_code);
    }

    #[test]
    fn chunk_coverage_preserves_every_paragraph() {
        let doc = "# Title\n\nintro para one\n\nintro para two\n\n## Sec\n\nsec para one\n\nsec para two\n";
        let chunks = chunk_document(doc);
        let joined = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        for para in [
            "intro para one",
            "intro para two",
            "sec para one",
            "sec para two",
        ] {
            assert!(joined.contains(para), "missing paragraph: {para}");
        }
    }

    #[test]
    fn id_is_stable_across_calls() {
        let doc = "## Sec\n\nbody text\n";
        let a = chunk_document(doc);
        let b = chunk_document(doc);
        assert_eq!(a[0].id(), b[0].id());
    }
}
