//! Knowledge-base research source.
//!
//! Similarity search over a local JSONL snapshot of known error patterns
//! and their fixes. The knowledge base's own indexing is a black box to the
//! engine — this client only implements the call/response contract: query
//! text in, scored findings out. Scoring here is normalized token overlap,
//! which is cheap, deterministic, and good enough to rank a curated
//! snapshot. The source's confidence signal is the mean similarity of the
//! top three hits.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;

use crate::aggregator::SOURCE_KNOWLEDGE_BASE;
use crate::research::{ResearchQuery, ResearchSource};
use crate::state::{Finding, SourceReport};

const MAX_FINDINGS: usize = 5;
const SIGNAL_TOP_K: usize = 3;
/// Hits below this similarity are noise, not evidence.
const SIMILARITY_FLOOR: f64 = 0.1;
const EXCERPT_LEN: usize = 200;

/// One knowledge-base record: a known error and its fix.
#[derive(Debug, Clone, Deserialize)]
struct KbRecord {
    error_pattern: String,
    solution: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    resolved: bool,
}

pub struct KnowledgeBaseSource {
    path: PathBuf,
}

impl KnowledgeBaseSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ResearchSource for KnowledgeBaseSource {
    fn name(&self) -> &'static str {
        SOURCE_KNOWLEDGE_BASE
    }

    async fn search(&self, query: &ResearchQuery) -> anyhow::Result<SourceReport> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("knowledge base unavailable: {}", self.path.display()))?;

        let records: Vec<KbRecord> = raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed knowledge-base line");
                    None
                }
            })
            .collect();

        let query_tokens = tokenize(&query.text);
        let mut scored: Vec<(f64, KbRecord)> = records
            .into_iter()
            .map(|record| (similarity(&query_tokens, &tokenize(&record.error_pattern)), record))
            .filter(|(score, _)| *score >= SIMILARITY_FLOOR)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(MAX_FINDINGS);

        let top = scored.len().min(SIGNAL_TOP_K);
        let signal = if top == 0 {
            0.0
        } else {
            scored.iter().take(top).map(|(score, _)| score).sum::<f64>() / top as f64
        };

        let findings = scored
            .into_iter()
            .map(|(score, record)| Finding {
                title: excerpt(&record.error_pattern, 80),
                link: record.link,
                excerpt: excerpt(&record.solution, EXCERPT_LEN),
                relevance: score,
                resolved: record.resolved,
            })
            .collect();

        Ok(SourceReport { findings, signal })
    }
}

/// Lowercased alphanumeric tokens of length ≥ 2.
fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() >= 2)
        .map(String::from)
        .collect()
}

/// Jaccard similarity between two token sets.
fn similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

fn excerpt(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    let mut end = flat.len().min(max);
    while end > 0 && !flat.is_char_boundary(end) {
        end -= 1;
    }
    flat[..end].trim().to_string()
}
