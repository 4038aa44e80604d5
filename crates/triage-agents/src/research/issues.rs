//! Issue-tracker research source (GitHub search API).
//!
//! Searches the configured repositories for issues matching the report's
//! error text and converts hits into findings. Relevance is rank-based:
//! the API sorts by relevance, so position i maps to 1.0 − 0.1·i. The
//! source's confidence signal is the top hit's relevance.

use async_trait::async_trait;
use serde::Deserialize;

use crate::aggregator::SOURCE_ISSUE_TRACKER;
use crate::config::IssueTrackerConfig;
use crate::research::{ResearchQuery, ResearchSource};
use crate::state::{Finding, SourceReport};

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("triage-agents/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 10;
const MAX_FINDINGS: usize = 5;
const EXCERPT_LEN: usize = 300;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<IssueItem>,
}

#[derive(Debug, Deserialize)]
struct IssueItem {
    number: u64,
    title: String,
    html_url: String,
    state: String,
    body: Option<String>,
}

pub struct IssueTrackerSource {
    client: reqwest::Client,
    token: String,
    repos: Vec<String>,
}

impl IssueTrackerSource {
    pub fn new(config: &IssueTrackerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            token: config.token.clone(),
            repos: config.repos.clone(),
        })
    }

    async fn search_repo(&self, repo: &str, terms: &str) -> anyhow::Result<Vec<IssueItem>> {
        let query = format!("{terms} repo:{repo} is:issue");

        let mut request = self
            .client
            .get(format!("{API_BASE}/search/issues"))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .query(&[
                ("q", query.as_str()),
                ("per_page", "5"),
                ("sort", "relevance"),
            ]);
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }

        let response = request.send().await?.error_for_status()?;
        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.items)
    }
}

#[async_trait]
impl ResearchSource for IssueTrackerSource {
    fn name(&self) -> &'static str {
        SOURCE_ISSUE_TRACKER
    }

    async fn search(&self, query: &ResearchQuery) -> anyhow::Result<SourceReport> {
        let terms = search_terms(query);
        let mut items = Vec::new();
        let mut last_error = None;

        for repo in &self.repos {
            match self.search_repo(repo, &terms).await {
                Ok(found) => {
                    tracing::debug!(repo = %repo, hits = found.len(), "issue search");
                    items.extend(found);
                }
                Err(e) => {
                    tracing::warn!(repo = %repo, error = %e, "issue search failed");
                    last_error = Some(e);
                }
            }
            if items.len() >= MAX_FINDINGS {
                break;
            }
        }

        // Every repo failed: the branch is unavailable, not empty-handed.
        if items.is_empty() {
            if let Some(e) = last_error {
                return Err(e.context("issue tracker unavailable"));
            }
        }

        Ok(report_from_items(items))
    }
}

/// Search text plus the first library hint, which sharpens relevance when
/// the error text alone is generic.
fn search_terms(query: &ResearchQuery) -> String {
    let mut terms = query.text.clone();
    if let Some(hint) = query.crate_hints.first() {
        if !terms.contains(hint.as_str()) {
            terms.push(' ');
            terms.push_str(hint);
        }
    }
    terms
}

/// Convert raw API items into a ranked source report.
fn report_from_items(items: Vec<IssueItem>) -> SourceReport {
    let findings: Vec<Finding> = items
        .into_iter()
        .take(MAX_FINDINGS)
        .enumerate()
        .map(|(i, item)| Finding {
            title: format!("#{}: {}", item.number, item.title),
            link: item.html_url,
            excerpt: excerpt(item.body.as_deref().unwrap_or_default()),
            relevance: 1.0 - (i as f64) * 0.1,
            resolved: item.state == "closed",
        })
        .collect();

    let signal = findings.first().map(|f| f.relevance).unwrap_or(0.0);
    SourceReport { findings, signal }
}

/// First `EXCERPT_LEN` bytes on a char boundary, newlines flattened.
fn excerpt(body: &str) -> String {
    let flat = body.replace('\n', " ");
    let mut end = flat.len().min(EXCERPT_LEN);
    while end > 0 && !flat.is_char_boundary(end) {
        end -= 1;
    }
    flat[..end].trim().to_string()
}
