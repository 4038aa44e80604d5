//! Configuration for the triage engine.
//!
//! Everything the engine needs — endpoint, research-source settings,
//! weights, routing policy — lives in one immutable `TriageConfig` built
//! before any ticket is touched. Defaults come from environment variables;
//! an optional TOML file overrides them. Invariant checks (weight sum,
//! policy ranges) run at load time and are fatal.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::aggregator::SourceWeights;
use crate::error::TriageError;

/// OpenAI-compatible reasoning endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReasoningEndpoint {
    pub url: String,
    pub model: String,
    pub api_key: String,
}

/// Issue-tracker research source configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueTrackerConfig {
    /// Optional API token; anonymous search works with tighter rate limits.
    pub token: String,
    /// Repositories searched for related issues, `owner/repo` form.
    pub repos: Vec<String>,
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    pub reasoning: ReasoningEndpoint,
    pub issue_tracker: IssueTrackerConfig,
    /// JSONL snapshot backing the knowledge-base source.
    pub kb_path: PathBuf,
    /// Directory holding `ticket_<id>.md` records.
    pub tickets_dir: PathBuf,
    pub weights: SourceWeights,
    /// Overall confidence at or above this routes to resolution.
    pub confidence_threshold: f64,
    /// Information-gathering rounds before resolution is forced.
    pub max_info_rounds: u32,
    /// Findings shown per source in rendered reports.
    pub findings_display_cap: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            reasoning: ReasoningEndpoint {
                url: std::env::var("TRIAGE_REASONING_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/v1".into()),
                model: std::env::var("TRIAGE_REASONING_MODEL")
                    .unwrap_or_else(|_| "qwen2.5-14b-instruct".into()),
                api_key: std::env::var("TRIAGE_REASONING_API_KEY")
                    .unwrap_or_else(|_| "not-needed".into()),
            },
            issue_tracker: IssueTrackerConfig {
                token: std::env::var("TRIAGE_GITHUB_TOKEN").unwrap_or_default(),
                repos: std::env::var("TRIAGE_GITHUB_REPOS")
                    .map(|v| {
                        v.split(',')
                            .map(|r| r.trim().to_string())
                            .filter(|r| !r.is_empty())
                            .collect()
                    })
                    .unwrap_or_else(|_| vec!["rust-lang/cargo".into()]),
            },
            kb_path: std::env::var("TRIAGE_KB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/known_errors.jsonl")),
            tickets_dir: std::env::var("TRIAGE_TICKETS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("incoming_tickets")),
            weights: SourceWeights::standard(),
            confidence_threshold: 0.70,
            max_info_rounds: 2,
            findings_display_cap: 3,
        }
    }
}

/// Optional on-disk overrides; every field may be omitted.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    reasoning: Option<ReasoningEndpoint>,
    issue_tracker: Option<IssueTrackerConfig>,
    kb_path: Option<PathBuf>,
    tickets_dir: Option<PathBuf>,
    /// Source name → weight; validated to sum to 1.0.
    weights: Option<BTreeMap<String, f64>>,
    confidence_threshold: Option<f64>,
    max_info_rounds: Option<u32>,
    findings_display_cap: Option<usize>,
}

impl TriageConfig {
    /// Build from env defaults, overlay an optional TOML file, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, TriageError> {
        let mut config = Self::default();

        if let Some(path) = path {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                TriageError::Config(format!("reading {}: {e}", path.display()))
            })?;
            let file: FileConfig = toml::from_str(&raw).map_err(|e| {
                TriageError::Config(format!("parsing {}: {e}", path.display()))
            })?;

            if let Some(reasoning) = file.reasoning {
                config.reasoning = reasoning;
            }
            if let Some(issue_tracker) = file.issue_tracker {
                config.issue_tracker = issue_tracker;
            }
            if let Some(kb_path) = file.kb_path {
                config.kb_path = kb_path;
            }
            if let Some(tickets_dir) = file.tickets_dir {
                config.tickets_dir = tickets_dir;
            }
            if let Some(weights) = file.weights {
                config.weights = SourceWeights::new(weights)?;
            }
            if let Some(threshold) = file.confidence_threshold {
                config.confidence_threshold = threshold;
            }
            if let Some(rounds) = file.max_info_rounds {
                config.max_info_rounds = rounds;
            }
            if let Some(cap) = file.findings_display_cap {
                config.findings_display_cap = cap;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Startup invariants beyond the weight-sum check (which runs when the
    /// weight set is constructed).
    pub fn validate(&self) -> Result<(), TriageError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(TriageError::Config(format!(
                "confidence_threshold {} is outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if self.max_info_rounds == 0 {
            return Err(TriageError::Config(
                "max_info_rounds must be at least 1".into(),
            ));
        }
        if self.reasoning.url.is_empty() || self.reasoning.model.is_empty() {
            return Err(TriageError::Config(
                "reasoning endpoint url and model must be set".into(),
            ));
        }
        Ok(())
    }
}
