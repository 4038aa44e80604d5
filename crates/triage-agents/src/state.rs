//! Core data model for the triage workflow.
//!
//! Two layers live here:
//! 1. The durable `Ticket` record (original report + append-only exchange
//!    log) — the only thing that survives between invocations.
//! 2. The per-run `WorkflowState` threaded through the engine — rebuilt
//!    from the ticket on every invocation, never persisted.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Timestamp format used in exchange-log entry headers.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Durable ticket record
// ---------------------------------------------------------------------------

/// Lifecycle state of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Freshly filed or still being worked.
    Open,
    /// A resolution plan was emitted — terminal.
    Resolved,
    /// The agent asked a clarifying question and suspended.
    AwaitingInfo,
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Resolved => write!(f, "Resolved"),
            Self::AwaitingInfo => write!(f, "AwaitingInfo"),
        }
    }
}

impl FromStr for TicketStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Open" => Ok(Self::Open),
            "Resolved" => Ok(Self::Resolved),
            "AwaitingInfo" => Ok(Self::AwaitingInfo),
            _ => Err(()),
        }
    }
}

/// Who authored an exchange entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Agent,
    User,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent => write!(f, "Agent"),
            Self::User => write!(f, "User"),
        }
    }
}

/// One turn in a ticket's conversation history.
///
/// Entries are append-only: never reordered, never deleted. Agent entries
/// may carry a structured `Diagnosis` payload alongside the rendered body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeEntry {
    pub speaker: Speaker,
    /// Rendered with [`TIMESTAMP_FORMAT`]; kept as text so records
    /// round-trip byte-for-byte.
    pub timestamp: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<Diagnosis>,
}

impl ExchangeEntry {
    /// New entry stamped with the current local time. Body is stored
    /// trimmed — the record format separates entries with blank lines.
    pub fn now(speaker: Speaker, body: impl Into<String>) -> Self {
        Self {
            speaker,
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            body: body.into().trim().to_string(),
            diagnosis: None,
        }
    }

    pub fn with_diagnosis(mut self, diagnosis: Diagnosis) -> Self {
        self.diagnosis = Some(diagnosis);
        self
    }
}

/// The durable record of one bug report plus its conversation history.
///
/// The report fields (title, description, reproduction, error_text) are
/// immutable after intake; only `status` and the exchange log change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub status: TicketStatus,
    pub title: String,
    pub description: String,
    pub reproduction: String,
    pub error_text: String,
    pub exchange_log: Vec<ExchangeEntry>,
}

impl Ticket {
    /// Create an open ticket. Report fields are stored trimmed so the
    /// markdown record round-trips exactly.
    pub fn new(
        id: impl Into<String>,
        title: &str,
        description: &str,
        reproduction: &str,
        error_text: &str,
    ) -> Self {
        Self {
            id: id.into(),
            status: TicketStatus::Open,
            title: title.trim().to_string(),
            description: description.trim().to_string(),
            reproduction: reproduction.trim().to_string(),
            error_text: error_text.trim().to_string(),
            exchange_log: Vec::new(),
        }
    }

    /// Append one entry to the exchange log.
    pub fn append(&mut self, entry: ExchangeEntry) {
        self.exchange_log.push(entry);
    }
}

// ---------------------------------------------------------------------------
// Per-run derived state
// ---------------------------------------------------------------------------

/// Structured view of a report, derived by the intake node.
///
/// All fields default to empty — malformed or sparse input never fails
/// intake, it just produces an emptier report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StructuredReport {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reproduction: String,
    #[serde(default)]
    pub error_text: String,
    /// Candidate library/component names mentioned by the report.
    #[serde(default)]
    pub crate_hints: Vec<String>,
}

impl StructuredReport {
    /// True when the report carries neither reproduction steps nor error
    /// output — the classic "please tell me more" case.
    pub fn is_sparse(&self) -> bool {
        self.reproduction.is_empty() && self.error_text.is_empty()
    }
}

/// Closed set of failure categories a report can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Api,
    Version,
    Dependency,
    Runtime,
    Configuration,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api => write!(f, "api"),
            Self::Version => write!(f, "version"),
            Self::Dependency => write!(f, "dependency"),
            Self::Runtime => write!(f, "runtime"),
            Self::Configuration => write!(f, "configuration"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Classifier verdict for a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: FailureKind,
    /// In [0, 1].
    pub confidence: f64,
    pub rationale: String,
}

/// One piece of evidence returned by a research source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub title: String,
    pub link: String,
    pub excerpt: String,
    /// Source-relevance score in [0, 1].
    pub relevance: f64,
    /// Whether the referenced item is already resolved/closed.
    pub resolved: bool,
}

/// What one research source returns for a query: its findings plus its
/// own normalized confidence signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub findings: Vec<Finding>,
    /// In [0, 1]; 0 when the source found nothing.
    pub signal: f64,
}

/// A candidate root-cause explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Hypothesis {
    pub cause: String,
    /// In [0, 1], as derived by the reasoning service.
    pub confidence: f64,
    /// References into the findings that support this hypothesis.
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Checks that would confirm or refute this hypothesis.
    #[serde(default)]
    pub validations: Vec<String>,
}

/// Per-source contribution to the overall confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceScore {
    /// In [0, 1]; 0 when the source was absent.
    pub score: f64,
    /// Fixed weight declared at configuration time.
    pub weight: f64,
}

/// Per-source weighted scores plus their combined overall score.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub sources: BTreeMap<String, SourceScore>,
    /// Weighted sum, clamped to [0, 1].
    pub overall: f64,
}

/// Ranked hypotheses with their confidence breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Ranked best-first.
    pub hypotheses: Vec<Hypothesis>,
    /// Index of the selected top hypothesis.
    pub selected: usize,
    pub breakdown: ConfidenceBreakdown,
}

impl Diagnosis {
    pub fn selected_hypothesis(&self) -> Option<&Hypothesis> {
        self.hypotheses.get(self.selected)
    }
}

/// One step of a resolution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Step {
    pub action: String,
    pub rationale: String,
    pub expected: String,
}

/// Ordered steps emitted when a ticket is routed to resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionPlan {
    pub steps: Vec<Step>,
}

/// The router's decision after diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Confidence cleared the threshold — emit a plan and finish.
    Resolve,
    /// Confidence too low — ask the reporter and suspend.
    GatherInfo,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve => write!(f, "resolve"),
            Self::GatherInfo => write!(f, "gather_info"),
        }
    }
}

/// Everything one engine invocation derives for a ticket.
///
/// Rebuilt fresh each run — the ticket and its exchange log are the only
/// cross-invocation memory.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    pub ticket: Ticket,
    pub report: StructuredReport,
    pub classification: Classification,
    /// Findings keyed by source name; each source owns its own key.
    pub findings: BTreeMap<String, Vec<Finding>>,
    /// Normalized signal per source that completed, even if empty-handed.
    pub source_signals: BTreeMap<String, f64>,
    /// Error text per source whose branch failed.
    pub source_errors: BTreeMap<String, String>,
    pub diagnosis: Diagnosis,
    pub resolution: Option<ResolutionPlan>,
    /// How many information-gathering rounds the ticket has consumed.
    pub iteration: u32,
    pub pending_question: Option<String>,
}
