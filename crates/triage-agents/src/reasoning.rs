//! The reasoning-service boundary.
//!
//! All nondeterministic language-model work goes through the narrow
//! [`ReasoningService`] trait — context in, structured result out — so the
//! engine can be tested against deterministic stubs. The live
//! implementation drives an OpenAI-compatible endpoint and parses every
//! response fail-closed: anything that does not match the declared contract
//! is a typed error for the calling node to degrade on, never a panic.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ReasoningEndpoint;
use crate::prompts;
use crate::state::{
    Classification, Diagnosis, ExchangeEntry, FailureKind, Finding, Hypothesis, Step,
    StructuredReport,
};

/// Failure modes at the reasoning boundary.
#[derive(Debug, Error)]
pub enum ReasoningError {
    /// Endpoint unreachable, timed out, or returned a transport-level error.
    #[error("reasoning endpoint unreachable: {0}")]
    Transport(String),
    /// The response did not contain JSON matching the expected contract.
    #[error("reasoning response failed schema validation: {0}")]
    Schema(String),
}

// ---------------------------------------------------------------------------
// Structured output contracts
// ---------------------------------------------------------------------------

/// Classifier contract: category, confidence, rationale, missing info.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClassifierOutput {
    pub label: FailureKind,
    /// In [0, 1].
    pub confidence: f64,
    pub rationale: String,
    /// Critical information the report is missing, if any.
    #[serde(default)]
    pub missing_info: Vec<String>,
}

impl From<ClassifierOutput> for Classification {
    fn from(out: ClassifierOutput) -> Self {
        Classification {
            label: out.label,
            confidence: out.confidence.clamp(0.0, 1.0),
            rationale: out.rationale,
        }
    }
}

/// Diagnoser contract: candidate hypotheses in the model's own order.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiagnosisOutput {
    pub hypotheses: Vec<Hypothesis>,
}

/// Resolution contract: ordered fix steps.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResolutionOutput {
    pub steps: Vec<Step>,
}

/// Everything the diagnoser hands to the reasoning service.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosisContext<'a> {
    pub report: &'a StructuredReport,
    pub classification: &'a Classification,
    pub findings: &'a BTreeMap<String, Vec<Finding>>,
    pub exchange_log: &'a [ExchangeEntry],
}

// ---------------------------------------------------------------------------
// Service trait
// ---------------------------------------------------------------------------

/// Narrow interface to the external reasoning service.
///
/// Implementations must be deterministic enough under a stub that engine
/// tests can assert exact classifications and routing decisions.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Extract a structured report from raw free text (interactive intake).
    async fn extract_report(&self, raw: &str) -> Result<StructuredReport, ReasoningError>;

    /// Classify a structured report given the conversation so far.
    async fn classify(
        &self,
        report: &StructuredReport,
        log: &[ExchangeEntry],
    ) -> Result<ClassifierOutput, ReasoningError>;

    /// Produce ranked root-cause hypotheses from the gathered context.
    async fn hypothesize(
        &self,
        ctx: DiagnosisContext<'_>,
    ) -> Result<DiagnosisOutput, ReasoningError>;

    /// Formulate one clarifying question for the reporter.
    async fn formulate_question(
        &self,
        report: &StructuredReport,
        missing: &[String],
        round: u32,
    ) -> Result<String, ReasoningError>;

    /// Turn a diagnosis into an ordered resolution plan.
    async fn plan_resolution(
        &self,
        diagnosis: &Diagnosis,
        report: &StructuredReport,
    ) -> Result<ResolutionOutput, ReasoningError>;
}

// ---------------------------------------------------------------------------
// Live implementation
// ---------------------------------------------------------------------------

/// Reasoning service backed by an OpenAI-compatible completions endpoint.
pub struct LlmReasoner {
    client: openai::CompletionsClient,
    model: String,
}

impl LlmReasoner {
    pub fn new(endpoint: &ReasoningEndpoint) -> anyhow::Result<Self> {
        let client = openai::CompletionsClient::builder()
            .api_key(&endpoint.api_key)
            .base_url(&endpoint.url)
            .build()?;

        tracing::debug!(
            model = %endpoint.model,
            prompt_version = prompts::PROMPT_VERSION,
            "reasoner ready"
        );

        Ok(Self {
            client,
            model: endpoint.model.clone(),
        })
    }

    /// Prompt the model and parse its response into `T`, fail-closed.
    async fn prompt_json<T: DeserializeOwned>(
        &self,
        preamble: &str,
        message: &str,
    ) -> Result<T, ReasoningError> {
        let raw = self.prompt_text(preamble, message).await?;
        let json = extract_json_block(&raw).unwrap_or(&raw);
        serde_json::from_str(json).map_err(|e| {
            ReasoningError::Schema(format!("{e}; response started: {}", truncate(&raw, 120)))
        })
    }

    async fn prompt_text(&self, preamble: &str, message: &str) -> Result<String, ReasoningError> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(preamble)
            .build();

        let response: String = agent
            .prompt(message)
            .await
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;
        Ok(response)
    }
}

#[async_trait]
impl ReasoningService for LlmReasoner {
    async fn extract_report(&self, raw: &str) -> Result<StructuredReport, ReasoningError> {
        let preamble = prompts::with_schema::<StructuredReport>(prompts::INTAKE_PREAMBLE);
        self.prompt_json(&preamble, raw).await
    }

    async fn classify(
        &self,
        report: &StructuredReport,
        log: &[ExchangeEntry],
    ) -> Result<ClassifierOutput, ReasoningError> {
        let preamble = prompts::with_schema::<ClassifierOutput>(prompts::CLASSIFIER_PREAMBLE);
        self.prompt_json(&preamble, &prompts::classification_context(report, log))
            .await
    }

    async fn hypothesize(
        &self,
        ctx: DiagnosisContext<'_>,
    ) -> Result<DiagnosisOutput, ReasoningError> {
        let preamble = prompts::with_schema::<DiagnosisOutput>(prompts::DIAGNOSIS_PREAMBLE);
        let message = prompts::diagnosis_context(
            ctx.report,
            ctx.classification,
            ctx.findings,
            ctx.exchange_log,
        );
        self.prompt_json(&preamble, &message).await
    }

    async fn formulate_question(
        &self,
        report: &StructuredReport,
        missing: &[String],
        round: u32,
    ) -> Result<String, ReasoningError> {
        let response = self
            .prompt_text(
                prompts::QUESTION_PREAMBLE,
                &prompts::question_context(report, missing, round),
            )
            .await?;
        let question = response.trim();
        if question.is_empty() {
            return Err(ReasoningError::Schema("empty question".into()));
        }
        Ok(question.to_string())
    }

    async fn plan_resolution(
        &self,
        diagnosis: &Diagnosis,
        report: &StructuredReport,
    ) -> Result<ResolutionOutput, ReasoningError> {
        let preamble = prompts::with_schema::<ResolutionOutput>(prompts::RESOLUTION_PREAMBLE);
        self.prompt_json(&preamble, &prompts::resolution_context(diagnosis, report))
            .await
    }
}

// ---------------------------------------------------------------------------
// Response parsing helpers
// ---------------------------------------------------------------------------

/// Try to extract a JSON block from a response that may contain
/// surrounding prose or a fenced code block.
pub fn extract_json_block(text: &str) -> Option<&str> {
    // Look for ```json ... ``` fenced blocks
    if let Some(start) = text.find("```json") {
        let json_start = start + 7;
        if let Some(end) = text[json_start..].find("```") {
            return Some(text[json_start..json_start + end].trim());
        }
    }

    // Look for first { to last }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Truncate to at most `max` bytes on a char boundary.
pub fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
