//! Preamble constants and prompt builders for each reasoning task.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble content
//! changes, so a logged response can be traced back to the prompt that
//! produced it.

use std::collections::BTreeMap;

use schemars::JsonSchema;

use crate::state::{Classification, Diagnosis, ExchangeEntry, Finding, StructuredReport};

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.0.0";

/// Intake extraction: raw report text → structured report JSON.
pub const INTAKE_PREAMBLE: &str = "\
You are the intake stage of a bug-report triage pipeline. Extract the \
structured fields from the raw report below. Copy text verbatim where \
possible; leave a field empty when the report does not provide it. \
Never invent content.";

/// Classification: structured report + exchange log → failure category.
pub const CLASSIFIER_PREAMBLE: &str = "\
You are the classifier stage of a bug-report triage pipeline. Assign the \
report exactly one failure category: api (auth, rate limits, wrong \
responses), version (incompatibility, deprecation), dependency (missing or \
conflicting packages, failed installs), runtime (crashes, panics, \
exceptions), configuration (setup or environment), or other. Report your \
confidence in [0,1], a one-sentence rationale, and list any critical \
information the report is missing.";

/// Diagnosis: full gathered context → ranked root-cause hypotheses.
pub const DIAGNOSIS_PREAMBLE: &str = "\
You are the diagnoser stage of a bug-report triage pipeline. Combine the \
report, its classification, and the research findings into ranked \
root-cause hypotheses, most likely first. For each hypothesis give a \
confidence in [0,1], cite the supporting findings by title, and list the \
checks that would confirm it. Prefer hypotheses backed by evidence over \
speculation.";

/// Question formulation: ask the reporter for what is missing.
pub const QUESTION_PREAMBLE: &str = "\
You are helping triage a bug report that lacks the information needed for \
a confident diagnosis. Write ONE short, specific question to the reporter \
that would most improve the diagnosis. Ask for concrete artifacts (exact \
error output, reproduction steps, versions) rather than generalities. \
Respond with the question text only.";

/// Resolution planning: diagnosis → ordered fix steps.
pub const RESOLUTION_PREAMBLE: &str = "\
You are the resolution stage of a bug-report triage pipeline. Turn the \
selected root-cause hypothesis into an ordered, actionable fix plan. Each \
step needs an action, the rationale for it, and the expected result. Keep \
the plan short — three to five steps.";

/// Append the JSON Schema of the expected response type to a preamble so
/// the model returns the exact contract shape.
pub fn with_schema<T: JsonSchema>(preamble: &str) -> String {
    let schema = serde_json::to_string_pretty(&schemars::schema_for!(T)).unwrap_or_default();
    format!("{preamble}\n\nRespond with strict JSON matching this schema:\n{schema}")
}

/// Render the exchange log for inclusion in a prompt.
fn render_exchange_log(log: &[ExchangeEntry]) -> String {
    if log.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n## Conversation So Far\n");
    for entry in log {
        out.push_str(&format!("[{}] {}\n", entry.speaker, entry.body));
    }
    out
}

fn render_report(report: &StructuredReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("**Title:** {}\n\n", report.title));
    out.push_str(&format!("**Description:**\n{}\n", report.description));
    if !report.reproduction.is_empty() {
        out.push_str(&format!("\n**Reproduction:**\n```\n{}\n```\n", report.reproduction));
    }
    if !report.error_text.is_empty() {
        out.push_str(&format!("\n**Error output:**\n```\n{}\n```\n", report.error_text));
    }
    if !report.crate_hints.is_empty() {
        out.push_str(&format!(
            "\n**Libraries mentioned:** {}\n",
            report.crate_hints.join(", ")
        ));
    }
    out
}

/// User message for the classifier task.
pub fn classification_context(report: &StructuredReport, log: &[ExchangeEntry]) -> String {
    format!(
        "# Bug Report\n{}{}",
        render_report(report),
        render_exchange_log(log)
    )
}

/// User message for the diagnosis task.
pub fn diagnosis_context(
    report: &StructuredReport,
    classification: &Classification,
    findings: &BTreeMap<String, Vec<Finding>>,
    log: &[ExchangeEntry],
) -> String {
    let mut out = format!("# Bug Report\n{}", render_report(report));

    out.push_str(&format!(
        "\n## Classification\nType: {} ({:.0}% confident)\nReasoning: {}\n",
        classification.label,
        classification.confidence * 100.0,
        classification.rationale
    ));

    for (source, items) in findings {
        if items.is_empty() {
            continue;
        }
        out.push_str(&format!("\n## Findings from {source}\n"));
        for finding in items.iter().take(5) {
            let state = if finding.resolved { "resolved" } else { "open" };
            out.push_str(&format!(
                "- {} ({state}, relevance {:.0}%)\n  {}\n",
                finding.title,
                finding.relevance * 100.0,
                finding.excerpt
            ));
        }
    }

    out.push_str(&render_exchange_log(log));
    out
}

/// User message for the question-formulation task.
pub fn question_context(report: &StructuredReport, missing: &[String], round: u32) -> String {
    format!(
        "# Bug Report\n{}\n## Missing Information\n{}\n\nQuestions already asked: {round}\n",
        render_report(report),
        missing
            .iter()
            .map(|m| format!("- {m}"))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

/// User message for the resolution-planning task.
pub fn resolution_context(diagnosis: &Diagnosis, report: &StructuredReport) -> String {
    let mut out = String::from("# Selected Diagnosis\n");
    if let Some(hypothesis) = diagnosis.selected_hypothesis() {
        out.push_str(&format!(
            "Root cause: {}\nConfidence: {:.0}%\n",
            hypothesis.cause,
            hypothesis.confidence * 100.0
        ));
        for evidence in &hypothesis.evidence {
            out.push_str(&format!("Evidence: {evidence}\n"));
        }
    }
    out.push_str(&format!(
        "Overall confidence: {:.0}%\n\n# Original Report\n{}",
        diagnosis.breakdown.overall * 100.0,
        render_report(report)
    ));
    out
}
