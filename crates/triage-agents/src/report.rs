//! Rendering of the agent-facing diagnostic report.
//!
//! The rendered report becomes the body of the Agent exchange entry when a
//! ticket is routed to resolution: classification, evidence summary,
//! literal confidence table (per-source score × weight), diagnosis, and
//! the numbered fix plan.

use std::collections::BTreeMap;

use crate::state::{Classification, ConfidenceBreakdown, Diagnosis, Finding, ResolutionPlan};

/// Inputs for one rendered report.
pub struct ReportContext<'a> {
    pub classification: &'a Classification,
    pub findings: &'a BTreeMap<String, Vec<Finding>>,
    pub source_errors: &'a BTreeMap<String, String>,
    pub diagnosis: &'a Diagnosis,
    pub plan: &'a ResolutionPlan,
    /// True when the iteration cap (or a reporter skip) forced resolution
    /// below the confidence threshold.
    pub forced: bool,
    /// Findings shown per source.
    pub display_cap: usize,
}

pub fn render_report(ctx: &ReportContext<'_>) -> String {
    let mut out = String::from("# Diagnostic Report\n");

    if ctx.forced {
        out.push_str(
            "\n> **Low confidence.** The information-gathering budget was exhausted; \
             treat this assessment as provisional.\n",
        );
    }

    out.push_str(&format!(
        "\n## Classification\n- Type: `{}`\n- Confidence: {}\n- Reasoning: {}\n",
        ctx.classification.label,
        pct(ctx.classification.confidence),
        ctx.classification.rationale
    ));

    out.push_str(&render_findings(ctx.findings, ctx.source_errors, ctx.display_cap));

    out.push_str("\n## Diagnosis\n");
    if let Some(hypothesis) = ctx.diagnosis.selected_hypothesis() {
        out.push_str(&format!("**Root cause:** {}\n", hypothesis.cause));
        if !hypothesis.evidence.is_empty() {
            out.push_str("\n**Supporting evidence:**\n");
            for evidence in &hypothesis.evidence {
                out.push_str(&format!("- {evidence}\n"));
            }
        }
        if !hypothesis.validations.is_empty() {
            out.push_str("\n**To confirm:**\n");
            for validation in &hypothesis.validations {
                out.push_str(&format!("- {validation}\n"));
            }
        }
    } else {
        out.push_str("**Root cause:** undetermined\n");
    }

    out.push_str(&render_confidence_table(&ctx.diagnosis.breakdown));

    out.push_str("\n## Resolution Plan\n");
    for (i, step) in ctx.plan.steps.iter().enumerate() {
        out.push_str(&format!(
            "\n### Step {}: {}\n*Why:* {}\n*Expected result:* {}\n",
            i + 1,
            step.action,
            step.rationale,
            step.expected
        ));
    }

    out
}

/// Findings summary, capped per source; failed sources are listed with
/// their error so the reduced confidence is explained, not hidden.
pub fn render_findings(
    findings: &BTreeMap<String, Vec<Finding>>,
    source_errors: &BTreeMap<String, String>,
    display_cap: usize,
) -> String {
    let mut out = String::new();
    let any_findings = findings.values().any(|items| !items.is_empty());

    if any_findings {
        out.push_str("\n## Related Evidence\n");
        for (source, items) in findings {
            if items.is_empty() {
                continue;
            }
            out.push_str(&format!("\n**{source}:**\n"));
            for finding in items.iter().take(display_cap) {
                let state = if finding.resolved { "resolved" } else { "open" };
                out.push_str(&format!("- [{}]({}) ({state})\n", finding.title, finding.link));
                if !finding.excerpt.is_empty() {
                    out.push_str(&format!("  > {}\n", finding.excerpt));
                }
            }
        }
    }

    if !source_errors.is_empty() {
        out.push_str("\n**Unavailable sources:**\n");
        for (source, error) in source_errors {
            out.push_str(&format!("- {source}: {error}\n"));
        }
    }

    out
}

/// Literal weight table: per-source score × weight plus the overall row.
pub fn render_confidence_table(breakdown: &ConfidenceBreakdown) -> String {
    let mut out = String::from("\n### Confidence Sources\n| Source | Score | Weight |\n|--------|-------|--------|\n");
    for (source, score) in &breakdown.sources {
        out.push_str(&format!(
            "| {source} | {} | {} |\n",
            pct(score.score),
            pct(score.weight)
        ));
    }
    out.push_str(&format!("| **Overall** | **{}** | |\n", pct(breakdown.overall)));
    out
}

fn pct(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}
