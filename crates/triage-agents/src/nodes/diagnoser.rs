//! Diagnoser — rank root-cause hypotheses and quantify confidence.
//!
//! Combines the classifier's label, the research findings, and the
//! reasoning service's hypotheses, then computes the confidence breakdown
//! via the aggregator. Ranking is deterministic: confidence first, then
//! number of supporting evidence references, then the order the reasoning
//! service returned them in (stable sort — no further reordering).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::warn;

use crate::aggregator::{ConfidenceAggregator, SOURCE_CLASSIFIER};
use crate::reasoning::{DiagnosisContext, ReasoningService};
use crate::state::{
    Classification, Diagnosis, ExchangeEntry, Finding, Hypothesis, StructuredReport,
};

/// Confidence of the fallback hypothesis when reasoning is unavailable.
const FALLBACK_CONFIDENCE: f64 = 0.2;

pub async fn diagnose(
    reasoner: &dyn ReasoningService,
    aggregator: &ConfidenceAggregator,
    report: &StructuredReport,
    classification: &Classification,
    findings: &BTreeMap<String, Vec<Finding>>,
    source_signals: &BTreeMap<String, f64>,
    log: &[ExchangeEntry],
) -> (Diagnosis, bool) {
    let ctx = DiagnosisContext {
        report,
        classification,
        findings,
        exchange_log: log,
    };

    let (raw_hypotheses, degraded) = match reasoner.hypothesize(ctx).await {
        Ok(output) if !output.hypotheses.is_empty() => (output.hypotheses, false),
        Ok(_) => {
            warn!("diagnoser returned no hypotheses, using fallback");
            (vec![fallback_hypothesis()], true)
        }
        Err(e) => {
            warn!(error = %e, "diagnosis unavailable, using fallback");
            (vec![fallback_hypothesis()], true)
        }
    };

    let hypotheses = rank_hypotheses(raw_hypotheses);

    let mut inputs: BTreeMap<String, Option<f64>> = source_signals
        .iter()
        .map(|(name, signal)| (name.clone(), Some(*signal)))
        .collect();
    inputs.insert(
        SOURCE_CLASSIFIER.to_string(),
        Some(classification.confidence),
    );

    let breakdown = aggregator.aggregate(&inputs);

    (
        Diagnosis {
            hypotheses,
            selected: 0,
            breakdown,
        },
        degraded,
    )
}

/// Deterministic ranking: confidence desc, then evidence count desc, then
/// original order (stable sort).
pub fn rank_hypotheses(mut hypotheses: Vec<Hypothesis>) -> Vec<Hypothesis> {
    for hypothesis in &mut hypotheses {
        hypothesis.confidence = hypothesis.confidence.clamp(0.0, 1.0);
    }
    hypotheses.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then(b.evidence.len().cmp(&a.evidence.len()))
    });
    hypotheses
}

fn fallback_hypothesis() -> Hypothesis {
    Hypothesis {
        cause: "Root cause could not be determined automatically; the error output and \
                stack trace need manual review"
            .into(),
        confidence: FALLBACK_CONFIDENCE,
        evidence: Vec::new(),
        validations: vec!["Review the error output and stack trace manually".into()],
    }
}
