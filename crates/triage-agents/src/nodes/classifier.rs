//! Classifier — label the report with a failure category.
//!
//! A pure function of the structured report and the exchange log (modulo
//! the reasoning service, which is stubbed deterministic in tests). A
//! failed or unparseable reasoning call degrades to the `other` label at
//! floor confidence — the run continues and the low score steers the
//! router toward information gathering.

use tracing::warn;

use crate::reasoning::ReasoningService;
use crate::state::{Classification, ExchangeEntry, FailureKind, StructuredReport};

/// Confidence assigned when the classifier response is unusable.
const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Classifier result plus what the engine needs for routing and error
/// accounting.
#[derive(Debug, Clone)]
pub struct ClassifierVerdict {
    pub classification: Classification,
    /// Critical information the report is missing.
    pub missing_info: Vec<String>,
    /// True when the reasoning call failed and the fallback was used.
    pub degraded: bool,
}

pub async fn classify(
    reasoner: &dyn ReasoningService,
    report: &StructuredReport,
    log: &[ExchangeEntry],
) -> ClassifierVerdict {
    match reasoner.classify(report, log).await {
        Ok(output) => {
            let missing_info = output.missing_info.clone();
            ClassifierVerdict {
                classification: output.into(),
                missing_info,
                degraded: false,
            }
        }
        Err(e) => {
            warn!(error = %e, "classification unavailable, using fallback");
            ClassifierVerdict {
                classification: Classification {
                    label: FailureKind::Other,
                    confidence: FALLBACK_CONFIDENCE,
                    rationale: "Classifier response unavailable; defaulting to low confidence"
                        .into(),
                },
                missing_info: vec![
                    "exact error output".into(),
                    "steps to reproduce".into(),
                ],
                degraded: true,
            }
        }
    }
}
