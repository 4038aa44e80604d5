//! Confidence aggregation across diagnostic signal sources.
//!
//! Each recognized source (the classifier plus every research source) is
//! declared once with a fixed weight; the weights must sum to 1.0 at
//! construction time — a violating set is a fatal configuration error, not
//! a per-call check. Aggregation is a plain weighted sum: a source that
//! failed or found nothing scores 0 and its weight is NOT redistributed,
//! so missing evidence lowers the overall score instead of inflating the
//! remaining signals.

use std::collections::BTreeMap;

use crate::error::TriageError;
use crate::state::{ConfidenceBreakdown, SourceScore};

/// Source name for the classifier's own confidence signal.
pub const SOURCE_CLASSIFIER: &str = "classifier";
/// Source name for the issue-tracker research source.
pub const SOURCE_ISSUE_TRACKER: &str = "issue_tracker";
/// Source name for the knowledge-base research source.
pub const SOURCE_KNOWLEDGE_BASE: &str = "knowledge_base";

const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// Declared per-source weights, validated to sum to 1.0 at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceWeights {
    weights: BTreeMap<String, f64>,
}

impl SourceWeights {
    /// Validate and freeze a weight set. Fails unless every weight is in
    /// [0, 1] and the set sums to 1.0 within epsilon.
    pub fn new(weights: BTreeMap<String, f64>) -> Result<Self, TriageError> {
        if weights.is_empty() {
            return Err(TriageError::Config(
                "source weights: at least one source must be declared".into(),
            ));
        }
        for (name, weight) in &weights {
            if !(0.0..=1.0).contains(weight) {
                return Err(TriageError::Config(format!(
                    "source weights: {name} = {weight} is outside [0, 1]"
                )));
            }
        }
        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(TriageError::Config(format!(
                "source weights must sum to 1.0, got {sum:.6}"
            )));
        }
        Ok(Self { weights })
    }

    /// The declared weight set: classifier 0.40, issue tracker 0.35,
    /// knowledge base 0.25.
    pub fn standard() -> Self {
        // Known-good by construction; sums to exactly 1.0.
        let mut weights = BTreeMap::new();
        weights.insert(SOURCE_CLASSIFIER.to_string(), 0.40);
        weights.insert(SOURCE_ISSUE_TRACKER.to_string(), 0.35);
        weights.insert(SOURCE_KNOWLEDGE_BASE.to_string(), 0.25);
        Self { weights }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.weights.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(name, w)| (name.as_str(), *w))
    }
}

/// Combines per-source signals into one overall confidence score.
#[derive(Debug, Clone)]
pub struct ConfidenceAggregator {
    weights: SourceWeights,
}

impl ConfidenceAggregator {
    pub fn new(weights: SourceWeights) -> Self {
        Self { weights }
    }

    /// Aggregate raw per-source scores into a breakdown.
    ///
    /// `None` (or a missing key) means the source failed or produced no
    /// findings: it scores 0. Input keys that are not declared sources are
    /// ignored with a warning.
    pub fn aggregate(&self, inputs: &BTreeMap<String, Option<f64>>) -> ConfidenceBreakdown {
        for name in inputs.keys() {
            if self.weights.get(name).is_none() {
                tracing::warn!(source = %name, "score from undeclared source ignored");
            }
        }

        let mut sources = BTreeMap::new();
        let mut overall = 0.0;
        for (name, weight) in self.weights.iter() {
            let score = inputs
                .get(name)
                .copied()
                .flatten()
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);
            overall += score * weight;
            sources.insert(name.to_string(), SourceScore { score, weight });
        }

        ConfidenceBreakdown {
            sources,
            overall: overall.clamp(0.0, 1.0),
        }
    }
}
