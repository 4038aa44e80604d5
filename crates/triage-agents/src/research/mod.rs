//! Research sources — the evidence-gathering side of the pipeline.
//!
//! Each source implements the narrow [`ResearchSource`] trait and owns its
//! own key in the workflow's findings map, so parallel branches can never
//! conflict. Source failures are ordinary `Err` values: the engine records
//! them and diagnoses with whatever the other branches returned.

pub mod issues;
pub mod knowledge;

use async_trait::async_trait;

use crate::state::SourceReport;

/// What the engine hands each research source.
#[derive(Debug, Clone)]
pub struct ResearchQuery {
    /// Search text — error output when present, otherwise title/description.
    pub text: String,
    /// Candidate library names extracted at intake; sources may use them to
    /// narrow their search.
    pub crate_hints: Vec<String>,
}

/// One independent evidence provider.
#[async_trait]
pub trait ResearchSource: Send + Sync {
    /// Stable name; doubles as the source's findings key and its entry in
    /// the confidence weight table.
    fn name(&self) -> &'static str;

    async fn search(&self, query: &ResearchQuery) -> anyhow::Result<SourceReport>;
}
