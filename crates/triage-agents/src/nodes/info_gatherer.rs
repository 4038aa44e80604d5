//! Info gatherer — the human-in-the-loop half of the workflow.
//!
//! Formulates a clarifying question, stamps the suspension marker into the
//! Agent entry, and provides the bookkeeping the engine needs to derive
//! the iteration count back out of the durable exchange log. The marker is
//! the only cross-invocation memory of how many rounds were consumed.

use tracing::warn;

use crate::reasoning::ReasoningService;
use crate::state::{ExchangeEntry, Speaker, StructuredReport};

/// Appended to every question entry; counting it in the log yields the
/// number of information-gathering rounds already taken.
pub const AWAITING_INFO_MARKER: &str =
    "**Waiting for more information. Add your reply below and re-run the ticket. \
     (Reply 'skip' if you don't have it.)**";

/// Replies that mean "I can't provide more" — they consume the remaining
/// rounds instead of feeding another question cycle.
const SKIP_PHRASES: &[&str] = &[
    "skip",
    "don't have",
    "i don't know",
    "no idea",
    "n/a",
    "not available",
    "cannot provide",
    "can't provide",
    "unavailable",
    "no info",
];

/// How many information-gathering rounds the ticket has consumed.
pub fn question_rounds(log: &[ExchangeEntry]) -> u32 {
    log.iter()
        .filter(|entry| entry.speaker == Speaker::Agent && entry.body.contains(AWAITING_INFO_MARKER))
        .count() as u32
}

/// Whether the reporter has signalled they cannot provide more information.
pub fn user_skipped(log: &[ExchangeEntry]) -> bool {
    log.iter()
        .filter(|entry| entry.speaker == Speaker::User)
        .any(|entry| {
            let body = entry.body.to_lowercase();
            SKIP_PHRASES.iter().any(|phrase| body.contains(phrase))
        })
}

/// Formulate the clarifying question, with a canned fallback when the
/// reasoning service is unavailable.
pub async fn formulate_question(
    reasoner: &dyn ReasoningService,
    report: &StructuredReport,
    missing: &[String],
    round: u32,
) -> String {
    match reasoner.formulate_question(report, missing, round).await {
        Ok(question) => question,
        Err(e) => {
            warn!(error = %e, "question formulation unavailable, using fallback");
            "Could you share the exact error output and the steps that reproduce the problem?"
                .to_string()
        }
    }
}

/// The Agent entry body for a suspension: question plus marker.
pub fn suspension_body(question: &str) -> String {
    format!("{question}\n\n{AWAITING_INFO_MARKER}")
}
