//! The diagnostic workflow engine.
//!
//! Executes the stage graph over one ticket per invocation:
//!
//! ```text
//! intake → classify → fan-out {research sources} → join → diagnose → route
//!                                                                     │
//!                         resolve (terminal) ◄───── confidence ≥ θ ───┤
//!                         ask reporter + suspend ◄── confidence < θ ──┘
//! ```
//!
//! Suspension is not an in-process block: the engine appends the question
//! to the exchange log, marks the ticket `AwaitingInfo`, and returns. The
//! next invocation rebuilds the whole workflow state from the durable
//! ticket — the exchange log is the only cross-invocation memory, which is
//! what lets a reply arrive hours or weeks later. A hard cap on
//! information-gathering rounds guarantees the workflow never waits
//! forever: once exhausted, the best available hypothesis is resolved with
//! a low-confidence flag.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::aggregator::ConfidenceAggregator;
use crate::config::TriageConfig;
use crate::error::TriageError;
use crate::nodes::{classifier, diagnoser, info_gatherer, intake, resolution};
use crate::reasoning::ReasoningService;
use crate::report::{render_report, ReportContext};
use crate::research::{ResearchQuery, ResearchSource};
use crate::state::{
    ExchangeEntry, Finding, Route, Speaker, StructuredReport, Ticket, TicketStatus, WorkflowState,
};
use crate::state_machine::{Phase, StateMachine};

/// How a run ended: terminal, or suspended on a question to the reporter.
#[derive(Debug)]
pub enum RunOutcome {
    Complete(WorkflowState),
    Suspended(WorkflowState, String),
}

impl RunOutcome {
    pub fn state(&self) -> &WorkflowState {
        match self {
            Self::Complete(state) => state,
            Self::Suspended(state, _) => state,
        }
    }

    pub fn into_state(self) -> WorkflowState {
        match self {
            Self::Complete(state) => state,
            Self::Suspended(state, _) => state,
        }
    }
}

pub struct WorkflowEngine {
    config: TriageConfig,
    reasoner: Arc<dyn ReasoningService>,
    sources: Vec<Arc<dyn ResearchSource>>,
    aggregator: ConfidenceAggregator,
}

impl WorkflowEngine {
    pub fn new(
        config: TriageConfig,
        reasoner: Arc<dyn ReasoningService>,
        sources: Vec<Arc<dyn ResearchSource>>,
    ) -> Self {
        let aggregator = ConfidenceAggregator::new(config.weights.clone());
        Self {
            config,
            reasoner,
            sources,
            aggregator,
        }
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    /// Run the workflow over one ticket to completion or suspension.
    pub async fn run(&self, mut ticket: Ticket) -> Result<RunOutcome, TriageError> {
        let resuming = !ticket.exchange_log.is_empty();
        let iteration = info_gatherer::question_rounds(&ticket.exchange_log);

        let mut machine = if resuming {
            StateMachine::resuming()
        } else {
            StateMachine::new()
        };
        machine.set_iteration(iteration);

        info!(id = %ticket.id, resuming, iteration, "triage run starting");

        // Intake: derived from the immutable report fields, so a resumed
        // run gets the identical report without re-extraction.
        let report = intake::report_from_ticket(&ticket);
        if !resuming {
            machine.advance(Phase::Classifying, Some("report derived"))?;
        }

        let verdict =
            classifier::classify(self.reasoner.as_ref(), &report, &ticket.exchange_log).await;
        machine.advance(
            Phase::Researching,
            Some(&format!(
                "classified as {} at {:.2}",
                verdict.classification.label, verdict.classification.confidence
            )),
        )?;

        let query = research_query(&report);
        let (findings, source_signals, source_errors) = self.fan_out(query).await;
        machine.advance(Phase::Diagnosing, None)?;

        // Fatal diagnostic failure: the reasoning service AND every
        // research source failed in this run.
        if verdict.degraded && !self.sources.is_empty() && source_errors.len() == self.sources.len()
        {
            let detail = format!(
                "reasoning service unavailable and research sources [{}] failed",
                source_errors.keys().cloned().collect::<Vec<_>>().join(", ")
            );
            machine.fail(&detail)?;
            return Err(TriageError::AllCollaboratorsFailed { detail });
        }

        let (diagnosis, _) = diagnoser::diagnose(
            self.reasoner.as_ref(),
            &self.aggregator,
            &report,
            &verdict.classification,
            &findings,
            &source_signals,
            &ticket.exchange_log,
        )
        .await;
        machine.advance(Phase::Routing, None)?;

        let overall = diagnosis.breakdown.overall;
        let route = if overall >= self.config.confidence_threshold {
            Route::Resolve
        } else {
            Route::GatherInfo
        };
        let skipped = info_gatherer::user_skipped(&ticket.exchange_log);
        let budget_exhausted = iteration >= self.config.max_info_rounds;
        let forced = route == Route::GatherInfo && (budget_exhausted || skipped);

        info!(
            overall,
            threshold = self.config.confidence_threshold,
            route = %route,
            forced,
            "routing decision"
        );

        if route == Route::Resolve || forced {
            let reason = if !forced {
                format!("confidence {overall:.2} cleared threshold")
            } else if skipped {
                "reporter cannot provide more information".to_string()
            } else {
                "information-gathering budget exhausted".to_string()
            };
            machine.advance(Phase::Resolving, Some(&reason))?;

            let plan = match resolution::resolve(self.reasoner.as_ref(), &diagnosis, &report).await
            {
                Ok(plan) => plan,
                Err(e) => {
                    machine.fail("resolution planning failed")?;
                    return Err(e);
                }
            };

            let body = render_report(&ReportContext {
                classification: &verdict.classification,
                findings: &findings,
                source_errors: &source_errors,
                diagnosis: &diagnosis,
                plan: &plan,
                forced,
                display_cap: self.config.findings_display_cap,
            });
            ticket.append(ExchangeEntry::now(Speaker::Agent, body).with_diagnosis(diagnosis.clone()));
            ticket.status = TicketStatus::Resolved;
            machine.advance(Phase::Resolved, None)?;
            info!(id = %ticket.id, summary = %machine.summary(), "ticket resolved");

            return Ok(RunOutcome::Complete(WorkflowState {
                ticket,
                report,
                classification: verdict.classification,
                findings,
                source_signals,
                source_errors,
                diagnosis,
                resolution: Some(plan),
                iteration,
                pending_question: None,
            }));
        }

        machine.advance(
            Phase::GatheringInfo,
            Some(&format!("confidence {overall:.2} below threshold")),
        )?;

        let question = info_gatherer::formulate_question(
            self.reasoner.as_ref(),
            &report,
            &verdict.missing_info,
            iteration,
        )
        .await;
        ticket.append(ExchangeEntry::now(
            Speaker::Agent,
            info_gatherer::suspension_body(&question),
        ));
        ticket.status = TicketStatus::AwaitingInfo;
        machine.advance(Phase::AwaitingInfo, None)?;

        let iteration = info_gatherer::question_rounds(&ticket.exchange_log);
        info!(id = %ticket.id, iteration, summary = %machine.summary(), "suspended awaiting reporter input");

        Ok(RunOutcome::Suspended(
            WorkflowState {
                ticket,
                report,
                classification: verdict.classification,
                findings,
                source_signals,
                source_errors,
                diagnosis,
                resolution: None,
                iteration,
                pending_question: Some(question.clone()),
            },
            question,
        ))
    }

    /// Fan out over the research sources concurrently and join.
    ///
    /// Each branch is an isolated task: a failure (or panic) records an
    /// error and an empty finding list for that source only — it never
    /// blocks or poisons the other branches. Completion order is
    /// irrelevant; results are keyed by source name.
    async fn fan_out(
        &self,
        query: ResearchQuery,
    ) -> (
        BTreeMap<String, Vec<Finding>>,
        BTreeMap<String, f64>,
        BTreeMap<String, String>,
    ) {
        let mut handles = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let name = source.name();
            let source = Arc::clone(source);
            let query = query.clone();
            handles.push((
                name,
                tokio::spawn(async move { source.search(&query).await }),
            ));
        }

        let mut findings = BTreeMap::new();
        let mut signals = BTreeMap::new();
        let mut errors = BTreeMap::new();
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(report)) => {
                    info!(
                        source = name,
                        hits = report.findings.len(),
                        signal = report.signal,
                        "research branch complete"
                    );
                    findings.insert(name.to_string(), report.findings);
                    signals.insert(name.to_string(), report.signal);
                }
                Ok(Err(e)) => {
                    warn!(source = name, error = %e, "research branch failed");
                    findings.insert(name.to_string(), Vec::new());
                    errors.insert(name.to_string(), e.to_string());
                }
                Err(join_error) => {
                    warn!(source = name, error = %join_error, "research branch panicked");
                    findings.insert(name.to_string(), Vec::new());
                    errors.insert(name.to_string(), format!("branch panicked: {join_error}"));
                }
            }
        }
        (findings, signals, errors)
    }
}

/// Build the research query from the report: error output is the
/// strongest search text, then the title, then the description head.
fn research_query(report: &StructuredReport) -> ResearchQuery {
    let text = if !report.error_text.is_empty() {
        report.error_text.clone()
    } else if !report.title.is_empty() {
        report.title.clone()
    } else {
        head(&report.description, 500)
    };
    ResearchQuery {
        text,
        crate_hints: report.crate_hints.clone(),
    }
}

fn head(text: &str, max: usize) -> String {
    let mut end = text.len().min(max);
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_research_query_prefers_error_text() {
        let report = StructuredReport {
            title: "A title".into(),
            description: "words".into(),
            error_text: "error: boom".into(),
            ..Default::default()
        };
        assert_eq!(research_query(&report).text, "error: boom");
    }

    #[test]
    fn test_research_query_falls_back_to_title_then_description() {
        let report = StructuredReport {
            title: "A title".into(),
            description: "words".into(),
            ..Default::default()
        };
        assert_eq!(research_query(&report).text, "A title");

        let report = StructuredReport {
            description: "just a description".into(),
            ..Default::default()
        };
        assert_eq!(research_query(&report).text, "just a description");
    }
}
