//! End-to-end engine tests with deterministic stub collaborators.
//!
//! The reasoning service and both research sources are hand-rolled stubs,
//! so every classification, diagnosis, and routing decision is exact and
//! repeatable — no live endpoints involved.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use triage_agents::aggregator::{SOURCE_ISSUE_TRACKER, SOURCE_KNOWLEDGE_BASE};
use triage_agents::config::TriageConfig;
use triage_agents::engine::{RunOutcome, WorkflowEngine};
use triage_agents::error::TriageError;
use triage_agents::nodes::info_gatherer::AWAITING_INFO_MARKER;
use triage_agents::reasoning::{
    ClassifierOutput, DiagnosisContext, DiagnosisOutput, ReasoningError, ReasoningService,
    ResolutionOutput,
};
use triage_agents::research::{ResearchQuery, ResearchSource};
use triage_agents::state::{
    ExchangeEntry, FailureKind, Finding, Hypothesis, SourceReport, Speaker, Step,
    StructuredReport, Ticket, TicketStatus,
};
use triage_agents::ticket_store::{parse_ticket, render_ticket};

// ---------------------------------------------------------------------------
// Stub collaborators
// ---------------------------------------------------------------------------

/// Deterministic reasoning stub. Classification confidence can be boosted
/// when the reporter has replied, which is how resumption runs are made to
/// converge.
struct StubReasoner {
    label: FailureKind,
    confidence: f64,
    hypothesis_confidence: f64,
    /// Added to the classification confidence once a User entry exists.
    reply_boost: f64,
    /// Simulate a full reasoning-service outage.
    fail_all: bool,
}

impl StubReasoner {
    fn confident() -> Self {
        Self {
            label: FailureKind::Dependency,
            confidence: 0.9,
            hypothesis_confidence: 0.85,
            reply_boost: 0.0,
            fail_all: false,
        }
    }

    fn unsure() -> Self {
        Self {
            label: FailureKind::Other,
            confidence: 0.4,
            hypothesis_confidence: 0.3,
            reply_boost: 0.0,
            fail_all: false,
        }
    }

    fn down() -> Self {
        Self {
            fail_all: true,
            ..Self::unsure()
        }
    }

    fn outage<T>(&self) -> Result<T, ReasoningError> {
        Err(ReasoningError::Transport("stubbed outage".into()))
    }
}

#[async_trait]
impl ReasoningService for StubReasoner {
    async fn extract_report(&self, raw: &str) -> Result<StructuredReport, ReasoningError> {
        if self.fail_all {
            return self.outage();
        }
        Ok(StructuredReport {
            description: raw.to_string(),
            ..Default::default()
        })
    }

    async fn classify(
        &self,
        report: &StructuredReport,
        log: &[ExchangeEntry],
    ) -> Result<ClassifierOutput, ReasoningError> {
        if self.fail_all {
            return self.outage();
        }
        let replied = log.iter().any(|entry| entry.speaker == Speaker::User);
        let confidence = if replied {
            (self.confidence + self.reply_boost).clamp(0.0, 1.0)
        } else {
            self.confidence
        };
        Ok(ClassifierOutput {
            label: self.label,
            confidence,
            rationale: "stubbed classification".into(),
            missing_info: if report.is_sparse() {
                vec!["exact error output".into(), "steps to reproduce".into()]
            } else {
                Vec::new()
            },
        })
    }

    async fn hypothesize(
        &self,
        ctx: DiagnosisContext<'_>,
    ) -> Result<DiagnosisOutput, ReasoningError> {
        if self.fail_all {
            return self.outage();
        }
        let evidence: Vec<String> = ctx
            .findings
            .values()
            .flatten()
            .take(3)
            .map(|finding| finding.title.clone())
            .collect();
        Ok(DiagnosisOutput {
            hypotheses: vec![Hypothesis {
                cause: format!("{} failure suspected", ctx.classification.label),
                confidence: self.hypothesis_confidence,
                evidence,
                validations: vec!["re-run with verbose output".into()],
            }],
        })
    }

    async fn formulate_question(
        &self,
        _report: &StructuredReport,
        _missing: &[String],
        _round: u32,
    ) -> Result<String, ReasoningError> {
        if self.fail_all {
            return self.outage();
        }
        Ok("Could you paste the exact error output?".into())
    }

    async fn plan_resolution(
        &self,
        _diagnosis: &triage_agents::state::Diagnosis,
        _report: &StructuredReport,
    ) -> Result<ResolutionOutput, ReasoningError> {
        if self.fail_all {
            return self.outage();
        }
        Ok(ResolutionOutput {
            steps: vec![Step {
                action: "Run cargo update".into(),
                rationale: "Refreshes the registry index".into(),
                expected: "The install succeeds".into(),
            }],
        })
    }
}

/// Research source stub: canned report or simulated outage, with a call
/// counter so tests can assert the fan-out actually ran.
struct StubSource {
    name: &'static str,
    report: Option<SourceReport>,
    calls: Mutex<u32>,
}

impl StubSource {
    fn healthy(name: &'static str, signal: f64) -> Arc<Self> {
        Arc::new(Self {
            name,
            report: Some(SourceReport {
                findings: vec![Finding {
                    title: format!("{name} evidence"),
                    link: format!("https://example.com/{name}"),
                    excerpt: "matching error seen before".into(),
                    relevance: signal,
                    resolved: true,
                }],
                signal,
            }),
            calls: Mutex::new(0),
        })
    }

    fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            report: None,
            calls: Mutex::new(0),
        })
    }

    fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ResearchSource for StubSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn search(&self, _query: &ResearchQuery) -> anyhow::Result<SourceReport> {
        *self.calls.lock().unwrap() += 1;
        match &self.report {
            Some(report) => Ok(report.clone()),
            None => Err(anyhow::anyhow!("stubbed outage")),
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn engine_with(
    reasoner: StubReasoner,
    sources: Vec<Arc<StubSource>>,
) -> WorkflowEngine {
    let sources: Vec<Arc<dyn ResearchSource>> = sources
        .into_iter()
        .map(|source| source as Arc<dyn ResearchSource>)
        .collect();
    WorkflowEngine::new(TriageConfig::default(), Arc::new(reasoner), sources)
}

fn dependency_ticket() -> Ticket {
    Ticket::new(
        "dep-404",
        "cargo add fails with HTTP 404",
        "Adding the dependency fails on every machine we tried.",
        "",
        "error: failed to get `leftpad` from registry (HTTP 404)",
    )
}

fn sparse_ticket() -> Ticket {
    Ticket::new(
        "sparse-1",
        "It crashes sometimes",
        "The tool just stops working.",
        "",
        "",
    )
}

fn agent_entries(ticket: &Ticket) -> usize {
    ticket
        .exchange_log
        .iter()
        .filter(|entry| entry.speaker == Speaker::Agent)
        .count()
}

fn question_entries(ticket: &Ticket) -> usize {
    ticket
        .exchange_log
        .iter()
        .filter(|entry| {
            entry.speaker == Speaker::Agent && entry.body.contains(AWAITING_INFO_MARKER)
        })
        .count()
}

fn user_reply(body: &str) -> ExchangeEntry {
    ExchangeEntry {
        speaker: Speaker::User,
        timestamp: "2026-08-07 12:00:00".into(),
        body: body.into(),
        diagnosis: None,
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_dependency_report_resolves_directly() {
    let issues = StubSource::healthy(SOURCE_ISSUE_TRACKER, 0.8);
    let kb = StubSource::healthy(SOURCE_KNOWLEDGE_BASE, 0.7);
    let engine = engine_with(StubReasoner::confident(), vec![issues.clone(), kb.clone()]);

    let outcome = engine.run(dependency_ticket()).await.unwrap();

    let state = match outcome {
        RunOutcome::Complete(state) => state,
        RunOutcome::Suspended(..) => panic!("expected direct resolution"),
    };

    assert_eq!(state.classification.label, FailureKind::Dependency);
    assert!(state.classification.confidence >= 0.85);
    assert_eq!(state.ticket.status, TicketStatus::Resolved);

    // 0.9*0.40 + 0.8*0.35 + 0.7*0.25
    assert!((state.diagnosis.breakdown.overall - 0.815).abs() < 1e-9);

    // No info-gathering cycle: exactly one Agent entry, the report.
    assert_eq!(agent_entries(&state.ticket), 1);
    assert_eq!(question_entries(&state.ticket), 0);
    let body = &state.ticket.exchange_log.last().unwrap().body;
    assert!(body.contains("Resolution Plan"));
    assert!(body.contains("Confidence Sources"));
    assert!(!body.contains("Low confidence"));

    assert_eq!(issues.call_count(), 1);
    assert_eq!(kb.call_count(), 1);
}

#[tokio::test]
async fn test_sparse_report_suspends_with_one_question() {
    let engine = engine_with(
        StubReasoner::unsure(),
        vec![
            StubSource::healthy(SOURCE_ISSUE_TRACKER, 0.2),
            StubSource::healthy(SOURCE_KNOWLEDGE_BASE, 0.1),
        ],
    );

    let outcome = engine.run(sparse_ticket()).await.unwrap();

    let (state, question) = match outcome {
        RunOutcome::Suspended(state, question) => (state, question),
        RunOutcome::Complete(_) => panic!("expected suspension"),
    };

    assert_eq!(state.ticket.status, TicketStatus::AwaitingInfo);
    assert_eq!(agent_entries(&state.ticket), 1);
    assert_eq!(question_entries(&state.ticket), 1);
    assert_eq!(state.iteration, 1);
    assert_eq!(state.pending_question.as_deref(), Some(question.as_str()));
    assert!(state
        .ticket
        .exchange_log
        .last()
        .unwrap()
        .body
        .contains(AWAITING_INFO_MARKER));
}

#[tokio::test]
async fn test_iteration_cap_forces_low_confidence_resolution() {
    let engine = engine_with(
        StubReasoner::unsure(),
        vec![
            StubSource::healthy(SOURCE_ISSUE_TRACKER, 0.2),
            StubSource::healthy(SOURCE_KNOWLEDGE_BASE, 0.1),
        ],
    );

    // Round 1 and 2: suspend, never a user reply.
    let mut ticket = sparse_ticket();
    for round in 1..=2u32 {
        let outcome = engine.run(ticket).await.unwrap();
        let state = match outcome {
            RunOutcome::Suspended(state, _) => state,
            RunOutcome::Complete(_) => panic!("round {round} should suspend"),
        };
        assert_eq!(state.iteration, round);
        ticket = state.ticket;
    }

    // Round 3: budget exhausted, forced low-confidence resolution.
    let outcome = engine.run(ticket).await.unwrap();
    let state = match outcome {
        RunOutcome::Complete(state) => state,
        RunOutcome::Suspended(..) => panic!("cap must force termination"),
    };

    assert_eq!(state.ticket.status, TicketStatus::Resolved);
    // Exactly the configured number of AwaitingInfo cycles, never more.
    assert_eq!(question_entries(&state.ticket), 2);
    let body = &state.ticket.exchange_log.last().unwrap().body;
    assert!(body.contains("Low confidence"));
    assert!(body.contains("Resolution Plan"));
}

#[tokio::test]
async fn test_engine_is_idempotent_without_new_user_entries() {
    let sources = || {
        vec![
            StubSource::healthy(SOURCE_ISSUE_TRACKER, 0.8),
            StubSource::healthy(SOURCE_KNOWLEDGE_BASE, 0.7),
        ]
    };
    let engine_a = engine_with(StubReasoner::confident(), sources());
    let engine_b = engine_with(StubReasoner::confident(), sources());

    let first = engine_a.run(dependency_ticket()).await.unwrap().into_state();
    let second = engine_b.run(dependency_ticket()).await.unwrap().into_state();

    assert_eq!(first.classification, second.classification);
    assert_eq!(first.diagnosis, second.diagnosis);
    assert_eq!(first.ticket.status, second.ticket.status);
    assert_eq!(first.resolution.is_some(), second.resolution.is_some());
}

#[tokio::test]
async fn test_both_sources_failing_degrades_to_classifier_only() {
    let issues = StubSource::failing(SOURCE_ISSUE_TRACKER);
    let kb = StubSource::failing(SOURCE_KNOWLEDGE_BASE);
    let engine = engine_with(StubReasoner::confident(), vec![issues, kb]);

    let outcome = engine.run(dependency_ticket()).await.unwrap();
    let state = outcome.state();

    // Only the classifier's weighted term contributes.
    assert!((state.diagnosis.breakdown.overall - 0.9 * 0.40).abs() < 1e-9);
    assert_eq!(state.source_errors.len(), 2);
    assert!(state.findings[SOURCE_ISSUE_TRACKER].is_empty());
    assert!(state.findings[SOURCE_KNOWLEDGE_BASE].is_empty());
}

#[tokio::test]
async fn test_all_collaborators_failing_is_fatal() {
    let engine = engine_with(
        StubReasoner::down(),
        vec![
            StubSource::failing(SOURCE_ISSUE_TRACKER),
            StubSource::failing(SOURCE_KNOWLEDGE_BASE),
        ],
    );

    let err = engine.run(dependency_ticket()).await.unwrap_err();
    assert!(matches!(err, TriageError::AllCollaboratorsFailed { .. }));
}

#[tokio::test]
async fn test_reasoner_outage_alone_is_not_fatal() {
    // Healthy sources keep the run alive even with the reasoning service
    // down: the fallback classification scores low, so the run suspends on
    // the canned clarifying question instead of crashing.
    let engine = engine_with(
        StubReasoner::down(),
        vec![
            StubSource::healthy(SOURCE_ISSUE_TRACKER, 0.8),
            StubSource::healthy(SOURCE_KNOWLEDGE_BASE, 0.7),
        ],
    );

    let outcome = engine.run(dependency_ticket()).await.unwrap();
    let state = match outcome {
        RunOutcome::Suspended(state, _) => state,
        RunOutcome::Complete(_) => panic!("fallback confidence should stay below threshold"),
    };
    assert_eq!(state.classification.label, FailureKind::Other);
    assert!(state.source_errors.is_empty());
    assert_eq!(state.ticket.status, TicketStatus::AwaitingInfo);
}

#[tokio::test]
async fn test_user_reply_feeds_resumption() {
    let engine = engine_with(
        StubReasoner {
            reply_boost: 0.5,
            ..StubReasoner::unsure()
        },
        vec![
            StubSource::healthy(SOURCE_ISSUE_TRACKER, 0.8),
            StubSource::healthy(SOURCE_KNOWLEDGE_BASE, 0.7),
        ],
    );

    let outcome = engine.run(sparse_ticket()).await.unwrap();
    let mut ticket = match outcome {
        RunOutcome::Suspended(state, _) => state.ticket,
        RunOutcome::Complete(_) => panic!("first run should suspend"),
    };

    ticket.append(user_reply(
        "Here it is: error: failed to get `leftpad` (HTTP 404)",
    ));

    let outcome = engine.run(ticket).await.unwrap();
    let state = match outcome {
        RunOutcome::Complete(state) => state,
        RunOutcome::Suspended(..) => panic!("reply should converge the run"),
    };

    assert_eq!(state.ticket.status, TicketStatus::Resolved);
    // The question round and the reply are still in the log — append-only.
    assert_eq!(question_entries(&state.ticket), 1);
    assert!(state
        .ticket
        .exchange_log
        .iter()
        .any(|entry| entry.speaker == Speaker::User));
}

#[tokio::test]
async fn test_user_skip_consumes_remaining_rounds() {
    let engine = engine_with(
        StubReasoner::unsure(),
        vec![
            StubSource::healthy(SOURCE_ISSUE_TRACKER, 0.2),
            StubSource::healthy(SOURCE_KNOWLEDGE_BASE, 0.1),
        ],
    );

    let outcome = engine.run(sparse_ticket()).await.unwrap();
    let mut ticket = match outcome {
        RunOutcome::Suspended(state, _) => state.ticket,
        RunOutcome::Complete(_) => panic!("first run should suspend"),
    };

    ticket.append(user_reply("Sorry, I don't have the logs"));

    // Confidence is still low, the cap is not reached, but the reporter
    // cannot provide more — resolve with what we have.
    let outcome = engine.run(ticket).await.unwrap();
    let state = match outcome {
        RunOutcome::Complete(state) => state,
        RunOutcome::Suspended(..) => panic!("skip must force resolution"),
    };

    assert_eq!(state.ticket.status, TicketStatus::Resolved);
    assert!(state
        .ticket
        .exchange_log
        .last()
        .unwrap()
        .body
        .contains("Low confidence"));
}

#[tokio::test]
async fn test_resolved_ticket_roundtrips_through_record_format() {
    let engine = engine_with(
        StubReasoner::confident(),
        vec![
            StubSource::healthy(SOURCE_ISSUE_TRACKER, 0.8),
            StubSource::healthy(SOURCE_KNOWLEDGE_BASE, 0.7),
        ],
    );

    let state = engine.run(dependency_ticket()).await.unwrap().into_state();
    let parsed = parse_ticket(&state.ticket.id, &render_ticket(&state.ticket));

    assert_eq!(parsed, state.ticket);
    // The structured payload survived the trip.
    let last = parsed.exchange_log.last().unwrap();
    assert!(last.diagnosis.is_some());
}

#[tokio::test]
async fn test_findings_keyed_by_owning_source() {
    let engine = engine_with(
        StubReasoner::confident(),
        vec![
            StubSource::healthy(SOURCE_ISSUE_TRACKER, 0.8),
            StubSource::healthy(SOURCE_KNOWLEDGE_BASE, 0.7),
        ],
    );

    let state = engine.run(dependency_ticket()).await.unwrap().into_state();

    let keys: Vec<&String> = state.findings.keys().collect();
    assert_eq!(keys, vec![SOURCE_ISSUE_TRACKER, SOURCE_KNOWLEDGE_BASE]);
    assert_eq!(
        state.findings[SOURCE_ISSUE_TRACKER][0].title,
        format!("{SOURCE_ISSUE_TRACKER} evidence")
    );
    assert_eq!(state.source_signals.len(), 2);
}
