//! Resolution — turn the selected hypothesis into an ordered fix plan.
//!
//! Invoked only when the router chooses resolution. A reasoning outage
//! degrades to a generic review plan; a response that parses but contains
//! zero steps is a diagnostic failure — an empty plan is never returned
//! silently.

use tracing::warn;

use crate::error::TriageError;
use crate::reasoning::ReasoningService;
use crate::state::{Diagnosis, ResolutionPlan, Step, StructuredReport};

pub async fn resolve(
    reasoner: &dyn ReasoningService,
    diagnosis: &Diagnosis,
    report: &StructuredReport,
) -> Result<ResolutionPlan, TriageError> {
    match reasoner.plan_resolution(diagnosis, report).await {
        Ok(output) => {
            if output.steps.is_empty() {
                return Err(TriageError::EmptyResolution);
            }
            Ok(ResolutionPlan {
                steps: output.steps,
            })
        }
        Err(e) => {
            warn!(error = %e, "resolution planning unavailable, using fallback plan");
            Ok(fallback_plan())
        }
    }
}

/// Generic plan used when the reasoning service is unavailable.
fn fallback_plan() -> ResolutionPlan {
    ResolutionPlan {
        steps: vec![
            Step {
                action: "Review the error message and stack trace carefully".into(),
                rationale: "Understanding the exact failure is the first step".into(),
                expected: "The failing line or function is identified".into(),
            },
            Step {
                action: "Search the project's issue tracker for the error text".into(),
                rationale: "Others may have hit and solved the same failure".into(),
                expected: "A matching issue or workaround is found".into(),
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::reasoning::{
        ClassifierOutput, DiagnosisContext, DiagnosisOutput, ReasoningError, ResolutionOutput,
    };
    use crate::state::{ConfidenceBreakdown, ExchangeEntry};

    enum PlanBehavior {
        Steps(Vec<Step>),
        Outage,
    }

    struct PlanReasoner {
        behavior: PlanBehavior,
    }

    #[async_trait]
    impl ReasoningService for PlanReasoner {
        async fn extract_report(&self, _raw: &str) -> Result<StructuredReport, ReasoningError> {
            Err(ReasoningError::Transport("unused".into()))
        }

        async fn classify(
            &self,
            _report: &StructuredReport,
            _log: &[ExchangeEntry],
        ) -> Result<ClassifierOutput, ReasoningError> {
            Err(ReasoningError::Transport("unused".into()))
        }

        async fn hypothesize(
            &self,
            _ctx: DiagnosisContext<'_>,
        ) -> Result<DiagnosisOutput, ReasoningError> {
            Err(ReasoningError::Transport("unused".into()))
        }

        async fn formulate_question(
            &self,
            _report: &StructuredReport,
            _missing: &[String],
            _round: u32,
        ) -> Result<String, ReasoningError> {
            Err(ReasoningError::Transport("unused".into()))
        }

        async fn plan_resolution(
            &self,
            _diagnosis: &Diagnosis,
            _report: &StructuredReport,
        ) -> Result<ResolutionOutput, ReasoningError> {
            match &self.behavior {
                PlanBehavior::Steps(steps) => Ok(ResolutionOutput {
                    steps: steps.clone(),
                }),
                PlanBehavior::Outage => Err(ReasoningError::Transport("stubbed outage".into())),
            }
        }
    }

    fn empty_diagnosis() -> Diagnosis {
        Diagnosis {
            hypotheses: Vec::new(),
            selected: 0,
            breakdown: ConfidenceBreakdown::default(),
        }
    }

    #[tokio::test]
    async fn test_resolve_returns_plan() {
        let reasoner = PlanReasoner {
            behavior: PlanBehavior::Steps(vec![Step {
                action: "Run cargo update".into(),
                rationale: "Refreshes the registry index".into(),
                expected: "The 404 disappears".into(),
            }]),
        };
        let plan = resolve(&reasoner, &empty_diagnosis(), &StructuredReport::default())
            .await
            .unwrap();
        assert_eq!(plan.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_steps_is_an_error() {
        let reasoner = PlanReasoner {
            behavior: PlanBehavior::Steps(Vec::new()),
        };
        let err = resolve(&reasoner, &empty_diagnosis(), &StructuredReport::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::EmptyResolution));
    }

    #[tokio::test]
    async fn test_outage_falls_back_to_generic_plan() {
        let reasoner = PlanReasoner {
            behavior: PlanBehavior::Outage,
        };
        let plan = resolve(&reasoner, &empty_diagnosis(), &StructuredReport::default())
            .await
            .unwrap();
        assert!(!plan.steps.is_empty());
    }
}
