//! Workflow phase machine — explicit phases and legal transition guards.
//!
//! The engine models the diagnostic pipeline as a graph of named phases.
//! Every step goes through `advance()` so that:
//! 1. Every transition is auditable and logged.
//! 2. Illegal routings are caught as typed errors, not silent drift.
//! 3. A run's exact phase sequence can be reconstructed from the log.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The set of workflow phases.
///
/// A fresh run starts at `Intake`; a resumed run starts at `Classifying`
/// because the original report is immutable and never re-extracted. Every
/// run terminates at `Resolved`, `AwaitingInfo`, or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Deriving the structured report from the raw ticket.
    Intake,
    /// Classifying the failure kind.
    Classifying,
    /// Fan-out over the research sources.
    Researching,
    /// Ranking hypotheses and computing the confidence breakdown.
    Diagnosing,
    /// Confidence-gated routing decision.
    Routing,
    /// Producing the resolution plan.
    Resolving,
    /// Formulating a clarifying question for the reporter.
    GatheringInfo,
    /// Suspended waiting on the reporter — terminal for this invocation.
    AwaitingInfo,
    /// Resolution emitted — terminal.
    Resolved,
    /// Fatal diagnostic failure — terminal.
    Failed,
}

impl Phase {
    /// Whether this phase ends the invocation (no further transitions).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::AwaitingInfo | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intake => write!(f, "Intake"),
            Self::Classifying => write!(f, "Classifying"),
            Self::Researching => write!(f, "Researching"),
            Self::Diagnosing => write!(f, "Diagnosing"),
            Self::Routing => write!(f, "Routing"),
            Self::Resolving => write!(f, "Resolving"),
            Self::GatheringInfo => write!(f, "GatheringInfo"),
            Self::AwaitingInfo => write!(f, "AwaitingInfo"),
            Self::Resolved => write!(f, "Resolved"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Legal transitions between phases.
///
/// ```text
/// Intake → Classifying
/// Classifying → Researching
/// Researching → Diagnosing
/// Diagnosing → Routing
/// Routing → Resolving | GatheringInfo
/// Resolving → Resolved
/// GatheringInfo → AwaitingInfo
/// ```
fn is_legal_transition(from: Phase, to: Phase) -> bool {
    use Phase::*;

    // Any non-terminal phase can transition to Failed.
    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Intake, Classifying)
            | (Classifying, Researching)
            | (Researching, Diagnosing)
            | (Diagnosing, Routing)
            // Router: threshold cleared (or cap exhausted) → resolve;
            // otherwise ask the reporter
            | (Routing, Resolving)
            | (Routing, GatheringInfo)
            | (Resolving, Resolved)
            | (GatheringInfo, AwaitingInfo)
    )
}

/// A single recorded phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: Phase,
    pub to: Phase,
    /// Information-gathering round at the time of transition.
    pub iteration: u32,
    /// Milliseconds since the machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: Phase,
    pub to: Phase,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal phase transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// The workflow phase machine.
///
/// Tracks the current phase, enforces legal transitions, and keeps a
/// complete transition log for diagnostics.
pub struct StateMachine {
    current: Phase,
    iteration: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    /// Machine for a fresh ticket, starting at `Intake`.
    pub fn new() -> Self {
        Self::starting_at(Phase::Intake)
    }

    /// Machine for a resumed ticket, starting at `Classifying`.
    pub fn resuming() -> Self {
        Self::starting_at(Phase::Classifying)
    }

    fn starting_at(phase: Phase) -> Self {
        Self {
            current: phase,
            iteration: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Set the information-gathering round counter (derived from the
    /// exchange log by the engine).
    pub fn set_iteration(&mut self, iteration: u32) {
        self.iteration = iteration;
    }

    /// Attempt to advance to the next phase.
    pub fn advance(&mut self, to: Phase, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            iteration: self.iteration,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(
            from = %self.current,
            to = %to,
            iteration = self.iteration,
            "Phase transition"
        );

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    /// Transition to `Failed` from any non-terminal phase.
    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(Phase::Failed, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// One-line summary of the machine's history.
    pub fn summary(&self) -> String {
        let start = self
            .transitions
            .first()
            .map(|t| t.from)
            .unwrap_or(self.current);
        let path: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut summary = format!(
            "{} → {} ({}ms, {} transitions)",
            start,
            self.current,
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        );
        if !path.is_empty() {
            summary.push_str(&format!(" [{}]", path.join(" → ")));
        }
        summary
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
