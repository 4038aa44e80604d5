//! Error taxonomy for the triage engine.
//!
//! Three tiers, matching how failures are handled:
//! - Input problems (sparse/malformed reports) are not errors at all —
//!   intake defaults missing fields to empty and continues.
//! - Collaborator failures (a research source or the reasoning service)
//!   are absorbed at the node boundary and lower confidence instead.
//! - Everything below is fatal and surfaced to the caller: persistence,
//!   configuration, phase violations, and the case where every
//!   collaborator failed in the same run.

use thiserror::Error;

use crate::state_machine::IllegalTransition;

#[derive(Debug, Error)]
pub enum TriageError {
    /// Ticket record could not be read or written. The prior persisted
    /// record is left untouched.
    #[error("ticket store: {context}: {source}")]
    Store {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// No record exists for the requested ticket id.
    #[error("ticket not found: {0}")]
    UnknownTicket(String),

    /// Invalid configuration, rejected at startup before any ticket is
    /// touched.
    #[error("configuration: {0}")]
    Config(String),

    /// The reasoning service and every research source failed in the same
    /// run — nothing is left to diagnose with.
    #[error("diagnostic failure: no collaborator produced a usable signal ({detail})")]
    AllCollaboratorsFailed { detail: String },

    /// The resolution planner produced a plan with no steps.
    #[error("resolution plan contained no steps")]
    EmptyResolution,

    /// The engine attempted an illegal phase transition. Indicates a bug
    /// in the routing logic, not bad input.
    #[error("workflow phase violation: {0}")]
    Phase(#[from] IllegalTransition),
}

impl TriageError {
    /// Helper for wrapping I/O failures with their operation context.
    pub fn store(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Store {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::Phase;

    #[test]
    fn test_store_error_display_includes_context() {
        let err = TriageError::store(
            "writing ticket_001.md",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = err.to_string();
        assert!(text.contains("ticket_001.md"));
        assert!(text.contains("denied"));
    }

    #[test]
    fn test_phase_violation_converts() {
        let err: TriageError = IllegalTransition {
            from: Phase::Resolved,
            to: Phase::Classifying,
        }
        .into();
        assert!(err.to_string().contains("Resolved"));
    }
}
