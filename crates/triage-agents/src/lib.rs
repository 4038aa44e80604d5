//! Diagnostic triage engine for incoming bug reports.
//!
//! A ticket flows through a directed graph of stages: intake derives a
//! structured report, the classifier labels it, two research sources are
//! queried in parallel for corroborating evidence, the diagnoser ranks
//! root-cause hypotheses with a weighted confidence breakdown, and the
//! router either emits a resolution plan or asks the reporter a clarifying
//! question and suspends. Suspended tickets resume on a later invocation
//! with the reporter's reply folded into the exchange log — the durable
//! ticket record is the only cross-invocation memory.
//!
//! The reasoning service and the research sources sit behind narrow traits
//! ([`reasoning::ReasoningService`], [`research::ResearchSource`]) so the
//! engine is deterministic under test stubs.

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod error;
pub mod nodes;
pub mod prompts;
pub mod reasoning;
pub mod report;
pub mod research;
pub mod state;
pub mod state_machine;
pub mod ticket_store;
