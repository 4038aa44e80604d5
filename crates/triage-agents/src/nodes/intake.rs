//! Intake — derive a structured report from raw material.
//!
//! Intake must never fail: missing sections produce empty fields. For
//! ticket records the report fields are already structured and immutable,
//! so derivation is a cheap, idempotent copy plus library-hint detection.
//! For free-text reports (interactive mode) the reasoning service does the
//! extraction, with a pure-heuristic fallback when it is unavailable.

use std::sync::LazyLock;

use regex::Regex;

use crate::reasoning::ReasoningService;
use crate::state::{StructuredReport, Ticket};

const TITLE_LEN: usize = 80;
const ERROR_LINES_CAP: usize = 10;

static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[a-zA-Z0-9_]*\n(.*?)```").expect("FENCED_BLOCK_RE regex should compile")
});

static ERROR_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(error|panic|panicked|exception|traceback|fatal)\b")
        .expect("ERROR_LINE_RE regex should compile")
});

static USE_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*use\s+([a-z_][a-z0-9_]*)").expect("USE_DECL_RE regex should compile")
});

static DEP_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*([a-z0-9_-]{2,})\s*=\s*["{]"#).expect("DEP_LINE_RE regex should compile")
});

/// Names that look like crates in code but never are the culprit.
const HINT_STOPLIST: &[&str] = &["std", "core", "alloc", "crate", "self", "super", "version"];

/// Derive the structured report from a ticket's immutable fields.
///
/// Byte-identical on every invocation for the same ticket, which is what
/// makes re-running the pipeline after a suspension safe.
pub fn report_from_ticket(ticket: &Ticket) -> StructuredReport {
    let hint_text = format!("{}\n{}\n{}", ticket.description, ticket.reproduction, ticket.error_text);
    StructuredReport {
        title: ticket.title.clone(),
        description: ticket.description.clone(),
        reproduction: ticket.reproduction.clone(),
        error_text: ticket.error_text.clone(),
        crate_hints: detect_crate_hints(&hint_text),
    }
}

/// Heuristic extraction from raw free text. Used directly when the
/// reasoning service is unavailable, and to backfill fields it left empty.
pub fn report_from_free_text(raw: &str) -> StructuredReport {
    let raw = raw.trim();

    let title = raw
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| clip(line.trim(), TITLE_LEN))
        .unwrap_or_default();

    let reproduction = FENCED_BLOCK_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let error_lines: Vec<&str> = raw
        .lines()
        .filter(|line| ERROR_LINE_RE.is_match(line))
        .take(ERROR_LINES_CAP)
        .collect();

    StructuredReport {
        title,
        description: raw.to_string(),
        reproduction,
        error_text: error_lines.join("\n").trim().to_string(),
        crate_hints: detect_crate_hints(raw),
    }
}

/// Extract a structured report via the reasoning service, falling back to
/// heuristics when it fails or leaves fields empty. The raw text is always
/// preserved as the description.
pub async fn ingest(reasoner: &dyn ReasoningService, raw: &str) -> StructuredReport {
    let heuristic = report_from_free_text(raw);

    let mut report = match reasoner.extract_report(raw).await {
        Ok(extracted) => extracted,
        Err(e) => {
            tracing::warn!(error = %e, "intake extraction unavailable, using heuristics");
            return heuristic;
        }
    };

    if report.title.is_empty() {
        report.title = heuristic.title;
    }
    if report.reproduction.is_empty() {
        report.reproduction = heuristic.reproduction;
    }
    if report.error_text.is_empty() {
        report.error_text = heuristic.error_text;
    }
    report.description = raw.trim().to_string();
    for hint in heuristic.crate_hints {
        if !report.crate_hints.contains(&hint) {
            report.crate_hints.push(hint);
        }
    }
    report
}

/// Candidate library/component names mentioned in the text.
pub fn detect_crate_hints(text: &str) -> Vec<String> {
    let mut hints = Vec::new();
    for captures in USE_DECL_RE.captures_iter(text).chain(DEP_LINE_RE.captures_iter(text)) {
        if let Some(name) = captures.get(1) {
            let name = name.as_str().to_string();
            if !HINT_STOPLIST.contains(&name.as_str()) && !hints.contains(&name) {
                hints.push(name);
            }
        }
    }
    hints
}

fn clip(text: &str, max: usize) -> String {
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
    fn test_report_from_ticket_is_idempotent() {
        let ticket = Ticket::new(
            "001",
            "Build fails",
            "use tokio::time; the build fails",
            "cargo build",
            "error[E0433]: failed to resolve",
        );
        let first = report_from_ticket(&ticket);
        let second = report_from_ticket(&ticket);
        assert_eq!(first, second);
        assert_eq!(first.title, "Build fails");
        assert!(first.crate_hints.contains(&"tokio".to_string()));
    }

    #[test]
    fn test_free_text_extracts_fenced_block_and_errors() {
        let raw = "Install explodes\n\nSteps:\n```sh\ncargo add leftpad\n```\n\
                   error: failed to get `leftpad` (HTTP 404)\n";
        let report = report_from_free_text(raw);
        assert_eq!(report.title, "Install explodes");
        assert_eq!(report.reproduction, "cargo add leftpad");
        assert!(report.error_text.contains("HTTP 404"));
        assert_eq!(report.description, raw.trim());
    }

    #[test]
    fn test_free_text_empty_input_gives_empty_fields() {
        let report = report_from_free_text("   \n  ");
        assert!(report.title.is_empty());
        assert!(report.reproduction.is_empty());
        assert!(report.error_text.is_empty());
        assert!(report.is_sparse());
    }

    #[test]
    fn test_free_text_without_error_lines_is_sparse() {
        let report = report_from_free_text("The button renders in the wrong place.");
        assert!(report.is_sparse());
        assert_eq!(report.title, "The button renders in the wrong place.");
    }

    #[test]
    fn test_detect_crate_hints_from_use_and_dep_lines() {
        let text = "use serde_json::Value;\n\n[dependencies]\nreqwest = { version = \"0.12\" }\n";
        let hints = detect_crate_hints(text);
        assert!(hints.contains(&"serde_json".to_string()));
        assert!(hints.contains(&"reqwest".to_string()));
    }

    #[test]
    fn test_detect_crate_hints_skips_stoplist_and_dedupes() {
        let text = "use std::fmt;\nuse tokio::task;\nuse tokio::time;\n";
        let hints = detect_crate_hints(text);
        assert_eq!(hints, vec!["tokio".to_string()]);
    }

    #[test]
    fn test_clip_respects_char_boundary() {
        let clipped = clip("日本語のタイトル", 5);
        assert!(clipped.len() <= 5);
    }
}
