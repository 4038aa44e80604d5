//! Durable ticket records.
//!
//! One markdown file per ticket (`ticket_<id>.md`) holding the immutable
//! report fields, the status, and the append-only exchange log. The format
//! must round-trip exactly: parse(render(t)) == t, including entry order
//! and bodies. Records are written whole through a temp file + rename so a
//! failed write never corrupts the previous record.
//!
//! ## Record layout
//!
//! ```text
//! # Ticket <id>
//!
//! **Status:** Open
//!
//! ## Title
//! ## Description
//! ## Reproduction
//! ## Error Output
//! ## Exchange Log
//!
//! ### [Agent] - 2026-08-07 10:00:00
//! <body, may embed a rendered report>
//! <!-- diagnosis {json} -->
//! ```
//!
//! Entry bodies may contain `###`-level headings of their own (rendered
//! reports do); the entry splitter only matches the speaker-tag header
//! form. Field content is stored trimmed — that is what makes the
//! round-trip exact.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::TriageError;
use crate::state::{Diagnosis, ExchangeEntry, Speaker, Ticket, TicketStatus};

static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\*\*Status:\*\*\s*(\S+)\s*$").expect("STATUS_RE regex should compile")
});

static EXCHANGE_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^## Exchange Log\s*$").expect("EXCHANGE_HEADER_RE regex should compile")
});

static ENTRY_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^### \[(Agent|User)\] - (.+)$").expect("ENTRY_HEADER_RE regex should compile")
});

static DIAGNOSIS_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^<!-- diagnosis (.+) -->\s*$")
        .expect("DIAGNOSIS_LINE_RE regex should compile")
});

/// File-backed store for ticket records.
pub struct TicketStore {
    dir: PathBuf,
}

impl TicketStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("ticket_{id}.md"))
    }

    /// Load one ticket record. A missing record is `UnknownTicket`; any
    /// other I/O failure is a fatal store error.
    pub fn load(&self, id: &str) -> Result<Ticket, TriageError> {
        let path = self.path_for(id);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TriageError::UnknownTicket(id.to_string())
            } else {
                TriageError::store(format!("reading {}", path.display()), e)
            }
        })?;
        Ok(parse_ticket(id, &content))
    }

    /// Persist one ticket record, whole, atomically.
    pub fn save(&self, ticket: &Ticket) -> Result<(), TriageError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| TriageError::store(format!("creating {}", self.dir.display()), e))?;

        let path = self.path_for(&ticket.id);
        let tmp = self.dir.join(format!(".ticket_{}.md.tmp", ticket.id));
        std::fs::write(&tmp, render_ticket(ticket))
            .map_err(|e| TriageError::store(format!("writing {}", tmp.display()), e))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| TriageError::store(format!("renaming into {}", path.display()), e))?;

        tracing::debug!(id = %ticket.id, path = %path.display(), "ticket saved");
        Ok(())
    }

    /// Enumerate available ticket ids, sorted.
    pub fn list(&self) -> Result<Vec<String>, TriageError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(TriageError::store(
                    format!("listing {}", self.dir.display()),
                    e,
                ))
            }
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| TriageError::store(format!("listing {}", self.dir.display()), e))?;
            if let Some(id) = id_from_path(&entry.path()) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Reset a ticket's exchange log and reopen it (the `--clean` path,
    /// used for reproducible re-runs).
    pub fn clean(&self, id: &str) -> Result<Ticket, TriageError> {
        let mut ticket = self.load(id)?;
        ticket.exchange_log.clear();
        ticket.status = TicketStatus::Open;
        self.save(&ticket)?;
        Ok(ticket)
    }
}

fn id_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let id = name.strip_prefix("ticket_")?.strip_suffix(".md")?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

// ---------------------------------------------------------------------------
// Record format
// ---------------------------------------------------------------------------

/// Render a ticket into its markdown record.
pub fn render_ticket(ticket: &Ticket) -> String {
    let mut out = format!("# Ticket {}\n\n**Status:** {}\n", ticket.id, ticket.status);

    push_section(&mut out, "Title", &ticket.title);
    push_section(&mut out, "Description", &ticket.description);
    push_section(&mut out, "Reproduction", &ticket.reproduction);
    push_section(&mut out, "Error Output", &ticket.error_text);

    out.push_str("\n## Exchange Log\n");
    for entry in &ticket.exchange_log {
        out.push_str(&format!(
            "\n### [{}] - {}\n\n{}\n",
            entry.speaker, entry.timestamp, entry.body
        ));
        if let Some(diagnosis) = &entry.diagnosis {
            if let Ok(json) = serde_json::to_string(diagnosis) {
                out.push_str(&format!("\n<!-- diagnosis {json} -->\n"));
            }
        }
    }
    out
}

fn push_section(out: &mut String, name: &str, content: &str) {
    out.push_str(&format!("\n## {name}\n"));
    if !content.is_empty() {
        out.push('\n');
        out.push_str(content);
        out.push('\n');
    }
}

/// Parse a markdown record back into a ticket. Lenient: missing sections
/// become empty fields, an unknown status becomes `Open`. Malformed input
/// is an input problem, never an error.
pub fn parse_ticket(id: &str, content: &str) -> Ticket {
    let (head, tail) = match EXCHANGE_HEADER_RE.find(content) {
        Some(m) => (&content[..m.start()], &content[m.end()..]),
        None => (content, ""),
    };

    let status = STATUS_RE
        .captures(head)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(TicketStatus::Open);

    Ticket {
        id: id.to_string(),
        status,
        title: section_content(head, "Title"),
        description: section_content(head, "Description"),
        reproduction: section_content(head, "Reproduction"),
        error_text: section_content(head, "Error Output"),
        exchange_log: parse_exchange_log(tail),
    }
}

/// Extract one `## <name>` section's content from the record head.
fn section_content(head: &str, name: &str) -> String {
    let mut collecting = false;
    let mut lines = Vec::new();
    for line in head.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            if collecting {
                break;
            }
            collecting = heading.trim() == name;
            continue;
        }
        if collecting {
            lines.push(line);
        }
    }
    lines.join("\n").trim().to_string()
}

fn parse_exchange_log(tail: &str) -> Vec<ExchangeEntry> {
    let headers: Vec<_> = ENTRY_HEADER_RE.captures_iter(tail).collect();
    let positions: Vec<_> = ENTRY_HEADER_RE.find_iter(tail).collect();

    let mut entries = Vec::new();
    for (i, captures) in headers.iter().enumerate() {
        let speaker = match &captures[1] {
            "Agent" => Speaker::Agent,
            _ => Speaker::User,
        };
        let timestamp = captures[2].trim().to_string();

        let body_start = positions[i].end();
        let body_end = positions
            .get(i + 1)
            .map(|m| m.start())
            .unwrap_or(tail.len());
        let raw_body = &tail[body_start..body_end];

        let (body, diagnosis) = split_diagnosis(raw_body);

        entries.push(ExchangeEntry {
            speaker,
            timestamp,
            body,
            diagnosis,
        });
    }
    entries
}

/// Split an entry body from its optional machine-readable diagnosis line.
fn split_diagnosis(raw: &str) -> (String, Option<Diagnosis>) {
    if let Some(captures) = DIAGNOSIS_LINE_RE.captures(raw) {
        let diagnosis = serde_json::from_str(&captures[1]).ok();
        let whole = captures.get(0).map(|m| (m.start(), m.end()));
        if let Some((start, end)) = whole {
            let mut body = String::with_capacity(raw.len());
            body.push_str(&raw[..start]);
            body.push_str(&raw[end..]);
            return (body.trim().to_string(), diagnosis);
        }
    }
    (raw.trim().to_string(), None)
}
