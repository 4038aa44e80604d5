use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use triage_agents::config::TriageConfig;
use triage_agents::engine::{RunOutcome, WorkflowEngine};
use triage_agents::nodes::intake;
use triage_agents::reasoning::{LlmReasoner, ReasoningService};
use triage_agents::research::issues::IssueTrackerSource;
use triage_agents::research::knowledge::KnowledgeBaseSource;
use triage_agents::research::ResearchSource;
use triage_agents::state::Ticket;
use triage_agents::ticket_store::TicketStore;

#[derive(Parser)]
#[command(
    name = "triage-agents",
    about = "Diagnostic triage for incoming bug reports"
)]
struct Cli {
    /// TOML config file overriding environment defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the engine over one stored ticket record.
    Ticket {
        id: String,
        /// Reset the exchange log before running (reproducible re-runs).
        #[arg(long, short)]
        clean: bool,
    },
    /// List available ticket ids.
    List,
    /// One-shot triage of a free-text report (argument or stdin).
    Report { text: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = TriageConfig::load(cli.config.as_deref())?;
    let store = TicketStore::new(config.tickets_dir.clone());

    match cli.command {
        Command::List => {
            let ids = store.list()?;
            if ids.is_empty() {
                println!("No tickets found in {}", config.tickets_dir.display());
            }
            for id in ids {
                println!("{id}");
            }
        }

        Command::Ticket { id, clean } => {
            let ticket = if clean {
                store.clean(&id)?
            } else {
                store.load(&id)?
            };
            let (engine, _) = build_engine(config)?;
            run_and_persist(&engine, &store, ticket).await?;
        }

        Command::Report { text } => {
            let raw = match text {
                Some(text) => text,
                None => std::io::read_to_string(std::io::stdin())?,
            };
            if raw.trim().is_empty() {
                anyhow::bail!("empty report: pass the bug report as an argument or on stdin");
            }

            let (engine, reasoner) = build_engine(config)?;
            let report = intake::ingest(reasoner.as_ref(), &raw).await;
            let id = uuid::Uuid::new_v4().to_string();
            let ticket = Ticket::new(
                &id,
                &report.title,
                &report.description,
                &report.reproduction,
                &report.error_text,
            );
            info!(id = %ticket.id, title = %ticket.title, "new ticket synthesized");

            run_and_persist(&engine, &store, ticket).await?;
        }
    }

    Ok(())
}

/// Wire the live collaborators into an engine.
fn build_engine(config: TriageConfig) -> Result<(WorkflowEngine, Arc<dyn ReasoningService>)> {
    let reasoner: Arc<dyn ReasoningService> = Arc::new(LlmReasoner::new(&config.reasoning)?);
    let sources: Vec<Arc<dyn ResearchSource>> = vec![
        Arc::new(IssueTrackerSource::new(&config.issue_tracker)?),
        Arc::new(KnowledgeBaseSource::new(config.kb_path.clone())),
    ];

    info!(
        reasoning = %config.reasoning.url,
        model = %config.reasoning.model,
        sources = sources.len(),
        "triage engine starting"
    );

    Ok((
        WorkflowEngine::new(config, Arc::clone(&reasoner), sources),
        reasoner,
    ))
}

/// Run the engine, persist the updated record, print the outcome.
async fn run_and_persist(
    engine: &WorkflowEngine,
    store: &TicketStore,
    ticket: Ticket,
) -> Result<()> {
    let id = ticket.id.clone();
    let outcome = engine.run(ticket).await?;
    store.save(&outcome.state().ticket)?;

    match &outcome {
        RunOutcome::Complete(state) => {
            if let Some(entry) = state.ticket.exchange_log.last() {
                println!("{}", entry.body);
            }
            println!("\nTicket {id}: {}", state.ticket.status);
        }
        RunOutcome::Suspended(state, question) => {
            println!("{question}");
            println!(
                "\nTicket {id}: {} — add your reply to the record and re-run",
                state.ticket.status
            );
        }
    }
    Ok(())
}
