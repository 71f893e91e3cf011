use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wreckit::cmd;

#[derive(Parser)]
#[command(name = "wreckit")]
#[command(version, about = "Backlog-to-pull-request orchestrator")]
struct Cli {
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize `.wreckit/` in the current version-controlled working copy.
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Add items from free text (external collaborator; not implemented).
    Ideas {
        text: Option<String>,
    },
    /// Create one `raw` item directly.
    Add {
        title: String,
        #[arg(long, default_value = "")]
        overview: String,
    },
    /// Read-only workspace summary.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Read-only listing of every item.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Read-only detail for one item.
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Drive one item to terminal through the phase runner, repeatedly.
    Run {
        id: String,
    },
    /// Drive exactly one phase for one item.
    Phase {
        phase: String,
        id: String,
        #[arg(long)]
        force: bool,
    },
    /// Advance the lowest-id runnable item by one phase.
    Next,
    /// Drive every runnable item to terminal.
    All {
        #[arg(long)]
        parallel: Option<usize>,
    },
    /// Reset a `done` item to `implementing` and force-reset/force-push the
    /// base branch. Explicit and destructive.
    Rollback {
        id: String,
        #[arg(long)]
        yes: bool,
    },
    /// Workspace diagnostics (external collaborator; not implemented).
    Doctor,
    /// Durable-storage consistency check (external collaborator; not
    /// implemented).
    CheckIntegrity,
    /// Long-running supervision (external collaborator; not implemented).
    Watchdog,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir {
        Some(dir) => dir,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("error: failed to resolve current directory: {e}");
                return ExitCode::FAILURE;
            }
        },
    };

    let result = dispatch(&project_dir, cli.command).await;
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(project_dir: &std::path::Path, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init { force } => cmd::init(project_dir, force),
        Commands::Ideas { text } => cmd::ideas(text.as_deref()),
        Commands::Add { title, overview } => cmd::add(project_dir, &title, &overview),
        Commands::Status { json } => cmd::status(project_dir, json),
        Commands::List { json } => cmd::list(project_dir, json),
        Commands::Show { id, json } => cmd::show(project_dir, &id, json),
        Commands::Run { id } => cmd::run(project_dir, &id).await,
        Commands::Phase { phase, id, force } => cmd::phase(project_dir, &phase, &id, force).await,
        Commands::Next => cmd::next(project_dir).await,
        Commands::All { parallel } => cmd::all(project_dir, parallel).await,
        Commands::Rollback { id, yes } => {
            if !yes {
                let confirm = dialoguer::Confirm::new()
                    .with_prompt(format!(
                        "rollback {id}: this force-resets and force-pushes the base branch. Continue?"
                    ))
                    .default(false)
                    .interact()
                    .unwrap_or(false);
                if !confirm {
                    println!("rollback cancelled");
                    return Ok(());
                }
            }
            cmd::rollback(project_dir, &id)
        }
        Commands::Doctor => cmd::doctor(project_dir),
        Commands::CheckIntegrity => cmd::check_integrity(project_dir),
        Commands::Watchdog => cmd::watchdog(project_dir),
    }
}
