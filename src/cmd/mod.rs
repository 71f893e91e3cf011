//! CLI subcommand handlers.
//!
//! One function per command, `anyhow::Result` throughout, printing directly
//! to stdout rather than returning a rendered string.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;

use crate::agent;
use crate::config::Config;
use crate::healing::HealingController;
use crate::host::GhCliHost;
use crate::init;
use crate::item::{Item, ItemState};
use crate::orchestrator::events::ProgressEvent;
use crate::orchestrator::Orchestrator;
use crate::phase::PhaseKind;
use crate::runner::{PhaseRunner, RunOutcome};
use crate::store::Store;
use crate::ui::ProgressReporter;
use crate::util;
use crate::vcs;

pub fn init(project_dir: &Path, force: bool) -> Result<()> {
    let result = init::init_project(project_dir, force)?;
    println!("initialized {}", result.wreckit_dir.display());
    Ok(())
}

/// `ideas` is the external idea-ingest collaborator — wreckit's
/// job starts once an item exists in `raw` state, not with turning free text
/// into one.
pub fn ideas(_text: Option<&str>) -> Result<()> {
    bail!("ideas: not implemented; idea ingestion is an external collaborator")
}

/// Not a documented command, but the minimal on-ramp `status`/`run` need to
/// have something to operate on: creates one `raw` item directly, the way a
/// real ingest step eventually would.
pub fn add(project_dir: &Path, title: &str, overview: &str) -> Result<()> {
    let config = Config::load(project_dir)?;
    let store = Store::new(&config.wreckit_dir);
    let ordinal = store
        .list_items()?
        .iter()
        .filter_map(|i| util::parse_ordinal(&i.id))
        .max()
        .unwrap_or(0)
        + 1;
    let id = util::format_item_id(ordinal, title);
    let item = Item::new(&id, title, overview);
    store.create_item(&item)?;
    println!("created {id}");
    Ok(())
}

fn load(project_dir: &Path) -> Result<(Config, Arc<Store>)> {
    let config = Config::load(project_dir)?;
    let store = Arc::new(Store::new(&config.wreckit_dir));
    Ok((config, store))
}

pub fn status(project_dir: &Path, json: bool) -> Result<()> {
    let (_config, store) = load(project_dir)?;
    let items = store.list_items()?;
    let counts = items.iter().fold(std::collections::HashMap::new(), |mut acc, i| {
        *acc.entry(i.state).or_insert(0u32) += 1;
        acc
    });

    if json {
        let body: serde_json::Value = serde_json::json!({
            "total": items.len(),
            "by_state": counts.iter().map(|(s, n)| (s.to_string(), n)).collect::<std::collections::HashMap<_, _>>(),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("{} items", items.len());
    for state in [
        ItemState::Raw,
        ItemState::Researched,
        ItemState::Planned,
        ItemState::Implementing,
        ItemState::InPr,
        ItemState::Done,
    ] {
        println!("  {state:<12} {}", counts.get(&state).copied().unwrap_or(0));
    }
    Ok(())
}

pub fn list(project_dir: &Path, json: bool) -> Result<()> {
    let (_config, store) = load(project_dir)?;
    let items = store.list_items()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    for item in items {
        println!("{:<24} {:<14} {}", item.id, item.state.to_string(), item.title);
    }
    Ok(())
}

pub fn show(project_dir: &Path, id: &str, json: bool) -> Result<()> {
    let (_config, store) = load(project_dir)?;
    let item = store.read_item(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    println!("id:          {}", item.id);
    println!("title:       {}", item.title);
    println!("state:       {}", item.state);
    println!("branch:      {}", item.branch.as_deref().unwrap_or("-"));
    println!("pr:          {}", item.pr_url.as_deref().unwrap_or("-"));
    println!("depends_on:  {:?}", item.depends_on);
    if let Some(err) = &item.last_error {
        println!("last_error:  {err}");
    }
    Ok(())
}

fn build_runner(config: Config, store: Arc<Store>) -> PhaseRunner {
    let agent = agent::factory::build(&config.agent);
    PhaseRunner::new(store, config, agent, Arc::new(GhCliHost))
}

/// Cancel on Ctrl-C so a long-running `run`/`all` invocation stops cleanly
/// (exits 0, not 1).
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}

/// `run <id>`: drive one item to terminal through C2 repeatedly.
pub async fn run(project_dir: &Path, id: &str) -> Result<()> {
    let (config, store) = load(project_dir)?;
    let runner = Arc::new(build_runner(config, store.clone()));
    let orchestrator = Orchestrator::new(store, runner);

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let reporter = tokio::spawn(ProgressReporter::new().run(rx));

    let mut healing = HealingController::default();
    let final_state = orchestrator
        .drive_item(id, &mut healing, Some(&tx), cancel_on_ctrl_c())
        .await?;
    drop(tx);
    let _ = reporter.await;

    println!("{id}: {final_state}");
    Ok(())
}

/// `phase <phase> <id>`: drive exactly one phase (C2 single-step).
pub async fn phase(project_dir: &Path, phase: &str, id: &str, force: bool) -> Result<()> {
    let phase: PhaseKind = phase.parse()?;
    let (config, store) = load(project_dir)?;
    let runner = build_runner(config, store);
    let mut healing = HealingController::default();

    let outcome = runner
        .run_phase(id, phase, force, &mut healing, None, CancellationToken::new())
        .await?;
    match outcome {
        RunOutcome::Skipped => println!("{id}: {phase} skipped (already at target)"),
        RunOutcome::Advanced { to } => println!("{id}: {phase} advanced to {to}"),
        RunOutcome::NotYetMergeable => println!("{id}: pull request not yet merged"),
    }
    Ok(())
}

/// `next`: advance the lowest-id runnable item one phase (C4 one-shot).
pub async fn next(project_dir: &Path) -> Result<()> {
    let (config, store) = load(project_dir)?;
    let runner = Arc::new(build_runner(config, store.clone()));
    let orchestrator = Orchestrator::new(store, runner);
    let mut healing = HealingController::default();

    match orchestrator
        .step_next(&mut healing, None, CancellationToken::new())
        .await?
    {
        Some((id, outcome)) => println!("{id}: {outcome:?}"),
        None => println!("nothing runnable"),
    }
    Ok(())
}

/// `all`: drive every runnable item through C4; `--parallel N` for the
/// worker pool.
pub async fn all(project_dir: &Path, parallel: Option<usize>) -> Result<()> {
    let (config, store) = load(project_dir)?;
    let runner = Arc::new(build_runner(config, store.clone()));
    let orchestrator = Arc::new(Orchestrator::new(store, runner));

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let reporter = tokio::spawn(ProgressReporter::new().run(rx));
    let cancel = cancel_on_ctrl_c();

    match parallel {
        Some(n) if n > 1 => {
            orchestrator.run_all_parallel(n, Some(tx.clone()), cancel).await?;
        }
        _ => {
            orchestrator.run_all_sequential(Some(&tx), cancel).await?;
        }
    }
    drop(tx);
    let _ = reporter.await;
    Ok(())
}

/// `rollback <id>`: reset a `done` item to `implementing`; requires
/// `rollback_sha`; force-resets the main-line branch and force-pushes.
/// Explicit and destructive — the caller (CLI) must already have confirmed.
pub fn rollback(project_dir: &Path, id: &str) -> Result<()> {
    let (config, store) = load(project_dir)?;
    let mut item = store.read_item(id)?;
    let rollback_sha = item
        .rollback_sha
        .clone()
        .context("item has no rollback_sha; not eligible for rollback")?;

    item.rollback()?;
    vcs::force_reset_branch(&config.project_dir, &config.base_branch, &rollback_sha)?;
    store.write_item(&item)?;

    let push = std::process::Command::new("git")
        .args(["push", "--force", "origin", &config.base_branch])
        .current_dir(&config.project_dir)
        .status()
        .context("failed to invoke git push")?;
    if !push.success() {
        bail!("force-push of {} failed after local rollback; branch state and remote now disagree", config.base_branch);
    }

    println!("{id}: rolled back to {rollback_sha}");
    Ok(())
}

pub fn doctor(_project_dir: &Path) -> Result<()> {
    bail!("doctor: not implemented; workspace diagnostics are an external collaborator")
}

pub fn check_integrity(_project_dir: &Path) -> Result<()> {
    bail!("check-integrity: not implemented; an external collaborator")
}

pub fn watchdog(_project_dir: &Path) -> Result<()> {
    bail!("watchdog: not implemented; an external collaborator")
}
