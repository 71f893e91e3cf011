//! Implement Loop (C3): drives the agent story-by-story until the plan is
//! fully done or an unrecoverable failure occurs.
//!
//! Story selection is first pending, in `(priority, id)` order.

pub mod scope;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::{AgentRequest, AgentTransport, ExitDisposition};
use crate::config::Config;
use crate::errors::PhaseError;
use crate::healing::{HealingController, HealingOutcome};
use crate::item::Item;
use crate::orchestrator::events::{agent_event_bridge, ProgressEvent, ProgressSender};
use crate::phase::{PhaseKind, ToolAllowlist};
use crate::plan::UserStory;
use crate::store::Store;
use crate::vcs;

fn render_implement_prompt(item: &Item, story: &UserStory) -> String {
    let criteria = story
        .acceptance_criteria
        .iter()
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "item: {id}\nstory: {story_id} — {title}\nacceptance criteria:\n{criteria}\n",
        id = item.id,
        story_id = story.id,
        title = story.title,
    )
}

async fn validate_story_output(
    config: &Config,
    before_sha: &str,
    story: &UserStory,
) -> Result<(), String> {
    let changes = vcs::compute_changes(&config.project_dir, before_sha).map_err(|e| e.to_string())?;
    if changes.is_empty() {
        return Err("agent made no file changes for this story".to_string());
    }

    let declared_scope = scope::declared_scope_from_notes(&story.notes);
    if !scope::files_within_scope(&changes.all_paths(), &declared_scope) {
        return Err(format!(
            "story {} touched files outside its declared scope",
            story.id
        ));
    }

    let added = vcs::added_lines_since(&config.project_dir, before_sha).map_err(|e| e.to_string())?;
    let secrets = scope::scan_for_secrets(&added);
    if !secrets.is_empty() {
        return Err(PhaseError::SecretDetected(secrets.join(", ")).to_string());
    }

    if let Some(cmd) = &config.quality_gate_cmd {
        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .current_dir(&config.project_dir)
            .status()
            .map_err(|e| format!("failed to run quality gate: {e}"))?;
        if !status.success() {
            return Err(PhaseError::QualityGateFailed(status.to_string()).to_string());
        }
    }

    Ok(())
}

/// Run the implement loop to completion: success means every story in the
/// plan is `done`; failure means healing gave up on the current story.
pub async fn run_implement_loop(
    store: &Store,
    config: &Config,
    agent: &Arc<dyn AgentTransport>,
    item: &mut Item,
    healing: &mut HealingController,
    events: Option<&ProgressSender>,
    cancel: CancellationToken,
) -> Result<(), PhaseError> {
    loop {
        let mut plan = store.read_plan(&item.id).map_err(PhaseError::Store)?;
        if plan.all_done() {
            return Ok(());
        }

        let story = plan
            .next_pending()
            .expect("all_done() is false, so a pending story exists")
            .clone();
        info!(item = %item.id, story = %story.id, "story changed");
        if let Some(tx) = events {
            let _ = tx.send(ProgressEvent::StoryChanged {
                item_id: item.id.clone(),
                story_id: story.id.clone(),
            });
        }

        let before = vcs::snapshot(&config.project_dir)?;
        let request = AgentRequest {
            prompt: render_implement_prompt(item, &story),
            allowlist: ToolAllowlist::ImplementFull,
            working_dir: config.project_dir.clone(),
            env: config.agent.env.clone(),
            deadline: config.timeout_seconds.for_phase(PhaseKind::Implement),
        };

        let bridge = agent_event_bridge(&item.id, events);
        let event_tx = bridge.as_ref().map(|(tx, _)| tx.clone());
        let invoke_result = agent.invoke(request, event_tx, cancel.clone()).await;
        if let Some((_, handle)) = bridge {
            let _ = handle.await;
        }

        let failure_text = match invoke_result {
            Ok(response) if response.disposition == ExitDisposition::Success => {
                match validate_story_output(config, &before, &story).await {
                    Ok(()) => None,
                    Err(reason) => Some(reason),
                }
            }
            Ok(response) => Some(format!("agent did not complete successfully: {}", response.final_output)),
            Err(e) => Some(e.to_string()),
        };

        match failure_text {
            None => {
                plan.mark_done(&story.id).map_err(|_| {
                    PhaseError::MissingArtifact(format!("story {} vanished from plan", story.id))
                })?;
                store.write_plan(&item.id, &plan).map_err(PhaseError::Store)?;
                healing.reset(&item.id);
            }
            Some(text) => {
                let (outcome, entry) = healing.handle(&item.id, &text);
                store.append_healing_log(&entry).map_err(PhaseError::Store)?;
                match outcome {
                    HealingOutcome::Recovered => continue,
                    HealingOutcome::Unrecoverable => {
                        return Err(PhaseError::Other(anyhow::anyhow!(
                            "story {} unrecoverable: {text}",
                            story.id
                        )));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::MockAgent;
    use crate::plan::PlanDocument;
    use crate::store::Store;

    fn setup() -> (tempfile::TempDir, Store, Config) {
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("README.md"), "hi").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(std::path::Path::new("README.md")).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("t", "t@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[]).unwrap();

        let config = Config {
            project_dir: dir.path().to_path_buf(),
            wreckit_dir: dir.path().join(".wreckit"),
            ..Config::default()
        };
        let store = Store::new(&config.wreckit_dir);
        (dir, store, config)
    }

    #[tokio::test]
    async fn empty_plan_completes_immediately() {
        let (_dir, store, config) = setup();
        let mut item = Item::new("001-x", "x", "x");
        let plan = PlanDocument::new("001-x", "wreckit/001-x");
        store.write_plan("001-x", &plan).unwrap();

        let agent: Arc<dyn AgentTransport> = Arc::new(MockAgent::new(vec![]));
        let mut healing = HealingController::default();
        let result = run_implement_loop(&store, &config, &agent, &mut item, &mut healing, None, CancellationToken::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn a_story_with_no_file_changes_is_unrecoverable_after_budget() {
        let (dir, store, config) = setup();
        let mut item = Item::new("001-x", "x", "x");
        let mut plan = PlanDocument::new("001-x", "wreckit/001-x");
        plan.user_stories.push(UserStory::new("US-001", "first", 1));
        store.write_plan("001-x", &plan).unwrap();

        // Agent "succeeds" each time but never touches the working tree.
        let responses: Vec<_> = (0..4)
            .map(|_| crate::agent::AgentResponse {
                disposition: ExitDisposition::Success,
                final_output: "did nothing".into(),
            })
            .collect();
        let agent: Arc<dyn AgentTransport> = Arc::new(MockAgent::new(responses));
        let mut healing = HealingController::new(3);
        let result = run_implement_loop(&store, &config, &agent, &mut item, &mut healing, None, CancellationToken::new()).await;
        assert!(result.is_err());
        let _ = dir;
    }

    #[tokio::test]
    async fn a_story_that_touches_files_completes() {
        let (dir, store, config) = setup();
        let mut item = Item::new("001-x", "x", "x");
        let mut plan = PlanDocument::new("001-x", "wreckit/001-x");
        plan.user_stories.push(UserStory::new("US-001", "first", 1));
        store.write_plan("001-x", &plan).unwrap();

        // A mock agent can't actually touch files, so simulate the agent's
        // effect directly before it "returns", the way a real subprocess
        // would have already written to the working tree by the time we
        // observe it.
        std::fs::write(dir.path().join("src_file.rs"), "fn main() {}").unwrap();

        let agent: Arc<dyn AgentTransport> = Arc::new(MockAgent::always_succeeds("wrote src_file.rs"));
        let mut healing = HealingController::default();
        let result = run_implement_loop(&store, &config, &agent, &mut item, &mut healing, None, CancellationToken::new()).await;
        assert!(result.is_ok());
        let plan_after = store.read_plan("001-x").unwrap();
        assert!(plan_after.all_done());
    }
}
