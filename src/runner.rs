//! Phase Runner (C2): advances one item by exactly one phase, or reports
//! that no advancement is possible.
//!
//! The five phases fall into three execution shapes:
//! - `research`/`plan` write docs-only artifacts under the item's store
//!   directory; `plan` additionally enforces the working-tree-diff scope
//!   check against the project repo.
//! - `implement` delegates entirely to the Implement Loop (C3).
//! - `pr`/`complete` drive the git branch and the PR host.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{AgentRequest, AgentTransport, ExitDisposition};
use crate::config::Config;
use crate::errors::PhaseError;
use crate::healing::HealingController;
use crate::host::{MergeStatus, PrHost};
use crate::item::ItemState;
use crate::orchestrator::events::{agent_event_bridge, ProgressSender};
use crate::phase::{decide_transition, PhaseKind, TransitionDecision};
use crate::store::Store;
use crate::vcs;

pub struct PhaseRunner {
    pub store: Arc<Store>,
    pub config: Config,
    pub agent: Arc<dyn AgentTransport>,
    pub host: Arc<dyn PrHost>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Skipped,
    Advanced { to: ItemState },
    NotYetMergeable,
}

impl PhaseRunner {
    pub fn new(
        store: Arc<Store>,
        config: Config,
        agent: Arc<dyn AgentTransport>,
        host: Arc<dyn PrHost>,
    ) -> Self {
        PhaseRunner { store, config, agent, host }
    }

    pub async fn run_phase(
        &self,
        item_id: &str,
        phase: PhaseKind,
        force: bool,
        healing: &mut HealingController,
        events: Option<&ProgressSender>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, PhaseError> {
        let mut item = self.store.read_item(item_id)?;

        match decide_transition(item.state, phase, force) {
            TransitionDecision::Skip => return Ok(RunOutcome::Skipped),
            TransitionDecision::Invalid(reason) => {
                return Err(PhaseError::InvalidTransition {
                    id: item.id.clone(),
                    from: item.state,
                    phase: phase.as_str(),
                    required: reason,
                })
            }
            TransitionDecision::Run => {}
        }

        let _lock = self.store.scoped_lock(item_id, crate::store::lock::LockMode::Exclusive)?;
        info!(item = item_id, phase = %phase, "starting phase");
        let started = Instant::now();

        let result = match phase {
            PhaseKind::Research => self.run_research(&mut item, events, cancel).await,
            PhaseKind::Plan => self.run_plan(&mut item, events, cancel).await,
            PhaseKind::Implement => {
                crate::implement::run_implement_loop(
                    &self.store,
                    &self.config,
                    &self.agent,
                    &mut item,
                    healing,
                    events,
                    cancel,
                )
                .await
                .map(|_| phase.def().target_state)
            }
            PhaseKind::Pr => self.run_pr(&mut item, events, cancel).await,
            PhaseKind::Complete => self.run_complete(&mut item).await,
        };

        match result {
            Ok(new_state) => {
                item.state = new_state;
                item.last_error = None;
                item.touch();
                self.store.write_item(&item)?;
                info!(item = item_id, phase = %phase, elapsed_ms = started.elapsed().as_millis() as u64, "phase completed");
                if new_state == ItemState::Done && item.completed_at.is_none() {
                    // run_complete sets completed_at itself; nothing to do.
                }
                if matches!(phase, PhaseKind::Complete) && item.state != ItemState::Done {
                    Ok(RunOutcome::NotYetMergeable)
                } else {
                    Ok(RunOutcome::Advanced { to: item.state })
                }
            }
            Err(err) => {
                warn!(item = item_id, phase = %phase, error = %err, "phase failed");
                item.last_error = Some(err.to_string());
                item.touch();
                let _ = self.store.write_item(&item);
                Err(err)
            }
        }
    }

    async fn invoke(
        &self,
        item: &crate::item::Item,
        phase: PhaseKind,
        working_dir: std::path::PathBuf,
        prompt: String,
        events: Option<&ProgressSender>,
        cancel: CancellationToken,
    ) -> Result<String, PhaseError> {
        let request = AgentRequest {
            prompt,
            allowlist: phase.def().allowlist,
            working_dir,
            env: self.config.agent.env.clone(),
            deadline: self.config.timeout_seconds.for_phase(phase),
        };
        let bridge = agent_event_bridge(&item.id, events);
        let event_tx = bridge.as_ref().map(|(tx, _)| tx.clone());
        let response = self.agent.invoke(request, event_tx, cancel).await?;
        if let Some((_, handle)) = bridge {
            let _ = handle.await;
        }
        match response.disposition {
            ExitDisposition::Success => Ok(response.final_output),
            ExitDisposition::TimedOut => Err(PhaseError::Timeout(self.config.timeout_seconds.for_phase(phase))),
            ExitDisposition::Error => {
                let _ = item;
                Err(PhaseError::NonZeroExit(1))
            }
        }
    }

    fn render_prompt(&self, item: &crate::item::Item, phase: PhaseKind, extra: &str) -> String {
        format!(
            "phase: {phase}\nitem: {id}\ntitle: {title}\noverview: {overview}\n{extra}",
            phase = phase,
            id = item.id,
            title = item.title,
            overview = item.overview,
        )
    }

    async fn run_research(
        &self,
        item: &mut crate::item::Item,
        events: Option<&ProgressSender>,
        cancel: CancellationToken,
    ) -> Result<ItemState, PhaseError> {
        let prompt = self.render_prompt(item, PhaseKind::Research, "write research.md in this directory.");
        self.invoke(item, PhaseKind::Research, self.store.item_dir(&item.id), prompt, events, cancel)
            .await?;

        if !self.store.has_research_report(&item.id) {
            return Err(PhaseError::MissingArtifact("research.md".into()));
        }
        Ok(ItemState::Researched)
    }

    async fn run_plan(
        &self,
        item: &mut crate::item::Item,
        events: Option<&ProgressSender>,
        cancel: CancellationToken,
    ) -> Result<ItemState, PhaseError> {
        let before = vcs::snapshot(&self.config.project_dir)?;
        let prompt = self.render_prompt(
            item,
            PhaseKind::Plan,
            "write plan.md and prd.json in this item's store directory only.",
        );
        self.invoke(item, PhaseKind::Plan, self.config.project_dir.clone(), prompt, events, cancel)
            .await?;

        let changes = vcs::compute_changes(&self.config.project_dir, &before)?;
        let item_dir_rel = self
            .store
            .item_dir(&item.id)
            .strip_prefix(&self.config.project_dir)
            .map(|p| p.to_path_buf())
            .unwrap_or_default();
        let out_of_scope: Vec<_> = changes
            .all_paths()
            .into_iter()
            .filter(|p| !p.starts_with(&item_dir_rel))
            .collect();
        if !out_of_scope.is_empty() {
            return Err(PhaseError::ScopeViolation(item.id.clone(), out_of_scope));
        }

        if !self.store.has_plan_artifacts(&item.id) {
            return Err(PhaseError::MissingArtifact("plan.md or prd.json".into()));
        }
        let plan = self.store.read_plan(&item.id).map_err(PhaseError::Store)?;
        if !plan.has_unique_story_ids() {
            return Err(PhaseError::SchemaInvalid("duplicate user story ids in prd.json".into()));
        }
        Ok(ItemState::Planned)
    }

    async fn run_pr(
        &self,
        item: &mut crate::item::Item,
        events: Option<&ProgressSender>,
        cancel: CancellationToken,
    ) -> Result<ItemState, PhaseError> {
        if item.branch.is_none() {
            let branch_name = format!("{}{}", self.config.branch_prefix, item.id);
            vcs::create_item_branch(&self.config.project_dir, &branch_name, &self.config.base_branch)?;
            item.branch = Some(branch_name);
        }
        let branch = item.branch.clone().expect("just ensured branch is set");

        let prompt = self.render_prompt(item, PhaseKind::Pr, "produce a pull request description.");
        let body = self
            .invoke(item, PhaseKind::Pr, self.config.project_dir.clone(), prompt, events, cancel)
            .await?;
        self.store
            .write_pr_description(&item.id, &body)
            .map_err(PhaseError::Store)?;

        let pr = self.host.open_or_update_pr(
            &self.config.project_dir,
            &branch,
            &self.config.base_branch,
            &item.title,
            &body,
        )?;
        item.pr_url = Some(pr.url);
        item.pr_number = Some(pr.number);
        Ok(ItemState::InPr)
    }

    async fn run_complete(&self, item: &mut crate::item::Item) -> Result<ItemState, PhaseError> {
        let pr_number = item
            .pr_number
            .ok_or_else(|| PhaseError::MissingArtifact("pr_number".into()))?;
        match self.host.detect_merge(&self.config.project_dir, pr_number)? {
            MergeStatus::Open => {
                // Not an error: simply not advanceable yet.
                item.state = ItemState::InPr;
                Ok(ItemState::InPr)
            }
            MergeStatus::MergedViaPr => {
                item.completed_at = Some(Utc::now());
                item.rollback_sha = None;
                Ok(ItemState::Done)
            }
            MergeStatus::MergedDirect => {
                let sha = vcs::snapshot(&self.config.project_dir)?;
                item.completed_at = Some(Utc::now());
                item.rollback_sha = Some(sha);
                Ok(ItemState::Done)
            }
            MergeStatus::Closed => Err(PhaseError::Other(anyhow::anyhow!(
                "pull request for {} was closed without merging",
                item.id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::MockAgent;
    use crate::host::PrHost;
    use crate::item::Item;
    use std::path::Path;

    struct StubHost;
    impl PrHost for StubHost {
        fn open_or_update_pr(
            &self,
            _repo_dir: &Path,
            _branch: &str,
            _base: &str,
            _title: &str,
            _body: &str,
        ) -> Result<crate::host::PrInfo, PhaseError> {
            Ok(crate::host::PrInfo {
                url: "https://example.test/pr/1".into(),
                number: 1,
            })
        }

        fn detect_merge(&self, _repo_dir: &Path, _pr_number: u64) -> Result<MergeStatus, PhaseError> {
            Ok(MergeStatus::MergedViaPr)
        }
    }

    fn setup() -> (tempfile::TempDir, Arc<Store>, Config) {
        let dir = tempfile::tempdir().unwrap();
        git2::Repository::init(dir.path()).unwrap();
        let config = Config {
            project_dir: dir.path().to_path_buf(),
            wreckit_dir: dir.path().join(".wreckit"),
            ..Config::default()
        };
        let store = Arc::new(Store::new(&config.wreckit_dir));
        (dir, store, config)
    }

    #[tokio::test]
    async fn invalid_transition_is_reported_without_state_change() {
        let (_dir, store, config) = setup();
        let item = Item::new("001-x", "x", "x");
        store.create_item(&item).unwrap();

        let runner = PhaseRunner::new(
            store.clone(),
            config,
            Arc::new(MockAgent::always_succeeds("done")),
            Arc::new(StubHost),
        );
        let mut healing = HealingController::default();
        let result = runner
            .run_phase("001-x", PhaseKind::Plan, false, &mut healing, None, CancellationToken::new())
            .await;
        assert!(result.is_err());
        let after = store.read_item("001-x").unwrap();
        assert_eq!(after.state, ItemState::Raw);
    }

    #[tokio::test]
    async fn skip_on_artifact_is_a_no_op() {
        let (_dir, store, config) = setup();
        let mut item = Item::new("001-x", "x", "x");
        item.state = ItemState::Researched;
        store.create_item(&item).unwrap();

        let runner = PhaseRunner::new(
            store,
            config,
            Arc::new(MockAgent::always_succeeds("done")),
            Arc::new(StubHost),
        );
        let mut healing = HealingController::default();
        let outcome = runner
            .run_phase("001-x", PhaseKind::Research, false, &mut healing, None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Skipped);
    }
}
