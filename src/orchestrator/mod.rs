//! Orchestrator (C4): runs many items toward completion, sequentially or
//! through a bounded worker pool, respecting dependency order.
//!
//! The worker pool asks for ready work, sleeps a beat if none is available,
//! and asks again, rather than precomputing dependency waves up front.
//! Items can't use precomputed waves because `depends_on` may name an id
//! that doesn't exist yet, which must stay non-runnable indefinitely rather
//! than error.

pub mod events;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::OrchestratorError;
use crate::healing::HealingController;
use crate::item::{Item, ItemState};
use crate::phase::PhaseKind;
use crate::runner::{PhaseRunner, RunOutcome};
use crate::store::Store;
use events::{ProgressEvent, ProgressSender};

/// The phase to run next for an item in this state, or `None` if terminal.
/// `Implementing` routes back to `implement` until its plan is fully done,
/// then to `pr` — this is live state, not something a precomputed wave
/// could capture, since the plan can change between polls.
fn next_phase_for(store: &Store, item: &Item) -> Result<Option<PhaseKind>, OrchestratorError> {
    Ok(match item.state {
        ItemState::Raw => Some(PhaseKind::Research),
        ItemState::Researched => Some(PhaseKind::Plan),
        ItemState::Planned => Some(PhaseKind::Implement),
        ItemState::Implementing => {
            let plan = store.read_plan(&item.id).map_err(OrchestratorError::Store)?;
            if plan.all_done() {
                Some(PhaseKind::Pr)
            } else {
                Some(PhaseKind::Implement)
            }
        }
        ItemState::InPr => Some(PhaseKind::Complete),
        ItemState::Done => None,
    })
}

/// Runnable means: not terminal, and every declared dependency resolves to
/// a known item that is `done`. An id that doesn't resolve to anything yet
/// leaves the item permanently non-runnable — never an error.
fn is_runnable(item: &Item, by_id: &std::collections::HashMap<String, ItemState>) -> bool {
    let dependency_states: Vec<Option<ItemState>> =
        item.depends_on.iter().map(|dep| by_id.get(dep).copied()).collect();
    item.is_runnable(&dependency_states)
}

pub struct Orchestrator {
    store: Arc<Store>,
    runner: Arc<PhaseRunner>,
}

#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub item_id: String,
    pub phase: PhaseKind,
}

impl Orchestrator {
    pub fn new(store: Arc<Store>, runner: Arc<PhaseRunner>) -> Self {
        Orchestrator { store, runner }
    }

    fn snapshot_states(&self) -> Result<std::collections::HashMap<String, ItemState>, OrchestratorError> {
        Ok(self
            .store
            .list_items()
            .map_err(OrchestratorError::Store)?
            .into_iter()
            .map(|i| (i.id, i.state))
            .collect())
    }

    /// Non-mutating dry run: the would-do plan per item, in scheduling
    /// order, without invoking agents or writing state.
    pub fn dry_run(&self) -> Result<Vec<PlannedStep>, OrchestratorError> {
        let items = self.store.list_items().map_err(OrchestratorError::Store)?;
        let by_id = self.snapshot_states()?;
        let mut plan = Vec::new();
        for item in items {
            if is_runnable(&item, &by_id) {
                if let Some(phase) = next_phase_for(&self.store, &item)? {
                    plan.push(PlannedStep { item_id: item.id, phase });
                }
            }
        }
        Ok(plan)
    }

    /// Advance the lowest-id runnable item by exactly one phase (the `next`
    /// CLI command).
    pub async fn step_next(
        &self,
        healing: &mut HealingController,
        events: Option<&ProgressSender>,
        cancel: CancellationToken,
    ) -> Result<Option<(String, RunOutcome)>, OrchestratorError> {
        let by_id = self.snapshot_states()?;
        let items = self.store.list_items().map_err(OrchestratorError::Store)?;
        let Some(item) = items.iter().find(|i| is_runnable(i, &by_id)) else {
            return Ok(None);
        };
        let Some(phase) = next_phase_for(&self.store, item)? else {
            return Ok(None);
        };
        let outcome = self.run_one_phase(&item.id, phase, healing, events, cancel).await?;
        Ok(Some((item.id.clone(), outcome)))
    }

    async fn run_one_phase(
        &self,
        item_id: &str,
        phase: PhaseKind,
        healing: &mut HealingController,
        events: Option<&ProgressSender>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, OrchestratorError> {
        if let Some(tx) = events {
            let _ = tx.send(ProgressEvent::PhaseStarted { item_id: item_id.to_string(), phase });
        }
        let result = self
            .runner
            .run_phase(item_id, phase, false, healing, events, cancel)
            .await;
        match &result {
            Ok(_) => {
                if let Some(tx) = events {
                    let _ = tx.send(ProgressEvent::PhaseCompleted { item_id: item_id.to_string(), phase });
                }
            }
            Err(e) => {
                if let Some(tx) = events {
                    let _ = tx.send(ProgressEvent::PhaseFailed {
                        item_id: item_id.to_string(),
                        phase,
                        error: e.to_string(),
                    });
                }
            }
        }
        result.map_err(OrchestratorError::Phase)
    }

    /// Drive one item through phases until terminal (`done`) or a phase
    /// fails (the `run <id>` CLI command).
    pub async fn drive_item(
        &self,
        item_id: &str,
        healing: &mut HealingController,
        events: Option<&ProgressSender>,
        cancel: CancellationToken,
    ) -> Result<ItemState, OrchestratorError> {
        loop {
            if cancel.is_cancelled() {
                let item = self.store.read_item(item_id).map_err(OrchestratorError::Store)?;
                return Ok(item.state);
            }
            let item = self.store.read_item(item_id).map_err(OrchestratorError::Store)?;
            let Some(phase) = next_phase_for(&self.store, &item)? else {
                return Ok(item.state);
            };
            self.run_one_phase(item_id, phase, healing, events, cancel.clone()).await?;
            let after = self.store.read_item(item_id).map_err(OrchestratorError::Store)?;
            if after.state == ItemState::Done {
                return Ok(ItemState::Done);
            }
        }
    }

    /// Sequential mode: repeatedly pick the lowest-id runnable
    /// item, advance it one phase, continue on failure with the next
    /// runnable item, stop when nothing remains runnable.
    pub async fn run_all_sequential(
        &self,
        events: Option<&ProgressSender>,
        cancel: CancellationToken,
    ) -> Result<(), OrchestratorError> {
        let mut healing = HealingController::default();
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let by_id = self.snapshot_states()?;
            let items = self.store.list_items().map_err(OrchestratorError::Store)?;
            let Some(item) = items.iter().find(|i| is_runnable(i, &by_id)) else {
                return Ok(());
            };
            let Some(phase) = next_phase_for(&self.store, item)? else {
                continue;
            };
            if let Err(e) = self
                .run_one_phase(&item.id, phase, &mut healing, events, cancel.clone())
                .await
            {
                warn!(item = %item.id, error = %e, "phase failed; continuing with next runnable item");
            }
        }
    }

    /// Parallel mode: a bounded worker pool. Each worker drives
    /// whatever item it claims through phases until terminal or failing,
    /// then asks the coordinator for the next one.
    pub async fn run_all_parallel(
        self: Arc<Self>,
        concurrency: usize,
        events: Option<ProgressSender>,
        cancel: CancellationToken,
    ) -> Result<(), OrchestratorError> {
        let in_progress: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        let mut handles = Vec::new();

        for worker_id in 0..concurrency.max(2) {
            let orchestrator = self.clone();
            let in_progress = in_progress.clone();
            let events = events.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let mut healing = HealingController::default();
                loop {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let claimed = {
                        let by_id = match orchestrator.snapshot_states() {
                            Ok(map) => map,
                            Err(_) => return,
                        };
                        let items = match orchestrator.store.list_items() {
                            Ok(items) => items,
                            Err(_) => return,
                        };
                        if items.iter().all(|i| i.state == ItemState::Done) {
                            return;
                        }
                        let mut guard = in_progress.lock().await;
                        let pick = items
                            .iter()
                            .find(|i| !guard.contains(&i.id) && is_runnable(i, &by_id))
                            .map(|i| i.id.clone());
                        if let Some(id) = &pick {
                            guard.insert(id.clone());
                        }
                        pick
                    };

                    let Some(item_id) = claimed else {
                        tokio::time::sleep(Duration::from_millis(250)).await;
                        continue;
                    };

                    info!(worker = worker_id, item = %item_id, "worker claimed item");
                    let result = orchestrator
                        .drive_item(&item_id, &mut healing, events.as_ref(), cancel.clone())
                        .await;
                    if let Err(e) = result {
                        warn!(worker = worker_id, item = %item_id, error = %e, "item failed");
                    }
                    in_progress.lock().await.remove(&item_id);
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }
}
