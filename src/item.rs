//! The item: the unit of work driven through the pipeline.
//!
//! An item is a durable state machine persisted by the artifact store (C1).
//! This module defines the wire record (`Item`) and its closed state set
//! (`ItemState`), pairing a closed enum with a human-readable on-disk
//! string.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The five-and-one states an item moves through, plus `Done`.
///
/// States are totally ordered in pipeline order; `PartialOrd`/`Ord` back the
/// phase table's monotonicity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Raw,
    Researched,
    Planned,
    Implementing,
    InPr,
    Done,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Raw => "raw",
            ItemState::Researched => "researched",
            ItemState::Planned => "planned",
            ItemState::Implementing => "implementing",
            ItemState::InPr => "in_pr",
            ItemState::Done => "done",
        }
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized item state: {0}")]
pub struct ParseItemStateError(String);

impl std::str::FromStr for ItemState {
    type Err = ParseItemStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(ItemState::Raw),
            "researched" => Ok(ItemState::Researched),
            "planned" => Ok(ItemState::Planned),
            "implementing" => Ok(ItemState::Implementing),
            "in_pr" => Ok(ItemState::InPr),
            "done" => Ok(ItemState::Done),
            other => Err(ParseItemStateError(other.to_string())),
        }
    }
}

/// Current schema version for `item.json`. Bump on incompatible format change.
pub const ITEM_SCHEMA_VERSION: u32 = 1;

/// A single unit of work. Mirrors `item.json` field-for-field;
/// `extra` preserves unknown keys across a read-modify-write round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub schema_version: u32,
    pub id: String,
    pub title: String,
    pub overview: String,
    pub state: ItemState,
    pub branch: Option<String>,
    pub pr_url: Option<String>,
    pub pr_number: Option<u64>,
    pub rollback_sha: Option<String>,
    #[serde(default)]
    pub depends_on: HashSet<String>,
    pub campaign: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Item {
    /// Build a fresh item in `raw` state, as the (external) idea-ingest step would.
    pub fn new(id: impl Into<String>, title: impl Into<String>, overview: impl Into<String>) -> Self {
        let now = Utc::now();
        Item {
            schema_version: ITEM_SCHEMA_VERSION,
            id: id.into(),
            title: title.into(),
            overview: overview.into(),
            state: ItemState::Raw,
            branch: None,
            pr_url: None,
            pr_number: None,
            rollback_sha: None,
            depends_on: HashSet::new(),
            campaign: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            extra: serde_json::Map::new(),
        }
    }

    /// `state >= in_pr` implies `branch` is set.
    pub fn invariant_branch_set_once_in_pr(&self) -> bool {
        self.state < ItemState::InPr || self.branch.is_some()
    }

    /// Whether this item can accept a rollback: must be `done` with a
    /// recorded `rollback_sha` (direct-merge path only).
    pub fn can_rollback(&self) -> bool {
        self.state == ItemState::Done && self.rollback_sha.is_some()
    }

    /// Reset a `done` item to `implementing`, clearing the fields the
    /// rollback operation owns.
    pub fn rollback(&mut self) -> Result<(), crate::errors::PhaseError> {
        if !self.can_rollback() {
            return Err(crate::errors::PhaseError::InvalidTransition {
                id: self.id.clone(),
                from: self.state,
                phase: "rollback",
                required: "done with rollback_sha set".into(),
            });
        }
        self.state = ItemState::Implementing;
        self.rollback_sha = None;
        self.completed_at = None;
        self.last_error = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// An item is runnable iff it is not terminal and every dependency is
    /// done. Dependencies naming ids that don't exist yet keep the item
    /// non-runnable indefinitely — never an error here; resolving ids
    /// against the store is the orchestrator's job.
    pub fn is_runnable(&self, dependency_states: &[Option<ItemState>]) -> bool {
        if self.state == ItemState::Done {
            return false;
        }
        dependency_states
            .iter()
            .all(|s| matches!(s, Some(ItemState::Done)))
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
