//! The structured plan document (`prd.json`) produced by the `plan` phase
//! and consumed by the implement loop.
//!
//! `StoryStatus` is a closed enum rather than a free string, pairing a
//! small closed status set with ordering/lifecycle helper methods.

use serde::{Deserialize, Serialize};

pub const PLAN_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Pending,
    Done,
}

impl StoryStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, StoryStatus::Done)
    }
}

impl std::fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoryStatus::Pending => write!(f, "pending"),
            StoryStatus::Done => write!(f, "done"),
        }
    }
}

/// A single user story within a plan. Ordered by `(priority, id)` for
/// execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStory {
    pub id: String,
    pub title: String,
    pub acceptance_criteria: Vec<String>,
    pub priority: i32,
    pub status: StoryStatus,
    #[serde(default)]
    pub notes: String,
}

impl UserStory {
    pub fn new(id: impl Into<String>, title: impl Into<String>, priority: i32) -> Self {
        UserStory {
            id: id.into(),
            title: title.into(),
            acceptance_criteria: Vec::new(),
            priority,
            status: StoryStatus::Pending,
            notes: String::new(),
        }
    }

    fn sort_key(&self) -> (i32, &str) {
        (self.priority, self.id.as_str())
    }
}

impl PartialOrd for UserStory {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UserStory {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// The structured plan document. Mirrors `prd.json` field for
/// field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDocument {
    pub schema_version: u32,
    pub id: String,
    pub branch_name: String,
    pub user_stories: Vec<UserStory>,
}

impl PlanDocument {
    pub fn new(id: impl Into<String>, branch_name: impl Into<String>) -> Self {
        PlanDocument {
            schema_version: PLAN_SCHEMA_VERSION,
            id: id.into(),
            branch_name: branch_name.into(),
            user_stories: Vec::new(),
        }
    }

    /// Pending stories in execution order: priority ascending, ties broken
    /// by id lexicographically.
    pub fn pending_in_order(&self) -> Vec<&UserStory> {
        let mut pending: Vec<&UserStory> = self
            .user_stories
            .iter()
            .filter(|s| !s.status.is_done())
            .collect();
        pending.sort();
        pending
    }

    /// The first pending story to drive next, or `None` if all are done.
    /// Stories sort by `(priority, id)`, so the first pending entry is
    /// always the highest-priority, lowest-id one still open.
    pub fn next_pending(&self) -> Option<&UserStory> {
        self.pending_in_order().into_iter().next()
    }

    pub fn all_done(&self) -> bool {
        self.user_stories.iter().all(|s| s.status.is_done())
    }

    /// Mark a story done by id. Errors if the id is unknown.
    pub fn mark_done(&mut self, story_id: &str) -> Result<(), crate::errors::PhaseError> {
        let story = self
            .user_stories
            .iter_mut()
            .find(|s| s.id == story_id)
            .ok_or_else(|| {
                crate::errors::PhaseError::MissingArtifact(format!(
                    "no such user story: {story_id}"
                ))
            })?;
        story.status = StoryStatus::Done;
        Ok(())
    }

    /// Story ids must be unique within the plan.
    pub fn has_unique_story_ids(&self) -> bool {
        let mut ids: Vec<&str> = self.user_stories.iter().map(|s| s.id.as_str()).collect();
        let before = ids.len();
        ids.sort_unstable();
        ids.dedup();
        ids.len() == before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: &str, priority: i32) -> UserStory {
        UserStory::new(id, format!("story {id}"), priority)
    }

    #[test]
    fn pending_in_order_sorts_by_priority_then_id() {
        let mut plan = PlanDocument::new("001-x", "wreckit/001-x");
        plan.user_stories.push(story("US-003", 2));
        plan.user_stories.push(story("US-001", 1));
        plan.user_stories.push(story("US-002", 1));

        let ordered: Vec<&str> = plan
            .pending_in_order()
            .into_iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ordered, vec!["US-001", "US-002", "US-003"]);
    }

    #[test]
    fn next_pending_skips_done_stories() {
        let mut plan = PlanDocument::new("001-x", "wreckit/001-x");
        let mut first = story("US-001", 1);
        first.status = StoryStatus::Done;
        plan.user_stories.push(first);
        plan.user_stories.push(story("US-002", 2));

        assert_eq!(plan.next_pending().unwrap().id, "US-002");
    }

    #[test]
    fn all_done_is_true_only_when_every_story_is_done() {
        let mut plan = PlanDocument::new("001-x", "wreckit/001-x");
        assert!(plan.all_done());
        plan.user_stories.push(story("US-001", 1));
        assert!(!plan.all_done());
        plan.mark_done("US-001").unwrap();
        assert!(plan.all_done());
    }

    #[test]
    fn mark_done_errors_on_unknown_story_id() {
        let mut plan = PlanDocument::new("001-x", "wreckit/001-x");
        assert!(plan.mark_done("US-999").is_err());
    }

    #[test]
    fn duplicate_story_ids_are_detected() {
        let mut plan = PlanDocument::new("001-x", "wreckit/001-x");
        plan.user_stories.push(story("US-001", 1));
        plan.user_stories.push(story("US-001", 2));
        assert!(!plan.has_unique_story_ids());
    }

    #[test]
    fn plan_document_round_trips_through_json() {
        let mut plan = PlanDocument::new("001-x", "wreckit/001-x");
        plan.user_stories.push(story("US-001", 1));
        let json = serde_json::to_string(&plan).unwrap();
        let back: PlanDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, plan.id);
        assert_eq!(back.user_stories.len(), 1);
    }
}
