//! The healing log: an append-only record of recoverable-failure episodes
//!, serialized as JSON Lines under `.wreckit/healing-log.jsonl`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::FailureClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Recovered,
    Unrecoverable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingAttempt {
    pub at: DateTime<Utc>,
    pub remediation: String,
    pub outcome: AttemptOutcome,
}

/// One episode: a single classified failure and everything tried against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingLogEntry {
    pub timestamp: DateTime<Utc>,
    pub item_id: String,
    pub class: FailureClass,
    pub detected_pattern: String,
    pub attempts: Vec<HealingAttempt>,
    pub final_outcome: AttemptOutcome,
}

impl HealingLogEntry {
    pub fn new(item_id: impl Into<String>, class: FailureClass, detected_pattern: impl Into<String>) -> Self {
        HealingLogEntry {
            timestamp: Utc::now(),
            item_id: item_id.into(),
            class,
            detected_pattern: detected_pattern.into(),
            attempts: Vec::new(),
            final_outcome: AttemptOutcome::Unrecoverable,
        }
    }

    pub fn record_attempt(&mut self, remediation: impl Into<String>, outcome: AttemptOutcome) {
        self.attempts.push(HealingAttempt {
            at: Utc::now(),
            remediation: remediation.into(),
            outcome,
        });
        self.final_outcome = outcome;
    }
}
