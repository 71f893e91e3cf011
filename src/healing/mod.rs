//! Healing Controller (C5): classifies agent failures and applies bounded,
//! cause-specific retries.
//!
//! `FailureClass` is a Rust enum over the closed set of recognized failure
//! causes, with `classify` doing ordered string-pattern matching against
//! the failure text.

pub mod log;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use log::{AttemptOutcome, HealingLogEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureClass {
    GitLock,
    PackageManagerFailure,
    JsonCorruption,
    PlanValidation,
    StoryValidation,
    Other,
}

impl FailureClass {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FailureClass::Other)
    }

    fn remediation(&self) -> &'static str {
        match self {
            FailureClass::GitLock => "wait and retry; clear stale index.lock if persistent",
            FailureClass::PackageManagerFailure => "clear package cache hint and retry",
            FailureClass::JsonCorruption => "re-invoke producing phase with parse error appended to prompt",
            FailureClass::PlanValidation => "re-invoke with corrective guidance on plan invariant violation",
            FailureClass::StoryValidation => "re-invoke with corrective guidance on story invariant violation",
            FailureClass::Other => "none; not recoverable",
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureClass::GitLock => "git-lock",
            FailureClass::PackageManagerFailure => "package-manager-failure",
            FailureClass::JsonCorruption => "json-corruption",
            FailureClass::PlanValidation => "plan-validation",
            FailureClass::StoryValidation => "story-validation",
            FailureClass::Other => "other",
        };
        f.write_str(s)
    }
}

/// Classify failure text via ordered pattern matching. First match wins.
pub fn classify(text: &str) -> FailureClass {
    let lower = text.to_lowercase();
    if lower.contains("index.lock") || lower.contains("unable to create") && lower.contains(".lock") {
        FailureClass::GitLock
    } else if lower.contains("enotfound")
        || lower.contains("registry")
        || lower.contains("package")
            && (lower.contains("fetch") || lower.contains("timeout") || lower.contains("network"))
    {
        FailureClass::PackageManagerFailure
    } else if lower.contains("json") && (lower.contains("parse") || lower.contains("invalid") || lower.contains("corrupt")) {
        FailureClass::JsonCorruption
    } else if lower.contains("plan") && (lower.contains("invariant") || lower.contains("invalid") || lower.contains("validation")) {
        FailureClass::PlanValidation
    } else if lower.contains("story") && (lower.contains("invariant") || lower.contains("invalid") || lower.contains("validation")) {
        FailureClass::StoryValidation
    } else {
        FailureClass::Other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealingOutcome {
    Recovered,
    Unrecoverable,
}

/// Per-class, per-item consecutive-failure counters, held in memory for the
/// lifetime of one orchestrator run. Reset on success.
pub struct HealingController {
    cap: u32,
    counters: HashMap<(String, FailureClass), u32>,
}

impl Default for HealingController {
    fn default() -> Self {
        HealingController::new(3)
    }
}

impl HealingController {
    pub fn new(cap: u32) -> Self {
        HealingController {
            cap,
            counters: HashMap::new(),
        }
    }

    /// Classify `failure_text` and decide whether to retry. Returns the
    /// outcome plus the log entry to append to the healing log (C1 owns the
    /// durable write; the controller only decides and records in memory).
    pub fn handle(&mut self, item_id: &str, failure_text: &str) -> (HealingOutcome, HealingLogEntry) {
        let class = classify(failure_text);
        let mut entry = HealingLogEntry::new(item_id, class, failure_text);

        if !class.is_recoverable() {
            entry.record_attempt("none; class is not recoverable", AttemptOutcome::Unrecoverable);
            return (HealingOutcome::Unrecoverable, entry);
        }

        let key = (item_id.to_string(), class);
        let count = self.counters.entry(key).or_insert(0);
        if *count < self.cap {
            *count += 1;
            entry.record_attempt(class.remediation(), AttemptOutcome::Recovered);
            (HealingOutcome::Recovered, entry)
        } else {
            entry.record_attempt("retry budget exhausted for this class", AttemptOutcome::Unrecoverable);
            (HealingOutcome::Unrecoverable, entry)
        }
    }

    /// Clear all per-class counters for an item, called on story/phase
    /// success so a later unrelated failure starts with a fresh budget.
    pub fn reset(&mut self, item_id: &str) {
        self.counters.retain(|(id, _), _| id != item_id);
    }
}
