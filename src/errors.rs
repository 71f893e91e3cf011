//! Typed error hierarchy for the wreckit engine.
//!
//! Three top-level enums cover the three subsystems:
//! - `StoreError` — artifact store lookup/corruption/lock failures
//! - `PhaseError` — per-phase execution and transition failures
//! - `OrchestratorError` — scheduling and dependency failures

use thiserror::Error;

/// Errors from the artifact store (C1).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("item already exists: {0}")]
    ItemAlreadyExists(String),

    #[error("artifact not found at {0}")]
    ArtifactNotFound(std::path::PathBuf),

    #[error("corrupt record at {path}: {source}")]
    Corruption {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to acquire {mode} lock on {path} after {timeout_ms}ms")]
    LockTimeout {
        path: std::path::PathBuf,
        mode: &'static str,
        timeout_ms: u64,
    },

    #[error("io error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from a single phase execution (C2/C3).
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("invalid transition: item {id} is in state {from:?}, phase {phase} requires {required}")]
    InvalidTransition {
        id: String,
        from: crate::item::ItemState,
        phase: &'static str,
        required: String,
    },

    #[error("agent invocation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("agent exited with non-zero status: {0}")]
    NonZeroExit(i32),

    #[error("missing expected artifact: {0}")]
    MissingArtifact(String),

    #[error("artifact failed schema validation: {0}")]
    SchemaInvalid(String),

    #[error("scope violation: {0} touched files outside its declared scope: {1:?}")]
    ScopeViolation(String, Vec<std::path::PathBuf>),

    #[error("secret-like content detected in added lines: {0}")]
    SecretDetected(String),

    #[error("quality gate failed: {0}")]
    QualityGateFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the orchestrator (C4).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("dependency '{0}' named by '{1}' does not exist")]
    UnknownDependency(String, String),

    #[error("dependency cycle detected involving item {0}")]
    DependencyCycle(String),

    #[error(transparent)]
    Phase(#[from] PhaseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemState;

    #[test]
    fn store_error_item_not_found_is_matchable() {
        let err = StoreError::ItemNotFound("001-foo".into());
        assert!(matches!(err, StoreError::ItemNotFound(_)));
        assert!(err.to_string().contains("001-foo"));
    }

    #[test]
    fn phase_error_invalid_transition_carries_context() {
        let err = PhaseError::InvalidTransition {
            id: "001-foo".into(),
            from: ItemState::Done,
            phase: "research",
            required: "raw".into(),
        };
        assert!(err.to_string().contains("001-foo"));
        assert!(err.to_string().contains("research"));
    }

    #[test]
    fn phase_error_converts_from_store_error() {
        let inner = StoreError::ItemNotFound("x".into());
        let phase_err: PhaseError = inner.into();
        assert!(matches!(
            phase_err,
            PhaseError::Store(StoreError::ItemNotFound(_))
        ));
    }

    #[test]
    fn orchestrator_error_converts_from_phase_error() {
        let inner = PhaseError::NonZeroExit(1);
        let orch_err: OrchestratorError = inner.into();
        assert!(matches!(
            orch_err,
            OrchestratorError::Phase(PhaseError::NonZeroExit(1))
        ));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&StoreError::ItemNotFound("x".into()));
        assert_std_error(&PhaseError::NonZeroExit(1));
        assert_std_error(&OrchestratorError::DependencyCycle("x".into()));
    }
}
