//! The agent transport boundary: the core invokes an external
//! AI coding agent as a black box and only cares about this contract.
//!
//! `AgentTransport` is a `#[async_trait]` trait with four closed
//! implementations selected by `agent.kind`. The `process` variant spawns
//! the configured command, pipes stdin/stdout, stream-parses JSON-lines
//! events, and accumulates the final text. `sdk` and `sandboxed-vm` are
//! documented stubs — the external agent-reasoning layer itself is out of
//! scope, but the dispatch shape must exist.

pub mod factory;
pub mod mock;
pub mod process;
pub mod stub;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::PhaseError;
use crate::phase::ToolAllowlist;

/// Which concrete transport to dispatch to, keyed off `agent.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Process,
    Sdk,
    SandboxedVm,
    Mock,
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized agent kind: {0}")]
pub struct ParseAgentKindError(String);

impl std::str::FromStr for AgentKind {
    type Err = ParseAgentKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "process" => Ok(AgentKind::Process),
            "sdk" => Ok(AgentKind::Sdk),
            "sandboxed-vm" => Ok(AgentKind::SandboxedVm),
            "mock" => Ok(AgentKind::Mock),
            other => Err(ParseAgentKindError(other.to_string())),
        }
    }
}

/// What the core asks the agent to do.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub allowlist: ToolAllowlist,
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
    pub deadline: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    Success,
    TimedOut,
    Error,
}

#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub disposition: ExitDisposition,
    pub final_output: String,
}

/// Typed progress events an agent invocation may stream, consumed by the
/// orchestrator's progress reporter.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    AssistantText(String),
    ToolUse { name: String },
    Iteration(u32),
    Error(String),
}

pub type EventSender = mpsc::UnboundedSender<AgentEvent>;

#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Run one phase invocation to completion or deadline/cancellation,
    /// optionally streaming progress events to `events`.
    async fn invoke(
        &self,
        request: AgentRequest,
        events: Option<EventSender>,
        cancel: CancellationToken,
    ) -> Result<AgentResponse, PhaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn agent_kind_parses_the_closed_set() {
        assert_eq!(AgentKind::from_str("process").unwrap(), AgentKind::Process);
        assert_eq!(AgentKind::from_str("sdk").unwrap(), AgentKind::Sdk);
        assert_eq!(AgentKind::from_str("sandboxed-vm").unwrap(), AgentKind::SandboxedVm);
        assert_eq!(AgentKind::from_str("mock").unwrap(), AgentKind::Mock);
        assert!(AgentKind::from_str("bogus").is_err());
    }
}
