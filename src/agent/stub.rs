//! Documented stubs for the `sdk` and `sandboxed-vm` transport variants.
//!
//! The external agent-reasoning layer is out of scope,
//! but the dispatch shape named in `agent.kind` must exist so
//! config validation and `AgentKind::from_str` have somewhere real to route
//! to. Both stubs fail immediately with a clear "not implemented" error
//! rather than silently behaving like `process`.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{AgentRequest, AgentResponse, AgentTransport, EventSender};
use crate::errors::PhaseError;

pub struct SdkAgent;

#[async_trait]
impl AgentTransport for SdkAgent {
    async fn invoke(
        &self,
        _request: AgentRequest,
        _events: Option<EventSender>,
        _cancel: CancellationToken,
    ) -> Result<AgentResponse, PhaseError> {
        Err(PhaseError::Other(anyhow::anyhow!(
            "agent.kind = \"sdk\" has no in-process implementation; external collaborator"
        )))
    }
}

pub struct SandboxedVmAgent;

#[async_trait]
impl AgentTransport for SandboxedVmAgent {
    async fn invoke(
        &self,
        _request: AgentRequest,
        _events: Option<EventSender>,
        _cancel: CancellationToken,
    ) -> Result<AgentResponse, PhaseError> {
        Err(PhaseError::Other(anyhow::anyhow!(
            "agent.kind = \"sandboxed-vm\" has no in-process implementation; external collaborator"
        )))
    }
}
