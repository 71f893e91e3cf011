//! Builds the configured `AgentTransport` from `agent.kind`.

use std::sync::Arc;

use super::{mock::MockAgent, process::ProcessAgent, stub::{SandboxedVmAgent, SdkAgent}, AgentKind, AgentTransport};
use crate::config::AgentConfig;

pub fn build(config: &AgentConfig) -> Arc<dyn AgentTransport> {
    match config.kind {
        AgentKind::Process => Arc::new(ProcessAgent::new(
            config.command.clone(),
            config.completion_signal.clone(),
        )),
        AgentKind::Sdk => Arc::new(SdkAgent),
        AgentKind::SandboxedVm => Arc::new(SandboxedVmAgent),
        AgentKind::Mock => Arc::new(MockAgent::always_succeeds("mock agent default response")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_transport_for_every_agent_kind() {
        for kind in [AgentKind::Process, AgentKind::Sdk, AgentKind::SandboxedVm, AgentKind::Mock] {
            let config = AgentConfig {
                kind,
                command: "true".into(),
                completion_signal: None,
                env: Default::default(),
            };
            let _transport = build(&config);
        }
    }
}
