//! A scriptable in-memory agent, used by `agent.kind = "mock"` and by unit
//! tests elsewhere in the crate that need an `AgentTransport` without
//! spawning a real subprocess.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{AgentEvent, AgentRequest, AgentResponse, AgentTransport, EventSender, ExitDisposition};
use crate::errors::PhaseError;

/// A queue of canned responses returned in order, one per `invoke` call.
/// Exhausting the queue returns a fixed "no more scripted responses" error,
/// which surfaces loudly in tests rather than silently repeating.
pub struct MockAgent {
    responses: Mutex<Vec<AgentResponse>>,
}

impl MockAgent {
    pub fn new(responses: Vec<AgentResponse>) -> Self {
        MockAgent {
            responses: Mutex::new(responses),
        }
    }

    /// A mock that always succeeds, optionally reporting files touched via
    /// `final_output` (tests that check scope enforcement parse this).
    pub fn always_succeeds(final_output: impl Into<String>) -> Self {
        MockAgent::new(vec![AgentResponse {
            disposition: ExitDisposition::Success,
            final_output: final_output.into(),
        }])
    }

    pub fn always_fails(message: impl Into<String>) -> Self {
        MockAgent::new(vec![AgentResponse {
            disposition: ExitDisposition::Error,
            final_output: message.into(),
        }])
    }
}

#[async_trait]
impl AgentTransport for MockAgent {
    async fn invoke(
        &self,
        _request: AgentRequest,
        events: Option<EventSender>,
        _cancel: CancellationToken,
    ) -> Result<AgentResponse, PhaseError> {
        let mut responses = self.responses.lock().await;
        if responses.is_empty() {
            return Err(PhaseError::Other(anyhow::anyhow!(
                "mock agent has no more scripted responses"
            )));
        }
        let response = responses.remove(0);
        if let Some(tx) = &events {
            let _ = tx.send(AgentEvent::AssistantText(response.final_output.clone()));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AgentRequest {
        AgentRequest {
            prompt: "do the thing".into(),
            allowlist: crate::phase::ToolAllowlist::ImplementFull,
            working_dir: std::env::temp_dir(),
            env: Default::default(),
            deadline: std::time::Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn returns_scripted_responses_in_order() {
        let mock = MockAgent::new(vec![
            AgentResponse {
                disposition: ExitDisposition::Success,
                final_output: "first".into(),
            },
            AgentResponse {
                disposition: ExitDisposition::Error,
                final_output: "second".into(),
            },
        ]);

        let first = mock
            .invoke(request(), None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.final_output, "first");

        let second = mock
            .invoke(request(), None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second.disposition, ExitDisposition::Error);
    }

    #[tokio::test]
    async fn errors_loudly_once_exhausted() {
        let mock = MockAgent::new(vec![]);
        assert!(mock
            .invoke(request(), None, CancellationToken::new())
            .await
            .is_err());
    }
}
