//! Subprocess agent transport: spawns the configured command, pipes the
//! prompt over stdin, and stream-parses JSON-lines events from stdout.
//!
//! Spawn via `tokio::process::Command` with piped stdio, write the prompt
//! to stdin then close it, read stdout line-by-line parsing assistant
//! message events, accumulate the final text.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{AgentEvent, AgentRequest, AgentResponse, AgentTransport, EventSender, ExitDisposition};
use crate::errors::PhaseError;

pub struct ProcessAgent {
    /// Shell command to spawn, e.g. `claude` or `claude --print`.
    pub command: String,
    /// Sentinel string that must appear in the final output for the run to
    /// count as successful; `None`
    /// means exit code alone decides.
    pub completion_signal: Option<String>,
}

impl ProcessAgent {
    pub fn new(command: impl Into<String>, completion_signal: Option<String>) -> Self {
        ProcessAgent {
            command: command.into(),
            completion_signal,
        }
    }

    fn emit(events: &Option<EventSender>, event: AgentEvent) {
        if let Some(tx) = events {
            let _ = tx.send(event);
        }
    }
}

/// One line of the agent's streamed JSON protocol: an `assistant` message
/// carries a list of content blocks, each either text or a tool invocation.
#[derive(Debug, serde::Deserialize)]
struct StreamLine {
    #[serde(default)]
    r#type: String,
    #[serde(default)]
    message: Option<StreamMessage>,
}

#[derive(Debug, serde::Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: Vec<StreamContentBlock>,
}

#[derive(Debug, serde::Deserialize)]
struct StreamContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    name: String,
}

#[async_trait]
impl AgentTransport for ProcessAgent {
    async fn invoke(
        &self,
        request: AgentRequest,
        events: Option<EventSender>,
        cancel: CancellationToken,
    ) -> Result<AgentResponse, PhaseError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .current_dir(&request.working_dir)
            .envs(&request.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            PhaseError::Other(anyhow::anyhow!("failed to spawn agent process: {e}"))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.prompt.as_bytes())
                .await
                .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to write prompt: {e}")))?;
            // Drop closes stdin, signaling end-of-input to the agent.
        }

        let stdout = child.stdout.take().expect("stdout is piped");
        let mut lines = BufReader::new(stdout).lines();
        let mut final_text = String::new();
        let mut iteration = 0u32;

        let read_loop = async {
            while let Ok(Some(line)) = lines.next_line().await {
                if let Ok(parsed) = serde_json::from_str::<StreamLine>(&line) {
                    if parsed.r#type == "assistant" {
                        iteration += 1;
                        Self::emit(&events, AgentEvent::Iteration(iteration));
                        if let Some(message) = parsed.message {
                            for block in message.content {
                                match block.kind.as_str() {
                                    "text" => {
                                        final_text.push_str(&block.text);
                                        Self::emit(
                                            &events,
                                            AgentEvent::AssistantText(block.text.clone()),
                                        );
                                    }
                                    "tool_use" => {
                                        Self::emit(
                                            &events,
                                            AgentEvent::ToolUse { name: block.name.clone() },
                                        );
                                    }
                                    _ => {}
                                }
                            }
                        }
                    }
                }
            }
        };

        tokio::select! {
            _ = read_loop => {}
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                return Ok(AgentResponse {
                    disposition: ExitDisposition::Error,
                    final_output: final_text,
                });
            }
            result = tokio::time::sleep(request.deadline) => {
                let _ = result;
                let _ = child.start_kill();
                return Ok(AgentResponse {
                    disposition: ExitDisposition::TimedOut,
                    final_output: final_text,
                });
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to await agent process: {e}")))?;

        let signal_ok = self
            .completion_signal
            .as_ref()
            .map(|sig| final_text.contains(sig.as_str()))
            .unwrap_or(true);

        let disposition = if status.success() && signal_ok {
            ExitDisposition::Success
        } else if !status.success() {
            Self::emit(&events, AgentEvent::Error(format!("exit status: {status}")));
            ExitDisposition::Error
        } else {
            Self::emit(
                &events,
                AgentEvent::Error("completion signal not found in output".into()),
            );
            ExitDisposition::Error
        };

        Ok(AgentResponse {
            disposition,
            final_output: final_text,
        })
    }
}
