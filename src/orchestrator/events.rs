//! Typed progress events the orchestrator (and the implement loop it calls
//! into) emits, consumed by a progress reporter.
//!
//! One variant per thing worth drawing a line for on a progress display,
//! spanning phase transitions and story changes across every item in
//! flight, not just one.

use crate::agent::{AgentEvent, EventSender};
use crate::phase::PhaseKind;

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    PhaseStarted { item_id: String, phase: PhaseKind },
    PhaseCompleted { item_id: String, phase: PhaseKind },
    PhaseFailed { item_id: String, phase: PhaseKind, error: String },
    StoryChanged { item_id: String, story_id: String },
    Iteration { item_id: String, n: u32 },
    AssistantOutputChunk { item_id: String, text: String },
    Error { item_id: Option<String>, message: String },
}

pub type ProgressSender = tokio::sync::mpsc::UnboundedSender<ProgressEvent>;

/// Bridge one agent invocation's `AgentEvent` stream onto the item-level
/// `ProgressEvent` channel. Returns `None` when there's no sink to forward
/// to, so callers can pass `None` straight into `AgentTransport::invoke`
/// instead of spinning up a task nobody drains into.
pub fn agent_event_bridge(
    item_id: &str,
    sink: Option<&ProgressSender>,
) -> Option<(EventSender, tokio::task::JoinHandle<()>)> {
    let sink = sink?.clone();
    let item_id = item_id.to_string();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let mapped = match event {
                AgentEvent::Iteration(n) => Some(ProgressEvent::Iteration { item_id: item_id.clone(), n }),
                AgentEvent::AssistantText(text) => {
                    Some(ProgressEvent::AssistantOutputChunk { item_id: item_id.clone(), text })
                }
                AgentEvent::Error(message) => Some(ProgressEvent::Error { item_id: Some(item_id.clone()), message }),
                AgentEvent::ToolUse { .. } => None,
            };
            if let Some(event) = mapped {
                let _ = sink.send(event);
            }
        }
    });
    Some((tx, handle))
}
