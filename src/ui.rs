//! Human-facing progress reporter: renders the `ProgressEvent` stream the
//! orchestrator emits. `tracing` remains the machine-facing
//! channel — this is purely for a person watching a terminal.
//!
//! One `indicatif` spinner per unit of concurrent work, styled with
//! `console`, updated in place rather than scrolling. Bars are keyed on
//! item id rather than phase/iteration within a single item, since many
//! items can be in flight at once under the worker pool.

use std::collections::HashMap;
use std::sync::Mutex;

use console::{style, Emoji};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::orchestrator::events::ProgressEvent;

static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
static ARROW: Emoji<'_, '_> = Emoji("▸ ", "> ");

pub struct ProgressReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        ProgressReporter {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn bar_for(&self, item_id: &str) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap();
        bars.entry(item_id.to_string())
            .or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(
                    ProgressStyle::default_spinner()
                        .template("{prefix:.bold.dim} {spinner} {msg}")
                        .unwrap(),
                );
                bar.set_prefix(item_id.to_string());
                bar.enable_steady_tick(std::time::Duration::from_millis(100));
                bar
            })
            .clone()
    }

    /// Drain `rx` to completion, rendering each event. Consumes `self` so it
    /// can be handed straight to `tokio::spawn`.
    pub async fn run(self, mut rx: UnboundedReceiver<ProgressEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(event);
        }
        for bar in self.bars.lock().unwrap().values() {
            bar.finish_and_clear();
        }
    }

    fn handle(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::PhaseStarted { item_id, phase } => {
                let bar = self.bar_for(&item_id);
                bar.set_message(format!("{} {phase}", style("running").yellow()));
            }
            ProgressEvent::PhaseCompleted { item_id, phase } => {
                let bar = self.bar_for(&item_id);
                bar.set_message(format!("{CHECK}{phase} complete"));
            }
            ProgressEvent::PhaseFailed { item_id, phase, error } => {
                let bar = self.bar_for(&item_id);
                bar.set_message(format!("{CROSS}{phase} failed: {error}"));
            }
            ProgressEvent::StoryChanged { item_id, story_id } => {
                let bar = self.bar_for(&item_id);
                bar.set_message(format!("{ARROW}story {story_id}"));
            }
            ProgressEvent::Iteration { item_id, n } => {
                let bar = self.bar_for(&item_id);
                bar.set_message(format!("iteration {n}"));
            }
            ProgressEvent::AssistantOutputChunk { item_id, text } => {
                let bar = self.bar_for(&item_id);
                let snippet: String = text.chars().take(80).collect();
                bar.set_message(snippet);
            }
            ProgressEvent::Error { item_id, message } => {
                let label = item_id.unwrap_or_else(|| "-".to_string());
                self.multi
                    .println(format!("{CROSS}{label}: {message}"))
                    .ok();
            }
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
