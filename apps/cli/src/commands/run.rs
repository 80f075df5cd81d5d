//! Dry-run command.
//!
//! Runs chains through the real engine against a simulated device and
//! prints every notification as it arrives.

use crate::device::{DryRunController, DryRunRecognizer, ScreenContent};
use anyhow::Context;
use assist_abstraction::Controller;
use assist_orchestrator::{Engine, MessageKind, NotificationEvent, NotificationSink, RunSnapshot};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Options for `assist run`.
#[derive(Debug)]
pub struct RunOptions {
    pub entries: Vec<String>,
    pub config: Option<PathBuf>,
    pub assume_found: bool,
    pub screen: ScreenContent,
    pub timeout: u64,
    pub json: bool,
}

/// Prints notifications and remembers whether anything failed.
struct ConsoleSink {
    json: bool,
    failed: AtomicBool,
}

impl ConsoleSink {
    fn new(json: bool) -> Self {
        Self { json, failed: AtomicBool::new(false) }
    }

    fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

impl NotificationSink for ConsoleSink {
    fn on_event(&self, event: &NotificationEvent) {
        if matches!(event.kind, MessageKind::ChainError | MessageKind::InitFailed | MessageKind::InternalError) {
            self.failed.store(true, Ordering::SeqCst);
        }
        if self.json {
            println!("{}", event.to_json());
        } else {
            println!("{}", render(event));
        }
    }
}

fn render(event: &NotificationEvent) -> String {
    let label = format!("[{}]", event.kind);
    let label = match event.kind {
        MessageKind::ChainError | MessageKind::SubTaskError | MessageKind::InitFailed | MessageKind::InternalError => {
            label.red().bold()
        }
        MessageKind::ChainCompleted | MessageKind::AllTasksCompleted => label.green().bold(),
        MessageKind::ChainStopped | MessageKind::SubTaskStopped => label.yellow(),
        _ => label.cyan(),
    };
    // Sub-task lines sit under the chain lines that bracket them.
    let mut line = if event.kind.is_subtask() { format!("  {label}") } else { label.to_string() };
    if let Some(chain) = event.chain {
        line.push_str(&format!(" chain={chain}"));
    }
    if let Some(task) = &event.task {
        line.push_str(&format!(" task={task}"));
    }
    if !event.details.is_null() {
        line.push_str(&format!(" {}", event.details.to_string().dimmed()));
    }
    line
}

/// Execute the run command.
pub fn execute(files: &[PathBuf], options: RunOptions) -> anyhow::Result<()> {
    let store = Arc::new(super::load_store(files)?);
    let config = crate::config::load_config(options.config.as_deref())?;

    let controller = Arc::new(DryRunController::new(config.window()));
    let sink = Arc::new(ConsoleSink::new(options.json));
    let engine = Engine::new(
        store,
        Arc::clone(&controller) as Arc<dyn Controller>,
        Arc::new(DryRunRecognizer::new(options.assume_found, options.screen)),
        Arc::clone(&sink) as Arc<dyn NotificationSink>,
        config,
    )
    .context("Failed to create engine")?;

    for entry in &options.entries {
        engine.append_chain(entry).with_context(|| format!("Cannot queue chain '{entry}'"))?;
    }
    engine.start(true);

    let deadline = Instant::now() + Duration::from_secs(options.timeout);
    let mut timed_out = false;
    while engine.running() {
        if Instant::now() >= deadline {
            warn!(timeout_secs = options.timeout, "Run timed out, stopping");
            engine.stop(true);
            timed_out = true;
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let snapshot = engine.snapshot();
    // Joins the message thread, so every notification is printed before the summary.
    engine.destroy();

    if !options.json {
        output_summary(&snapshot, controller.actions());
    }
    if timed_out {
        anyhow::bail!("Run did not finish within {}s", options.timeout);
    }
    if sink.failed() {
        anyhow::bail!("Run finished with errors");
    }
    Ok(())
}

fn output_summary(snapshot: &RunSnapshot, actions: usize) {
    println!();
    println!("{}", "Summary:".bold());
    println!("  Actions: {actions}");
    for (task, times) in &snapshot.exec_times {
        println!("  {task}: {times}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assist_orchestrator::ChainId;
    use serde_json::json;

    fn event(kind: MessageKind, details: serde_json::Value) -> NotificationEvent {
        serde_json::from_value(json!({
            "kind": kind,
            "chain": 3,
            "task": "Start",
            "details": details,
            "engine_id": "00000000-0000-0000-0000-000000000000",
        }))
        .unwrap()
    }

    #[test]
    fn test_render_includes_chain_task_and_details() {
        colored::control::set_override(false);
        let start = event(MessageKind::SubTaskStart, json!({ "exec_times": 0 }));
        assert_eq!(start.chain, Some(ChainId(3)));

        let line = render(&start);
        assert!(line.starts_with("  [SubTaskStart] chain=3 task=Start"));
        assert!(line.contains("\"exec_times\":0"));

        let chain_line = render(&event(MessageKind::ChainStart, json!(null)));
        assert!(chain_line.starts_with("[ChainStart] chain=3"));
    }

    #[test]
    fn test_sink_flags_chain_errors() {
        let sink = ConsoleSink::new(true);
        sink.on_event(&event(MessageKind::SubTaskError, json!({})));
        assert!(!sink.failed());
        sink.on_event(&event(MessageKind::ChainError, json!({})));
        assert!(sink.failed());
    }
}
