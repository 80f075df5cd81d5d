//! The execution cycle.
//!
//! The worker parks until a start is accepted, then drains queued chains one
//! at a time. Each iteration pops one pending item and pushes at most one
//! successor, or a resume frame for the task's subs and `next`. Stop and exit
//! requests are honored between iterations and inside delays and retries,
//! never while an action is in flight.

use crate::action::{self, Checkpoint};
use crate::lifecycle::{ChainRequest, Phase, Shared, lock, wait};
use crate::notification::{MessageKind, Notifier};
use crate::run_state::{ChainId, Pending, RunState};
use crate::traversal::{Perception, Recognition};
use assist_abstraction::{Controller, Hit, Recognizer};
use assist_core::{Action, EngineConfig, TaskDescriptor, TaskStore};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, warn};

/// Result of one iteration.
#[derive(Debug)]
enum Step {
    Continue,
    /// The task's scope failed and no `on_error_next` candidate was recognized.
    Failed { task: String, depth: usize },
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainOutcome {
    Completed,
    Failed,
    Stopped,
}

/// Owner of the run state; lives on the worker thread.
pub(crate) struct Worker {
    shared: Arc<Shared>,
    store: Arc<TaskStore>,
    controller: Arc<dyn Controller>,
    recognizer: Arc<dyn Recognizer>,
    notifier: Notifier,
    config: EngineConfig,
    state: RunState,
    rng: StdRng,
}

fn perception<'a>(
    shared: &'a Shared,
    controller: &'a dyn Controller,
    recognizer: &'a dyn Recognizer,
    config: &EngineConfig,
) -> Perception<'a> {
    Perception {
        controller,
        recognizer,
        checkpoint: Checkpoint::new(&shared.interrupt, &shared.exit, config.checkpoint_interval()),
        retry_delay: config.retry_delay(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Worker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        store: Arc<TaskStore>,
        controller: Arc<dyn Controller>,
        recognizer: Arc<dyn Recognizer>,
        notifier: Notifier,
        config: EngineConfig,
    ) -> Self {
        let rng = config.rng_seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self { shared, store, controller, recognizer, notifier, config, state: RunState::default(), rng }
    }

    pub(crate) fn run(mut self) {
        debug!(engine = %self.shared.engine_id, "Worker started");
        while self.wait_for_start() {
            self.drain();
            self.go_idle();
        }
        debug!(engine = %self.shared.engine_id, "Worker exiting");
    }

    /// Parks until a start is accepted. Returns `false` on exit.
    fn wait_for_start(&self) -> bool {
        let mut control = lock(&self.shared.control);
        loop {
            if self.shared.exiting() {
                return false;
            }
            if control.start_epoch > control.ack_epoch {
                control.ack_epoch = control.start_epoch;
                self.shared.ack.notify_all();
                return true;
            }
            control = wait(&self.shared.wake, control);
        }
    }

    fn go_idle(&mut self) {
        self.state.clear_pending();
        self.state.current_task = None;
        let mut control = lock(&self.shared.control);
        control.phase = Phase::Idle;
        self.shared.running.store(false, Ordering::Release);
        self.shared.publish(self.state.snapshot(false));
        self.shared.ack.notify_all();
        info!(engine = %self.shared.engine_id, "Engine idle");
    }

    fn checkpoint(&self) -> Checkpoint<'_> {
        Checkpoint::new(&self.shared.interrupt, &self.shared.exit, self.config.checkpoint_interval())
    }

    fn stop_requested(&self) -> bool {
        self.checkpoint().should_stop()
    }

    fn next_chain(&self) -> Option<ChainRequest> {
        lock(&self.shared.control).chains.pop_front()
    }

    /// Runs queued chains until the queue is empty or a stop is requested.
    fn drain(&mut self) {
        self.state.reset();
        self.shared.publish(self.state.snapshot(true));

        if !self.controller.connected() {
            warn!(engine = %self.shared.engine_id, "Controller not connected, run aborted");
            self.notifier.global(MessageKind::InitFailed, json!({ "why": "ControllerNotConnected" }));
            return;
        }

        let mut chains = 0u32;
        loop {
            if self.stop_requested() {
                info!(chains, "Run stopped");
                return;
            }
            let Some(chain) = self.next_chain() else {
                info!(chains, "All chains processed");
                self.notifier.global(MessageKind::AllTasksCompleted, json!({ "chains": chains }));
                return;
            };
            chains += 1;

            match catch_unwind(AssertUnwindSafe(|| self.run_chain(&chain))) {
                Ok(ChainOutcome::Stopped) => return,
                Ok(ChainOutcome::Completed | ChainOutcome::Failed) => {}
                Err(payload) => {
                    let why = panic_message(payload.as_ref());
                    error!(chain = %chain.id, why = %why, "Chain panicked");
                    self.state.clear_pending();
                    self.notifier.global(MessageKind::InternalError, json!({ "why": why, "chain": chain.id }));
                    self.notifier.chain(MessageKind::ChainError, chain.id, json!({ "why": "InternalError" }));
                }
            }
        }
    }

    fn run_chain(&mut self, chain: &ChainRequest) -> ChainOutcome {
        info!(chain = %chain.id, entry = %chain.entry, "Chain started");
        self.state.chain = Some(chain.id);
        self.state.clear_pending();
        self.notifier.chain(MessageKind::ChainStart, chain.id, json!({ "entry": chain.entry }));
        self.state.push(Pending::Task { name: chain.entry.clone(), hit: None, depth: 0 });

        loop {
            if self.stop_requested() {
                info!(chain = %chain.id, "Chain stopped");
                self.state.clear_pending();
                self.notifier.chain(MessageKind::ChainStopped, chain.id, json!({ "entry": chain.entry }));
                return ChainOutcome::Stopped;
            }
            let Some(item) = self.state.pop() else {
                info!(chain = %chain.id, "Chain completed");
                self.notifier.chain(MessageKind::ChainCompleted, chain.id, json!({ "entry": chain.entry }));
                return ChainOutcome::Completed;
            };

            let step = self.step(chain.id, item);
            self.shared.publish(self.state.snapshot(true));

            match step {
                Step::Continue | Step::Stopped => {}
                Step::Failed { task, depth } => {
                    if let Some(failed) = self.escalate(chain.id, task, depth) {
                        warn!(chain = %chain.id, task = %failed, "Chain failed");
                        self.state.clear_pending();
                        self.notifier.chain(
                            MessageKind::ChainError,
                            chain.id,
                            json!({ "entry": chain.entry, "task": failed }),
                        );
                        return ChainOutcome::Failed;
                    }
                }
            }
        }
    }

    fn step(&mut self, chain: ChainId, item: Pending) -> Step {
        match item {
            Pending::Task { name, hit, depth } => self.run_task(chain, &name, hit, depth),
            Pending::Resume { parent, mut remaining_subs, depth } => {
                if let Some(sub) = remaining_subs.pop_front() {
                    self.state.push(Pending::Resume { parent, remaining_subs, depth });
                    self.state.push(Pending::Task { name: sub, hit: None, depth: depth + 1 });
                } else {
                    self.follow(&parent, &parent.next, depth);
                }
                Step::Continue
            }
        }
    }

    fn run_task(&mut self, chain: ChainId, name: &str, carried: Option<Hit>, depth: usize) -> Step {
        let Some(task) = self.store.get(name) else {
            error!(task = name, "Task missing from store");
            self.notifier.global(MessageKind::InternalError, json!({ "why": "UnknownTask", "task": name }));
            return Step::Failed { task: name.to_string(), depth };
        };
        self.state.current_task = Some(name.to_string());
        let exec_times = self.state.exec_times(name);
        debug!(chain = %chain, task = name, depth, exec_times, "Task started");
        self.notifier.subtask(
            MessageKind::SubTaskStart,
            chain,
            name,
            json!({
                "algorithm": task.algorithm.kind().as_str(),
                "action": task.action.as_str(),
                "exec_times": exec_times,
                "max_times": task.max_times,
            }),
        );

        if self.state.is_exhausted(&task) {
            info!(task = name, exec_times, "Execution budget spent");
            self.notifier.subtask(
                MessageKind::SubTaskExtraInfo,
                chain,
                name,
                json!({ "what": "ExceededLimit", "exec_times": exec_times, "max_times": task.max_times }),
            );
            self.notifier.subtask(MessageKind::SubTaskCompleted, chain, name, json!({ "what": "ExceededLimit" }));
            self.follow(&task, &task.exceeded_next, depth);
            return Step::Continue;
        }

        let recognition = perception(&self.shared, self.controller.as_ref(), self.recognizer.as_ref(), &self.config)
            .recognize(&task, carried, &mut self.state);
        let hit = match recognition {
            Recognition::Found(hit) => hit,
            Recognition::Exhausted { attempts } => {
                warn!(task = name, attempts, "Recognition failed");
                self.notifier.subtask(
                    MessageKind::SubTaskError,
                    chain,
                    name,
                    json!({ "why": "RecognitionFailed", "attempts": attempts }),
                );
                return self.recover(&task, depth);
            }
            Recognition::Interrupted => return self.interrupted(chain, name),
        };

        if !self.checkpoint().sleep(task.pre_delay) {
            return self.interrupted(chain, name);
        }

        let details = match action::perform(
            self.controller.as_ref(),
            &task,
            Some(&hit),
            self.config.window(),
            self.config.swipe_duration(),
            &mut self.rng,
        ) {
            Ok(details) => details,
            Err(e) => {
                warn!(task = name, action = %task.action, error = %e, "Action failed");
                self.notifier.subtask(
                    MessageKind::SubTaskError,
                    chain,
                    name,
                    json!({ "why": "ActionFailed", "error": e.to_string() }),
                );
                return self.recover(&task, depth);
            }
        };

        let exec_times = self.state.record_execution(name);
        for other in &task.reduce_other_times {
            if let Some(target) = self.store.get(other)
                && self.state.reduce(&target)
            {
                debug!(task = name, target = %other, "Reduced budget");
            }
        }

        let completed = json!({
            "action": task.action.as_str(),
            "exec_times": exec_times,
            "rect": hit.rect,
            "details": details,
        });
        let finished_delay = self.checkpoint().sleep(task.post_delay);
        self.notifier.subtask(MessageKind::SubTaskCompleted, chain, name, completed);
        if !finished_delay {
            return Step::Stopped;
        }

        if task.action == Action::Stop {
            info!(task = name, depth, "Stop action ends scope");
            return Step::Continue;
        }
        self.state.push(Pending::Resume {
            remaining_subs: task.sub.iter().cloned().collect(),
            parent: task,
            depth,
        });
        Step::Continue
    }

    /// Pushes the first recognized candidate of `candidates`. Returns whether one was found.
    fn follow(&mut self, task: &TaskDescriptor, candidates: &[String], depth: usize) -> bool {
        if candidates.is_empty() {
            return false;
        }
        let picked = perception(&self.shared, self.controller.as_ref(), self.recognizer.as_ref(), &self.config)
            .select_successor(&self.store, &self.state, candidates)
            .map(|(name, hit)| (name.clone(), hit));
        match picked {
            Some((name, hit)) => {
                debug!(from = %task.name, to = %name, "Successor selected");
                self.state.push(Pending::Task { name, hit: Some(hit), depth });
                true
            }
            None => {
                debug!(from = %task.name, candidates = candidates.len(), "No successor recognized");
                false
            }
        }
    }

    fn recover(&mut self, task: &TaskDescriptor, depth: usize) -> Step {
        if self.follow(task, &task.on_error_next, depth) {
            Step::Continue
        } else {
            Step::Failed { task: task.name.clone(), depth }
        }
    }

    fn interrupted(&self, chain: ChainId, name: &str) -> Step {
        info!(task = name, "Task interrupted");
        self.notifier.subtask(MessageKind::SubTaskStopped, chain, name, serde_json::Value::Null);
        Step::Stopped
    }

    /// Carries a scope failure up through the parents.
    ///
    /// Returns the top-level task that failed, or `None` when a parent with
    /// `sub_error_ignored` absorbed the failure.
    fn escalate(&mut self, chain: ChainId, task: String, depth: usize) -> Option<String> {
        let mut failed = task;
        let mut depth = depth;
        while depth > 0 {
            match self.state.pop() {
                Some(Pending::Resume { parent, remaining_subs, depth: parent_depth }) => {
                    if parent.sub_error_ignored {
                        debug!(task = %parent.name, sub = %failed, "Sub-task failure ignored");
                        self.state.push(Pending::Resume { parent, remaining_subs, depth: parent_depth });
                        return None;
                    }
                    warn!(task = %parent.name, sub = %failed, "Sub-task failed");
                    self.notifier.subtask(
                        MessageKind::SubTaskError,
                        chain,
                        &parent.name,
                        json!({ "why": "SubTaskFailed", "sub": failed }),
                    );
                    failed.clone_from(&parent.name);
                    depth = parent_depth;
                }
                other => {
                    error!(task = %failed, depth, top = ?other.as_ref().map(Pending::depth), "Failed sub-task has no parent frame");
                    return Some(failed);
                }
            }
        }
        Some(failed)
    }
}
