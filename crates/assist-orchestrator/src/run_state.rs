//! Per-run execution state.
//!
//! [`RunState`] is owned by the worker thread and reset whenever a run
//! begins. Observers only ever see the [`RunSnapshot`] it publishes.

use assist_abstraction::{Hit, Rect};
use assist_core::TaskDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Identifies a queued chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An item on the pending stack.
#[derive(Debug, Clone)]
pub(crate) enum Pending {
    /// A task waiting to run, with the hit found when it was selected.
    Task { name: String, hit: Option<Hit>, depth: usize },
    /// A parent whose action has run; its remaining subs, then its `next`, follow.
    Resume { parent: Arc<TaskDescriptor>, remaining_subs: VecDeque<String>, depth: usize },
}

impl Pending {
    pub(crate) fn depth(&self) -> usize {
        match self {
            Self::Task { depth, .. } | Self::Resume { depth, .. } => *depth,
        }
    }
}

/// Counters, pending work and cache of the current run.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    exec_times: HashMap<String, u32>,
    reductions: HashMap<String, u32>,
    pending: Vec<Pending>,
    cache: HashMap<String, Rect>,
    pub(crate) chain: Option<ChainId>,
    pub(crate) current_task: Option<String>,
}

impl RunState {
    /// Clears everything; called when a run begins.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn exec_times(&self, name: &str) -> u32 {
        self.exec_times.get(name).copied().unwrap_or(0)
    }

    pub(crate) fn reductions(&self, name: &str) -> u32 {
        self.reductions.get(name).copied().unwrap_or(0)
    }

    /// Executions left for `task` in this run; `None` when unbounded.
    pub(crate) fn remaining(&self, task: &TaskDescriptor) -> Option<u32> {
        task.max_times.map(|max| {
            max.saturating_sub(self.exec_times(&task.name)).saturating_sub(self.reductions(&task.name))
        })
    }

    /// Whether `task` has spent its budget.
    pub(crate) fn is_exhausted(&self, task: &TaskDescriptor) -> bool {
        self.remaining(task) == Some(0)
    }

    pub(crate) fn record_execution(&mut self, name: &str) -> u32 {
        let times = self.exec_times.entry(name.to_string()).or_insert(0);
        *times += 1;
        *times
    }

    /// Shrinks the budget of `target` by one.
    ///
    /// A spent budget stays at zero and nothing is recorded; returns whether
    /// a reduction was recorded.
    pub(crate) fn reduce(&mut self, target: &TaskDescriptor) -> bool {
        if self.is_exhausted(target) {
            return false;
        }
        *self.reductions.entry(target.name.clone()).or_insert(0) += 1;
        true
    }

    pub(crate) fn cached_roi(&self, name: &str) -> Option<Rect> {
        self.cache.get(name).copied()
    }

    pub(crate) fn store_cache(&mut self, name: &str, rect: Rect) {
        self.cache.insert(name.to_string(), rect);
    }

    pub(crate) fn drop_cache(&mut self, name: &str) {
        self.cache.remove(name);
    }

    pub(crate) fn push(&mut self, item: Pending) {
        self.pending.push(item);
    }

    pub(crate) fn pop(&mut self) -> Option<Pending> {
        self.pending.pop()
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Read-only copy for observers.
    pub(crate) fn snapshot(&self, running: bool) -> RunSnapshot {
        RunSnapshot {
            running,
            chain: self.chain,
            current_task: self.current_task.clone(),
            exec_times: self.exec_times.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            reductions: self.reductions.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            pending: self.pending.len(),
            queued_chains: 0,
        }
    }
}

/// Published view of the current (or last) run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Whether a run is in progress.
    pub running: bool,
    /// Chain being executed.
    pub chain: Option<ChainId>,
    /// Task most recently started.
    pub current_task: Option<String>,
    /// Executions per task name.
    pub exec_times: BTreeMap<String, u32>,
    /// Budget reductions per task name.
    pub reductions: BTreeMap<String, u32>,
    /// Items on the pending stack.
    pub pending: usize,
    /// Chains queued but not yet started.
    pub queued_chains: usize,
}

impl RunSnapshot {
    /// Executions of `name` in this run.
    pub fn exec_times(&self, name: &str) -> u32 {
        self.exec_times.get(name).copied().unwrap_or(0)
    }

    /// Budget reductions applied to `name` in this run.
    pub fn reductions(&self, name: &str) -> u32 {
        self.reductions.get(name).copied().unwrap_or(0)
    }
}
