//! The task descriptor store.

use super::definition::TaskDefinition;
use super::descriptor::TaskDescriptor;
use crate::error::{CoreError, Result};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Immutable, name-indexed collection of task descriptors.
///
/// A store is assembled once (from JSON files or descriptors), validated so
/// that every referenced name resolves, and then shared read-only.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: HashMap<String, Arc<TaskDescriptor>>,
}

impl TaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds and validates a store from descriptors.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = TaskDescriptor>) -> Result<Self> {
        let mut store = Self::new();
        for descriptor in descriptors {
            store.insert(descriptor)?;
        }
        store.validate()?;
        Ok(store)
    }

    /// Parses and validates a JSON definition document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let store = Self::parse_definitions(json)?;
        store.validate()?;
        Ok(store)
    }

    /// Loads and validates a single definition file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::load_files(&[path])
    }

    /// Loads several definition files into one store.
    ///
    /// Files may refer to each other's tasks; validation runs after all files
    /// are merged. A name defined in more than one file is rejected.
    pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut store = Self::new();
        for path in paths {
            let path = path.as_ref();
            let content = std::fs::read_to_string(path)?;
            let parsed = Self::parse_definitions(&content)?;
            debug!(path = %path.display(), tasks = parsed.len(), "Loaded task definitions");
            store.merge(parsed)?;
        }
        store.validate()?;
        Ok(store)
    }

    fn parse_definitions(json: &str) -> Result<Self> {
        let definitions: BTreeMap<String, TaskDefinition> = serde_json::from_str(json)?;
        let mut store = Self::new();
        for (name, definition) in definitions {
            store.insert(definition.into_descriptor(&name)?)?;
        }
        Ok(store)
    }

    /// Adds a descriptor. Names must be unique.
    pub fn insert(&mut self, descriptor: TaskDescriptor) -> Result<()> {
        if self.tasks.contains_key(&descriptor.name) {
            return Err(CoreError::DuplicateTask(descriptor.name));
        }
        self.tasks.insert(descriptor.name.clone(), Arc::new(descriptor));
        Ok(())
    }

    /// Moves every descriptor of `other` into this store.
    pub fn merge(&mut self, other: Self) -> Result<()> {
        if let Some(name) = other.tasks.keys().find(|name| self.tasks.contains_key(*name)) {
            return Err(CoreError::DuplicateTask(name.clone()));
        }
        self.tasks.extend(other.tasks);
        Ok(())
    }

    /// Checks that every referenced name resolves to a descriptor.
    pub fn validate(&self) -> Result<()> {
        for name in self.names() {
            let task = &self.tasks[name];
            for (field, reference) in task.references() {
                if !self.tasks.contains_key(reference) {
                    return Err(CoreError::DanglingReference {
                        task: task.name.clone(),
                        field,
                        reference: reference.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Looks up a descriptor.
    pub fn get(&self, name: &str) -> Option<Arc<TaskDescriptor>> {
        self.tasks.get(name).cloned()
    }

    /// Looks up a descriptor that must exist.
    pub fn require(&self, name: &str) -> Result<Arc<TaskDescriptor>> {
        self.get(name).ok_or_else(|| CoreError::UnknownTask(name.to_string()))
    }

    /// Whether `name` is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// All names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Names reachable from `entry` through `sub`, `next`, `exceeded_next`
    /// and `on_error_next`, in breadth-first order.
    pub fn reachable_from(&self, entry: &str) -> Result<Vec<String>> {
        self.require(entry)?;
        let mut seen = HashSet::from([entry.to_string()]);
        let mut order = Vec::new();
        let mut queue = VecDeque::from([entry.to_string()]);
        while let Some(name) = queue.pop_front() {
            let task = self.require(&name)?;
            for successor in task.successors() {
                if seen.insert(successor.to_string()) {
                    queue.push_back(successor.to_string());
                }
            }
            order.push(name);
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Action;
    use assist_abstraction::Algorithm;

    const DEFINITIONS: &str = r#"{
        "Start": { "algorithm": "JustReturn", "next": ["Battle", "Start"] },
        "Battle": { "action": "ClickSelf", "sub": ["Supply"], "next": ["Result"] },
        "Supply": { "algorithm": "JustReturn" },
        "Result": { "algorithm": "OcrDetect", "text": ["Victory"], "action": "Stop" },
        "Unused": { "algorithm": "JustReturn" }
    }"#;

    #[test]
    fn test_from_json_str() {
        let store = TaskStore::from_json_str(DEFINITIONS).unwrap();
        assert_eq!(store.len(), 5);
        assert_eq!(store.require("Result").unwrap().action, Action::Stop);
        assert!(store.get("Missing").is_none());
        assert!(matches!(store.require("Missing"), Err(CoreError::UnknownTask(_))));
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let err = TaskStore::from_json_str(r#"{"A": {"next": ["B"]}}"#).unwrap_err();
        match err {
            CoreError::DanglingReference { task, field, reference } => {
                assert_eq!(task, "A");
                assert_eq!(field, "next");
                assert_eq!(reference, "B");
            }
            other => panic!("Expected DanglingReference, got {other:?}"),
        }
    }

    #[test]
    fn test_reduce_other_times_must_resolve() {
        let err = TaskStore::from_json_str(r#"{"A": {"reduceOtherTimes": ["Ghost"]}}"#).unwrap_err();
        assert!(matches!(err, CoreError::DanglingReference { field: "reduce_other_times", .. }));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut store = TaskStore::new();
        store.insert(TaskDescriptor::new("A", Algorithm::JustReturn, Action::DoNothing)).unwrap();
        let err = store
            .insert(TaskDescriptor::new("A", Algorithm::JustReturn, Action::Stop))
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateTask(name) if name == "A"));
    }

    #[test]
    fn test_merge_rejects_redefinition() {
        let mut first = TaskStore::from_json_str(r#"{"A": {"algorithm": "JustReturn"}}"#).unwrap();
        let second = TaskStore::from_json_str(r#"{"A": {"algorithm": "JustReturn"}}"#).unwrap();
        assert!(matches!(first.merge(second), Err(CoreError::DuplicateTask(_))));
    }

    #[test]
    fn test_reachable_from() {
        let store = TaskStore::from_json_str(DEFINITIONS).unwrap();
        let reachable = store.reachable_from("Start").unwrap();
        assert_eq!(reachable, vec!["Start", "Battle", "Supply", "Result"]);
        assert!(store.reachable_from("Nowhere").is_err());
    }

    #[test]
    fn test_names_sorted() {
        let store = TaskStore::from_json_str(DEFINITIONS).unwrap();
        assert_eq!(store.names(), vec!["Battle", "Result", "Start", "Supply", "Unused"]);
    }
}
