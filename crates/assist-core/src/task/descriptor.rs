//! Immutable task descriptors.

use assist_abstraction::{Algorithm, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Raised when an action name does not parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown action: '{0}'")]
pub struct UnknownAction(pub String);

/// What a task does once it has been recognized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Nothing; the task only gates the chain.
    #[default]
    DoNothing,
    /// Click inside the recognized region.
    ClickSelf,
    /// Click inside `specific_rect`.
    ClickRect,
    /// Click a random point on the screen.
    ClickRand,
    /// Swipe from `specific_rect` to `rect_move`.
    Swipe,
    /// End the current scope: the chain at top level, the sub-chain otherwise.
    Stop,
}

impl Action {
    /// Whether this action belongs to the click family.
    pub fn is_click(&self) -> bool {
        matches!(self, Self::ClickSelf | Self::ClickRect | Self::ClickRand)
    }

    /// Canonical name, as written in task definitions.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DoNothing => "DoNothing",
            Self::ClickSelf => "ClickSelf",
            Self::ClickRect => "ClickRect",
            Self::ClickRand => "ClickRand",
            Self::Swipe => "Swipe",
            Self::Stop => "Stop",
        }
    }
}

impl FromStr for Action {
    type Err = UnknownAction;

    /// Parses an action name, ignoring ASCII case. An empty name means `DoNothing`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "donothing" => Ok(Self::DoNothing),
            "clickself" => Ok(Self::ClickSelf),
            "clickrect" => Ok(Self::ClickRect),
            "clickrand" => Ok(Self::ClickRand),
            "swipe" => Ok(Self::Swipe),
            "stop" => Ok(Self::Stop),
            _ => Err(UnknownAction(s.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named unit of work: how to recognize it, what to do, where to go next.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    /// Unique name.
    pub name: String,
    /// Recognition algorithm and its parameters.
    pub algorithm: Algorithm,
    /// Action run after a successful recognition.
    pub action: Action,
    /// Child tasks run, in order, after the action and before `next`.
    pub sub: Vec<String>,
    /// Keep going when a child task fails.
    pub sub_error_ignored: bool,
    /// Successor candidates; the first one recognized wins.
    pub next: Vec<String>,
    /// Execution budget per run; `None` is unbounded.
    pub max_times: Option<u32>,
    /// Successor candidates once the budget is spent.
    pub exceeded_next: Vec<String>,
    /// Successor candidates when recognition or the action fails.
    pub on_error_next: Vec<String>,
    /// Tasks whose remaining budget shrinks by one each time this task runs.
    pub reduce_other_times: Vec<String>,
    /// Recognition attempts before the task fails; `None` is unbounded.
    pub retry_times: Option<u32>,
    /// Delay before the action.
    pub pre_delay: Duration,
    /// Delay after the action.
    pub post_delay: Duration,
    /// Region to search; empty means the whole frame.
    pub roi: Rect,
    /// Offset applied to the recognized region before clicking.
    pub rect_move: Rect,
    /// Fixed region for `ClickRect` and the swipe origin.
    pub specific_rect: Rect,
    /// Reuse the last hit region as the search region.
    pub cache: bool,
    /// Free parameters for actions.
    pub special_params: Vec<i32>,
}

impl TaskDescriptor {
    /// Creates a descriptor with no successors and unbounded budgets.
    pub fn new(name: impl Into<String>, algorithm: Algorithm, action: Action) -> Self {
        Self {
            name: name.into(),
            algorithm,
            action,
            sub: Vec::new(),
            sub_error_ignored: false,
            next: Vec::new(),
            max_times: None,
            exceeded_next: Vec::new(),
            on_error_next: Vec::new(),
            reduce_other_times: Vec::new(),
            retry_times: None,
            pre_delay: Duration::ZERO,
            post_delay: Duration::ZERO,
            roi: Rect::default(),
            rect_move: Rect::default(),
            specific_rect: Rect::default(),
            cache: false,
            special_params: Vec::new(),
        }
    }

    /// Number of recognition attempts allowed; at least one when bounded.
    pub fn attempts(&self) -> Option<u32> {
        self.retry_times.map(|times| times.max(1))
    }

    /// Every name this descriptor refers to, tagged with the field it appears in.
    pub fn references(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        let fields: [(&'static str, &Vec<String>); 5] = [
            ("sub", &self.sub),
            ("next", &self.next),
            ("exceeded_next", &self.exceeded_next),
            ("on_error_next", &self.on_error_next),
            ("reduce_other_times", &self.reduce_other_times),
        ];
        fields
            .into_iter()
            .flat_map(|(field, names)| names.iter().map(move |name| (field, name.as_str())))
    }

    /// Names reachable from this descriptor during traversal.
    pub fn successors(&self) -> impl Iterator<Item = &str> + '_ {
        self.references().filter(|(field, _)| *field != "reduce_other_times").map(|(_, name)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse() {
        assert_eq!("".parse::<Action>(), Ok(Action::DoNothing));
        assert_eq!("ClickSelf".parse::<Action>(), Ok(Action::ClickSelf));
        assert_eq!("clickrand".parse::<Action>(), Ok(Action::ClickRand));
        assert_eq!("SWIPE".parse::<Action>(), Ok(Action::Swipe));
        assert_eq!("Stop".parse::<Action>(), Ok(Action::Stop));
        assert_eq!("Teleport".parse::<Action>(), Err(UnknownAction("Teleport".to_string())));
    }

    #[test]
    fn test_click_family() {
        assert!(Action::ClickSelf.is_click());
        assert!(Action::ClickRect.is_click());
        assert!(Action::ClickRand.is_click());
        assert!(!Action::Swipe.is_click());
        assert!(!Action::DoNothing.is_click());
    }

    #[test]
    fn test_attempts_is_at_least_one() {
        let mut task = TaskDescriptor::new("A", Algorithm::JustReturn, Action::DoNothing);
        assert_eq!(task.attempts(), None);
        task.retry_times = Some(0);
        assert_eq!(task.attempts(), Some(1));
        task.retry_times = Some(3);
        assert_eq!(task.attempts(), Some(3));
    }

    #[test]
    fn test_references_and_successors() {
        let mut task = TaskDescriptor::new("A", Algorithm::JustReturn, Action::DoNothing);
        task.sub = vec!["S".to_string()];
        task.next = vec!["B".to_string()];
        task.reduce_other_times = vec!["C".to_string()];

        let refs: Vec<_> = task.references().collect();
        assert_eq!(refs, vec![("sub", "S"), ("next", "B"), ("reduce_other_times", "C")]);

        let successors: Vec<_> = task.successors().collect();
        assert_eq!(successors, vec!["S", "B"]);
    }
}
