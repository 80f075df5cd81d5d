//! Task graph traversal: recognition with retries and successor selection.
//!
//! Every successor list (`next`, `exceeded_next`, `on_error_next`) is resolved
//! the same way: candidates are tested in list order against one capture and
//! the first one whose recognition holds is the only successor.

use crate::action::Checkpoint;
use crate::error::StepError;
use crate::run_state::RunState;
use assist_abstraction::{Algorithm, Controller, Frame, Hit, RecognitionRequest, Recognizer, Rect};
use assist_core::{TaskDescriptor, TaskStore};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Returns the first candidate accepted by `test`, with what `test` produced.
pub(crate) fn first_match<'a, T, H>(
    candidates: &'a [T],
    mut test: impl FnMut(&T) -> Option<H>,
) -> Option<(&'a T, H)> {
    candidates.iter().find_map(|candidate| test(candidate).map(|found| (candidate, found)))
}

/// Outcome of recognizing the current task.
#[derive(Debug)]
pub(crate) enum Recognition {
    Found(Hit),
    Exhausted { attempts: u32 },
    Interrupted,
}

/// Recognition front-end over the device and the recognizer.
pub(crate) struct Perception<'a> {
    pub(crate) controller: &'a dyn Controller,
    pub(crate) recognizer: &'a dyn Recognizer,
    pub(crate) checkpoint: Checkpoint<'a>,
    pub(crate) retry_delay: Duration,
}

impl Perception<'_> {
    /// Recognizes `task`, retrying up to its attempt limit.
    ///
    /// A `carried` hit (found when the task was selected as a successor)
    /// counts as a successful first attempt.
    pub(crate) fn recognize(&self, task: &TaskDescriptor, carried: Option<Hit>, state: &mut RunState) -> Recognition {
        if let Some(hit) = carried {
            if task.cache {
                state.store_cache(&task.name, hit.rect);
            }
            return Recognition::Found(hit);
        }

        let limit = task.attempts();
        let mut attempts = 0u32;
        loop {
            if self.checkpoint.should_stop() {
                return Recognition::Interrupted;
            }
            attempts += 1;
            match self.attempt(task, state) {
                Ok(Some(hit)) => {
                    debug!(task = %task.name, attempts, rect = %hit.rect, "Recognized");
                    return Recognition::Found(hit);
                }
                Ok(None) => trace!(task = %task.name, attempts, "Not recognized"),
                Err(e) => warn!(task = %task.name, attempts, error = %e, "Recognition attempt failed"),
            }
            if limit.is_some_and(|limit| attempts >= limit) {
                return Recognition::Exhausted { attempts };
            }
            if !self.checkpoint.sleep(self.retry_delay) {
                return Recognition::Interrupted;
            }
        }
    }

    /// One capture plus one recognition, with the cache applied.
    fn attempt(&self, task: &TaskDescriptor, state: &mut RunState) -> Result<Option<Hit>, StepError> {
        let cached = if task.cache { state.cached_roi(&task.name) } else { None };
        let roi = cached.unwrap_or(task.roi);
        let frame = if task.algorithm.needs_frame() { Some(self.controller.screencap()?) } else { None };

        let hit = self.evaluate(task, frame.as_ref(), roi)?;
        if task.cache {
            match &hit {
                Some(hit) => state.store_cache(&task.name, hit.rect),
                None if cached.is_some() => state.drop_cache(&task.name),
                None => {}
            }
        }
        Ok(hit)
    }

    fn evaluate(&self, task: &TaskDescriptor, frame: Option<&Frame>, roi: Rect) -> Result<Option<Hit>, StepError> {
        match (&task.algorithm, frame) {
            (Algorithm::JustReturn, _) => Ok(Some(Hit::new(roi, 1.0))),
            (algorithm, Some(frame)) => {
                let request = RecognitionRequest { task: &task.name, algorithm, roi };
                Ok(self.recognizer.recognize(frame, request)?)
            }
            (_, None) => Ok(None),
        }
    }

    /// Picks the first candidate in `candidates` that is recognized now.
    ///
    /// At most one frame is captured, and only if a candidate needs one.
    pub(crate) fn select_successor<'n>(
        &self,
        store: &TaskStore,
        state: &RunState,
        candidates: &'n [String],
    ) -> Option<(&'n String, Hit)> {
        let mut frame: Option<Frame> = None;
        let mut capture_failed = false;

        first_match(candidates, |name| {
            let Some(task) = store.get(name) else {
                warn!(task = %name, "Successor is not defined");
                return None;
            };
            if task.algorithm.needs_frame() && frame.is_none() && !capture_failed {
                match self.controller.screencap() {
                    Ok(captured) => frame = Some(captured),
                    Err(e) => {
                        warn!(error = %e, "Capture for successor selection failed");
                        capture_failed = true;
                    }
                }
            }
            let roi = if task.cache { state.cached_roi(name).unwrap_or(task.roi) } else { task.roi };
            match self.evaluate(&task, frame.as_ref(), roi) {
                Ok(hit) => hit,
                Err(e) => {
                    warn!(task = %name, error = %e, "Successor recognition failed");
                    None
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assist_abstraction::{ControlResult, MatchParams, Point, RecognitionResult};
    use assist_core::Action;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Screen {
        captures: AtomicUsize,
    }

    impl Controller for Screen {
        fn connect(&self) -> ControlResult<()> {
            Ok(())
        }

        fn connected(&self) -> bool {
            true
        }

        fn screencap(&self) -> ControlResult<Frame> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            Ok(Frame::new(4, 4, vec![0u8; 16]))
        }

        fn click(&self, _point: Point) -> ControlResult<()> {
            Ok(())
        }

        fn swipe(&self, _from: Point, _to: Point, _duration: Duration) -> ControlResult<()> {
            Ok(())
        }
    }

    /// Recognizes only the named tasks and records every request.
    struct Visible {
        names: HashSet<String>,
        requests: Mutex<Vec<(String, Rect)>>,
    }

    impl Visible {
        fn new(names: &[&str]) -> Self {
            Self { names: names.iter().map(ToString::to_string).collect(), requests: Mutex::new(Vec::new()) }
        }

        fn requested(&self, name: &str) -> usize {
            self.requests.lock().unwrap().iter().filter(|(task, _)| task == name).count()
        }
    }

    impl Recognizer for Visible {
        fn recognize(&self, _frame: &Frame, request: RecognitionRequest<'_>) -> RecognitionResult<Option<Hit>> {
            self.requests.lock().unwrap().push((request.task.to_string(), request.roi));
            Ok(self.names.contains(request.task).then(|| Hit::new(Rect::new(5, 5, 10, 10), 0.95)))
        }
    }

    fn template(name: &str) -> TaskDescriptor {
        let params = MatchParams {
            templates: vec![format!("{name}.png")],
            thresholds: vec![0.8],
            mask_range: (0, 0),
        };
        TaskDescriptor::new(name, Algorithm::MatchTemplate(params), Action::DoNothing)
    }

    fn store(tasks: Vec<TaskDescriptor>) -> TaskStore {
        TaskStore::from_descriptors(tasks).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    struct Flags {
        interrupt: AtomicBool,
        exit: AtomicBool,
    }

    impl Flags {
        fn new() -> Self {
            Self { interrupt: AtomicBool::new(false), exit: AtomicBool::new(false) }
        }

        fn checkpoint(&self) -> Checkpoint<'_> {
            Checkpoint::new(&self.interrupt, &self.exit, Duration::from_millis(1))
        }
    }

    #[test]
    fn test_first_match_respects_order() {
        let candidates = [1, 2, 3, 4];
        let mut tested = Vec::new();
        let found = first_match(&candidates, |n| {
            tested.push(*n);
            (*n % 2 == 0).then_some(n * 10)
        });
        assert_eq!(found, Some((&2, 20)));
        assert_eq!(tested, vec![1, 2]);
        assert_eq!(first_match(&candidates, |_| None::<()>), None);
    }

    #[test]
    fn test_select_successor_picks_first_recognized() {
        let screen = Screen { captures: AtomicUsize::new(0) };
        let recognizer = Visible::new(&["C", "D"]);
        let flags = Flags::new();
        let perception = Perception {
            controller: &screen,
            recognizer: &recognizer,
            checkpoint: flags.checkpoint(),
            retry_delay: Duration::ZERO,
        };
        let store = store(vec![template("B"), template("C"), template("D")]);
        let candidates = names(&["B", "C", "D"]);

        let (name, hit) = perception.select_successor(&store, &RunState::default(), &candidates).unwrap();
        assert_eq!(name, "C");
        assert_eq!(hit.rect, Rect::new(5, 5, 10, 10));
        assert_eq!(recognizer.requested("D"), 0);
        assert_eq!(screen.captures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_select_successor_without_match_or_capture() {
        let screen = Screen { captures: AtomicUsize::new(0) };
        let recognizer = Visible::new(&[]);
        let flags = Flags::new();
        let perception = Perception {
            controller: &screen,
            recognizer: &recognizer,
            checkpoint: flags.checkpoint(),
            retry_delay: Duration::ZERO,
        };
        let store = store(vec![
            template("B"),
            TaskDescriptor::new("J", Algorithm::JustReturn, Action::DoNothing),
        ]);

        assert!(perception.select_successor(&store, &RunState::default(), &names(&["B"])).is_none());
        assert!(perception.select_successor(&store, &RunState::default(), &[]).is_none());

        let captures = screen.captures.load(Ordering::SeqCst);
        let successors = names(&["J", "B"]);
        let (name, _) = perception.select_successor(&store, &RunState::default(), &successors).unwrap();
        assert_eq!(name, "J");
        assert_eq!(screen.captures.load(Ordering::SeqCst), captures);
    }

    #[test]
    fn test_recognize_exhausts_attempts() {
        let screen = Screen { captures: AtomicUsize::new(0) };
        let recognizer = Visible::new(&[]);
        let flags = Flags::new();
        let perception = Perception {
            controller: &screen,
            recognizer: &recognizer,
            checkpoint: flags.checkpoint(),
            retry_delay: Duration::from_millis(1),
        };
        let mut task = template("X");
        task.retry_times = Some(2);

        let outcome = perception.recognize(&task, None, &mut RunState::default());
        assert!(matches!(outcome, Recognition::Exhausted { attempts: 2 }));
        assert_eq!(recognizer.requested("X"), 2);
        assert_eq!(screen.captures.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_recognize_uses_carried_hit() {
        let screen = Screen { captures: AtomicUsize::new(0) };
        let recognizer = Visible::new(&[]);
        let flags = Flags::new();
        let perception = Perception {
            controller: &screen,
            recognizer: &recognizer,
            checkpoint: flags.checkpoint(),
            retry_delay: Duration::ZERO,
        };
        let carried = Hit::new(Rect::new(1, 1, 1, 1), 0.9);

        let outcome = perception.recognize(&template("A"), Some(carried.clone()), &mut RunState::default());
        assert!(matches!(outcome, Recognition::Found(hit) if hit == carried));
        assert_eq!(recognizer.requested("A"), 0);
        assert_eq!(screen.captures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_recognize_interrupted() {
        let screen = Screen { captures: AtomicUsize::new(0) };
        let recognizer = Visible::new(&[]);
        let flags = Flags::new();
        flags.interrupt.store(true, Ordering::SeqCst);
        let perception = Perception {
            controller: &screen,
            recognizer: &recognizer,
            checkpoint: flags.checkpoint(),
            retry_delay: Duration::ZERO,
        };

        let outcome = perception.recognize(&template("A"), None, &mut RunState::default());
        assert!(matches!(outcome, Recognition::Interrupted));
        assert_eq!(recognizer.requested("A"), 0);
    }

    #[test]
    fn test_cache_narrows_roi_and_is_dropped_on_miss() {
        let screen = Screen { captures: AtomicUsize::new(0) };
        let flags = Flags::new();
        let mut task = template("A");
        task.cache = true;
        task.retry_times = Some(1);
        let mut state = RunState::default();

        let visible = Visible::new(&["A"]);
        let perception = Perception {
            controller: &screen,
            recognizer: &visible,
            checkpoint: flags.checkpoint(),
            retry_delay: Duration::ZERO,
        };
        assert!(matches!(perception.recognize(&task, None, &mut state), Recognition::Found(_)));
        assert_eq!(state.cached_roi("A"), Some(Rect::new(5, 5, 10, 10)));

        let hidden = Visible::new(&[]);
        let perception = Perception {
            controller: &screen,
            recognizer: &hidden,
            checkpoint: flags.checkpoint(),
            retry_delay: Duration::ZERO,
        };
        assert!(matches!(perception.recognize(&task, None, &mut state), Recognition::Exhausted { .. }));
        assert_eq!(hidden.requests.lock().unwrap()[0].1, Rect::new(5, 5, 10, 10));
        assert_eq!(state.cached_roi("A"), None);
    }
}
