//! Action execution and interruptible delays.

use assist_abstraction::{ControlResult, Controller, Hit, Point, Rect};
use assist_core::{Action, TaskDescriptor};
use rand::Rng;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cooperative cancellation point shared by delays and retries.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint<'a> {
    interrupt: &'a AtomicBool,
    exit: &'a AtomicBool,
    interval: Duration,
}

impl<'a> Checkpoint<'a> {
    pub(crate) fn new(interrupt: &'a AtomicBool, exit: &'a AtomicBool, interval: Duration) -> Self {
        Self { interrupt, exit, interval }
    }

    /// Whether a stop or exit has been requested.
    pub(crate) fn should_stop(&self) -> bool {
        self.interrupt.load(Ordering::Acquire) || self.exit.load(Ordering::Acquire)
    }

    /// Sleeps for `duration` in slices, returning `false` if interrupted.
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return true;
        }
        let deadline = Instant::now() + duration;
        loop {
            if self.should_stop() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(self.interval.min(deadline - now));
        }
    }
}

/// Uniformly random point inside `rect`; degenerate rectangles yield their center.
///
/// Edges past the `i32` range are clamped to it.
pub(crate) fn random_point(rect: Rect, rng: &mut impl Rng) -> Point {
    let (right, bottom) = (rect.right(), rect.bottom());
    if right <= rect.x || bottom <= rect.y {
        return rect.center();
    }
    Point::new(rng.gen_range(rect.x..right), rng.gen_range(rect.y..bottom))
}

/// Swipe duration: a positive first special parameter overrides `default` in milliseconds.
pub(crate) fn swipe_duration(task: &TaskDescriptor, default: Duration) -> Duration {
    match task.special_params.first() {
        Some(&ms) if ms > 0 => Duration::from_millis(u64::from(ms.unsigned_abs())),
        _ => default,
    }
}

/// Region a click-family action aims at.
pub(crate) fn click_region(task: &TaskDescriptor, hit: Option<&Hit>, window: Rect) -> Option<Rect> {
    if !task.action.is_click() {
        return None;
    }
    match task.action {
        Action::ClickSelf => {
            let rect = hit.map_or(task.roi, |hit| hit.rect);
            Some(if task.rect_move.is_empty() { rect } else { rect.move_by(task.rect_move) })
        }
        Action::ClickRect => Some(task.specific_rect),
        Action::ClickRand => Some(window),
        Action::DoNothing | Action::Swipe | Action::Stop => None,
    }
}

/// Runs the action of `task` against the device.
///
/// Returns details describing what was done, for the completion event.
pub(crate) fn perform(
    controller: &dyn Controller,
    task: &TaskDescriptor,
    hit: Option<&Hit>,
    window: Rect,
    default_swipe: Duration,
    rng: &mut impl Rng,
) -> ControlResult<Value> {
    match task.action {
        Action::DoNothing | Action::Stop => Ok(Value::Null),
        Action::ClickSelf | Action::ClickRect | Action::ClickRand => {
            let region = click_region(task, hit, window).unwrap_or(window);
            let point = random_point(region, rng);
            debug!(task = %task.name, action = %task.action, x = point.x, y = point.y, "Clicking");
            controller.click(point)?;
            Ok(json!({ "point": [point.x, point.y] }))
        }
        Action::Swipe => {
            let from = random_point(task.specific_rect, &mut *rng);
            let to = random_point(task.rect_move, rng);
            let duration = swipe_duration(task, default_swipe);
            debug!(task = %task.name, from = %from, to = %to, duration_ms = duration.as_millis(), "Swiping");
            controller.swipe(from, to, duration)?;
            Ok(json!({
                "from": [from.x, from.y],
                "to": [to.x, to.y],
                "distance": Point::distance(from, to),
                "duration_ms": duration.as_millis(),
            }))
        }
    }
}
