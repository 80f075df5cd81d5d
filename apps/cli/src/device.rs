//! Simulated device used by `assist run`.

use assist_abstraction::{
    Algorithm, ControlResult, Controller, Frame, Hit, OcrMatcher, OcrParams, Point, RecognitionError,
    RecognitionRequest, RecognitionResult, Recognizer, Rect,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::info;

/// Controller that logs input instead of sending it anywhere.
pub struct DryRunController {
    screen: Rect,
    actions: AtomicUsize,
}

impl DryRunController {
    pub fn new(screen: Rect) -> Self {
        Self { screen, actions: AtomicUsize::new(0) }
    }

    /// Number of clicks and swipes performed so far.
    pub fn actions(&self) -> usize {
        self.actions.load(Ordering::SeqCst)
    }
}

impl Controller for DryRunController {
    fn connect(&self) -> ControlResult<()> {
        Ok(())
    }

    fn connected(&self) -> bool {
        true
    }

    fn screencap(&self) -> ControlResult<Frame> {
        let width = self.screen.width.max(0) as u32;
        let height = self.screen.height.max(0) as u32;
        Ok(Frame::new(width, height, Vec::<u8>::new()))
    }

    fn click(&self, point: Point) -> ControlResult<()> {
        self.actions.fetch_add(1, Ordering::SeqCst);
        info!(x = point.x, y = point.y, "click");
        Ok(())
    }

    fn swipe(&self, from: Point, to: Point, duration: Duration) -> ControlResult<()> {
        self.actions.fetch_add(1, Ordering::SeqCst);
        info!(from = %from, to = %to, duration_ms = duration.as_millis() as u64, "swipe");
        Ok(())
    }
}

/// What the simulated screen shows.
#[derive(Debug, Clone, Default)]
pub struct ScreenContent {
    /// Text an OCR pass would read.
    pub text: Option<String>,
    /// Perceptual hash of the screen, as hex.
    pub hash: Option<String>,
}

/// Recognizer with no real perception.
///
/// OCR tasks match against [`ScreenContent::text`] and hash tasks against
/// [`ScreenContent::hash`]. Anything else is found only with `assume_found`,
/// which also makes every task hit. `JustReturn` tasks never reach a
/// recognizer, so they always pass.
pub struct DryRunRecognizer {
    assume_found: bool,
    screen: ScreenContent,
    matchers: Mutex<HashMap<String, Arc<OcrMatcher>>>,
}

impl DryRunRecognizer {
    pub fn new(assume_found: bool, screen: ScreenContent) -> Self {
        Self { assume_found, screen, matchers: Mutex::new(HashMap::new()) }
    }

    fn matcher(&self, task: &str, params: &OcrParams) -> RecognitionResult<Arc<OcrMatcher>> {
        let mut matchers = self.matchers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(matcher) = matchers.get(task) {
            return Ok(Arc::clone(matcher));
        }
        let matcher = Arc::new(params.compile().map_err(|e| RecognitionError::Other(e.to_string()))?);
        matchers.insert(task.to_string(), Arc::clone(&matcher));
        Ok(matcher)
    }
}

impl Recognizer for DryRunRecognizer {
    fn recognize(&self, frame: &Frame, request: RecognitionRequest<'_>) -> RecognitionResult<Option<Hit>> {
        let rect = if request.roi.is_empty() { frame.bounds() } else { request.roi };
        let hit = match request.algorithm {
            Algorithm::OcrDetect(params) => match &self.screen.text {
                Some(text) => {
                    let matcher = self.matcher(request.task, params)?;
                    matcher.matched_candidate(text).map(|found| Hit::new(rect, 1.0).with_text(found))
                }
                None => None,
            },
            Algorithm::Hash(params) => self
                .screen
                .hash
                .as_deref()
                .and_then(|hash| params.best_match(hash))
                .map(|index| Hit::new(rect, 1.0).with_text(params.hashes[index].clone())),
            Algorithm::JustReturn | Algorithm::MatchTemplate(_) => None,
        };
        if hit.is_some() || !self.assume_found {
            return Ok(hit);
        }
        Ok(Some(Hit::new(rect, 1.0)))
    }
}
