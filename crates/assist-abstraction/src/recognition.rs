//! Recognition contract: algorithm parameters, results and the [`Recognizer`] trait.

use crate::geometry::Rect;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Default score a template must reach to count as a match.
pub const DEFAULT_TEMPLATE_THRESHOLD: f64 = 0.8;

/// Errors reported by a [`Recognizer`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// The recognizer does not implement this algorithm.
    #[error("Unsupported algorithm: {0}")]
    Unsupported(AlgorithmKind),

    /// A resource the algorithm needs (template image, OCR model) is missing.
    #[error("Missing recognition resource: {0}")]
    MissingResource(String),

    /// The captured frame could not be analyzed.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Other recognizer failures.
    #[error("Recognition error: {0}")]
    Other(String),
}

/// Result type for recognition operations.
pub type RecognitionResult<T> = std::result::Result<T, RecognitionError>;

/// Raised when an algorithm name does not parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown algorithm: '{0}'")]
pub struct UnknownAlgorithm(pub String);

/// The algorithm family of a task, without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmKind {
    /// Always succeeds without looking at the screen.
    JustReturn,
    /// Template image matching.
    MatchTemplate,
    /// Text detection and recognition.
    OcrDetect,
    /// Perceptual hash comparison.
    Hash,
}

impl AlgorithmKind {
    /// Canonical name, as written in task definitions.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JustReturn => "JustReturn",
            Self::MatchTemplate => "MatchTemplate",
            Self::OcrDetect => "OcrDetect",
            Self::Hash => "Hash",
        }
    }
}

impl FromStr for AlgorithmKind {
    type Err = UnknownAlgorithm;

    /// Parses an algorithm name, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "justreturn" => Ok(Self::JustReturn),
            "matchtemplate" => Ok(Self::MatchTemplate),
            "ocrdetect" => Ok(Self::OcrDetect),
            "hash" => Ok(Self::Hash),
            _ => Err(UnknownAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Template matching parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchParams {
    /// Template image names, tried in order.
    pub templates: Vec<String>,
    /// One threshold per template.
    pub thresholds: Vec<f64>,
    /// Binarization mask range applied before matching.
    pub mask_range: (i32, i32),
}

impl MatchParams {
    /// Iterates `(template, threshold)` pairs in priority order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.templates.iter().map(String::as_str).zip(self.thresholds.iter().copied())
    }
}

/// Text recognition parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrParams {
    /// Accepted texts; any one of them is enough.
    pub text: Vec<String>,
    /// Require the whole recognized string to equal a candidate.
    pub full_match: bool,
    /// Use the ASCII character-set model.
    pub is_ascii: bool,
    /// Skip the text detector and recognize the ROI directly.
    pub without_det: bool,
    /// When a replacement pattern matches, replace the whole string rather than the matched part.
    pub replace_full: bool,
    /// Regex replacement rules applied to recognized text before matching.
    pub replace_map: Vec<(String, String)>,
}

impl OcrParams {
    /// Compiles the replacement rules into a reusable matcher.
    pub fn compile(&self) -> Result<OcrMatcher, regex::Error> {
        let rules = self
            .replace_map
            .iter()
            .map(|(pattern, replacement)| Ok((Regex::new(pattern)?, replacement.clone())))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(OcrMatcher {
            text: self.text.clone(),
            full_match: self.full_match,
            replace_full: self.replace_full,
            rules,
        })
    }

    /// Checks that every replacement pattern compiles.
    pub fn validate(&self) -> Result<(), regex::Error> {
        self.compile().map(|_| ())
    }
}

/// Compiled form of [`OcrParams`], built once and applied to many recognized strings.
#[derive(Debug, Clone)]
pub struct OcrMatcher {
    text: Vec<String>,
    full_match: bool,
    replace_full: bool,
    rules: Vec<(Regex, String)>,
}

impl OcrMatcher {
    /// Applies the replacement rules to a recognized string.
    pub fn normalize(&self, raw: &str) -> String {
        let mut text = raw.to_string();
        for (re, replacement) in &self.rules {
            if self.replace_full {
                if re.is_match(&text) {
                    text.clone_from(replacement);
                }
            } else {
                text = re.replace_all(&text, replacement.as_str()).into_owned();
            }
        }
        text
    }

    /// Returns the first candidate matched by `raw` after normalization.
    pub fn matched_candidate(&self, raw: &str) -> Option<&str> {
        let text = self.normalize(raw);
        self.text
            .iter()
            .find(|candidate| {
                if self.full_match {
                    text == **candidate
                } else {
                    text.contains(candidate.as_str())
                }
            })
            .map(String::as_str)
    }
}

/// Perceptual hash parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashParams {
    /// Candidate hashes as hex strings.
    pub hashes: Vec<String>,
    /// Maximum Hamming distance for a match.
    pub dist_threshold: u32,
    /// Binarization mask range.
    pub mask_range: (i32, i32),
    /// Whether edge pixels are cropped before hashing.
    pub bound: bool,
}

impl HashParams {
    /// Hamming distance between two hex hash strings of equal length.
    pub fn hamming_distance(lhs: &str, rhs: &str) -> Option<u32> {
        if lhs.len() != rhs.len() {
            return None;
        }
        lhs.chars().zip(rhs.chars()).try_fold(0u32, |acc, (a, b)| {
            let diff = a.to_digit(16)? ^ b.to_digit(16)?;
            Some(acc + diff.count_ones())
        })
    }

    /// Index of the closest candidate hash within the threshold.
    pub fn best_match(&self, computed: &str) -> Option<usize> {
        self.hashes
            .iter()
            .enumerate()
            .filter_map(|(index, hash)| Some((index, Self::hamming_distance(hash, computed)?)))
            .filter(|(_, dist)| *dist <= self.dist_threshold)
            .min_by_key(|(_, dist)| *dist)
            .map(|(index, _)| index)
    }
}

/// Algorithm selection together with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Algorithm {
    /// Always succeeds; no capture is needed.
    JustReturn,
    /// Template matching.
    MatchTemplate(MatchParams),
    /// Text recognition.
    OcrDetect(OcrParams),
    /// Perceptual hash comparison.
    Hash(HashParams),
}

impl Algorithm {
    /// The algorithm family.
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Self::JustReturn => AlgorithmKind::JustReturn,
            Self::MatchTemplate(_) => AlgorithmKind::MatchTemplate,
            Self::OcrDetect(_) => AlgorithmKind::OcrDetect,
            Self::Hash(_) => AlgorithmKind::Hash,
        }
    }

    /// Whether evaluating this algorithm requires a captured frame.
    pub fn needs_frame(&self) -> bool {
        !matches!(self, Self::JustReturn)
    }
}

/// A captured device screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Encoded or raw pixel data, opaque to the engine.
    pub data: Arc<[u8]>,
}

impl Frame {
    /// Creates a frame.
    pub fn new(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self { width, height, data: data.into() }
    }

    /// The full-frame rectangle.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, i32::try_from(self.width).unwrap_or(i32::MAX), i32::try_from(self.height).unwrap_or(i32::MAX))
    }
}

/// A successful recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Where the target was found.
    pub rect: Rect,
    /// Match confidence.
    pub score: f64,
    /// Recognized text, for OCR hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Hit {
    /// Creates a hit without text.
    pub fn new(rect: Rect, score: f64) -> Self {
        Self { rect, score, text: None }
    }

    /// Attaches recognized text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// What a [`Recognizer`] is asked to evaluate.
#[derive(Debug, Clone, Copy)]
pub struct RecognitionRequest<'a> {
    /// Name of the task being recognized.
    pub task: &'a str,
    /// Algorithm and parameters.
    pub algorithm: &'a Algorithm,
    /// Region to search; an empty rectangle means the whole frame.
    pub roi: Rect,
}

/// Perception collaborator: evaluates an algorithm against a frame.
///
/// Implementations are shared between threads. `Ok(None)` means the target was
/// not found; errors are treated as failed attempts by the engine.
pub trait Recognizer: Send + Sync {
    /// Evaluates `request` against `frame`.
    fn recognize(&self, frame: &Frame, request: RecognitionRequest<'_>) -> RecognitionResult<Option<Hit>>;
}
