//! Device and recognition abstraction layer for Assist.
//!
//! This crate defines the geometry types shared by every crate and the two
//! collaborator traits the engine drives: [`Controller`] for the target
//! device and [`Recognizer`] for the perception algorithms.

pub mod control;
pub mod geometry;
pub mod recognition;

pub use control::{ControlError, ControlResult, Controller};
pub use geometry::{Point, Rect};
pub use recognition::{
    Algorithm, AlgorithmKind, DEFAULT_TEMPLATE_THRESHOLD, Frame, HashParams, Hit, MatchParams,
    OcrMatcher, OcrParams, RecognitionError, RecognitionRequest, RecognitionResult, Recognizer,
    UnknownAlgorithm,
};
