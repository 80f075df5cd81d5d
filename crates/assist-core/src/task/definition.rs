//! On-disk task definitions and their conversion into descriptors.
//!
//! Definitions are JSON objects keyed by task name. Field names are camelCase
//! and every field is optional:
//!
//! ```json
//! {
//!   "StartButton": {
//!     "algorithm": "MatchTemplate",
//!     "template": "StartButton.png",
//!     "templThreshold": 0.85,
//!     "action": "ClickSelf",
//!     "roi": [900, 600, 380, 120],
//!     "next": ["Confirm", "StartButton"],
//!     "maxTimes": 5,
//!     "exceededNext": ["Abort"]
//!   }
//! }
//! ```

use super::descriptor::{Action, TaskDescriptor};
use crate::error::{CoreError, Result};
use assist_abstraction::{
    Algorithm, AlgorithmKind, DEFAULT_TEMPLATE_THRESHOLD, HashParams, MatchParams, OcrParams, Rect,
};
use serde::Deserialize;
use std::time::Duration;

/// A value written either alone or as a list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// A single value.
    One(T),
    /// A list of values.
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

/// Raw definition of one task as read from JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskDefinition {
    pub algorithm: Option<String>,
    pub action: Option<String>,
    pub sub: Vec<String>,
    pub sub_error_ignored: bool,
    pub next: Vec<String>,
    pub max_times: Option<u32>,
    pub exceeded_next: Vec<String>,
    pub on_error_next: Vec<String>,
    pub reduce_other_times: Vec<String>,
    pub specific_rect: Option<Rect>,
    pub pre_delay: u64,
    #[serde(alias = "rearDelay")]
    pub post_delay: u64,
    pub retry_times: Option<u32>,
    pub roi: Option<Rect>,
    pub rect_move: Option<Rect>,
    pub cache: bool,
    pub special_params: Vec<i32>,

    // MatchTemplate
    pub template: Option<OneOrMany<String>>,
    pub templ_threshold: Option<OneOrMany<f64>>,
    pub mask_range: Option<(i32, i32)>,

    // OcrDetect
    pub text: Vec<String>,
    pub full_match: bool,
    pub is_ascii: bool,
    pub without_det: bool,
    pub replace_full: bool,
    pub ocr_replace: Vec<(String, String)>,

    // Hash
    pub hash: Vec<String>,
    pub threshold: Option<u32>,
    pub bound: bool,
}

impl TaskDefinition {
    /// Converts the definition into a descriptor named `name`.
    ///
    /// The algorithm defaults to `MatchTemplate` with template `<name>.png`;
    /// the action defaults to `DoNothing`.
    pub fn into_descriptor(self, name: &str) -> Result<TaskDescriptor> {
        let kind = match self.algorithm.as_deref() {
            None => AlgorithmKind::MatchTemplate,
            Some(raw) => raw.parse().map_err(|e| CoreError::invalid(name, format!("{e}")))?,
        };
        let action = match self.action.as_deref() {
            None => Action::DoNothing,
            Some(raw) => raw.parse().map_err(|e| CoreError::invalid(name, format!("{e}")))?,
        };

        for (field, rect) in [("roi", self.roi), ("rectMove", self.rect_move), ("specificRect", self.specific_rect)] {
            if let Some(rect) = rect
                && !rect.is_valid()
            {
                return Err(CoreError::invalid(name, format!("{field} {rect} is out of range")));
            }
        }

        let algorithm = match kind {
            AlgorithmKind::JustReturn => Algorithm::JustReturn,
            AlgorithmKind::MatchTemplate => Algorithm::MatchTemplate(self.match_params(name)?),
            AlgorithmKind::OcrDetect => Algorithm::OcrDetect(self.ocr_params(name)?),
            AlgorithmKind::Hash => Algorithm::Hash(HashParams {
                hashes: self.hash.clone(),
                dist_threshold: self.threshold.unwrap_or(0),
                mask_range: self.mask_range.unwrap_or_default(),
                bound: self.bound,
            }),
        };

        Ok(TaskDescriptor {
            name: name.to_string(),
            algorithm,
            action,
            sub: self.sub,
            sub_error_ignored: self.sub_error_ignored,
            next: self.next,
            max_times: self.max_times,
            exceeded_next: self.exceeded_next,
            on_error_next: self.on_error_next,
            reduce_other_times: self.reduce_other_times,
            retry_times: self.retry_times,
            pre_delay: Duration::from_millis(self.pre_delay),
            post_delay: Duration::from_millis(self.post_delay),
            roi: self.roi.unwrap_or_default(),
            rect_move: self.rect_move.unwrap_or_default(),
            specific_rect: self.specific_rect.unwrap_or_default(),
            cache: self.cache,
            special_params: self.special_params,
        })
    }

    fn match_params(&self, name: &str) -> Result<MatchParams> {
        let templates = self
            .template
            .clone()
            .map_or_else(|| vec![format!("{name}.png")], OneOrMany::into_vec);
        if templates.is_empty() {
            return Err(CoreError::invalid(name, "template list is empty"));
        }

        let thresholds = match self.templ_threshold.clone() {
            None => vec![DEFAULT_TEMPLATE_THRESHOLD; templates.len()],
            Some(OneOrMany::One(threshold)) => vec![threshold; templates.len()],
            Some(OneOrMany::Many(thresholds)) if thresholds.len() == templates.len() => thresholds,
            Some(OneOrMany::Many(thresholds)) => {
                return Err(CoreError::invalid(
                    name,
                    format!(
                        "{} thresholds given for {} templates",
                        thresholds.len(),
                        templates.len()
                    ),
                ));
            }
        };
        if let Some(bad) = thresholds.iter().find(|t| !(0.0..=1.0).contains(*t)) {
            return Err(CoreError::invalid(name, format!("threshold {bad} is outside [0, 1]")));
        }

        Ok(MatchParams { templates, thresholds, mask_range: self.mask_range.unwrap_or_default() })
    }

    fn ocr_params(&self, name: &str) -> Result<OcrParams> {
        if self.text.is_empty() {
            return Err(CoreError::invalid(name, "OcrDetect requires at least one text"));
        }
        let params = OcrParams {
            text: self.text.clone(),
            full_match: self.full_match,
            is_ascii: self.is_ascii,
            without_det: self.without_det,
            replace_full: self.replace_full,
            replace_map: self.ocr_replace.clone(),
        };
        params
            .validate()
            .map_err(|e| CoreError::invalid(name, format!("bad ocrReplace pattern: {e}")))?;
        Ok(params)
    }
}
