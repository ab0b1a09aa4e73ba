//! Response recovery: raw model text to structured items.
//!
//! Four strategies run in order of trustworthiness and the first that
//! succeeds wins:
//!
//! | Stage | Input | Parser |
//! |-------|-------|--------|
//! | [`RecoveryStage::StrictParse`] | candidate spans as-is | `serde_json` |
//! | [`RecoveryStage::SanitizedParse`] | candidate spans after [`sanitize`] | `serde_json` |
//! | [`RecoveryStage::PermissiveEvaluation`] | candidate spans | [`parse_literal`] |
//! | [`RecoveryStage::PatternExtraction`] | whole text | field regexes |
//!
//! Each span stage tries every span from [`candidate_spans`] in order and
//! succeeds on the first value whose shape [`interpret`] recognises and that
//! holds items. A recognised but empty collection is remembered and returned
//! only if no span stage finds items. When every stage fails the caller
//! receives [`RecoveryError::Unrecoverable`]; an empty item list is only ever
//! returned for a parseable structure that genuinely holds zero items.

mod extract;
mod interpret;
mod literal;
mod patterns;
mod sanitize;

pub use extract::candidate_spans;
pub use interpret::interpret;
pub use literal::{parse_literal, LiteralError, MAX_DEPTH};
pub use patterns::extract_items;
pub use sanitize::sanitize;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::{ContentItem, RecoveryStage, RequestKind};

/// Failure of the whole pipeline for one response.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RecoveryError {
    /// The response held no non-whitespace text.
    #[error("response text is blank")]
    BlankText,

    /// No stage could extract structure.
    #[error("no recovery stage could extract structure ({})", .attempts.join("; "))]
    Unrecoverable {
        /// One note per stage that was attempted, strongest first.
        attempts: Vec<String>,
    },
}

/// Items recovered from one response and the stage that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub items: Vec<ContentItem>,
    pub stage: RecoveryStage,
}

/// Runs the recovery stages. Stateless and synchronous.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryPipeline;

impl RecoveryPipeline {
    pub fn new() -> Self {
        Self
    }

    /// Recovers items of `kind` from `text`.
    ///
    /// # Errors
    ///
    /// [`RecoveryError::BlankText`] for whitespace-only input and
    /// [`RecoveryError::Unrecoverable`] when all four stages fail.
    pub fn recover(&self, kind: RequestKind, text: &str) -> Result<Recovered, RecoveryError> {
        if text.trim().is_empty() {
            return Err(RecoveryError::BlankText);
        }

        let spans = candidate_spans(text);
        let mut attempts = Vec::new();
        let mut empty = None;

        if spans.is_empty() {
            attempts.push("no structured span in text".to_owned());
        } else {
            let stages: [(RecoveryStage, &dyn Fn(&str) -> Result<Value, String>); 3] = [
                (RecoveryStage::StrictParse, &|span: &str| {
                    serde_json::from_str(span).map_err(|e| e.to_string())
                }),
                (RecoveryStage::SanitizedParse, &|span: &str| {
                    let cleaned = sanitize(span);
                    if cleaned == span {
                        return Err("no rewrite applied".to_owned());
                    }
                    serde_json::from_str(&cleaned).map_err(|e| e.to_string())
                }),
                (RecoveryStage::PermissiveEvaluation, &|span: &str| {
                    parse_literal(span).map_err(|e| e.to_string())
                }),
            ];
            for (stage, parse) in stages {
                if let Some(recovered) =
                    run_stage(kind, &spans, stage, parse, &mut empty, &mut attempts)
                {
                    return Ok(recovered);
                }
            }
            if let Some(recovered) = empty {
                return Ok(recovered);
            }
        }

        if let Some(items) = extract_items(kind, text) {
            return Ok(found(items, RecoveryStage::PatternExtraction));
        }
        attempts.push("pattern-extraction: no fields found".to_owned());

        debug!(attempts = ?attempts, "response recovery failed");
        Err(RecoveryError::Unrecoverable { attempts })
    }
}

/// Tries one stage against every span. Returns the first non-empty result and
/// keeps the strongest empty one in `empty`.
fn run_stage(
    kind: RequestKind,
    spans: &[&str],
    stage: RecoveryStage,
    parse: &dyn Fn(&str) -> Result<Value, String>,
    empty: &mut Option<Recovered>,
    attempts: &mut Vec<String>,
) -> Option<Recovered> {
    for span in spans {
        match parse(span) {
            Ok(value) => match interpret(kind, &value) {
                Some(items) if !items.is_empty() => return Some(found(items, stage)),
                Some(_) => {
                    empty.get_or_insert(Recovered {
                        items: Vec::new(),
                        stage,
                    });
                }
                None => attempts.push(format!("{stage}: unrecognised shape")),
            },
            Err(e) => attempts.push(format!("{stage}: {e}")),
        }
    }
    None
}

fn found(items: Vec<ContentItem>, stage: RecoveryStage) -> Recovered {
    debug!(%stage, items = items.len(), "response recovered");
    Recovered { items, stage }
}
