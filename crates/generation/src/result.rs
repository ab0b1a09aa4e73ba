//! Structured results recovered from provider output.

use serde::{Deserialize, Serialize};

use crate::{Confidence, ProviderId, RequestKind, RunId, Timestamp};

/// Value substituted for sub-fields the source text did not provide, so
/// consumers always see a complete item shape.
pub const PLACEHOLDER: &str = "Not specified";

// ---------------------------------------------------------------------------
// Recovery stages
// ---------------------------------------------------------------------------

/// The recovery strategy that produced a result.
///
/// Ordered by trustworthiness: `StrictParse < SanitizedParse <
/// PermissiveEvaluation < PatternExtraction`. The pipeline always reports the
/// first (strongest) stage that succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryStage {
    StrictParse,
    SanitizedParse,
    PermissiveEvaluation,
    PatternExtraction,
}

impl RecoveryStage {
    /// All stages, strongest first.
    pub const ALL: [RecoveryStage; 4] = [
        Self::StrictParse,
        Self::SanitizedParse,
        Self::PermissiveEvaluation,
        Self::PatternExtraction,
    ];
}

impl std::fmt::Display for RecoveryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::StrictParse => "strict-parse",
            Self::SanitizedParse => "sanitized-parse",
            Self::PermissiveEvaluation => "permissive-evaluation",
            Self::PatternExtraction => "pattern-extraction",
        })
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// One generated meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub name: String,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_minutes: Option<u32>,
    pub confidence: Confidence,
}

/// One ingredient recognised in a photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedIngredient {
    pub name: String,
    pub category: String,
    pub quantity: String,
    pub freshness: String,
    pub confidence: Confidence,
}

/// A single structured item: a generated meal or a recognised entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Meal(Meal),
    Ingredient(RecognizedIngredient),
}

impl ContentItem {
    pub fn name(&self) -> &str {
        match self {
            Self::Meal(m) => &m.name,
            Self::Ingredient(i) => &i.name,
        }
    }

    pub fn confidence(&self) -> Confidence {
        match self {
            Self::Meal(m) => m.confidence,
            Self::Ingredient(i) => i.confidence,
        }
    }

    /// Case-insensitive, whitespace-collapsed name used to match the same item
    /// across results.
    pub fn normalized_name(&self) -> String {
        normalize_name(self.name())
    }
}

/// Lowercases and collapses internal whitespace.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Where a result came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Providers whose output contributed. Exactly one for a sequential run.
    pub providers: Vec<ProviderId>,
    /// The weakest recovery stage among contributing outputs.
    pub stage: RecoveryStage,
    pub run_id: RunId,
    pub recovered_at: Timestamp,
}

/// Structured content plus provenance.
///
/// An empty `items` list is a valid outcome ("nothing recognised"); it is only
/// produced when the provider's output parsed into a structure holding zero
/// items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveredResult {
    pub kind: RequestKind,
    pub items: Vec<ContentItem>,
    pub provenance: Provenance,
}

impl RecoveredResult {
    /// The provider that produced this result (the first contributor for
    /// merged results).
    pub fn provider(&self) -> Option<&ProviderId> {
        self.provenance.providers.first()
    }

    pub fn stage(&self) -> RecoveryStage {
        self.provenance.stage
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
