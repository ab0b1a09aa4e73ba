//! Shared value types for the generation domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! values with invariants (confidence is always in `[0.0, 1.0]`) and take part
//! in domain computations such as consensus averaging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// A confidence score in the range `[0.0, 1.0]`.
///
/// Model output is untrusted, so construction clamps instead of rejecting:
/// `1.7` becomes `1.0`, `-0.2` becomes `0.0`. A score of exactly `0.0` is
/// reserved for an explicit zero reported by the provider; items without any
/// reported score receive [`Confidence::UNREPORTED`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    /// Score assigned when the source model did not report one.
    pub const UNREPORTED: Confidence = Confidence(0.5);

    /// Full confidence.
    pub const CERTAIN: Confidence = Confidence(1.0);

    /// Creates a [`Confidence`], clamping `value` into `[0.0, 1.0]`.
    ///
    /// NaN carries no information and maps to [`Confidence::UNREPORTED`].
    #[must_use]
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            Self::UNREPORTED
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    /// Interprets a model-reported number that may be a fraction (`0.85`) or
    /// a percentage (`85`).
    ///
    /// Values above `1.0` and at most `100.0` are treated as percentages.
    #[must_use]
    pub fn from_reported(value: f64) -> Self {
        if value > 1.0 && value <= 100.0 {
            Self::clamped(value / 100.0)
        } else {
            Self::clamped(value)
        }
    }

    /// Arithmetic mean of a set of scores, or `None` for an empty set.
    ///
    /// When every score is the same, that score is returned exactly.
    pub fn mean(scores: impl IntoIterator<Item = Confidence>) -> Option<Self> {
        let mut scores = scores.into_iter();
        let first = scores.next()?;
        let (sum, count, uniform) = scores.fold(
            (first.0, 1_u32, true),
            |(sum, count, uniform), c| (sum + c.0, count + 1, uniform && c == first),
        );
        if uniform {
            Some(first)
        } else {
            Some(Self::clamped(sum / f64::from(count)))
        }
    }

    /// Returns the score as an `f64` in `[0.0, 1.0]`.
    pub fn as_f64(self) -> f64 {
        self.0
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::UNREPORTED
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Provider tiers
// ---------------------------------------------------------------------------

/// Coarse three-level ranking used for cost, speed, and throttle risk.
///
/// Tiers are informational: they only feed the default candidate ordering when
/// no explicit priority list is configured.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Low,
    #[default]
    Medium,
    High,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// When a result was recovered, in UTC. Serialized as an RFC 3339 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.to_rfc3339())
    }
}
