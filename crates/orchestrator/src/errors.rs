//! Failure classes surfaced to callers of the orchestrator.
//!
//! Adapter-level failures never reach the caller directly. They are recorded
//! as [`FailedAttempt`]s and only the exhaustion class is reported.

use std::time::Duration;

use generation::{ProviderFailure, ProviderId, RecoveryError, RequestKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why one attempted provider did not produce a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum AttemptFailure {
    /// The adapter call failed.
    Provider { failure: ProviderFailure },
    /// The provider answered but recovery could not extract structure.
    Unrecoverable { error: RecoveryError },
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provider { failure } => write!(f, "{failure}"),
            Self::Unrecoverable { error } => write!(f, "{error}"),
        }
    }
}

/// One provider attempted during a run and the reason it failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedAttempt {
    pub provider: ProviderId,
    pub reason: AttemptFailure,
}

impl FailedAttempt {
    pub fn is_throttled(&self) -> bool {
        matches!(&self.reason, AttemptFailure::Provider { failure } if failure.is_throttled())
    }

    pub fn is_unrecoverable(&self) -> bool {
        matches!(self.reason, AttemptFailure::Unrecoverable { .. })
    }

    /// Short label for the failure, without any provider-supplied text.
    pub fn class(&self) -> &'static str {
        match &self.reason {
            AttemptFailure::Provider { failure } => failure.class(),
            AttemptFailure::Unrecoverable { .. } => "unrecoverable",
        }
    }
}

/// Terminal failure of an orchestration run.
///
/// Each variant is a distinct, user-facing class; callers render them rather
/// than a raw transport error.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "kebab-case")]
pub enum OrchestrationError {
    /// No registered provider can serve this kind of request at all.
    #[error("no registered provider supports {kind} requests")]
    NoCapableProvider { kind: RequestKind },

    /// Capable providers exist but none has usable credentials.
    #[error("no provider with credentials is available for {kind} requests")]
    NoCredentials { kind: RequestKind },

    /// Every credentialed candidate is cooling down.
    #[error("all providers are rate limited; retry in {}s", .retry_after.as_secs())]
    AllRateLimited {
        /// Minimum remaining cooldown among the candidates.
        retry_after: Duration,
    },

    /// Candidates were attempted and each failed for a non-throttling reason.
    #[error("all {} attempted provider(s) failed", .attempts.len())]
    AllFailed { attempts: Vec<FailedAttempt> },

    /// Every attempted provider answered but none could be recovered.
    #[error("no provider response could be recovered into structured data")]
    UnrecoverableResponse { attempts: Vec<FailedAttempt> },

    /// The caller cancelled the run.
    #[error("generation run was cancelled")]
    Cancelled,
}

impl OrchestrationError {
    /// Minimum wait before retrying is meaningful, when known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::AllRateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Providers attempted before the run gave up, in attempt order.
    pub fn attempts(&self) -> &[FailedAttempt] {
        match self {
            Self::AllFailed { attempts } | Self::UnrecoverableResponse { attempts } => attempts,
            _ => &[],
        }
    }

    /// Short class label, matching the serialized tag.
    pub fn class(&self) -> &'static str {
        match self {
            Self::NoCapableProvider { .. } => "no-capable-provider",
            Self::NoCredentials { .. } => "no-credentials",
            Self::AllRateLimited { .. } => "all-rate-limited",
            Self::AllFailed { .. } => "all-failed",
            Self::UnrecoverableResponse { .. } => "unrecoverable-response",
            Self::Cancelled => "cancelled",
        }
    }
}
