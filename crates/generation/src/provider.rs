//! Provider descriptors and the adapter port.
//!
//! [`ProviderAdapter`] is the single interface every generation endpoint
//! implements. The `llm` crate supplies HTTP implementations; tests supply
//! scripted ones. The orchestrator only ever sees this trait.
//!
//! ## Failure taxonomy
//!
//! Adapters must classify every failure into [`ProviderFailure`] instead of
//! leaking transport-specific error shapes. HTTP 429 (or the provider's
//! documented equivalent) is always [`ProviderFailure::Throttled`]; a timeout
//! is always [`ProviderFailure::Transport`]. Adapters never retry internally.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{GenerationRequest, ModelName, ProviderId, RequestKind, Tier};

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// What a provider can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities {
    pub text_generation: bool,
    pub image_input: bool,
}

impl Capabilities {
    /// Text-only provider.
    pub const TEXT: Capabilities = Capabilities {
        text_generation: true,
        image_input: false,
    };

    /// Provider accepting both text prompts and image input.
    pub const MULTIMODAL: Capabilities = Capabilities {
        text_generation: true,
        image_input: true,
    };

    /// Returns `true` if a provider with these capabilities can serve `kind`.
    pub fn supports(self, kind: RequestKind) -> bool {
        match kind {
            RequestKind::ContentGeneration => self.text_generation,
            RequestKind::ImageRecognition => self.image_input,
        }
    }
}

/// Static description of one registered provider.
///
/// Immutable for the lifetime of a registry. `has_credentials` is resolved
/// once from the external credential store when the registry is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub label: String,
    pub capabilities: Capabilities,
    #[serde(default)]
    pub model: Option<ModelName>,
    pub cost: Tier,
    pub speed: Tier,
    pub throttle_risk: Tier,
    pub has_credentials: bool,
}

impl ProviderDescriptor {
    /// Creates a descriptor with medium tiers and no credentials.
    pub fn new(id: ProviderId, label: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            id,
            label: label.into(),
            capabilities,
            model: None,
            cost: Tier::Medium,
            speed: Tier::Medium,
            throttle_risk: Tier::Medium,
            has_credentials: false,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: Option<ModelName>) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn with_tiers(mut self, cost: Tier, speed: Tier, throttle_risk: Tier) -> Self {
        self.cost = cost;
        self.speed = speed;
        self.throttle_risk = throttle_risk;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, present: bool) -> Self {
        self.has_credentials = present;
        self
    }

    /// Sort key for default ordering: lower throttle risk, then cheaper, then
    /// faster.
    pub fn default_rank(&self) -> (Tier, Tier, std::cmp::Reverse<Tier>) {
        (self.throttle_risk, self.cost, std::cmp::Reverse(self.speed))
    }
}

// ---------------------------------------------------------------------------
// Raw responses
// ---------------------------------------------------------------------------

/// Classified adapter failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "kebab-case")]
pub enum ProviderFailure {
    /// Credentials were rejected (HTTP 401/403).
    #[error("authentication rejected: {message}")]
    Auth { message: String },

    /// The provider is throttling this client (HTTP 429 or equivalent).
    ///
    /// `retry_after` carries the provider's own hint when it sent one.
    #[error("throttled by provider")]
    Throttled {
        #[serde(default)]
        retry_after: Option<Duration>,
    },

    /// Network failure, timeout, or provider-side outage (5xx).
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// The call succeeded but carried no text.
    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("unclassified provider failure: {message}")]
    Unknown { message: String },
}

impl ProviderFailure {
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    /// Short class label used in logs and attempt summaries.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Throttled { .. } => "throttled",
            Self::Transport { .. } => "transport",
            Self::EmptyResponse => "empty-response",
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// The outcome of exactly one adapter call.
#[derive(Debug, Clone, PartialEq)]
pub struct RawProviderResponse {
    pub provider: ProviderId,
    pub outcome: Result<String, ProviderFailure>,
}

impl RawProviderResponse {
    pub fn text(provider: ProviderId, text: impl Into<String>) -> Self {
        Self {
            provider,
            outcome: Ok(text.into()),
        }
    }

    pub fn failure(provider: ProviderId, failure: ProviderFailure) -> Self {
        Self {
            provider,
            outcome: Err(failure),
        }
    }
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// One external generation endpoint.
///
/// Implementations perform exactly one network call per invocation, own their
/// timeout, and classify failures into [`ProviderFailure`]. Dropping the
/// returned future must abort the in-flight call; the orchestrator relies on
/// this for cancellation.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Sends the normalized request and returns raw text or a classified
    /// failure.
    async fn call(&self, request: &GenerationRequest) -> RawProviderResponse;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_gate_request_kinds() {
        assert!(Capabilities::TEXT.supports(RequestKind::ContentGeneration));
        assert!(!Capabilities::TEXT.supports(RequestKind::ImageRecognition));
        assert!(Capabilities::MULTIMODAL.supports(RequestKind::ImageRecognition));
    }

    #[test]
    fn default_rank_prefers_low_risk_then_cheap_then_fast() {
        let id = |s: &str| ProviderId::new(s).unwrap();
        let risky = ProviderDescriptor::new(id("a"), "A", Capabilities::TEXT).with_tiers(
            Tier::Low,
            Tier::Low,
            Tier::High,
        );
        let fast = ProviderDescriptor::new(id("b"), "B", Capabilities::TEXT).with_tiers(
            Tier::Low,
            Tier::High,
            Tier::Low,
        );
        let slow = ProviderDescriptor::new(id("c"), "C", Capabilities::TEXT).with_tiers(
            Tier::Low,
            Tier::Low,
            Tier::Low,
        );
        let mut all = [risky.clone(), slow.clone(), fast.clone()];
        all.sort_by_key(ProviderDescriptor::default_rank);
        assert_eq!(all[0].id, fast.id);
        assert_eq!(all[1].id, slow.id);
        assert_eq!(all[2].id, risky.id);
    }

    #[test]
    fn failure_class_labels() {
        assert_eq!(ProviderFailure::EmptyResponse.class(), "empty-response");
        assert!(ProviderFailure::Throttled { retry_after: None }.is_throttled());
    }
}
