//! Generation domain for Mealwise.
//!
//! This crate contains every domain concept shared by the workspace: request and
//! result shapes, the provider port trait, cooldown tracking, response recovery
//! and consensus merging. Infrastructure crates implement [`ProviderAdapter`];
//! they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; the `llm` crate defines *how* to reach a model
//! and the `orchestrator` crate decides *which* model to reach.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ProviderId`, `ModelName`, `RunId`) |
//! | [`types`] | Shared value types (`Confidence`, `Tier`, `Timestamp`) |
//! | [`request`] | Generation requests and their inputs |
//! | [`result`] | Recovered items and provenance |
//! | [`provider`] | Provider descriptors, failures and the adapter port |
//! | [`cooldown`] | Per-provider throttle cooldowns |
//! | [`recovery`] | Raw text to structured items |
//! | [`consensus`] | Merging results from several providers |
//! | [`prompt`] | Prompt text per request kind |

pub mod consensus;
pub mod cooldown;
pub mod identifiers;
pub mod prompt;
pub mod provider;
pub mod recovery;
pub mod request;
pub mod result;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use consensus::{merge, ConsensusResult, MergedItem};
pub use cooldown::{
    Clock, CooldownStatus, CooldownTracker, ManualClock, SystemClock, DEFAULT_COOLDOWN,
    MAX_COOLDOWN,
};
pub use identifiers::{ModelName, ProviderId, RunId};
pub use prompt::Prompt;
pub use provider::{
    Capabilities, ProviderAdapter, ProviderDescriptor, ProviderFailure, RawProviderResponse,
};
pub use recovery::{Recovered, RecoveryError, RecoveryPipeline};
pub use request::{
    EncodedImage, GenerationRequest, ImageMediaType, ImageRecognitionRequest, MealPlanRequest,
    RequestKind,
};
pub use result::{
    normalize_name, ContentItem, Meal, Provenance, RecognizedIngredient, RecoveredResult,
    RecoveryStage, PLACEHOLDER,
};
pub use types::{Confidence, Tier, Timestamp};
