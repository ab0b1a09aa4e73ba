//! Provider orchestration for Mealwise.
//!
//! Given a [`generation::GenerationRequest`], the [`Orchestrator`] picks an
//! ordered list of candidate providers, skips those cooling down, calls each
//! adapter in turn, recovers the raw text and returns the first success or a
//! typed [`OrchestrationError`].
//!
//! ## Architectural Layer
//!
//! **Orchestration.** This crate owns the *policy* for calling adapters
//! (ordering, fallback, cooldowns, cancellation, consensus fan-out). It holds
//! no transport code; adapters arrive as `Arc<dyn ProviderAdapter>` through
//! the [`ProviderRegistry`].
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`registry`] | `ProviderRegistry` and `PriorityPolicy` |
//! | [`orchestrator`] | `Orchestrator` and its status snapshot |
//! | [`errors`] | `OrchestrationError` and per-attempt failure records |
//! | [`cancel`] | `CancellationToken` |

pub mod cancel;
pub mod errors;
pub mod orchestrator;
pub mod registry;

pub use cancel::CancellationToken;
pub use errors::{AttemptFailure, FailedAttempt, OrchestrationError};
pub use orchestrator::{Orchestrator, OrchestratorStatus, DEFAULT_CONSENSUS_SOURCES};
pub use registry::{PriorityPolicy, ProviderRegistry, RegisteredProvider, RegistryError};
