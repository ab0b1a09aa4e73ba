//! The orchestration entry point.
//!
//! ## Sequential runs
//!
//! [`Orchestrator::generate`] selects an ordered candidate list and tries each
//! candidate strictly in order until one produces a recoverable response:
//!
//! 1. Providers that cannot serve the request kind are dropped. If none remain
//!    the run fails with [`OrchestrationError::NoCapableProvider`].
//! 2. Providers without credentials are dropped. If none remain the run fails
//!    with [`OrchestrationError::NoCredentials`] before any network call.
//! 3. A valid preferred provider moves to the front; the rest follow
//!    [`PriorityPolicy`] order.
//! 4. Candidates in cooldown are skipped without counting as an attempt.
//! 5. A `throttled` failure marks the provider in the tracker before moving
//!    on. No provider is called twice in one run.
//!
//! ## Consensus runs
//!
//! [`Orchestrator::cross_validate`] calls several eligible providers
//! concurrently, waits for all of them, and merges the successful results.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use generation::{
    merge, ConsensusResult, CooldownStatus, CooldownTracker, GenerationRequest, Provenance,
    ProviderFailure, ProviderId, RawProviderResponse, RecoveredResult, RecoveryPipeline,
    RequestKind, RunId, Timestamp,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    AttemptFailure, CancellationToken, FailedAttempt, OrchestrationError, PriorityPolicy,
    ProviderRegistry, RegisteredProvider,
};

/// Number of providers asked in a consensus run unless configured otherwise.
pub const DEFAULT_CONSENSUS_SOURCES: usize = 3;

/// Read-only snapshot for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Credentialed providers not in cooldown, in registration order.
    pub available: Vec<ProviderId>,
    /// Credentialed providers in cooldown, sorted by id.
    pub rate_limited: Vec<CooldownStatus>,
    /// Providers without credentials, in registration order.
    pub unconfigured: Vec<ProviderId>,
}

/// Selects providers, enforces cooldowns and recovers responses.
///
/// The tracker is injected so several orchestrators (or tests) can choose to
/// share cooldown state or keep it separate.
#[derive(Debug)]
pub struct Orchestrator {
    registry: ProviderRegistry,
    tracker: Arc<CooldownTracker>,
    policy: PriorityPolicy,
    pipeline: RecoveryPipeline,
    consensus_sources: usize,
}

impl Orchestrator {
    pub fn new(
        registry: ProviderRegistry,
        tracker: Arc<CooldownTracker>,
        policy: PriorityPolicy,
    ) -> Self {
        Self {
            registry,
            tracker,
            policy,
            pipeline: RecoveryPipeline::new(),
            consensus_sources: DEFAULT_CONSENSUS_SOURCES,
        }
    }

    /// Sets how many providers a consensus run asks; zero is raised to one.
    #[must_use]
    pub fn with_consensus_sources(mut self, sources: usize) -> Self {
        self.consensus_sources = sources.max(1);
        self
    }

    pub fn tracker(&self) -> &Arc<CooldownTracker> {
        &self.tracker
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Runs `request` to completion without cancellation.
    ///
    /// # Errors
    ///
    /// One of the exhaustion classes of [`OrchestrationError`].
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        preferred: Option<&ProviderId>,
    ) -> Result<RecoveredResult, OrchestrationError> {
        self.generate_with_cancel(request, preferred, &CancellationToken::new())
            .await
    }

    /// Runs `request`, aborting the in-flight call when `cancel` fires.
    ///
    /// # Errors
    ///
    /// [`OrchestrationError::Cancelled`] if the token fires before a result is
    /// produced; otherwise one of the exhaustion classes.
    pub async fn generate_with_cancel(
        &self,
        request: &GenerationRequest,
        preferred: Option<&ProviderId>,
        cancel: &CancellationToken,
    ) -> Result<RecoveredResult, OrchestrationError> {
        let run_id = RunId::new_random();
        let kind = request.kind();
        let span = info_span!("generation_run", run_id = %run_id, kind = %kind);
        self.run_sequential(request, preferred, cancel, run_id)
            .instrument(span)
            .await
    }

    async fn run_sequential(
        &self,
        request: &GenerationRequest,
        preferred: Option<&ProviderId>,
        cancel: &CancellationToken,
        run_id: RunId,
    ) -> Result<RecoveredResult, OrchestrationError> {
        let kind = request.kind();
        let candidates = self.candidates(kind, preferred)?;
        let mut attempts: Vec<FailedAttempt> = Vec::new();

        for candidate in &candidates {
            if cancel.is_cancelled() {
                info!("run cancelled before next candidate");
                return Err(OrchestrationError::Cancelled);
            }

            let id = candidate.id();
            let remaining = self.tracker.remaining_cooldown(id);
            if !remaining.is_zero() {
                debug!(
                    provider = %id,
                    remaining_ms = remaining.as_millis() as u64,
                    "skipping provider in cooldown"
                );
                continue;
            }

            debug!(provider = %id, "calling provider");
            let response = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(provider = %id, "run cancelled during provider call");
                    return Err(OrchestrationError::Cancelled);
                }
                response = candidate.adapter.call(request) => response,
            };

            match self.settle(kind, id, response, run_id) {
                Ok(result) => {
                    info!(
                        provider = %id,
                        stage = %result.stage(),
                        items = result.items.len(),
                        "generation succeeded"
                    );
                    return Ok(result);
                }
                Err(attempt) => attempts.push(attempt),
            }
        }

        Err(self.exhausted(&candidates, attempts))
    }

    /// Asks several providers concurrently and merges their answers.
    ///
    /// # Errors
    ///
    /// [`OrchestrationError::Cancelled`] if the token fires before all calls
    /// settle; otherwise an exhaustion class when no provider produced a
    /// recoverable response.
    pub async fn cross_validate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<ConsensusResult, OrchestrationError> {
        let run_id = RunId::new_random();
        let kind = request.kind();
        let span = info_span!("consensus_run", run_id = %run_id, kind = %kind);
        self.run_consensus(request, cancel, run_id)
            .instrument(span)
            .await
    }

    async fn run_consensus(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
        run_id: RunId,
    ) -> Result<ConsensusResult, OrchestrationError> {
        let kind = request.kind();
        let candidates = self.candidates(kind, None)?;
        let chosen: Vec<&RegisteredProvider> = candidates
            .iter()
            .copied()
            .filter(|c| self.tracker.is_eligible(c.id()))
            .take(self.consensus_sources)
            .collect();

        if chosen.is_empty() {
            return Err(self.exhausted(&candidates, Vec::new()));
        }
        if cancel.is_cancelled() {
            return Err(OrchestrationError::Cancelled);
        }

        info!(sources = chosen.len(), "fanning out consensus request");
        let calls = chosen.iter().map(|c| c.adapter.call(request));
        let responses = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("consensus run cancelled");
                return Err(OrchestrationError::Cancelled);
            }
            responses = join_all(calls) => responses,
        };

        let mut successes = Vec::new();
        let mut attempts = Vec::new();
        for (candidate, response) in chosen.iter().zip(responses) {
            match self.settle(kind, candidate.id(), response, run_id) {
                Ok(result) => successes.push(result),
                Err(attempt) => attempts.push(attempt),
            }
        }

        if successes.is_empty() {
            return Err(self.exhausted(&candidates, attempts));
        }

        let merged = merge(&successes);
        info!(
            sources = merged.sources,
            items = merged.items.len(),
            failed = attempts.len(),
            "consensus merged"
        );
        Ok(merged)
    }

    /// Providers grouped by availability.
    pub fn status(&self) -> OrchestratorStatus {
        let cooling = self.tracker.status();
        let mut available = Vec::new();
        let mut unconfigured = Vec::new();
        for provider in self.registry.iter() {
            let id = provider.id();
            if !provider.descriptor.has_credentials {
                unconfigured.push(id.clone());
            } else if !cooling.iter().any(|s| &s.provider == id) {
                available.push(id.clone());
            }
        }
        let rate_limited = cooling
            .into_iter()
            .filter(|s| {
                self.registry
                    .get(&s.provider)
                    .is_some_and(|p| p.descriptor.has_credentials)
            })
            .collect();
        OrchestratorStatus {
            available,
            rate_limited,
            unconfigured,
        }
    }

    /// Capable, credentialed providers in attempt order.
    fn candidates(
        &self,
        kind: RequestKind,
        preferred: Option<&ProviderId>,
    ) -> Result<Vec<&RegisteredProvider>, OrchestrationError> {
        let capable: Vec<&RegisteredProvider> = self
            .policy
            .order(kind, &self.registry)
            .into_iter()
            .filter(|p| p.descriptor.capabilities.supports(kind))
            .collect();
        if capable.is_empty() {
            warn!(%kind, "no registered provider supports request kind");
            return Err(OrchestrationError::NoCapableProvider { kind });
        }

        let mut credentialed: Vec<&RegisteredProvider> = capable
            .into_iter()
            .filter(|p| p.descriptor.has_credentials)
            .collect();
        if credentialed.is_empty() {
            warn!(%kind, "no capable provider has credentials");
            return Err(OrchestrationError::NoCredentials { kind });
        }

        if let Some(preferred) = preferred {
            match credentialed.iter().position(|p| p.id() == preferred) {
                Some(index) => {
                    let first = credentialed.remove(index);
                    credentialed.insert(0, first);
                }
                None => warn!(
                    provider = %preferred,
                    "preferred provider is not a usable candidate; using default order"
                ),
            }
        }
        Ok(credentialed)
    }

    /// Turns one adapter response into a result or a failed attempt.
    fn settle(
        &self,
        kind: RequestKind,
        id: &ProviderId,
        response: RawProviderResponse,
        run_id: RunId,
    ) -> Result<RecoveredResult, FailedAttempt> {
        let text = match response.outcome {
            Ok(text) => text,
            Err(failure) => {
                if let ProviderFailure::Throttled { retry_after } = &failure {
                    self.tracker.mark_throttled_for(id, *retry_after);
                }
                warn!(provider = %id, class = failure.class(), error = %failure, "provider call failed");
                return Err(FailedAttempt {
                    provider: id.clone(),
                    reason: AttemptFailure::Provider { failure },
                });
            }
        };

        match self.pipeline.recover(kind, &text) {
            Ok(recovered) => Ok(RecoveredResult {
                kind,
                items: recovered.items,
                provenance: Provenance {
                    providers: vec![id.clone()],
                    stage: recovered.stage,
                    run_id,
                    recovered_at: Timestamp::now(),
                },
            }),
            Err(error) => {
                warn!(provider = %id, error = %error, "provider response unrecoverable");
                Err(FailedAttempt {
                    provider: id.clone(),
                    reason: AttemptFailure::Unrecoverable { error },
                })
            }
        }
    }

    /// Classifies a run that produced no result.
    fn exhausted(
        &self,
        candidates: &[&RegisteredProvider],
        attempts: Vec<FailedAttempt>,
    ) -> OrchestrationError {
        if attempts.iter().all(FailedAttempt::is_throttled) {
            let retry_after = candidates
                .iter()
                .map(|c| self.tracker.remaining_cooldown(c.id()))
                .filter(|d| !d.is_zero())
                .min()
                .unwrap_or(Duration::ZERO);
            if !retry_after.is_zero() {
                warn!(retry_after_ms = retry_after.as_millis() as u64, "all providers rate limited");
                return OrchestrationError::AllRateLimited { retry_after };
            }
        }

        if !attempts.is_empty() && attempts.iter().all(FailedAttempt::is_unrecoverable) {
            warn!(attempts = attempts.len(), "all responses unrecoverable");
            return OrchestrationError::UnrecoverableResponse { attempts };
        }

        warn!(attempts = attempts.len(), "all providers failed");
        OrchestrationError::AllFailed { attempts }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use generation::{Capabilities, ManualClock, ProviderDescriptor, DEFAULT_COOLDOWN};

    use super::*;

    struct Fixed(ProviderId, &'static str);

    #[async_trait]
    impl generation::ProviderAdapter for Fixed {
        async fn call(&self, _request: &GenerationRequest) -> RawProviderResponse {
            RawProviderResponse::text(self.0.clone(), self.1)
        }
    }

    fn id(s: &str) -> ProviderId {
        ProviderId::new(s).unwrap()
    }

    fn orchestrator(entries: &[(&str, Capabilities, bool)]) -> Orchestrator {
        let mut registry = ProviderRegistry::new();
        for (name, caps, creds) in entries {
            registry
                .register(
                    ProviderDescriptor::new(id(name), *name, *caps).with_credentials(*creds),
                    Arc::new(Fixed(id(name), r#"[{"name": "Egg"}]"#)),
                )
                .unwrap();
        }
        // A stopped clock keeps cooldown snapshots comparable across calls.
        let tracker = CooldownTracker::with_clock(DEFAULT_COOLDOWN, Arc::new(ManualClock::new()));
        Orchestrator::new(registry, Arc::new(tracker), PriorityPolicy::new())
    }

    #[test]
    fn text_only_providers_cannot_recognise_images() {
        let o = orchestrator(&[("text", Capabilities::TEXT, true)]);
        assert_eq!(
            o.candidates(RequestKind::ImageRecognition, None).unwrap_err(),
            OrchestrationError::NoCapableProvider {
                kind: RequestKind::ImageRecognition
            }
        );
    }

    #[test]
    fn preferred_provider_moves_to_front() {
        let o = orchestrator(&[
            ("a", Capabilities::TEXT, true),
            ("b", Capabilities::TEXT, true),
            ("c", Capabilities::TEXT, false),
        ]);
        let order: Vec<String> = o
            .candidates(RequestKind::ContentGeneration, Some(&id("b")))
            .unwrap()
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(order, vec!["b", "a"]);

        // A preferred provider without credentials is ignored.
        let order: Vec<String> = o
            .candidates(RequestKind::ContentGeneration, Some(&id("c")))
            .unwrap()
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn status_groups_providers() {
        let o = orchestrator(&[
            ("a", Capabilities::TEXT, true),
            ("b", Capabilities::MULTIMODAL, true),
            ("c", Capabilities::TEXT, false),
        ]);
        o.tracker().mark_throttled(&id("b"));
        let status = o.status();
        assert_eq!(status.available, vec![id("a")]);
        assert_eq!(status.rate_limited.len(), 1);
        assert_eq!(status.rate_limited[0].provider, id("b"));
        assert_eq!(status.unconfigured, vec![id("c")]);
        assert_eq!(status.rate_limited[0].remaining, DEFAULT_COOLDOWN);
        assert_eq!(o.status(), status);
    }

    #[test]
    fn mixed_failures_are_all_failed() {
        let o = orchestrator(&[("a", Capabilities::TEXT, true)]);
        let candidates = o.candidates(RequestKind::ContentGeneration, None).unwrap();
        let attempts = vec![
            FailedAttempt {
                provider: id("a"),
                reason: AttemptFailure::Provider {
                    failure: ProviderFailure::Transport {
                        message: "timeout".into(),
                    },
                },
            },
            FailedAttempt {
                provider: id("b"),
                reason: AttemptFailure::Unrecoverable {
                    error: generation::RecoveryError::BlankText,
                },
            },
        ];
        assert_eq!(o.exhausted(&candidates, attempts).class(), "all-failed");
    }
}
