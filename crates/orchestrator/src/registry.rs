//! Provider registry and default priority policy.
//!
//! The registry maps provider ids to a descriptor and an adapter. Adding a
//! provider is a [`ProviderRegistry::register`] call; the orchestrator never
//! branches on provider identity.

use std::sync::Arc;

use generation::{ProviderAdapter, ProviderDescriptor, ProviderId, RequestKind};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("provider '{0}' is already registered")]
    DuplicateProvider(ProviderId),
}

/// A descriptor paired with the adapter that reaches it.
#[derive(Clone)]
pub struct RegisteredProvider {
    pub descriptor: ProviderDescriptor,
    pub adapter: Arc<dyn ProviderAdapter>,
}

impl RegisteredProvider {
    pub fn id(&self) -> &ProviderId {
        &self.descriptor.id
    }
}

impl std::fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Registered providers in registration order.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a provider.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateProvider`] if the id is already present.
    pub fn register(
        &mut self,
        descriptor: ProviderDescriptor,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Result<(), RegistryError> {
        if self.get(&descriptor.id).is_some() {
            return Err(RegistryError::DuplicateProvider(descriptor.id));
        }
        self.providers.push(RegisteredProvider {
            descriptor,
            adapter,
        });
        Ok(())
    }

    pub fn get(&self, id: &ProviderId) -> Option<&RegisteredProvider> {
        self.providers.iter().find(|p| p.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredProvider> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Default candidate order per request kind.
///
/// Explicitly configured ids come first, in configured order. Every other
/// registered provider follows, sorted by [`ProviderDescriptor::default_rank`]
/// with registration order breaking ties.
#[derive(Debug, Clone, Default)]
pub struct PriorityPolicy {
    content_generation: Vec<ProviderId>,
    image_recognition: Vec<ProviderId>,
}

impl PriorityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_order(mut self, kind: RequestKind, order: Vec<ProviderId>) -> Self {
        match kind {
            RequestKind::ContentGeneration => self.content_generation = order,
            RequestKind::ImageRecognition => self.image_recognition = order,
        }
        self
    }

    pub fn configured(&self, kind: RequestKind) -> &[ProviderId] {
        match kind {
            RequestKind::ContentGeneration => &self.content_generation,
            RequestKind::ImageRecognition => &self.image_recognition,
        }
    }

    /// Full ordering of registered providers for `kind`. Capability is not
    /// checked here.
    pub fn order<'r>(
        &self,
        kind: RequestKind,
        registry: &'r ProviderRegistry,
    ) -> Vec<&'r RegisteredProvider> {
        let mut ordered: Vec<&RegisteredProvider> = Vec::with_capacity(registry.len());
        for id in self.configured(kind) {
            match registry.get(id) {
                Some(p) if !ordered.iter().any(|o| o.id() == id) => ordered.push(p),
                Some(_) => {}
                None => tracing::warn!(provider = %id, %kind, "priority list names unknown provider"),
            }
        }

        let mut rest: Vec<&RegisteredProvider> = registry
            .iter()
            .filter(|p| !ordered.iter().any(|o| o.id() == p.id()))
            .collect();
        // Stable sort keeps registration order among equal ranks.
        rest.sort_by_key(|p| p.descriptor.default_rank());
        ordered.extend(rest);
        ordered
    }
}
