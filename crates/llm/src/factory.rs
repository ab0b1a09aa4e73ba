//! Adapter factory registry keyed by provider kind.
//!
//! Configuration names a provider's `kind`; the factory for that kind builds
//! the adapter. Supporting a new wire protocol is one [`AdapterFactories::register`]
//! call.

use std::collections::BTreeMap;
use std::sync::Arc;

use generation::ProviderAdapter;

use crate::{
    AdapterConfigError, AdapterSettings, AnthropicAdapter, GeminiAdapter, OpenAiCompatibleAdapter,
};

pub const ANTHROPIC: &str = "anthropic";
pub const OPENAI_COMPATIBLE: &str = "openai_compatible";
pub const GEMINI: &str = "gemini";

/// Builds one adapter from its settings.
pub type AdapterFactory =
    fn(AdapterSettings) -> Result<Arc<dyn ProviderAdapter>, AdapterConfigError>;

/// Kind name to factory.
#[derive(Debug, Clone, Default)]
pub struct AdapterFactories {
    factories: BTreeMap<String, AdapterFactory>,
}

impl AdapterFactories {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in HTTP adapters.
    pub fn builtin() -> Self {
        let mut factories = Self::new();
        factories.register(ANTHROPIC, anthropic);
        factories.register(OPENAI_COMPATIBLE, openai_compatible);
        factories.register(GEMINI, gemini);
        factories
    }

    /// Adds or replaces the factory for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, factory: AdapterFactory) {
        self.factories.insert(kind.into(), factory);
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Builds the adapter for `kind`.
    ///
    /// # Errors
    ///
    /// [`AdapterConfigError::UnknownKind`] if no factory is registered, or the
    /// factory's own error.
    pub fn build(
        &self,
        kind: &str,
        settings: AdapterSettings,
    ) -> Result<Arc<dyn ProviderAdapter>, AdapterConfigError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| AdapterConfigError::UnknownKind {
                kind: kind.to_owned(),
            })?;
        factory(settings)
    }
}

fn anthropic(settings: AdapterSettings) -> Result<Arc<dyn ProviderAdapter>, AdapterConfigError> {
    Ok(Arc::new(AnthropicAdapter::new(settings)?))
}

fn openai_compatible(
    settings: AdapterSettings,
) -> Result<Arc<dyn ProviderAdapter>, AdapterConfigError> {
    Ok(Arc::new(OpenAiCompatibleAdapter::new(settings)?))
}

fn gemini(settings: AdapterSettings) -> Result<Arc<dyn ProviderAdapter>, AdapterConfigError> {
    Ok(Arc::new(GeminiAdapter::new(settings)?))
}
