//! Builds the provider registry and priority policy from configuration.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use generation::{
    Capabilities, CooldownTracker, ModelName, ProviderDescriptor, ProviderId, RequestKind,
};
use llm::{AdapterFactories, AdapterSettings};
use orchestrator::{Orchestrator, PriorityPolicy, ProviderRegistry};
use tracing::{debug, info};

use crate::config::{MealwiseConfig, ProviderConfig};

/// Builds a ready orchestrator, reading API keys from the process
/// environment.
pub fn build_orchestrator(config: &MealwiseConfig) -> anyhow::Result<Orchestrator> {
    let registry = build_registry(config, |name| std::env::var(name).ok())?;
    let policy = build_policy(config)?;
    info!(
        providers = registry.len(),
        credentialed = registry.iter().filter(|p| p.descriptor.has_credentials).count(),
        "provider registry built"
    );
    Ok(Orchestrator::new(
        registry,
        Arc::new(CooldownTracker::new(config.cooldown())),
        policy,
    )
    .with_consensus_sources(config.consensus_sources))
}

/// Registers every configured provider. `credential` resolves an environment
/// variable name to its value.
pub fn build_registry(
    config: &MealwiseConfig,
    credential: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<ProviderRegistry> {
    let factories = AdapterFactories::builtin();
    let mut registry = ProviderRegistry::new();

    for (key, provider) in &config.providers {
        let id = ProviderId::new(key.as_str())
            .ok_or_else(|| anyhow!("provider table with a blank id"))?;
        let api_key = provider
            .api_key_env
            .as_deref()
            .and_then(&credential)
            .filter(|k| !k.trim().is_empty());
        // Keyless endpoints (a local server) count as credentialed.
        let has_credentials = provider.api_key_env.is_none() || api_key.is_some();
        let model = provider.model.clone().and_then(ModelName::new);

        let settings = AdapterSettings::new(id.clone())
            .with_api_key(api_key)
            .with_base_url(provider.base_url.clone())
            .with_model(model.clone())
            .with_timeout(config.request_timeout());
        let adapter = factories
            .build(&provider.kind, settings)
            .with_context(|| format!("failed to build adapter for provider '{id}'"))?;

        debug!(provider = %id, kind = %provider.kind, has_credentials, "registering provider");
        registry.register(descriptor(id, provider, model, has_credentials), adapter)?;
    }
    Ok(registry)
}

fn descriptor(
    id: ProviderId,
    provider: &ProviderConfig,
    model: Option<ModelName>,
    has_credentials: bool,
) -> ProviderDescriptor {
    let capabilities = if provider.supports_images {
        Capabilities::MULTIMODAL
    } else {
        Capabilities::TEXT
    };
    let label = provider.label.clone().unwrap_or_else(|| id.to_string());
    ProviderDescriptor::new(id, label, capabilities)
        .with_model(model)
        .with_tiers(provider.cost_tier, provider.speed_tier, provider.throttle_risk)
        .with_credentials(has_credentials)
}

/// Converts the `[priority]` table. Unknown ids are kept; the policy warns
/// about them at selection time.
pub fn build_policy(config: &MealwiseConfig) -> anyhow::Result<PriorityPolicy> {
    let ids = |names: &[String]| -> anyhow::Result<Vec<ProviderId>> {
        names
            .iter()
            .map(|n| ProviderId::new(n.as_str()).ok_or_else(|| anyhow!("blank id in priority list")))
            .collect()
    };
    Ok(PriorityPolicy::new()
        .with_order(
            RequestKind::ContentGeneration,
            ids(&config.priority.content_generation)?,
        )
        .with_order(
            RequestKind::ImageRecognition,
            ids(&config.priority.image_recognition)?,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(text: &str) -> MealwiseConfig {
        MealwiseConfig::from_toml_str(text).unwrap()
    }

    #[test]
    fn credentials_come_from_named_variable() {
        let config = config("");
        let registry =
            build_registry(&config, |name| (name == "GROQ_API_KEY").then(|| "gsk".to_owned()))
                .unwrap();

        assert_eq!(registry.len(), 4);
        let groq = registry.get(&ProviderId::new("groq").unwrap()).unwrap();
        assert!(groq.descriptor.has_credentials);
        assert_eq!(groq.descriptor.capabilities, Capabilities::TEXT);
        let anthropic = registry.get(&ProviderId::new("anthropic").unwrap()).unwrap();
        assert!(!anthropic.descriptor.has_credentials);
        assert_eq!(anthropic.descriptor.capabilities, Capabilities::MULTIMODAL);
    }

    #[test]
    fn blank_credential_is_missing() {
        let config = config("");
        let registry = build_registry(&config, |_| Some("  ".to_owned())).unwrap();
        assert!(registry.iter().all(|p| !p.descriptor.has_credentials));
    }

    #[test]
    fn keyless_provider_is_credentialed() {
        let config = config(
            r#"
            [providers.local]
            kind = "openai_compatible"
            base_url = "http://localhost:11434/v1"
            label = "Ollama"
            "#,
        );
        let registry = build_registry(&config, |_| None).unwrap();
        let local = registry.get(&ProviderId::new("local").unwrap()).unwrap();
        assert!(local.descriptor.has_credentials);
        assert_eq!(local.descriptor.label, "Ollama");
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let config = config(
            r#"
            [providers.x]
            kind = "carrier-pigeon"
            "#,
        );
        let err = build_registry(&config, |_| None).unwrap_err();
        assert!(err.to_string().contains("provider 'x'"));
    }

    #[test]
    fn priority_lists_map_to_kinds() {
        let config = config(
            r#"
            [priority]
            content_generation = ["groq", "gemini"]
            image_recognition = ["gemini"]
            "#,
        );
        let policy = build_policy(&config).unwrap();
        assert_eq!(
            policy.configured(RequestKind::ContentGeneration),
            [ProviderId::new("groq").unwrap(), ProviderId::new("gemini").unwrap()]
        );
        assert_eq!(
            policy.configured(RequestKind::ImageRecognition),
            [ProviderId::new("gemini").unwrap()]
        );
    }

    #[test]
    fn orchestrator_reports_unconfigured_providers() {
        let config = config("");
        let registry = build_registry(&config, |_| None).unwrap();
        let orchestrator = Orchestrator::new(
            registry,
            Arc::new(CooldownTracker::new(config.cooldown())),
            build_policy(&config).unwrap(),
        );
        let status = orchestrator.status();
        assert!(status.available.is_empty());
        assert_eq!(status.unconfigured.len(), 4);
    }
}
