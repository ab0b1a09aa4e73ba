//! CLI configuration.
//!
//! Loaded with the `config` crate from an optional TOML file layered under
//! `MEALWISE__*` environment variables (`__` separates nesting levels, e.g.
//! `MEALWISE__COOLDOWN_SECS=60` or `MEALWISE__PROVIDERS__GROQ__MODEL=...`).
//!
//! When no provider table is configured, a built-in set (Anthropic, OpenAI,
//! Gemini, Groq) is used with the conventional API-key variables.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use generation::Tier;
use serde::Deserialize;

/// File read when `--config` is not given. Missing is not an error.
pub const DEFAULT_CONFIG_FILE: &str = "mealwise.toml";
const ENV_PREFIX: &str = "MEALWISE";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MealwiseConfig {
    /// Cooldown applied after a provider throttles, in seconds.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Per-call adapter timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Providers asked by `recognize --consensus`.
    #[serde(default = "default_consensus_sources")]
    pub consensus_sources: usize,

    #[serde(default)]
    pub priority: PriorityConfig,

    /// Provider id to provider settings.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Explicit candidate order per request kind.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriorityConfig {
    #[serde(default)]
    pub content_generation: Vec<String>,
    #[serde(default)]
    pub image_recognition: Vec<String>,
}

/// One provider table.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Adapter kind: `anthropic`, `openai_compatible` or `gemini`.
    pub kind: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub supports_images: bool,
    #[serde(default)]
    pub cost_tier: Tier,
    #[serde(default)]
    pub speed_tier: Tier,
    #[serde(default)]
    pub throttle_risk: Tier,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint; `OTEL_EXPORTER_OTLP_ENDPOINT` is used when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_consensus_sources() -> usize {
    3
}

impl MealwiseConfig {
    /// Loads the file at `path` (required) or [`DEFAULT_CONFIG_FILE`]
    /// (optional), then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing or any source fails to
    /// parse.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE)
                .format(FileFormat::Toml)
                .required(false),
        };
        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Self>()
            .map(Self::with_builtin_providers)
    }

    /// Parses TOML text without consulting the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not parse or deserialize.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize::<Self>()
            .map(Self::with_builtin_providers)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Configured OTLP endpoint, falling back to the standard variable.
    pub fn otlp_endpoint(&self) -> Option<String> {
        self.telemetry
            .otlp_endpoint
            .clone()
            .or_else(|| std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok())
            .filter(|e| !e.trim().is_empty())
    }

    fn with_builtin_providers(mut self) -> Self {
        if self.providers.is_empty() {
            self.providers = builtin_providers();
        }
        self
    }
}

fn builtin_providers() -> BTreeMap<String, ProviderConfig> {
    let provider = |kind: &str, label: &str, key: &str, images: bool, cost: Tier, risk: Tier| {
        ProviderConfig {
            kind: kind.to_owned(),
            label: Some(label.to_owned()),
            base_url: None,
            model: None,
            api_key_env: Some(key.to_owned()),
            supports_images: images,
            cost_tier: cost,
            speed_tier: Tier::Medium,
            throttle_risk: risk,
        }
    };

    let mut groq = provider(
        "openai_compatible",
        "Groq",
        "GROQ_API_KEY",
        false,
        Tier::Low,
        Tier::High,
    );
    groq.base_url = Some("https://api.groq.com/openai/v1".to_owned());
    groq.model = Some("llama-3.1-8b-instant".to_owned());
    groq.speed_tier = Tier::High;

    BTreeMap::from([
        (
            "anthropic".to_owned(),
            provider("anthropic", "Anthropic", "ANTHROPIC_API_KEY", true, Tier::High, Tier::Low),
        ),
        (
            "openai".to_owned(),
            provider("openai_compatible", "OpenAI", "OPENAI_API_KEY", true, Tier::Medium, Tier::Low),
        ),
        (
            "gemini".to_owned(),
            provider("gemini", "Google Gemini", "GEMINI_API_KEY", true, Tier::Low, Tier::Medium),
        ),
        ("groq".to_owned(), groq),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = MealwiseConfig::from_toml_str("").unwrap();
        assert_eq!(config.cooldown(), Duration::from_secs(300));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.consensus_sources, 3);
        assert_eq!(
            config.providers.keys().collect::<Vec<_>>(),
            vec!["anthropic", "gemini", "groq", "openai"]
        );
    }

    #[test]
    fn provider_tables_replace_builtins() {
        let config = MealwiseConfig::from_toml_str(
            r#"
            cooldown_secs = 30

            [priority]
            content_generation = ["local"]

            [providers.local]
            kind = "openai_compatible"
            base_url = "http://localhost:11434/v1"
            model = "qwen2.5"
            speed_tier = "high"
            "#,
        )
        .unwrap();

        assert_eq!(config.cooldown_secs, 30);
        assert_eq!(config.priority.content_generation, vec!["local"]);
        assert_eq!(config.providers.len(), 1);
        let local = &config.providers["local"];
        assert_eq!(local.kind, "openai_compatible");
        assert_eq!(local.speed_tier, Tier::High);
        assert_eq!(local.cost_tier, Tier::Medium);
        assert!(!local.supports_images);
        assert!(local.api_key_env.is_none());
    }

    #[test]
    fn unknown_tier_is_rejected() {
        let result = MealwiseConfig::from_toml_str(
            r#"
            [providers.x]
            kind = "gemini"
            cost_tier = "free"
            "#,
        );
        assert!(result.is_err());
    }
}
