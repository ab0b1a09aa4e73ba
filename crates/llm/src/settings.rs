//! Per-adapter construction settings and configuration errors.

use std::time::Duration;

use generation::{ModelName, ProviderId};
use thiserror::Error;

/// Default per-call timeout applied when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything an adapter needs to reach one endpoint.
///
/// `base_url` and `model` fall back to the adapter's own defaults when unset.
/// `api_key` is `None` for providers registered without credentials; such
/// adapters are constructed but never called by the orchestrator.
#[derive(Clone)]
pub struct AdapterSettings {
    pub id: ProviderId,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<ModelName>,
    pub timeout: Duration,
}

impl AdapterSettings {
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            api_key: None,
            base_url: None,
            model: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: Option<ModelName>) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configured base URL without a trailing slash, or `default`.
    pub(crate) fn base_url_or(&self, default: &str) -> Result<String, AdapterConfigError> {
        let url = self
            .base_url
            .as_deref()
            .unwrap_or(default)
            .trim()
            .trim_end_matches('/');
        if url.starts_with("http://") || url.starts_with("https://") {
            Ok(url.to_owned())
        } else {
            Err(AdapterConfigError::InvalidBaseUrl {
                provider: self.id.clone(),
                url: url.to_owned(),
            })
        }
    }

    pub(crate) fn model_or(&self, default: &str) -> String {
        self.model
            .as_ref()
            .map_or_else(|| default.to_owned(), |m| m.as_str().to_owned())
    }
}

// The API key never appears in logs.
impl std::fmt::Debug for AdapterSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSettings")
            .field("id", &self.id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Errors raised while constructing adapters.
#[derive(Debug, Error)]
pub enum AdapterConfigError {
    #[error("unknown provider kind '{kind}'")]
    UnknownKind { kind: String },

    #[error("invalid base URL '{url}' for provider '{provider}'")]
    InvalidBaseUrl { provider: ProviderId, url: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
