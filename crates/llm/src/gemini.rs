//! Google Gemini `generateContent` adapter.

use async_trait::async_trait;
use generation::{
    prompt, GenerationRequest, ProviderAdapter, ProviderFailure, RawProviderResponse,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::http::{self, HttpReply};
use crate::{AdapterConfigError, AdapterSettings};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
/// Gemini's quota error status, reported in the error body.
const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";
const TEMPERATURE: f32 = 0.2;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'static str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Calls `POST {base}/models/{model}:generateContent`.
#[derive(Debug)]
pub struct GeminiAdapter {
    settings: AdapterSettings,
    client: Client,
    url: String,
    model: String,
}

impl GeminiAdapter {
    /// # Errors
    ///
    /// [`AdapterConfigError::InvalidBaseUrl`] for a non-HTTP base URL and
    /// [`AdapterConfigError::Client`] if the HTTP client cannot be built.
    pub fn new(settings: AdapterSettings) -> Result<Self, AdapterConfigError> {
        let client = http::build_client(settings.timeout)?;
        let model = settings.model_or(DEFAULT_MODEL);
        let url = format!(
            "{}/models/{model}:generateContent",
            settings.base_url_or(DEFAULT_BASE_URL)?
        );
        Ok(Self {
            settings,
            client,
            url,
            model,
        })
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String, ProviderFailure> {
        let prompt = prompt::build(request);
        let mut parts = vec![Part::Text { text: &prompt.user }];
        if let Some(image) = request.image() {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.media_type.as_mime(),
                    data: &image.base64_data,
                },
            });
        }
        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text {
                    text: &prompt.system,
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                response_mime_type: "application/json",
            },
        };

        let mut builder = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.settings.api_key {
            builder = builder.header("x-goog-api-key", key);
        }

        let HttpReply {
            status,
            retry_after,
            body,
        } = http::send(builder).await?;
        if !status.is_success() {
            let failure = http::classify_status(status, retry_after, &body);
            // Quota exhaustion is sometimes reported with a non-429 status.
            if !failure.is_throttled() && body.contains(RESOURCE_EXHAUSTED) {
                return Err(ProviderFailure::Throttled {
                    retry_after: retry_after.or_else(|| http::retry_hint_in(&body)),
                });
            }
            return Err(failure);
        }

        let parsed: GenerateResponse = http::decode(&body)?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        http::non_blank(text)
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    #[instrument(skip(self, request), fields(provider = %self.settings.id, model = %self.model))]
    async fn call(&self, request: &GenerationRequest) -> RawProviderResponse {
        let id = self.settings.id.clone();
        match self.complete(request).await {
            Ok(text) => RawProviderResponse::text(id, text),
            Err(failure) => {
                debug!(class = failure.class(), "gemini call failed");
                RawProviderResponse::failure(id, failure)
            }
        }
    }
}
