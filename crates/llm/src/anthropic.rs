//! Anthropic Messages API adapter.

use async_trait::async_trait;
use generation::{
    prompt, GenerationRequest, ProviderAdapter, ProviderFailure, RawProviderResponse,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::http::{self, HttpReply};
use crate::{AdapterConfigError, AdapterSettings};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;
/// Anthropic's "overloaded" status, treated as throttling.
const OVERLOADED: u16 = 529;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Text { text: &'a str },
    Image { source: ImageSource<'a> },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: &'static str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

/// Calls `POST {base}/v1/messages`.
#[derive(Debug)]
pub struct AnthropicAdapter {
    settings: AdapterSettings,
    client: Client,
    url: String,
    model: String,
}

impl AnthropicAdapter {
    /// # Errors
    ///
    /// [`AdapterConfigError::InvalidBaseUrl`] for a non-HTTP base URL and
    /// [`AdapterConfigError::Client`] if the HTTP client cannot be built.
    pub fn new(settings: AdapterSettings) -> Result<Self, AdapterConfigError> {
        let client = http::build_client(settings.timeout)?;
        let url = format!("{}/v1/messages", settings.base_url_or(DEFAULT_BASE_URL)?);
        let model = settings.model_or(DEFAULT_MODEL);
        Ok(Self {
            settings,
            client,
            url,
            model,
        })
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String, ProviderFailure> {
        let prompt = prompt::build(request);
        let mut content = Vec::with_capacity(2);
        if let Some(image) = request.image() {
            content.push(ContentBlock::Image {
                source: ImageSource {
                    source_type: "base64",
                    media_type: image.media_type.as_mime(),
                    data: &image.base64_data,
                },
            });
        }
        content.push(ContentBlock::Text { text: &prompt.user });

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: &prompt.system,
            messages: vec![Message {
                role: "user",
                content,
            }],
        };

        let mut builder = self
            .client
            .post(&self.url)
            .header("anthropic-version", API_VERSION)
            .json(&body);
        if let Some(key) = &self.settings.api_key {
            builder = builder.header("x-api-key", key);
        }

        let HttpReply {
            status,
            retry_after,
            body,
        } = http::send(builder).await?;

        if status.as_u16() == OVERLOADED {
            return Err(ProviderFailure::Throttled { retry_after });
        }
        if !status.is_success() {
            return Err(http::classify_status(status, retry_after, &body));
        }

        let parsed: MessagesResponse = http::decode(&body)?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("\n");
        http::non_blank(text)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    #[instrument(skip(self, request), fields(provider = %self.settings.id, model = %self.model))]
    async fn call(&self, request: &GenerationRequest) -> RawProviderResponse {
        let id = self.settings.id.clone();
        match self.complete(request).await {
            Ok(text) => RawProviderResponse::text(id, text),
            Err(failure) => {
                debug!(class = failure.class(), "anthropic call failed");
                RawProviderResponse::failure(id, failure)
            }
        }
    }
}
