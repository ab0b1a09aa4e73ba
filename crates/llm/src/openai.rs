//! OpenAI-compatible Chat Completions adapter.
//!
//! Works against OpenAI itself and any server exposing the same
//! `/chat/completions` contract (Groq, OpenRouter, Ollama, vLLM).

use async_trait::async_trait;
use generation::{
    prompt, GenerationRequest, ProviderAdapter, ProviderFailure, RawProviderResponse,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::http::{self, HttpReply};
use crate::{AdapterConfigError, AdapterSettings};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const TEMPERATURE: f32 = 0.2;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Calls `POST {base}/chat/completions`.
#[derive(Debug)]
pub struct OpenAiCompatibleAdapter {
    settings: AdapterSettings,
    client: Client,
    url: String,
    model: String,
}

impl OpenAiCompatibleAdapter {
    /// # Errors
    ///
    /// [`AdapterConfigError::InvalidBaseUrl`] for a non-HTTP base URL and
    /// [`AdapterConfigError::Client`] if the HTTP client cannot be built.
    pub fn new(settings: AdapterSettings) -> Result<Self, AdapterConfigError> {
        let client = http::build_client(settings.timeout)?;
        let url = format!("{}/chat/completions", settings.base_url_or(DEFAULT_BASE_URL)?);
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
        let user = match request.image() {
            Some(image) => MessageContent::Parts(vec![
                ContentPart::Text { text: &prompt.user },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.to_data_url(),
                    },
                },
            ]),
            None => MessageContent::Text(&prompt.user),
        };
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(&prompt.system),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: TEMPERATURE,
        };

        let mut builder = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.settings.api_key {
            builder = builder.bearer_auth(key);
        }

        let HttpReply {
            status,
            retry_after,
            body,
        } = http::send(builder).await?;
        if !status.is_success() {
            return Err(http::classify_status(status, retry_after, &body));
        }

        let parsed: ChatResponse = http::decode(&body)?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        http::non_blank(text)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    #[instrument(skip(self, request), fields(provider = %self.settings.id, model = %self.model))]
    async fn call(&self, request: &GenerationRequest) -> RawProviderResponse {
        let id = self.settings.id.clone();
        match self.complete(request).await {
            Ok(text) => RawProviderResponse::text(id, text),
            Err(failure) => {
                debug!(class = failure.class(), "chat completion failed");
                RawProviderResponse::failure(id, failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_serializes_as_plain_string() {
        let message = ChatMessage {
            role: "user",
            content: MessageContent::Text("hi"),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn image_part_uses_data_url() {
        let part = ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: "data:image/png;base64,AAAA".into(),
            },
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "image_url");
        assert_eq!(json["image_url"]["url"], "data:image/png;base64,AAAA");
    }
}
