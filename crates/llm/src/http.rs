//! Shared HTTP plumbing and failure classification.
//!
//! Every adapter funnels its response through [`classify_status`] so the
//! taxonomy is identical across providers:
//!
//! | Condition | Failure |
//! |-----------|---------|
//! | 401, 403 | `auth` |
//! | 429 | `throttled` (with `Retry-After` when sent) |
//! | 5xx, connect error, timeout | `transport` |
//! | 2xx with blank text | `empty-response` |
//! | anything else | `unknown` |

use std::time::Duration;

use generation::{ProviderFailure, MAX_COOLDOWN};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::AdapterConfigError;

/// Longest error body excerpt carried in a failure message.
const MAX_MESSAGE_CHARS: usize = 200;

pub(crate) fn build_client(timeout: Duration) -> Result<Client, AdapterConfigError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// A completed HTTP exchange.
pub(crate) struct HttpReply {
    pub status: StatusCode,
    pub retry_after: Option<Duration>,
    pub body: String,
}

/// Sends the request and reads the whole body.
pub(crate) async fn send(request: RequestBuilder) -> Result<HttpReply, ProviderFailure> {
    let response = request.send().await.map_err(transport_failure)?;
    let status = response.status();
    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.map_err(transport_failure)?;
    debug!(status = status.as_u16(), bytes = body.len(), "provider replied");
    Ok(HttpReply {
        status,
        retry_after,
        body,
    })
}

/// Maps a non-success status to a failure.
pub fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> ProviderFailure {
    let message = error_message(body);
    match status.as_u16() {
        401 | 403 => ProviderFailure::Auth { message },
        429 => ProviderFailure::Throttled {
            retry_after: retry_after.or_else(|| retry_hint_in(&message)),
        },
        500..=599 => ProviderFailure::Transport {
            message: format!("HTTP {}: {message}", status.as_u16()),
        },
        code => ProviderFailure::Unknown {
            message: format!("HTTP {code}: {message}"),
        },
    }
}

/// Decodes a success body, mapping malformed JSON to `unknown`.
pub(crate) fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ProviderFailure> {
    serde_json::from_str(body).map_err(|e| ProviderFailure::Unknown {
        message: format!("malformed provider body: {e}"),
    })
}

/// Rejects blank completions.
pub(crate) fn non_blank(text: String) -> Result<String, ProviderFailure> {
    if text.trim().is_empty() {
        Err(ProviderFailure::EmptyResponse)
    } else {
        Ok(text)
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    parse_seconds(raw)
}

/// Finds hints like "Please retry in 6.4s" or "try again in 20s" in an error
/// message.
pub fn retry_hint_in(message: &str) -> Option<Duration> {
    let lower = message.to_ascii_lowercase();
    ["retry in ", "try again in "].iter().find_map(|marker| {
        let start = lower.find(marker)? + marker.len();
        let rest = &lower[start..];
        let end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        parse_seconds(&rest[..end])
    })
}

/// Whole seconds, rounded up and capped at [`MAX_COOLDOWN`].
fn parse_seconds(raw: &str) -> Option<Duration> {
    let seconds: f64 = raw.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let cap = MAX_COOLDOWN.as_secs();
    Some(Duration::from_secs((seconds.ceil() as u64).min(cap)))
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Detailed {
        message: String,
        #[serde(default)]
        status: Option<String>,
    },
    Plain(String),
}

/// The provider's own error message if the body carries one, otherwise a
/// truncated excerpt of the body.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: ErrorBody::Detailed { message, status },
        }) => match status {
            Some(status) => format!("{status}: {message}"),
            None => message,
        },
        Ok(ErrorEnvelope {
            error: ErrorBody::Plain(message),
        }) => message,
        Err(_) => body.chars().take(MAX_MESSAGE_CHARS).collect(),
    }
}

fn transport_failure(error: reqwest::Error) -> ProviderFailure {
    let kind = if error.is_timeout() {
        "timeout"
    } else if error.is_connect() {
        "connect"
    } else {
        "request"
    };
    ProviderFailure::Transport {
        message: format!("{kind}: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    #[test]
    fn statuses_map_to_taxonomy() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, None, "nope").class(),
            "auth"
        );
        assert_eq!(classify_status(StatusCode::FORBIDDEN, None, "").class(), "auth");
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, None, "").class(),
            "throttled"
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, None, "").class(),
            "transport"
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, None, "").class(),
            "unknown"
        );
    }

    #[test]
    fn retry_after_header_wins_over_body_hint() {
        let failure = classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(3)),
            r#"{"error": {"message": "Please try again in 20s"}}"#,
        );
        assert_eq!(
            failure,
            ProviderFailure::Throttled {
                retry_after: Some(Duration::from_secs(3))
            }
        );
    }

    #[test]
    fn body_hint_is_rounded_up() {
        assert_eq!(
            retry_hint_in("Quota exceeded. Please retry in 6.406453963s."),
            Some(Duration::from_secs(7))
        );
        assert_eq!(retry_hint_in("slow down"), None);
    }

    #[test]
    fn retry_after_header_accepts_seconds_only() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn oversized_hints_are_capped() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("1e30"));
        assert_eq!(parse_retry_after(&headers), Some(MAX_COOLDOWN));
        assert_eq!(
            retry_hint_in("try again in 99999999999999999999s"),
            Some(MAX_COOLDOWN)
        );
    }

    #[test]
    fn error_messages_are_extracted() {
        assert_eq!(error_message(r#"{"error": {"message": "bad key"}}"#), "bad key");
        assert_eq!(
            error_message(r#"{"error": {"message": "slow", "status": "RESOURCE_EXHAUSTED"}}"#),
            "RESOURCE_EXHAUSTED: slow"
        );
        assert_eq!(error_message(r#"{"error": "plain"}"#), "plain");
        assert_eq!(error_message(&"x".repeat(500)).len(), MAX_MESSAGE_CHARS);
    }

    #[test]
    fn blank_text_is_empty_response() {
        assert_eq!(non_blank("  \n".into()), Err(ProviderFailure::EmptyResponse));
        assert_eq!(non_blank("{}".into()), Ok("{}".to_owned()));
    }
}
