//! Completion Backend Traits
//!
//! Trait definitions for the upstream completion provider. The turn
//! processor only talks to [`CompletionBackend`], which lets tests drive it
//! with scripted backends and keeps the HTTP details in one place.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::state::Message;

/// Default provider API base
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Referrer tag sent with every request
pub const DEFAULT_REFERER: &str = "http://devel.ops.knuth.li";

/// Title tag sent with every request
pub const DEFAULT_TITLE: &str = "AI Chat";

/// Upstream failures
///
/// Each variant maps to the user-visible text returned as the turn output,
/// see [`BackendError::user_message`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request could not be sent, or the body could not be read
    #[error("{0}")]
    Transport(String),

    /// The provider answered with a non-success status
    #[error("{status} from {url}: {body}")]
    Status {
        /// HTTP status
        status: reqwest::StatusCode,
        /// Endpoint that answered
        url: String,
        /// Response body (may be empty)
        body: String,
    },

    /// The provider answered, but not with what the protocol promises
    #[error("{0}")]
    Protocol(String),
}

impl BackendError {
    /// Whether this is a request-level failure (as opposed to a bad payload)
    #[must_use]
    pub fn is_request_failure(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { .. })
    }

    /// Text shown to the user in place of a reply
    #[must_use]
    pub fn user_message(&self) -> String {
        if self.is_request_failure() {
            format!("API request failed: {self}")
        } else {
            format!("An error occurred: {self}")
        }
    }
}

/// Events produced while a streaming reply arrives
#[derive(Debug)]
pub enum StreamingToken {
    /// A fragment of the reply
    Delta(String),
    /// The reply is complete
    Complete,
    /// The stream failed; no further tokens follow
    Error(BackendError),
}

/// A chat completion request
#[derive(Clone, Debug, Serialize)]
pub struct CompletionRequest {
    /// Provider model identifier
    pub model: String,
    /// Full conversation, oldest first, ending with the new user message
    pub messages: Vec<Message>,
    /// Whether to request an event stream
    pub stream: bool,
}

impl CompletionRequest {
    /// Create a streaming request
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
        }
    }

    /// Set streaming mode
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Response from a blocking request
#[derive(Clone, Debug)]
pub struct CompletionResponse {
    /// The reply text
    pub content: String,
    /// Model that generated the reply
    pub model: String,
    /// Request duration in milliseconds
    pub duration_ms: Option<u64>,
}

/// Upstream provider settings for one turn
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderConfig {
    /// API base; `/chat/completions` is appended
    pub base_url: String,
    /// Bearer token; requests are unauthenticated without one
    pub api_key: Option<String>,
    /// `HTTP-Referer` header value
    pub referer: String,
    /// `X-Title` header value
    pub title: String,
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// Capacity of the producer -> consumer token channel
    pub channel_capacity: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            referer: DEFAULT_REFERER.to_string(),
            title: DEFAULT_TITLE.to_string(),
            request_timeout: Duration::from_secs(300),
            channel_capacity: 64,
        }
    }
}

impl ProviderConfig {
    /// Override the API base; blank values keep the current one
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        if !base_url.trim().is_empty() {
            self.base_url = base_url.trim().to_string();
        }
        self
    }

    /// Set the bearer token; blank values clear it
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = if api_key.trim().is_empty() {
            None
        } else {
            Some(api_key)
        };
        self
    }

    /// Full completions endpoint
    #[must_use]
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Completion provider
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Send a request and receive the reply incrementally
    ///
    /// Returns a bounded channel fed by a producer task. Tokens arrive in
    /// upstream order and the channel ends after one terminal token.
    async fn send_streaming(
        &self,
        request: &CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, BackendError>;

    /// Send a request and wait for the complete reply
    async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse, BackendError>;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_body_shape() {
        let request = CompletionRequest::new(
            "a/b",
            vec![Message::user("hi"), Message::assistant("hello"), Message::user("again")],
        )
        .with_stream(false);

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "a/b",
                "messages": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"},
                    {"role": "user", "content": "again"}
                ],
                "stream": false
            })
        );
    }

    #[test]
    fn test_completions_url() {
        let config = ProviderConfig::default();
        assert_eq!(
            config.completions_url(),
            "https://openrouter.ai/api/v1/chat/completions"
        );

        let config = ProviderConfig::default().with_base_url("http://localhost:8080/v1/");
        assert_eq!(config.completions_url(), "http://localhost:8080/v1/chat/completions");

        let config = ProviderConfig::default().with_base_url("  ");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_api_key_blank_clears() {
        let config = ProviderConfig::default().with_api_key("sk-1");
        assert_eq!(config.api_key.as_deref(), Some("sk-1"));
        assert_eq!(config.with_api_key("").api_key, None);
    }

    #[test]
    fn test_user_messages() {
        let err = BackendError::Transport("connection refused".to_string());
        assert_eq!(err.user_message(), "API request failed: connection refused");

        let err = BackendError::Status {
            status: reqwest::StatusCode::UNAUTHORIZED,
            url: "http://x/chat/completions".to_string(),
            body: "no key".to_string(),
        };
        assert_eq!(
            err.user_message(),
            "API request failed: 401 Unauthorized from http://x/chat/completions: no key"
        );

        let err = BackendError::Protocol("missing content".to_string());
        assert_eq!(err.user_message(), "An error occurred: missing content");
    }
}
