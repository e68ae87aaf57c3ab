//! OpenRouter Backend Implementation
//!
//! Client for OpenRouter-compatible chat completion APIs:
//! - `POST {base}/chat/completions` with `stream: true` answers with a
//!   server-sent event stream, decoded by [`crate::streaming`]
//! - the same endpoint with `stream: false` answers with one JSON body whose
//!   reply sits at `choices[0].message.content`

use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::Instrument;

use super::traits::{
    BackendError, CompletionBackend, CompletionRequest, CompletionResponse, ProviderConfig,
    StreamingToken,
};
use crate::streaming;

/// OpenRouter backend client
#[derive(Clone, Debug)]
pub struct OpenRouterBackend {
    config: ProviderConfig,
    http_client: reqwest::Client,
}

impl OpenRouterBackend {
    /// Create a backend for `config`
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Transport` if the HTTP client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Provider settings in use
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// POST `request` and fail on transport errors or non-2xx statuses
    async fn post(&self, request: &CompletionRequest) -> Result<reqwest::Response, BackendError> {
        let url = self.config.completions_url();

        let mut builder = self
            .http_client
            .post(&url)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        tracing::debug!(
            url = %url,
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            authenticated = self.config.api_key.is_some(),
            "Sending completion request"
        );

        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, url, body });
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionBackend for OpenRouterBackend {
    fn name(&self) -> &str {
        "OpenRouter"
    }

    async fn send_streaming(
        &self,
        request: &CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, BackendError> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        let streaming_request = request.clone().with_stream(true);
        let response = self.post(&streaming_request).await?;

        tokio::spawn(streaming::pump(response.bytes_stream(), tx).in_current_span());

        Ok(rx)
    }

    async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse, BackendError> {
        let start = Instant::now();
        let blocking_request = request.clone().with_stream(false);
        let response = self.post(&blocking_request).await?;

        let data: Value = response
            .json()
            .await
            .map_err(|e| BackendError::Protocol(format!("invalid completion body: {e}")))?;

        let content = extract_message_content(&data)?;

        Ok(CompletionResponse {
            content,
            model: data
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(&request.model)
                .to_string(),
            duration_ms: u64::try_from(start.elapsed().as_millis()).ok(),
        })
    }
}

/// Pull `choices[0].message.content` out of a blocking response body
fn extract_message_content(data: &Value) -> Result<String, BackendError> {
    data.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            BackendError::Protocol("completion has no choices[0].message.content".to_string())
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_extract_message_content() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "Hi!"}}]});
        assert_eq!(extract_message_content(&body).unwrap(), "Hi!");

        let body = json!({"choices": []});
        assert!(matches!(
            extract_message_content(&body),
            Err(BackendError::Protocol(_))
        ));

        let body = json!({"error": {"message": "bad"}});
        assert!(extract_message_content(&body).is_err());
    }

    #[test]
    fn test_backend_creation() {
        let backend = OpenRouterBackend::new(ProviderConfig::default()).unwrap();
        assert_eq!(backend.name(), "OpenRouter");
        assert_eq!(
            backend.config().completions_url(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }
}
