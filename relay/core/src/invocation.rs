//! Invocation boundary
//!
//! Decodes the caller's input bag into typed values and runs one turn. This
//! is the only place the relay reads loosely typed caller input; everything
//! past [`TurnRequest::from_bag`] works on validated types.
//!
//! | key                 | meaning                          |
//! |---------------------|----------------------------------|
//! | `input`             | user text (non-strings are stringified) |
//! | `state`             | conversation state object or JSON string |
//! | `STREAM_HOST`       | side-channel host                |
//! | `STREAM_PORT`       | side-channel port (string or number) |
//! | `OLLAMA_API_HOST`   | upstream base URL override       |
//! | `OLLAMA_API_SECRET` | upstream bearer token            |
//!
//! The four upper-case keys fall back to an environment lookup supplied by
//! the caller when the bag does not carry them.

use serde_json::Value;

use crate::backend::{OpenRouterBackend, ProviderConfig};
use crate::config::RelayConfig;
use crate::state::ConversationState;
use crate::transport::SideChannelConfig;
use crate::turn::{TurnOutcome, TurnProcessor};

/// Bag key for the side-channel host
pub const STREAM_HOST: &str = "STREAM_HOST";
/// Bag key for the side-channel port
pub const STREAM_PORT: &str = "STREAM_PORT";
/// Bag key for the upstream base URL override
pub const API_HOST: &str = "OLLAMA_API_HOST";
/// Bag key for the upstream bearer token
pub const API_SECRET: &str = "OLLAMA_API_SECRET";

/// A decoded turn invocation
#[derive(Clone, Debug, PartialEq)]
pub struct TurnRequest {
    /// Raw user text, untrimmed
    pub input: String,
    /// Normalized conversation state
    pub state: ConversationState,
    /// Observer target for this turn
    pub side_channel: SideChannelConfig,
    /// Upstream base URL override
    pub base_url: Option<String>,
    /// Upstream bearer token
    pub api_key: Option<String>,
}

impl TurnRequest {
    /// Decode `bag`, consulting `env` for transport and provider keys it lacks
    ///
    /// Never fails: a bag that is not an object is treated as empty.
    pub fn from_bag<F>(bag: &Value, config: &RelayConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if !bag.is_object() {
            tracing::warn!("Input bag is not a JSON object, treating it as empty");
        }

        let input = match bag.get("input") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        };

        let state = ConversationState::from_value(bag.get("state"), config.catalog.default_model());

        let host = lookup(bag, STREAM_HOST, &env).unwrap_or_default();
        let port = lookup(bag, STREAM_PORT, &env)
            .map(|raw| parse_port(&raw))
            .unwrap_or(0);

        let mut side_channel = config.side_channel.clone();
        side_channel.host = host.trim().to_string();
        side_channel.port = port;

        Self {
            input,
            state,
            side_channel,
            base_url: lookup(bag, API_HOST, &env).filter(|v| !v.trim().is_empty()),
            api_key: lookup(bag, API_SECRET, &env).filter(|v| !v.trim().is_empty()),
        }
    }

    /// Provider settings for this turn layered over the configured defaults
    #[must_use]
    pub fn provider_config(&self, config: &RelayConfig) -> ProviderConfig {
        let mut provider = config.provider.clone();
        if let Some(ref base_url) = self.base_url {
            provider = provider.with_base_url(base_url.as_str());
        }
        if let Some(ref api_key) = self.api_key {
            provider = provider.with_api_key(api_key.as_str());
        }
        provider
    }
}

/// Decode `bag` and run one turn against the configured provider
pub async fn run_turn<F>(bag: &Value, config: &RelayConfig, env: F) -> TurnOutcome
where
    F: Fn(&str) -> Option<String>,
{
    let request = TurnRequest::from_bag(bag, config, env);

    tracing::debug!(
        side_channel = request.side_channel.is_configured(),
        authenticated = request.api_key.is_some(),
        base_url_override = request.base_url.is_some(),
        "Decoded turn request"
    );

    let backend = match OpenRouterBackend::new(request.provider_config(config)) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!(error = %e, "Could not create provider client");
            return TurnOutcome {
                output: e.user_message(),
                streaming: config.streaming,
                state: request.state,
            };
        }
    };

    TurnProcessor::from_config(backend, config)
        .process(request.state, &request.input, &request.side_channel)
        .await
}

/// Bag value for `key` as text, else the environment's
fn lookup<F>(bag: &Value, key: &str, env: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    match bag.get(key) {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Null) | None => env(key),
        Some(other) => {
            tracing::warn!(key, value = %other, "Ignoring non-scalar bag value");
            env(key)
        }
    }
}

fn parse_port(raw: &str) -> u16 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }
    raw.parse::<u16>().unwrap_or_else(|_| {
        tracing::warn!(value = %raw, "Invalid side-channel port, disabling side channel");
        0
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::backend::DEFAULT_BASE_URL;
    use crate::catalog::DEFAULT_MODEL;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_minimal_bag() {
        let config = RelayConfig::default();
        let request = TurnRequest::from_bag(&json!({"input": "hello"}), &config, no_env);

        assert_eq!(request.input, "hello");
        assert_eq!(request.state, ConversationState::new(DEFAULT_MODEL));
        assert!(!request.side_channel.is_configured());
        assert_eq!(request.base_url, None);
        assert_eq!(request.api_key, None);
        assert_eq!(request.provider_config(&config).base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_non_string_input_is_stringified() {
        let config = RelayConfig::default();
        assert_eq!(
            TurnRequest::from_bag(&json!({"input": 42}), &config, no_env).input,
            "42"
        );
        assert_eq!(TurnRequest::from_bag(&json!({}), &config, no_env).input, "");
        assert_eq!(TurnRequest::from_bag(&json!("text"), &config, no_env).input, "");
    }

    #[test]
    fn test_port_as_string_or_number() {
        let config = RelayConfig::default();

        let request = TurnRequest::from_bag(
            &json!({"STREAM_HOST": " localhost ", "STREAM_PORT": "9000"}),
            &config,
            no_env,
        );
        assert_eq!(request.side_channel.host, "localhost");
        assert_eq!(request.side_channel.port, 9000);

        let request = TurnRequest::from_bag(
            &json!({"STREAM_HOST": "localhost", "STREAM_PORT": 9001}),
            &config,
            no_env,
        );
        assert_eq!(request.side_channel.port, 9001);

        let request = TurnRequest::from_bag(
            &json!({"STREAM_HOST": "localhost", "STREAM_PORT": "not a port"}),
            &config,
            no_env,
        );
        assert!(!request.side_channel.is_configured());
    }

    #[test]
    fn test_bag_wins_over_env() {
        let config = RelayConfig::default();
        let env = env_from(&[
            ("STREAM_HOST", "env-host"),
            ("STREAM_PORT", "7000"),
            ("OLLAMA_API_HOST", "http://env:1/v1"),
            ("OLLAMA_API_SECRET", "env-secret"),
        ]);

        let request = TurnRequest::from_bag(
            &json!({"STREAM_HOST": "bag-host", "OLLAMA_API_SECRET": "bag-secret"}),
            &config,
            env,
        );

        assert_eq!(request.side_channel.host, "bag-host");
        assert_eq!(request.side_channel.port, 7000);
        assert_eq!(request.api_key.as_deref(), Some("bag-secret"));

        let provider = request.provider_config(&config);
        assert_eq!(provider.completions_url(), "http://env:1/v1/chat/completions");
        assert_eq!(provider.api_key.as_deref(), Some("bag-secret"));
    }

    #[test]
    fn test_side_channel_inherits_configured_framing() {
        let mut config = RelayConfig::default();
        config.side_channel.framing = crate::transport::Framing::LengthPrefixed;

        let request = TurnRequest::from_bag(
            &json!({"STREAM_HOST": "h", "STREAM_PORT": 1}),
            &config,
            no_env,
        );
        assert_eq!(
            request.side_channel.framing,
            crate::transport::Framing::LengthPrefixed
        );
    }

    #[tokio::test]
    async fn test_run_turn_command_needs_no_network() {
        let config = RelayConfig::default();
        let bag = json!({"input": "@openai/gpt-5", "state": "{\"model\":\"qwen/qwen3-coder\"}"});

        let outcome = run_turn(&bag, &config, no_env).await;

        assert_eq!(outcome.output, "Model updated to: openai/gpt-5");
        assert!(outcome.streaming);
        assert_eq!(outcome.state.model(), "openai/gpt-5");
    }
}
