//! TOML Configuration File Support
//!
//! Centralized, immutable configuration for the relay, built once at startup
//! and injected into the turn processor. The file lives at
//! `~/.config/chat-relay/relay.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`RELAY_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [catalog]
//! models = ["openai/gpt-5", "qwen/qwen3-coder"]
//! default_model = "openai/gpt-5"
//!
//! [relay]
//! streaming = true
//! chunk_size = 10
//!
//! [provider]
//! base_url = "https://openrouter.ai/api/v1"
//! referer = "http://devel.ops.knuth.li"
//! title = "AI Chat"
//! request_timeout_secs = 300
//! channel_capacity = 64
//!
//! [side_channel]
//! connect_timeout_ms = 2000
//! write_timeout_ms = 5000
//! framing = "raw"
//! ```
//!
//! Per-turn values (side-channel host and port, API token, base URL
//! override) are not configured here; they arrive with each invocation, see
//! [`crate::invocation`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::ProviderConfig;
use crate::catalog::ModelCatalog;
use crate::transport::{Framing, SideChannelConfig, DEFAULT_CHUNK_SIZE};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the highest-priority configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Catalog section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogToml {
    /// Selectable model identifiers, in display order
    pub models: Option<Vec<String>>,

    /// Model used when the conversation state names none
    pub default_model: Option<String>,
}

/// Relay behavior section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayToml {
    /// Stream replies (false = single blocking request)
    pub streaming: Option<bool>,

    /// Characters per side-channel slice for command and error texts
    pub chunk_size: Option<usize>,
}

/// Provider section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderToml {
    /// API base URL
    pub base_url: Option<String>,

    /// `HTTP-Referer` header value
    pub referer: Option<String>,

    /// `X-Title` header value
    pub title: Option<String>,

    /// Whole-request timeout in seconds
    pub request_timeout_secs: Option<u64>,

    /// Token channel capacity between stream producer and relay
    pub channel_capacity: Option<usize>,
}

/// Side-channel section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SideChannelToml {
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Per-write timeout in milliseconds; a stalled observer is dropped
    pub write_timeout_ms: Option<u64>,

    /// Wire format: `raw` or `length_prefixed`
    pub framing: Option<Framing>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfigToml {
    /// Model catalog section
    pub catalog: CatalogToml,

    /// Relay behavior section
    pub relay: RelayToml,

    /// Provider section
    pub provider: ProviderToml,

    /// Side-channel section
    pub side_channel: SideChannelToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Immutable relay configuration
///
/// Use [`load_config`] to load it with proper priority handling.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Selectable models and the default
    pub catalog: ModelCatalog,

    /// Stream replies through the side channel
    pub streaming: bool,

    /// Characters per side-channel slice for command and error texts
    pub chunk_size: usize,

    /// Provider defaults; per-turn token and base URL are layered on top
    pub provider: ProviderConfig,

    /// Side-channel defaults; host and port are filled in per turn
    pub side_channel: SideChannelConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            catalog: ModelCatalog::builtin(),
            streaming: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            provider: ProviderConfig::default(),
            side_channel: SideChannelConfig::disabled(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl RelayConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Re-run catalog validation in case fields were assembled piecemeal
        ModelCatalog::new(
            self.catalog.models().to_vec(),
            self.catalog.default_model(),
        )?;

        if self.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.provider.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.provider.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "provider base_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/chat-relay/relay.toml` or
/// `~/.config/chat-relay/relay.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chat-relay").join("relay.toml"))
}

/// Load configuration from the default path and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the merged configuration is invalid. A missing file is not an error.
pub fn load_config() -> Result<RelayConfig, ConfigError> {
    load_config_from_path(default_config_path().as_deref())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the merged
/// configuration is invalid.
pub fn load_config_from_path(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration using `env` as the environment lookup
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the merged
/// configuration is invalid.
pub fn load_config_with_env<F>(path: Option<&Path>, env: F) -> Result<RelayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = RelayConfig::default();

    if let Some(config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.to_path_buf(),
                    source: e,
                })?;

            let toml_config: RelayConfigToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.to_path_buf());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, &env)?;
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut RelayConfig, toml: &RelayConfigToml) -> Result<(), ConfigError> {
    if toml.catalog.models.is_some() || toml.catalog.default_model.is_some() {
        let models = toml
            .catalog
            .models
            .clone()
            .unwrap_or_else(|| config.catalog.models().to_vec());
        let default_model = toml
            .catalog
            .default_model
            .clone()
            .unwrap_or_else(|| config.catalog.default_model().to_string());
        config.catalog = ModelCatalog::new(models, default_model)?;
    }

    if let Some(streaming) = toml.relay.streaming {
        config.streaming = streaming;
    }
    if let Some(size) = toml.relay.chunk_size {
        config.chunk_size = size;
    }

    if let Some(ref base_url) = toml.provider.base_url {
        config.provider.base_url.clone_from(base_url);
    }
    if let Some(ref referer) = toml.provider.referer {
        config.provider.referer.clone_from(referer);
    }
    if let Some(ref title) = toml.provider.title {
        config.provider.title.clone_from(title);
    }
    if let Some(secs) = toml.provider.request_timeout_secs {
        config.provider.request_timeout = Duration::from_secs(secs);
    }
    if let Some(capacity) = toml.provider.channel_capacity {
        config.provider.channel_capacity = capacity;
    }

    if let Some(ms) = toml.side_channel.connect_timeout_ms {
        config.side_channel.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.side_channel.write_timeout_ms {
        config.side_channel.write_timeout = Duration::from_millis(ms);
    }
    if let Some(framing) = toml.side_channel.framing {
        config.side_channel.framing = framing;
    }

    Ok(())
}

fn parse_flag(value: &str) -> bool {
    value != "0" && !value.eq_ignore_ascii_case("false")
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut RelayConfig, env: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(model) = env("RELAY_DEFAULT_MODEL") {
        config.catalog = ModelCatalog::new(config.catalog.models().to_vec(), model)?;
        config.source = ConfigSource::Env;
    }
    if let Some(streaming) = env("RELAY_STREAMING") {
        config.streaming = parse_flag(&streaming);
        config.source = ConfigSource::Env;
    }
    if let Some(size) = env("RELAY_CHUNK_SIZE") {
        match size.parse::<usize>() {
            Ok(n) => {
                config.chunk_size = n;
                config.source = ConfigSource::Env;
            }
            Err(e) => tracing::warn!(value = %size, error = %e, "Ignoring RELAY_CHUNK_SIZE"),
        }
    }
    if let Some(base_url) = env("RELAY_BASE_URL") {
        config.provider = config.provider.clone().with_base_url(base_url);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = env("RELAY_REQUEST_TIMEOUT_SECS") {
        match secs.parse::<u64>() {
            Ok(n) => {
                config.provider.request_timeout = Duration::from_secs(n);
                config.source = ConfigSource::Env;
            }
            Err(e) => {
                tracing::warn!(value = %secs, error = %e, "Ignoring RELAY_REQUEST_TIMEOUT_SECS");
            }
        }
    }
    if let Some(ms) = env("RELAY_CONNECT_TIMEOUT_MS") {
        match ms.parse::<u64>() {
            Ok(n) => {
                config.side_channel.connect_timeout = Duration::from_millis(n);
                config.source = ConfigSource::Env;
            }
            Err(e) => tracing::warn!(value = %ms, error = %e, "Ignoring RELAY_CONNECT_TIMEOUT_MS"),
        }
    }
    if let Some(ms) = env("RELAY_WRITE_TIMEOUT_MS") {
        match ms.parse::<u64>() {
            Ok(n) => {
                config.side_channel.write_timeout = Duration::from_millis(n);
                config.source = ConfigSource::Env;
            }
            Err(e) => tracing::warn!(value = %ms, error = %e, "Ignoring RELAY_WRITE_TIMEOUT_MS"),
        }
    }
    if let Some(framing) = env("RELAY_FRAMING") {
        match framing.parse::<Framing>() {
            Ok(framing) => {
                config.side_channel.framing = framing;
                config.source = ConfigSource::Env;
            }
            Err(reason) => tracing::warn!(reason = %reason, "Ignoring RELAY_FRAMING"),
        }
    }
    Ok(())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Default model override
    pub default_model: Option<String>,

    /// Streaming toggle override
    pub streaming: Option<bool>,

    /// Chunk size override
    pub chunk_size: Option<usize>,

    /// Framing override
    pub framing: Option<Framing>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set default model override
    #[must_use]
    pub fn with_default_model(mut self, model: String) -> Self {
        self.default_model = Some(model);
        self
    }

    /// Set streaming override
    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = Some(streaming);
        self
    }

    /// Set chunk size override
    #[must_use]
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }

    /// Set framing override
    #[must_use]
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = Some(framing);
        self
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the result is invalid.
    pub fn apply(&self, config: &mut RelayConfig) -> Result<(), ConfigError> {
        if self.default_model.is_some()
            || self.streaming.is_some()
            || self.chunk_size.is_some()
            || self.framing.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref model) = self.default_model {
            config.catalog = ModelCatalog::new(config.catalog.models().to_vec(), model.clone())?;
        }
        if let Some(streaming) = self.streaming {
            config.streaming = streaming;
        }
        if let Some(size) = self.chunk_size {
            config.chunk_size = size;
        }
        if let Some(framing) = self.framing {
            config.side_channel.framing = framing;
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
