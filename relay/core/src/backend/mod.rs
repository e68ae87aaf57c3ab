//! Completion Provider Integration
//!
//! Abstracted access to the upstream chat completion provider through the
//! [`CompletionBackend`] trait.
//!
//! # Available Backends
//!
//! - **OpenRouter**: OpenRouter-compatible `/chat/completions` (default)
//!
//! # Usage
//!
//! ```ignore
//! use relay_core::backend::{CompletionBackend, CompletionRequest, OpenRouterBackend, ProviderConfig};
//! use relay_core::state::Message;
//!
//! let backend = OpenRouterBackend::new(ProviderConfig::default().with_api_key(token))?;
//! let request = CompletionRequest::new("openai/gpt-5", vec![Message::user("Hello!")]);
//! let rx = backend.send_streaming(&request).await?;
//! ```

mod openrouter;
mod traits;

pub use openrouter::OpenRouterBackend;
pub use traits::{
    BackendError, CompletionBackend, CompletionRequest, CompletionResponse, ProviderConfig,
    StreamingToken, DEFAULT_BASE_URL, DEFAULT_REFERER, DEFAULT_TITLE,
};
