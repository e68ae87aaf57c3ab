//! Relay Core - Chat Turn Processing
//!
//! This crate implements one turn of a conversational assistant: it takes a
//! user message plus the caller's conversation state, either runs an in-band
//! `@` command or forwards the conversation to an OpenRouter-compatible
//! completion provider, and returns the reply while streaming it to an
//! optional TCP observer.
//!
//! # Architecture
//!
//! ```text
//!   caller (input bag)
//!         │
//!         ▼
//!   ┌──────────────┐      ┌───────────────────┐
//!   │  invocation  │─────▶│  TurnProcessor    │
//!   └──────────────┘      └───┬───────────┬───┘
//!                             │           │
//!                 `@` command │           │ chat
//!                             ▼           ▼
//!                     ┌──────────┐  ┌────────────────────────────┐
//!                     │ command  │  │ backend (producer task)    │
//!                     └──────────┘  │  HTTP body ─▶ SseDecoder   │
//!                                   │          ─▶ mpsc (bounded) │
//!                                   └─────────────┬──────────────┘
//!                                                 ▼
//!                                   relay loop ─▶ SideChannel (TCP)
//!                                              ─▶ accumulator ─▶ state
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Completion provider abstraction and the OpenRouter client
//! - [`catalog`]: Selectable models and the default
//! - [`command`]: `@` command parsing and execution
//! - [`config`]: TOML + environment configuration
//! - [`invocation`]: Input bag decoding and the one-call turn entry point
//! - [`state`]: Conversation state carried across turns
//! - [`streaming`]: Server-sent event decoding and the producer task
//! - [`transport`]: TCP side channel and its wire framing
//! - [`turn`]: The turn orchestrator
//!
//! # Ambient Globals
//!
//! Nothing in this crate reads the process environment on its own. The
//! environment lookup used for bag fallbacks is passed in by the caller, and
//! configuration is loaded once and injected.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod catalog;
pub mod command;
pub mod config;
pub mod invocation;
pub mod state;
pub mod streaming;
pub mod transport;
pub mod turn;

// Re-exports for convenience
pub use backend::{
    BackendError, CompletionBackend, CompletionRequest, CompletionResponse, OpenRouterBackend,
    ProviderConfig, StreamingToken,
};
pub use catalog::ModelCatalog;
pub use command::{Command, Selection};
pub use invocation::{run_turn, TurnRequest};
pub use state::{ConversationState, Message, MessageRole};
pub use streaming::{SseDecoder, StreamEvent};
pub use transport::{
    FrameDecoder, Framing, PayloadDecoder, SideChannel, SideChannelConfig, SideChannelPayload,
    TransportError,
};
pub use turn::{TurnId, TurnOutcome, TurnProcessor};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env,
    ConfigError, ConfigOverrides, ConfigSource, RelayConfig,
};
