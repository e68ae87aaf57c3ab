//! Turn Orchestrator
//!
//! Processes one user turn: the usage banner for empty input, the `@`
//! command path, or the chat path that forwards the conversation upstream.
//!
//! # Streaming relay
//!
//! On the chat path with streaming enabled the backend's producer task feeds
//! a bounded channel and this module is its single consumer. Every delta is
//! pushed to the side channel and appended to the accumulator in channel
//! order, so the concatenation of pushed deltas equals the returned output.
//! The history only grows once the reply is complete.
//!
//! Side-channel failures never affect the turn: they are logged and the turn
//! carries on as if no observer were configured.

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::backend::{BackendError, CompletionBackend, CompletionRequest, StreamingToken};
use crate::catalog::ModelCatalog;
use crate::command::{self, Command};
use crate::config::RelayConfig;
use crate::state::{ConversationState, Message};
use crate::transport::{SideChannel, SideChannelConfig, SideChannelPayload, DEFAULT_CHUNK_SIZE};

/// Identifier attached to every log line of one turn
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TurnId(pub String);

impl TurnId {
    /// Generate a new unique turn ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one turn, serialized as the output bag
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnOutcome {
    /// Reply, command result, banner, or error text
    pub output: String,
    /// Whether the output was (or would have been) streamed
    pub streaming: bool,
    /// Updated conversation state for the caller to keep
    pub state: ConversationState,
}

/// Runs turns against one completion backend
pub struct TurnProcessor<B: CompletionBackend> {
    backend: B,
    catalog: ModelCatalog,
    streaming: bool,
    chunk_size: usize,
}

impl<B: CompletionBackend> TurnProcessor<B> {
    /// Create a streaming processor with the default chunk size
    pub fn new(backend: B, catalog: ModelCatalog) -> Self {
        Self {
            backend,
            catalog,
            streaming: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Create a processor using the catalog and relay settings of `config`
    pub fn from_config(backend: B, config: &RelayConfig) -> Self {
        Self::new(backend, config.catalog.clone())
            .with_streaming(config.streaming)
            .with_chunk_size(config.chunk_size)
    }

    /// Enable or disable streaming
    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Characters per side-channel slice for command and error texts
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Catalog used for commands and defaults
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Process one turn
    ///
    /// Never fails: upstream errors become the output text and leave the
    /// history untouched.
    pub async fn process(
        &self,
        state: ConversationState,
        raw_input: &str,
        side_channel: &SideChannelConfig,
    ) -> TurnOutcome {
        let turn_id = TurnId::new();
        let span = tracing::info_span!(
            "turn",
            turn_id = %turn_id,
            backend = %self.backend.name(),
            model = %state.model()
        );

        self.dispatch(state, raw_input, side_channel)
            .instrument(span)
            .await
    }

    async fn dispatch(
        &self,
        state: ConversationState,
        raw_input: &str,
        side_channel: &SideChannelConfig,
    ) -> TurnOutcome {
        let input = raw_input.trim();

        if input.is_empty() {
            tracing::debug!("Empty input, returning usage banner");
            return TurnOutcome {
                output: self.banner(),
                streaming: true,
                state,
            };
        }

        match Command::parse(input) {
            Some(command) => self.run_command(&command, state, side_channel).await,
            None => self.run_chat(input, state, side_channel).await,
        }
    }

    fn banner(&self) -> String {
        format!(
            "Welcome to the assistant.\nType @ to list curated models.\nType @<prefix> to select one (default: {}).\n",
            self.catalog.default_model()
        )
    }

    async fn run_command(
        &self,
        command: &Command,
        mut state: ConversationState,
        side_channel: &SideChannelConfig,
    ) -> TurnOutcome {
        tracing::info!(command = ?command, "Running command");
        let output = command::execute(command, &mut state, &self.catalog);

        if self.streaming {
            let mut observer = Observer::open(side_channel).await;
            observer.send(&SideChannelPayload::State(&state)).await;
            observer.send_text(&output, self.chunk_size).await;
            observer.close().await;
        }

        TurnOutcome {
            output,
            streaming: self.streaming,
            state,
        }
    }

    async fn run_chat(
        &self,
        input: &str,
        mut state: ConversationState,
        side_channel: &SideChannelConfig,
    ) -> TurnOutcome {
        let user = Message::user(input);
        let mut messages = state.history().to_vec();
        messages.push(user.clone());
        let request =
            CompletionRequest::new(state.model(), messages).with_stream(self.streaming);

        tracing::info!(
            history = state.history().len(),
            streaming = self.streaming,
            "Forwarding conversation upstream"
        );

        if !self.streaming {
            let output = match self.backend.send(&request).await {
                Ok(response) => {
                    tracing::info!(
                        chars = response.content.len(),
                        duration_ms = ?response.duration_ms,
                        "Reply received"
                    );
                    state.record_exchange(user, Message::assistant(response.content.clone()));
                    response.content
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Upstream request failed");
                    e.user_message()
                }
            };
            return TurnOutcome {
                output,
                streaming: false,
                state,
            };
        }

        let mut observer = Observer::open(side_channel).await;
        // The observer sees the state as it was before this turn
        observer.send(&SideChannelPayload::State(&state)).await;

        let output = match self.relay(&request, &mut observer).await {
            Ok(reply) => {
                state.record_exchange(user, Message::assistant(reply.clone()));
                reply
            }
            Err(e) => {
                tracing::warn!(error = %e, "Upstream request failed");
                let text = e.user_message();
                observer.send_text(&text, self.chunk_size).await;
                text
            }
        };

        observer.close().await;

        TurnOutcome {
            output,
            streaming: true,
            state,
        }
    }

    /// Consume the token channel, relaying and accumulating in order
    async fn relay(
        &self,
        request: &CompletionRequest,
        observer: &mut Observer,
    ) -> Result<String, BackendError> {
        let mut rx = self.backend.send_streaming(request).await?;
        let mut reply = String::new();
        let mut deltas: u32 = 0;

        while let Some(token) = rx.recv().await {
            match token {
                StreamingToken::Delta(text) => {
                    deltas += 1;
                    observer.send(&SideChannelPayload::Output(&text)).await;
                    reply.push_str(&text);
                }
                StreamingToken::Complete => {
                    tracing::info!(deltas, chars = reply.len(), "Reply complete");
                    return Ok(reply);
                }
                StreamingToken::Error(e) => {
                    tracing::debug!(deltas, "Stream failed after relaying deltas");
                    return Err(e);
                }
            }
        }

        Err(BackendError::Protocol(
            "stream ended before the reply was complete".to_string(),
        ))
    }
}

/// Side channel for one turn with failures logged and swallowed
struct Observer {
    channel: Option<SideChannel>,
}

impl Observer {
    async fn open(config: &SideChannelConfig) -> Self {
        let channel = match SideChannel::connect(config).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(error = %e, "Side channel unavailable, continuing without it");
                None
            }
        };
        Self { channel }
    }

    async fn send(&mut self, payload: &SideChannelPayload<'_>) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        if !channel.is_open() {
            return;
        }
        if let Err(e) = channel.send(payload).await {
            tracing::debug!(peer = %channel.peer(), error = %e, "Side channel send skipped");
        }
    }

    async fn send_text(&mut self, text: &str, chunk_size: usize) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        if !channel.is_open() {
            return;
        }
        if let Err(e) = channel.stream_text(text, chunk_size).await {
            tracing::debug!(peer = %channel.peer(), error = %e, "Side channel text push stopped");
        }
    }

    async fn close(&mut self) {
        if let Some(channel) = self.channel.as_mut() {
            channel.close().await;
        }
    }
}
