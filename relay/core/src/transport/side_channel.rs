//! TCP side channel to an output observer

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::frame::{encode_framed, encode_raw};
use super::TransportError;
use crate::state::ConversationState;

/// Characters per `{"output"}` slice when pushing a complete text
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Default connect timeout in milliseconds
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;

/// Default per-payload write timeout in milliseconds
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5000;

/// How payloads are delimited on the wire
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Bare JSON objects back to back
    #[default]
    Raw,
    /// `[len][crc32][json]` frames
    LengthPrefixed,
}

impl std::str::FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "raw" => Ok(Self::Raw),
            "length_prefixed" => Ok(Self::LengthPrefixed),
            other => Err(format!("unknown framing '{other}'")),
        }
    }
}

/// Where and how to reach the observer for one turn
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SideChannelConfig {
    /// Observer host; empty disables the side channel
    pub host: String,
    /// Observer port; 0 disables the side channel
    pub port: u16,
    /// Upper bound for establishing the connection
    pub connect_timeout: Duration,
    /// Upper bound for writing one payload; a stalled observer breaks the channel
    pub write_timeout: Duration,
    /// Wire format
    pub framing: Framing,
}

impl Default for SideChannelConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

impl SideChannelConfig {
    /// A configuration that never opens a connection
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            host: String::new(),
            port: 0,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
            framing: Framing::Raw,
        }
    }

    /// Target `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::disabled()
        }
    }

    /// Set the wire format
    #[must_use]
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Set the connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-payload write timeout
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Whether both host and port are set
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty() && self.port != 0
    }
}

/// One unit pushed to the observer
///
/// Serializes as `{"state": {...}}` or `{"output": "..."}`.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SideChannelPayload<'a> {
    /// Conversation state snapshot, sent once before any output
    State(&'a ConversationState),
    /// A fragment of the reply text
    Output(&'a str),
}

/// An open side-channel connection
///
/// Acquired at most once per turn. [`close`](Self::close) is idempotent,
/// and the socket is also released when the handle is dropped.
#[derive(Debug)]
pub struct SideChannel {
    peer: String,
    stream: Option<TcpStream>,
    framing: Framing,
    write_timeout: Duration,
    payloads_sent: u64,
}

impl SideChannel {
    /// Connect to the observer named by `config`
    ///
    /// Returns `Ok(None)` when the side channel is not configured.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ConnectionFailed` if the connection is refused
    /// or does not complete within the connect timeout.
    pub async fn connect(config: &SideChannelConfig) -> Result<Option<Self>, TransportError> {
        if !config.is_configured() {
            tracing::debug!("Side channel not configured");
            return Ok(None);
        }

        let peer = format!("{}:{}", config.host.trim(), config.port);
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&peer))
            .await
            .map_err(|_| {
                TransportError::ConnectionFailed(format!(
                    "timed out connecting to {peer} after {}ms",
                    config.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| TransportError::ConnectionFailed(format!("{peer}: {e}")))?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Could not disable Nagle on side channel");
        }

        tracing::debug!(peer = %peer, framing = ?config.framing, "Side channel connected");

        Ok(Some(Self {
            peer,
            stream: Some(stream),
            framing: config.framing,
            write_timeout: config.write_timeout,
            payloads_sent: 0,
        }))
    }

    /// Observer address
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Whether the connection is still usable
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Payloads written so far
    #[must_use]
    pub fn payloads_sent(&self) -> u64 {
        self.payloads_sent
    }

    /// Write one payload as a single unit
    ///
    /// A write failure, or a write that does not finish within the write
    /// timeout, breaks the channel; later sends return
    /// `TransportError::ConnectionClosed` without touching the socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded or written.
    pub async fn send(&mut self, payload: &SideChannelPayload<'_>) -> Result<(), TransportError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::ConnectionClosed);
        };

        let data = match self.framing {
            Framing::Raw => encode_raw(payload)?,
            Framing::LengthPrefixed => encode_framed(payload)?,
        };

        let written = tokio::time::timeout(self.write_timeout, stream.write_all(&data)).await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(peer = %self.peer, error = %e, "Side channel write failed");
                self.stream = None;
                return Err(TransportError::SendFailed(e.to_string()));
            }
            Err(_) => {
                tracing::warn!(
                    peer = %self.peer,
                    timeout_ms = self.write_timeout.as_millis(),
                    "Side channel observer stalled, dropping connection"
                );
                self.stream = None;
                return Err(TransportError::SendFailed(format!(
                    "write to {} timed out after {}ms",
                    self.peer,
                    self.write_timeout.as_millis()
                )));
            }
        }

        self.payloads_sent += 1;
        Ok(())
    }

    /// Push `text` as consecutive `{"output"}` slices of `chunk_size` characters
    ///
    /// # Errors
    ///
    /// Stops at and returns the first send failure.
    pub async fn stream_text(&mut self, text: &str, chunk_size: usize) -> Result<(), TransportError> {
        for chunk in chunk_text(text, chunk_size) {
            self.send(&SideChannelPayload::Output(chunk)).await?;
        }
        Ok(())
    }

    /// Flush and shut down the connection; safe to call repeatedly
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            match tokio::time::timeout(self.write_timeout, stream.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(peer = %self.peer, error = %e, "Side channel shutdown error");
                }
                Err(_) => tracing::debug!(peer = %self.peer, "Side channel shutdown timed out"),
            }
            tracing::debug!(peer = %self.peer, sent = self.payloads_sent, "Side channel closed");
        }
    }
}

/// Split `text` into slices of at most `chunk_size` characters
///
/// Slices always end on `char` boundaries. A `chunk_size` of 0 is treated as 1.
pub fn chunk_text(text: &str, chunk_size: usize) -> impl Iterator<Item = &str> {
    let chunk_size = chunk_size.max(1);
    let mut rest = text;

    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let end = rest
            .char_indices()
            .nth(chunk_size)
            .map_or(rest.len(), |(idx, _)| idx);
        let (chunk, tail) = rest.split_at(end);
        rest = tail;
        Some(chunk)
    })
}
