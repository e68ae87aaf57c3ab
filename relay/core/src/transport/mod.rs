//! Side-Channel Transport
//!
//! Best-effort push delivery of partial output to an observer while a turn
//! is running. The side channel is an outbound TCP connection opened at most
//! once per turn; it carries a sequence of independent JSON objects:
//!
//! ```text
//! {"state": {...}}      once, before any content
//! {"output": "Hel"}     one per content delta (or per slice of a status text)
//! {"output": "lo"}
//! ```
//!
//! # Failure Model
//!
//! Nothing on the side channel can fail a turn. Every operation returns a
//! `Result` so the caller decides what to log, and the turn processor
//! ignores the error after logging it. A missing host or port is not an
//! error at all: [`SideChannel::connect`] returns `Ok(None)`.
//!
//! # Framing
//!
//! By default payloads are written back to back as bare JSON (observers rely
//! on JSON being self-delimiting, see [`PayloadDecoder`]). The optional
//! length-prefixed mode wraps each payload in a checksummed frame, decoded by
//! [`FrameDecoder`].

pub mod error;
pub mod frame;
pub mod side_channel;

// Re-exports for convenience
pub use error::TransportError;
pub use frame::{FrameDecoder, PayloadDecoder};
pub use side_channel::{
    chunk_text, Framing, SideChannel, SideChannelConfig, SideChannelPayload, DEFAULT_CHUNK_SIZE,
};
