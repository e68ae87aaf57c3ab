//! Upstream Stream Decoding
//!
//! The completion provider streams its reply as server-sent events:
//!
//! ```text
//! : OPENROUTER PROCESSING
//!
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! [`SseDecoder`] turns the raw body into [`StreamEvent`]s, and [`pump`]
//! runs it as the producer half of a bounded channel: one task per request
//! reads the body, decodes, and sends [`StreamingToken`]s in arrival order
//! to the single consumer (the turn processor).
//!
//! # Fragment Policy
//!
//! Lines are reassembled across network reads, but a complete `data:` line
//! whose payload is not valid JSON is reported as [`StreamEvent::Malformed`]
//! and dropped. Payloads are never merged across lines. A line longer than
//! [`MAX_LINE_SIZE`] is reported as malformed and skipped up to the next
//! newline, so a runaway upstream cannot grow the buffer without bound.
//!
//! [`StreamingToken`]: crate::backend::StreamingToken

mod decoder;
mod producer;

pub use decoder::{
    decode_line, SseDecoder, StreamEvent, DATA_PREFIX, DONE_SENTINEL, MAX_LINE_SIZE,
};
pub use producer::pump;
