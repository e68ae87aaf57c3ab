//! Side-Channel Wire Formats
//!
//! Two encodings are supported for payloads pushed to an observer.
//!
//! # Raw
//!
//! Bare JSON objects written back to back with no delimiter. This is what
//! existing observers expect. Because JSON objects are self-delimiting, an
//! observer can split the byte stream with [`PayloadDecoder`].
//!
//! # Length-Prefixed
//!
//! ```text
//! +----------------+----------------+------------------------------------------+
//! | Length (4)     | Checksum (4)   | JSON Payload (variable)                  |
//! | big-endian u32 | CRC32          | {"state": ...} or {"output": ...}        |
//! +----------------+----------------+------------------------------------------+
//! ```
//!
//! The Length field contains the size of the JSON payload only. The Checksum
//! is the CRC32 hash of the JSON payload. Decoded by [`FrameDecoder`].

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::TransportError;

/// Maximum frame size (10 MB)
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Minimum buffer capacity for decoders
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Frame header size: 4 bytes length + 4 bytes checksum
const HEADER_SIZE: usize = 8;

#[inline]
fn compute_checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Serialize a payload as bare JSON
///
/// # Errors
///
/// Returns `TransportError::SerializationError` if JSON serialization fails.
pub fn encode_raw<T: Serialize>(msg: &T) -> Result<Vec<u8>, TransportError> {
    serde_json::to_vec(msg).map_err(|e| TransportError::SerializationError(e.to_string()))
}

/// Serialize a payload into a length-prefixed frame with CRC32 checksum
///
/// # Errors
///
/// Returns `TransportError::SerializationError` if serialization fails or the
/// payload exceeds `MAX_FRAME_SIZE`.
pub fn encode_framed<T: Serialize>(msg: &T) -> Result<Vec<u8>, TransportError> {
    let json = encode_raw(msg)?;

    if json.len() > MAX_FRAME_SIZE {
        return Err(TransportError::SerializationError(format!(
            "Frame too large: {} bytes (max: {})",
            json.len(),
            MAX_FRAME_SIZE
        )));
    }

    #[allow(clippy::cast_possible_truncation)]
    let len = json.len() as u32;
    let checksum = compute_checksum(&json);

    let mut buf = Vec::with_capacity(HEADER_SIZE + json.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&checksum.to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Decoder for the length-prefixed format
///
/// Buffers incoming bytes and yields complete messages.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Position where we've consumed up to
    read_pos: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a new decoder with default buffer capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
        }
    }

    /// Append bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        // Compact once most of the buffer has been consumed
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Number of undecoded bytes
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Try to decode the next frame
    ///
    /// Returns `Ok(None)` when more data is needed.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ChecksumMismatch` on corruption and
    /// `TransportError::SerializationError` for oversized or invalid frames.
    pub fn decode<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        let available = self.available();
        if available < HEADER_SIZE {
            return Ok(None);
        }

        let header = &self.buffer[self.read_pos..self.read_pos + HEADER_SIZE];
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected_checksum = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

        if len > MAX_FRAME_SIZE {
            return Err(TransportError::SerializationError(format!(
                "Frame size {len} exceeds maximum {MAX_FRAME_SIZE}"
            )));
        }

        if available < HEADER_SIZE + len {
            return Ok(None);
        }

        let payload_start = self.read_pos + HEADER_SIZE;
        let payload_end = payload_start + len;
        let payload = &self.buffer[payload_start..payload_end];

        let actual_checksum = compute_checksum(payload);
        if actual_checksum != expected_checksum {
            return Err(TransportError::ChecksumMismatch {
                expected: expected_checksum,
                actual: actual_checksum,
            });
        }

        let msg = serde_json::from_slice(payload)
            .map_err(|e| TransportError::SerializationError(e.to_string()))?;

        self.read_pos = payload_end;

        Ok(Some(msg))
    }
}

/// Decoder for the raw format: splits concatenated JSON values
#[derive(Debug, Default)]
pub struct PayloadDecoder {
    buffer: Vec<u8>,
}

impl PayloadDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
        }
    }

    /// Append bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of undecoded bytes
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len()
    }

    /// Try to decode the next complete JSON value
    ///
    /// Returns `Ok(None)` when the buffer holds only whitespace or an
    /// incomplete value.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::SerializationError` if the buffered bytes can
    /// never form valid JSON.
    pub fn decode(&mut self) -> Result<Option<Value>, TransportError> {
        let Some(start) = self.buffer.iter().position(|b| !b.is_ascii_whitespace()) else {
            self.buffer.clear();
            return Ok(None);
        };

        let (value, consumed) = {
            let mut values =
                serde_json::Deserializer::from_slice(&self.buffer[start..]).into_iter::<Value>();
            match values.next() {
                None => return Ok(None),
                Some(Ok(value)) => (value, start + values.byte_offset()),
                Some(Err(e)) if e.is_eof() => return Ok(None),
                Some(Err(e)) => return Err(TransportError::SerializationError(e.to_string())),
            }
        };

        self.buffer.drain(..consumed);
        Ok(Some(value))
    }
}
