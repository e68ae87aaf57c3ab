//! Transport error type

use thiserror::Error;

/// Errors raised by side-channel operations
///
/// None of these are fatal to a turn; they only mean an observer missed
/// some output.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the observer
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Writing to the socket failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The channel was closed or broken by an earlier failure
    #[error("Connection closed")]
    ConnectionClosed,

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Frame checksum mismatch - data corruption detected
    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Expected checksum value
        expected: u32,
        /// Actual checksum value received
        actual: u32,
    },
}
