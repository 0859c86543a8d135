//! Error types for Fieldlink
//!
//! This module defines all error types used throughout the core library.
//! None of them is fatal to the pipeline: callers log, count and retry on
//! the next natural schedule point.

use thiserror::Error;

/// Result type alias for Fieldlink operations
pub type Result<T> = std::result::Result<T, FieldlinkError>;

/// Main error type for Fieldlink operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldlinkError {
    /// Encoding error
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    /// Decoding error
    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),

    /// Radio session error
    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),

    /// Frame counter store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors during encoding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    /// A single record does not fit in one frame
    #[error("Record too large: {size} bytes exceeds MTU {mtu}")]
    RecordTooLarge { size: usize, mtu: usize },
}

/// Errors during decoding of uplink frames
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Buffer too short
    #[error("Buffer too short: need at least {needed} bytes, got {available}")]
    BufferTooShort { needed: usize, available: usize },

    /// Unknown fieldbus function code
    #[error("Unknown function code: {0}")]
    UnknownFunction(u8),

    /// Unknown alarm operator
    #[error("Unknown operator: 0x{0:02x}")]
    UnknownOperator(u8),

    /// Unknown input kind
    #[error("Unknown input kind: {0}")]
    UnknownInputKind(u8),

    /// Malformed frame
    #[error("Malformed frame at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },
}

/// Errors raised by the radio session
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RadioError {
    /// No session established yet
    #[error("Not joined")]
    NotJoined,

    /// A previous transmission is still in flight
    #[error("Transmission already in flight")]
    Busy,

    /// The link did not report completion in time
    #[error("Transmission timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The link refused the frame
    #[error("Transmission rejected: {reason}")]
    Rejected { reason: String },

    /// The frame counter could not be made durable
    #[error("Frame counter not persisted")]
    CounterNotPersisted,
}

/// Errors related to the frame counter store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Storage could not be read or written
    #[error("I/O error for '{key}': {reason}")]
    Io { key: String, reason: String },

    /// Stored record failed validation
    #[error("Corrupt record for '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}
