// Fieldlink Gateway - Poll/uplink orchestration for telemetry gateways
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for Fieldlink Gateway

use std::net::Ipv4Addr;

use thiserror::Error;

/// Main error type for Gateway operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Rejected configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error from the core pipeline
    #[error("Core error: {0}")]
    Core(#[from] fieldlink::FieldlinkError),
}

/// Reasons a configuration entry is rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Document could not be parsed
    #[error("Invalid {section} document: {reason}")]
    InvalidDocument {
        section: &'static str,
        reason: String,
    },

    /// Entry has the wrong shape
    #[error("Malformed entry: {0}")]
    Malformed(String),

    /// Required field absent
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Numeric field outside its range
    #[error("Field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },

    /// Function code not in 1..=4
    #[error("Unknown function code: {0}")]
    UnknownFunction(i64),

    /// Operator not one of `>`, `<`, `=`
    #[error("Unknown operator: {0:?}")]
    UnknownOperator(String),

    /// Alarm watches a register outside the read
    #[error("Alarm index {index} outside {count} registers")]
    AlarmIndexOutOfRange { index: u8, count: u8 },

    /// Address collides with the input section marker
    #[error("Reserved address: {0}")]
    ReservedAddress(Ipv4Addr),

    /// Too many entries
    #[error("Too many {what} (max {max})")]
    CapacityExceeded { what: &'static str, max: usize },

    /// Target record larger than the largest uplink frame
    #[error("Record of {size} bytes exceeds the {mtu}-byte frame limit")]
    RecordTooLarge { size: usize, mtu: usize },

    /// Credential is not valid hex of the right length
    #[error("Bad credential {field}: {reason}")]
    BadCredential {
        field: &'static str,
        reason: String,
    },

    /// Join mode not `otaa` or `abp`
    #[error("Unknown join mode: {0:?}")]
    UnknownJoinMode(String),

    /// Input type not `digital` or `counter`
    #[error("Unknown input type: {0:?}")]
    UnknownInputKind(String),
}

/// Fieldbus transport failures (all per-target and non-fatal)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// No connection to the device
    #[error("Not connected to {0}")]
    NotConnected(Ipv4Addr),

    /// Connection attempt failed
    #[error("Connect to {address} failed: {reason}")]
    ConnectFailed { address: Ipv4Addr, reason: String },

    /// Read request failed or returned an exception
    #[error("Read from {address} failed: {reason}")]
    ReadFailed { address: Ipv4Addr, reason: String },
}

/// Result type alias for Gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
