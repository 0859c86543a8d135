//! Wire-level definitions shared by the encoder, decoder and radio session
//!
//! This module defines:
//! - Fieldbus function codes and alarm comparison operators
//! - Input channel kinds
//! - Spreading factor / data rate mapping and the MTU table
//! - Uplink ports, section markers and capacity limits

use std::fmt;

/// Maximum number of poll targets held by a signal model
pub const MAX_TARGETS: usize = 16;

/// Maximum number of alarm rules owned by one poll target
pub const MAX_RULES_PER_TARGET: usize = 4;

/// Maximum number of local input channels
pub const MAX_INPUT_CHANNELS: usize = 8;

/// Largest register count a single read may request
pub const MAX_REGISTERS_PER_READ: u8 = 125;

/// Marker byte opening the input section and input-channel alarms.
///
/// Target addresses never start with this byte (validated at configuration).
pub const INPUT_SECTION_MARKER: u8 = 0xFF;

/// Port used for bulk uplink frames
pub const BULK_PORT: u8 = 1;

/// Port used for alarm notifications
pub const ALARM_PORT: u8 = 2;

/// Size of a target record header in bytes
pub const RECORD_HEADER_SIZE: usize = 10;

/// Size of a fieldbus alarm notification
pub const FIELDBUS_ALARM_SIZE: usize = 12;

/// Size of an input-channel alarm notification
pub const INPUT_ALARM_SIZE: usize = 5;

/// Fieldbus read function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read coils (bit data)
    ReadCoils = 1,
    /// Read discrete inputs (bit data)
    ReadDiscreteInputs = 2,
    /// Read holding registers (16-bit data)
    ReadHoldingRegisters = 3,
    /// Read input registers (16-bit data)
    ReadInputRegisters = 4,
}

impl FunctionCode {
    /// Convert from the wire/config code
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(FunctionCode::ReadCoils),
            2 => Some(FunctionCode::ReadDiscreteInputs),
            3 => Some(FunctionCode::ReadHoldingRegisters),
            4 => Some(FunctionCode::ReadInputRegisters),
            _ => None,
        }
    }

    /// Wire code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// True for coils and discrete inputs
    pub fn is_bit_type(self) -> bool {
        matches!(
            self,
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs
        )
    }

    /// Payload length of a record carrying `num_regs` values of this kind
    pub fn payload_len(self, num_regs: u8) -> usize {
        if self.is_bit_type() {
            (num_regs as usize + 7) / 8
        } else {
            num_regs as usize * 2
        }
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionCode::ReadCoils => write!(f, "coils"),
            FunctionCode::ReadDiscreteInputs => write!(f, "discrete-inputs"),
            FunctionCode::ReadHoldingRegisters => write!(f, "holding-registers"),
            FunctionCode::ReadInputRegisters => write!(f, "input-registers"),
        }
    }
}

/// Comparison applied by an alarm rule
///
/// The wire byte is the ASCII operator character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompareOp {
    /// `value > threshold`
    GreaterThan = b'>',
    /// `value < threshold`
    LessThan = b'<',
    /// `value == threshold`
    Equal = b'=',
}

impl CompareOp {
    /// Convert from the wire byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            b'>' => Some(CompareOp::GreaterThan),
            b'<' => Some(CompareOp::LessThan),
            b'=' => Some(CompareOp::Equal),
            _ => None,
        }
    }

    /// Parse the configuration form (`">"`, `"<"`, `"="`)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            ">" => Some(CompareOp::GreaterThan),
            "<" => Some(CompareOp::LessThan),
            "=" | "==" => Some(CompareOp::Equal),
            _ => None,
        }
    }

    /// Evaluate `value <op> threshold`
    pub fn holds(self, value: u16, threshold: u16) -> bool {
        match self {
            CompareOp::GreaterThan => value > threshold,
            CompareOp::LessThan => value < threshold,
            CompareOp::Equal => value == threshold,
        }
    }

    /// Wire byte
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code() as char)
    }
}

/// Kind of local input channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum InputKind {
    /// Level-sensed digital input
    #[default]
    Digital = 0,
    /// Rising-edge counter
    Counter = 1,
}

impl InputKind {
    /// Convert from the wire byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(InputKind::Digital),
            1 => Some(InputKind::Counter),
            _ => None,
        }
    }
}

/// LoRa spreading factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum SpreadingFactor {
    /// SF7 (fastest)
    #[default]
    Sf7 = 7,
    /// SF8
    Sf8 = 8,
    /// SF9
    Sf9 = 9,
    /// SF10
    Sf10 = 10,
    /// SF11
    Sf11 = 11,
    /// SF12 (slowest)
    Sf12 = 12,
}

impl SpreadingFactor {
    /// Convert from the numeric spreading factor (7..=12)
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            7 => Some(SpreadingFactor::Sf7),
            8 => Some(SpreadingFactor::Sf8),
            9 => Some(SpreadingFactor::Sf9),
            10 => Some(SpreadingFactor::Sf10),
            11 => Some(SpreadingFactor::Sf11),
            12 => Some(SpreadingFactor::Sf12),
            _ => None,
        }
    }

    /// Numeric spreading factor
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Data rate using this spreading factor at 125 kHz
    pub fn data_rate(self) -> DataRate {
        DataRate(12 - self.value())
    }

    /// Maximum uplink payload at this spreading factor
    pub fn max_payload(self) -> usize {
        match self {
            SpreadingFactor::Sf7 | SpreadingFactor::Sf8 => 242,
            SpreadingFactor::Sf9 => 115,
            SpreadingFactor::Sf10 | SpreadingFactor::Sf11 | SpreadingFactor::Sf12 => 51,
        }
    }
}

impl fmt::Display for SpreadingFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SF{}", self.value())
    }
}

/// Radio data rate index (DR0 = SF12 ... DR5 = SF7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataRate(pub u8);

impl DataRate {
    /// Fastest 125 kHz data rate
    pub const FASTEST: DataRate = DataRate(5);

    /// Spreading factor for this data rate.
    ///
    /// Indices outside DR0..=DR5 are treated as the slowest rate.
    pub fn spreading_factor(self) -> SpreadingFactor {
        match self.0 {
            5 => SpreadingFactor::Sf7,
            4 => SpreadingFactor::Sf8,
            3 => SpreadingFactor::Sf9,
            2 => SpreadingFactor::Sf10,
            1 => SpreadingFactor::Sf11,
            _ => SpreadingFactor::Sf12,
        }
    }

    /// Maximum uplink payload (MTU) at this data rate
    pub fn mtu(self) -> usize {
        self.spreading_factor().max_payload()
    }
}

impl Default for DataRate {
    fn default() -> Self {
        Self::FASTEST
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DR{}", self.0)
    }
}

/// Kind of uplink frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Chunk of the periodic bulk uplink
    Bulk,
    /// Single alarm notification
    Alarm,
}

impl FrameKind {
    /// Port the frame is sent on
    pub fn port(self) -> u8 {
        match self {
            FrameKind::Bulk => BULK_PORT,
            FrameKind::Alarm => ALARM_PORT,
        }
    }
}

/// One complete unit handed to the radio for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkFrame {
    /// Frame kind (selects the port)
    pub kind: FrameKind,
    /// Frame bytes
    pub payload: Vec<u8>,
}

impl UplinkFrame {
    /// Create a bulk uplink frame
    pub fn bulk(payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Bulk,
            payload,
        }
    }

    /// Create an alarm notification frame
    pub fn alarm(payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Alarm,
            payload,
        }
    }

    /// Port the frame is sent on
    pub fn port(&self) -> u8 {
        self.kind.port()
    }

    /// Frame length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the frame carries no bytes
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
