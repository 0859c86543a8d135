//! Decoder module
//!
//! Network-server side parsing of bulk frames and alarm notifications.
//! Every record length is computable from its header, so a frame is parsed
//! front to back without any out-of-band information.

use std::net::Ipv4Addr;

use crate::error::{DecodeError, Result};
use crate::protocol::{
    CompareOp, FunctionCode, InputKind, FIELDBUS_ALARM_SIZE, INPUT_ALARM_SIZE,
    INPUT_SECTION_MARKER, RECORD_HEADER_SIZE,
};

/// One target record as found in a bulk frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRecord {
    /// Device address
    pub address: Ipv4Addr,
    /// Unit identifier
    pub unit_id: u8,
    /// First register
    pub start_reg: u16,
    /// Register count
    pub num_regs: u8,
    /// Poll succeeded
    pub success: bool,
    /// Read function
    pub function: FunctionCode,
    /// One value per register (bits expanded to 0/1)
    pub values: Vec<u16>,
}

/// One channel entry of the input section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputReport {
    /// Channel index
    pub index: u8,
    /// Channel kind
    pub kind: InputKind,
    /// Counter value or level
    pub value: u16,
}

/// A parsed section of a bulk frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    /// Target record
    Target(TargetRecord),
    /// Input section
    Inputs(Vec<InputReport>),
}

/// A parsed alarm notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmNotification {
    /// Fieldbus threshold alarm
    Fieldbus {
        /// Device address
        address: Ipv4Addr,
        /// Unit identifier
        unit_id: u8,
        /// Register address
        register: u16,
        /// Operator
        op: CompareOp,
        /// Threshold
        threshold: u16,
        /// Observed value
        value: u16,
    },
    /// Input channel alarm
    Input {
        /// Channel index
        channel: u8,
        /// Normal state
        expected: bool,
        /// Observed state
        actual: bool,
    },
}

/// Decoder for uplink frames
#[derive(Debug, Clone, Copy, Default)]
pub struct UplinkDecoder;

impl UplinkDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self
    }

    /// Decode every section of one bulk frame
    pub fn decode_frame(&self, frame: &[u8]) -> Result<Vec<Section>> {
        let mut sections = Vec::new();
        let mut pos = 0;

        while pos < frame.len() {
            let (section, used) = if frame[pos] == INPUT_SECTION_MARKER {
                self.decode_inputs(&frame[pos..])?
            } else {
                self.decode_record(&frame[pos..])?
            };
            sections.push(section);
            pos += used;
        }

        Ok(sections)
    }

    /// Decode a sequence of frames in transmission order
    pub fn decode_frames<'a, I>(&self, frames: I) -> Result<Vec<Section>>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut sections = Vec::new();
        for frame in frames {
            sections.extend(self.decode_frame(frame)?);
        }
        Ok(sections)
    }

    fn decode_record(&self, data: &[u8]) -> Result<(Section, usize)> {
        need(data, RECORD_HEADER_SIZE)?;

        let function =
            FunctionCode::from_u8(data[9]).ok_or(DecodeError::UnknownFunction(data[9]))?;
        let num_regs = data[7];
        let payload_len = function.payload_len(num_regs);
        need(data, RECORD_HEADER_SIZE + payload_len)?;

        let payload = &data[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + payload_len];
        let values = if function.is_bit_type() {
            (0..num_regs as usize)
                .map(|i| u16::from(payload[i / 8] & (0x80 >> (i % 8)) != 0))
                .collect()
        } else {
            payload
                .chunks_exact(2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .collect()
        };

        let record = TargetRecord {
            address: Ipv4Addr::new(data[0], data[1], data[2], data[3]),
            unit_id: data[4],
            start_reg: u16::from_be_bytes([data[5], data[6]]),
            num_regs,
            success: match data[8] {
                0 => false,
                1 => true,
                other => {
                    return Err(DecodeError::Malformed {
                        offset: 8,
                        reason: format!("success flag {}", other),
                    }
                    .into())
                }
            },
            function,
            values,
        };

        Ok((Section::Target(record), RECORD_HEADER_SIZE + payload_len))
    }

    fn decode_inputs(&self, data: &[u8]) -> Result<(Section, usize)> {
        need(data, 2)?;
        let count = data[1] as usize;
        let len = 2 + count * 4;
        need(data, len)?;

        let mut reports = Vec::with_capacity(count);
        for entry in data[2..len].chunks_exact(4) {
            let kind = InputKind::from_u8(entry[1]).ok_or(DecodeError::UnknownInputKind(entry[1]))?;
            reports.push(InputReport {
                index: entry[0],
                kind,
                value: u16::from_be_bytes([entry[2], entry[3]]),
            });
        }

        Ok((Section::Inputs(reports), len))
    }

    /// Decode an alarm notification
    pub fn decode_alarm(&self, frame: &[u8]) -> Result<AlarmNotification> {
        need(frame, 1)?;

        if frame[0] == INPUT_SECTION_MARKER {
            need(frame, INPUT_ALARM_SIZE)?;
            return Ok(AlarmNotification::Input {
                channel: frame[1],
                expected: frame[2] != 0,
                actual: frame[3] != 0,
            });
        }

        need(frame, FIELDBUS_ALARM_SIZE)?;
        let op = CompareOp::from_u8(frame[7]).ok_or(DecodeError::UnknownOperator(frame[7]))?;
        Ok(AlarmNotification::Fieldbus {
            address: Ipv4Addr::new(frame[0], frame[1], frame[2], frame[3]),
            unit_id: frame[4],
            register: u16::from_be_bytes([frame[5], frame[6]]),
            op,
            threshold: u16::from_be_bytes([frame[8], frame[9]]),
            value: u16::from_be_bytes([frame[10], frame[11]]),
        })
    }
}

fn need(data: &[u8], needed: usize) -> Result<()> {
    if data.len() < needed {
        return Err(DecodeError::BufferTooShort {
            needed,
            available: data.len(),
        }
        .into());
    }
    Ok(())
}
