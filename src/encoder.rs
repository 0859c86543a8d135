//! Uplink encoder
//!
//! Serializes poll results and input-channel state into MTU-bounded bulk
//! frames, and alarms into single fixed-size notification frames.
//!
//! # Bulk format
//!
//! ```text
//! target record:
//! [addr: 4] [unit: 1] [start: 2 BE] [count: 1] [success: 1] [function: 1] [payload]
//!
//! payload:
//!   bit functions (1, 2)       ceil(count / 8) bytes, MSB first
//!   register functions (3, 4)  count * 2 bytes, big-endian
//!   (zero-filled when success = 0)
//!
//! input section:
//! [0xFF] [channel count: 1] { [index: 1] [kind: 1] [value: 2 BE] }*
//! ```
//!
//! # Alarm formats
//!
//! ```text
//! fieldbus: [addr: 4] [unit: 1] [register: 2 BE] [op: 1] [threshold: 2 BE] [value: 2 BE]
//! input:    [0xFF] [channel: 1] [expected: 1] [actual: 1] [reserved: 1]
//! ```

use log::{debug, warn};

use crate::alarm::{FieldbusAlarm, InputAlarm, PendingAlarm};
use crate::frame::Chunker;
use crate::protocol::{UplinkFrame, INPUT_SECTION_MARKER, RECORD_HEADER_SIZE};
use crate::signal::{InputChannel, PollTarget};

/// Encoder for uplink frames
#[derive(Debug, Clone, Copy, Default)]
pub struct UplinkEncoder;

impl UplinkEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self
    }

    /// Encode all targets and the input section into frames of at most `mtu` bytes.
    ///
    /// Records are emitted in target order followed by the input section.
    /// A record that exceeds `mtu` on its own is skipped with a warning.
    pub fn encode(
        &self,
        targets: &[PollTarget],
        inputs: &[InputChannel],
        mtu: usize,
    ) -> Vec<UplinkFrame> {
        let mut chunker = Chunker::new(mtu);

        for target in targets {
            let record = self.encode_record(target);
            if let Err(e) = chunker.push(&record) {
                warn!("Target {} unit {} left out of uplink: {}", target.address, target.unit_id, e);
            }
        }

        let section = self.encode_input_section(inputs);
        if let Err(e) = chunker.push(&section) {
            warn!("Input section left out of uplink: {}", e);
        }

        let frames: Vec<UplinkFrame> = chunker.finish().into_iter().map(UplinkFrame::bulk).collect();
        debug!(
            "Encoded {} targets and {} inputs into {} frame(s) at MTU {}",
            targets.len(),
            inputs.len(),
            frames.len(),
            mtu
        );
        frames
    }

    /// Encode one target record
    pub fn encode_record(&self, target: &PollTarget) -> Vec<u8> {
        let payload_len = target.function.payload_len(target.num_regs);
        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + payload_len);

        record.extend_from_slice(&target.address.octets());
        record.push(target.unit_id);
        record.extend_from_slice(&target.start_reg.to_be_bytes());
        record.push(target.num_regs);
        record.push(u8::from(target.success()));
        record.push(target.function.code());

        if !target.success() {
            record.resize(RECORD_HEADER_SIZE + payload_len, 0);
        } else if target.function.is_bit_type() {
            record.extend(pack_bits(target.result()));
        } else {
            for value in target.result() {
                record.extend_from_slice(&value.to_be_bytes());
            }
        }

        record
    }

    /// Encode the input section
    pub fn encode_input_section(&self, inputs: &[InputChannel]) -> Vec<u8> {
        let mut section = Vec::with_capacity(2 + inputs.len() * 4);
        section.push(INPUT_SECTION_MARKER);
        section.push(inputs.len() as u8);

        for (index, input) in inputs.iter().enumerate() {
            section.push(index as u8);
            section.push(input.kind as u8);
            section.extend_from_slice(&input.reported_value().to_be_bytes());
        }

        section
    }

    /// Encode an alarm notification frame
    pub fn encode_alarm(&self, alarm: &PendingAlarm) -> UplinkFrame {
        let payload = match alarm {
            PendingAlarm::Fieldbus(a) => self.encode_fieldbus_alarm(a),
            PendingAlarm::Input(a) => self.encode_input_alarm(a),
        };
        UplinkFrame::alarm(payload)
    }

    fn encode_fieldbus_alarm(&self, alarm: &FieldbusAlarm) -> Vec<u8> {
        let mut payload = Vec::with_capacity(crate::protocol::FIELDBUS_ALARM_SIZE);
        payload.extend_from_slice(&alarm.address.octets());
        payload.push(alarm.unit_id);
        payload.extend_from_slice(&alarm.register.to_be_bytes());
        payload.push(alarm.op.code());
        payload.extend_from_slice(&alarm.threshold.to_be_bytes());
        payload.extend_from_slice(&alarm.value.to_be_bytes());
        payload
    }

    fn encode_input_alarm(&self, alarm: &InputAlarm) -> Vec<u8> {
        vec![
            INPUT_SECTION_MARKER,
            alarm.channel as u8,
            u8::from(alarm.expected),
            u8::from(alarm.actual),
            0x00,
        ]
    }
}

/// Pack values into bits, MSB first; any nonzero value is a 1 bit
fn pack_bits(values: &[u16]) -> Vec<u8> {
    let mut packed = vec![0u8; (values.len() + 7) / 8];
    for (i, value) in values.iter().enumerate() {
        if *value != 0 {
            packed[i / 8] |= 0x80 >> (i % 8);
        }
    }
    packed
}
