// Fieldlink - Poll/alarm/uplink core for telemetry gateways
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! MTU-bounded frame assembly
//!
//! Records are appended in order; when the next record would push the
//! current frame past the MTU the frame is closed and a new one started.
//! A record is never split across frames.
//!
//! ```text
//! mtu = 20, records of 12 bytes:
//! [r1 (12)]  [r2 (12)]  [r3 (12)]
//! ```

use crate::error::EncodeError;

/// Builder for one frame with a size limit
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    buf: Vec<u8>,
    max_size: usize,
}

impl FrameBuilder {
    /// Create a new frame builder with the specified maximum size
    pub fn new(max_size: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_size),
            max_size,
        }
    }

    /// Try to append a record, returns false if the frame would exceed max size
    pub fn try_add(&mut self, record: &[u8]) -> bool {
        if self.buf.len() + record.len() > self.max_size {
            return false;
        }
        self.buf.extend_from_slice(record);
        true
    }

    /// Get the remaining space in bytes
    pub fn remaining(&self) -> usize {
        self.max_size.saturating_sub(self.buf.len())
    }

    /// Get the current frame size
    pub fn current_size(&self) -> usize {
        self.buf.len()
    }

    /// Check if the frame is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Build the frame
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

/// Splits an ordered record stream into MTU-bounded frames
#[derive(Debug)]
pub struct Chunker {
    mtu: usize,
    current: FrameBuilder,
    frames: Vec<Vec<u8>>,
}

impl Chunker {
    /// Create a chunker for the given MTU
    pub fn new(mtu: usize) -> Self {
        Self {
            mtu,
            current: FrameBuilder::new(mtu),
            frames: Vec::new(),
        }
    }

    /// Append one record, flushing the current frame first if needed.
    ///
    /// A record larger than the MTU is rejected and left out.
    pub fn push(&mut self, record: &[u8]) -> Result<(), EncodeError> {
        if record.len() > self.mtu {
            return Err(EncodeError::RecordTooLarge {
                size: record.len(),
                mtu: self.mtu,
            });
        }

        if !self.current.try_add(record) {
            self.flush();
            let added = self.current.try_add(record);
            debug_assert!(added, "record of {} bytes rejected by an empty frame", record.len());
        }
        Ok(())
    }

    fn flush(&mut self) {
        let full = std::mem::replace(&mut self.current, FrameBuilder::new(self.mtu));
        if !full.is_empty() {
            self.frames.push(full.build());
        }
    }

    /// Close the last frame and return all frames in order
    pub fn finish(mut self) -> Vec<Vec<u8>> {
        self.flush();
        self.frames
    }
}
