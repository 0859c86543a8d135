// Fieldlink - Poll/alarm/uplink core for telemetry gateways
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Frame counter persistence
//!
//! The radio session loads its frame counter through a [`CounterStore`]
//! before the first transmission and saves it after every transmission.
//!
//! # Record Format
//!
//! ```text
//! [counter: 4 BE] [crc32: 4 BE]
//! ```
//!
//! The checksum covers the counter bytes (CRC-32/ISO-HDLC).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::error::{Result, StoreError};

/// Well-known key of the uplink frame counter
pub const FRAME_COUNTER_KEY: &str = "fcnt";

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Size of an encoded counter record
pub const COUNTER_RECORD_SIZE: usize = 8;

/// Durable storage of named counters
pub trait CounterStore {
    /// Load a counter; `Ok(None)` when it was never saved
    fn load(&mut self, key: &str) -> Result<Option<u32>>;

    /// Save a counter durably
    fn save(&mut self, key: &str, value: u32) -> Result<()>;
}

/// Encode a counter record with its checksum
pub fn encode_counter(value: u32) -> [u8; COUNTER_RECORD_SIZE] {
    let bytes = value.to_be_bytes();
    let crc = CRC32.checksum(&bytes).to_be_bytes();
    let mut record = [0u8; COUNTER_RECORD_SIZE];
    record[..4].copy_from_slice(&bytes);
    record[4..].copy_from_slice(&crc);
    record
}

/// Decode and verify a counter record
pub fn decode_counter(key: &str, record: &[u8]) -> Result<u32> {
    if record.len() != COUNTER_RECORD_SIZE {
        return Err(StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("expected {} bytes, got {}", COUNTER_RECORD_SIZE, record.len()),
        }
        .into());
    }

    let value = [record[0], record[1], record[2], record[3]];
    let stored = u32::from_be_bytes([record[4], record[5], record[6], record[7]]);
    let actual = CRC32.checksum(&value);
    if stored != actual {
        return Err(StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("checksum {:08x} != {:08x}", stored, actual),
        }
        .into());
    }

    Ok(u32::from_be_bytes(value))
}

/// In-memory counter store.
///
/// Clones share the same map, so a store handed to a new session after a
/// simulated restart sees what the previous session saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryCounterStore {
    values: Arc<Mutex<HashMap<String, u32>>>,
    fail_saves: Arc<Mutex<bool>>,
}

impl MemoryCounterStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding an initial counter value
    pub fn with_value(key: &str, value: u32) -> Self {
        let store = Self::new();
        if let Ok(mut values) = store.values.lock() {
            values.insert(key.to_string(), value);
        }
        store
    }

    /// Read a value without going through the trait
    pub fn get(&self, key: &str) -> Option<u32> {
        self.values.lock().ok().and_then(|v| v.get(key).copied())
    }

    /// Make subsequent saves fail (simulates a worn-out flash)
    pub fn set_fail_saves(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_saves.lock() {
            *flag = fail;
        }
    }
}

impl CounterStore for MemoryCounterStore {
    fn load(&mut self, key: &str) -> Result<Option<u32>> {
        Ok(self.get(key))
    }

    fn save(&mut self, key: &str, value: u32) -> Result<()> {
        let failing = self.fail_saves.lock().map(|f| *f).unwrap_or(true);
        if failing {
            return Err(StoreError::Io {
                key: key.to_string(),
                reason: "save failed".to_string(),
            }
            .into());
        }

        let mut values = self.values.lock().map_err(|_| StoreError::Io {
            key: key.to_string(),
            reason: "store poisoned".to_string(),
        })?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}
