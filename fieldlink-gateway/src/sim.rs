// Fieldlink Gateway - Poll/uplink orchestration for telemetry gateways
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! In-memory fieldbus and input pins for tests and bench setups

use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::error::TransportError;
use crate::poll::{FieldbusTransport, InputPins};

#[derive(Debug, Default)]
struct Device {
    connected: bool,
    registers: HashMap<u16, u16>,
    bits: HashMap<u16, bool>,
    fail_reads: bool,
}

/// Simulated fieldbus with a register and a bit space per device.
///
/// Holding and input registers share one space, as do coils and discrete
/// inputs. Unset addresses read as zero.
#[derive(Debug, Default)]
pub struct MemoryFieldbus {
    devices: HashMap<Ipv4Addr, Device>,
    reads: u64,
}

impl MemoryFieldbus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a device reachable
    pub fn add_device(&mut self, address: Ipv4Addr) {
        self.devices.entry(address).or_default();
    }

    /// Drop the connection to a device (it stays reachable)
    pub fn disconnect(&mut self, address: Ipv4Addr) {
        if let Some(device) = self.devices.get_mut(&address) {
            device.connected = false;
        }
    }

    /// Set consecutive registers starting at `start`
    pub fn set_registers(&mut self, address: Ipv4Addr, start: u16, values: &[u16]) {
        let device = self.devices.entry(address).or_default();
        for (i, v) in values.iter().enumerate() {
            device.registers.insert(start.wrapping_add(i as u16), *v);
        }
    }

    /// Set consecutive coils/discrete inputs starting at `start`
    pub fn set_coils(&mut self, address: Ipv4Addr, start: u16, values: &[bool]) {
        let device = self.devices.entry(address).or_default();
        for (i, v) in values.iter().enumerate() {
            device.bits.insert(start.wrapping_add(i as u16), *v);
        }
    }

    /// Make reads from a device fail
    pub fn fail_reads(&mut self, address: Ipv4Addr, fail: bool) {
        if let Some(device) = self.devices.get_mut(&address) {
            device.fail_reads = fail;
        }
    }

    /// Number of read requests served or refused
    pub fn read_count(&self) -> u64 {
        self.reads
    }

    fn device(&mut self, address: Ipv4Addr) -> Result<&Device, TransportError> {
        self.reads += 1;
        let device = self
            .devices
            .get(&address)
            .filter(|d| d.connected)
            .ok_or(TransportError::NotConnected(address))?;
        if device.fail_reads {
            return Err(TransportError::ReadFailed {
                address,
                reason: "exception response".to_string(),
            });
        }
        Ok(device)
    }

    fn read_words(&mut self, address: Ipv4Addr, start: u16, count: u8) -> Result<Vec<u16>, TransportError> {
        let device = self.device(address)?;
        Ok((0..count as u16)
            .map(|i| {
                device
                    .registers
                    .get(&start.wrapping_add(i))
                    .copied()
                    .unwrap_or(0)
            })
            .collect())
    }

    fn read_bits(&mut self, address: Ipv4Addr, start: u16, count: u8) -> Result<Vec<bool>, TransportError> {
        let device = self.device(address)?;
        Ok((0..count as u16)
            .map(|i| device.bits.get(&start.wrapping_add(i)).copied().unwrap_or(false))
            .collect())
    }
}

impl FieldbusTransport for MemoryFieldbus {
    fn is_connected(&self, address: Ipv4Addr) -> bool {
        self.devices.get(&address).map_or(false, |d| d.connected)
    }

    fn connect(&mut self, address: Ipv4Addr) -> Result<(), TransportError> {
        match self.devices.get_mut(&address) {
            Some(device) => {
                device.connected = true;
                Ok(())
            }
            None => Err(TransportError::ConnectFailed {
                address,
                reason: "host unreachable".to_string(),
            }),
        }
    }

    fn read_holding_registers(
        &mut self,
        address: Ipv4Addr,
        _unit_id: u8,
        start: u16,
        count: u8,
    ) -> Result<Vec<u16>, TransportError> {
        self.read_words(address, start, count)
    }

    fn read_input_registers(
        &mut self,
        address: Ipv4Addr,
        _unit_id: u8,
        start: u16,
        count: u8,
    ) -> Result<Vec<u16>, TransportError> {
        self.read_words(address, start, count)
    }

    fn read_coils(
        &mut self,
        address: Ipv4Addr,
        _unit_id: u8,
        start: u16,
        count: u8,
    ) -> Result<Vec<bool>, TransportError> {
        self.read_bits(address, start, count)
    }

    fn read_discrete_inputs(
        &mut self,
        address: Ipv4Addr,
        _unit_id: u8,
        start: u16,
        count: u8,
    ) -> Result<Vec<bool>, TransportError> {
        self.read_bits(address, start, count)
    }
}

/// Simulated input lines; unset pins read low
#[derive(Debug, Default, Clone)]
pub struct MemoryPins {
    levels: HashMap<u8, bool>,
}

impl MemoryPins {
    /// Create with every pin low
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive a pin
    pub fn set(&mut self, pin: u8, level: bool) {
        self.levels.insert(pin, level);
    }
}

impl InputPins for MemoryPins {
    fn level(&mut self, pin: u8) -> bool {
        self.levels.get(&pin).copied().unwrap_or(false)
    }
}
