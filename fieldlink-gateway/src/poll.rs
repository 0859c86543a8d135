// Fieldlink Gateway - Poll/uplink orchestration for telemetry gateways
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Poll scheduling
//!
//! Reads every poll target through a [`FieldbusTransport`], records
//! success or failure per target and feeds fresh values to the alarm
//! engine. Local inputs are sampled through [`InputPins`].

use std::net::Ipv4Addr;

use fieldlink::{AlarmEngine, FunctionCode, SignalModel};
use log::{debug, warn};

use crate::error::TransportError;

/// Fieldbus client used by the scheduler.
///
/// Reads are synchronous and bounded in time by the implementation.
pub trait FieldbusTransport {
    /// Check for an open connection to `address`
    fn is_connected(&self, address: Ipv4Addr) -> bool;

    /// Open a connection to `address`
    fn connect(&mut self, address: Ipv4Addr) -> Result<(), TransportError>;

    /// Read `count` holding registers
    fn read_holding_registers(
        &mut self,
        address: Ipv4Addr,
        unit_id: u8,
        start: u16,
        count: u8,
    ) -> Result<Vec<u16>, TransportError>;

    /// Read `count` input registers
    fn read_input_registers(
        &mut self,
        address: Ipv4Addr,
        unit_id: u8,
        start: u16,
        count: u8,
    ) -> Result<Vec<u16>, TransportError>;

    /// Read `count` coils
    fn read_coils(
        &mut self,
        address: Ipv4Addr,
        unit_id: u8,
        start: u16,
        count: u8,
    ) -> Result<Vec<bool>, TransportError>;

    /// Read `count` discrete inputs
    fn read_discrete_inputs(
        &mut self,
        address: Ipv4Addr,
        unit_id: u8,
        start: u16,
        count: u8,
    ) -> Result<Vec<bool>, TransportError>;
}

/// Local input lines
pub trait InputPins {
    /// Current level of `pin`
    fn level(&mut self, pin: u8) -> bool;
}

/// Counts from one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Targets read successfully
    pub succeeded: usize,
    /// Targets whose read failed
    pub failed: usize,
    /// Targets skipped while (re)connecting
    pub skipped: usize,
    /// Alarm rules that rose
    pub alarms_raised: usize,
}

/// Drives one poll cycle over all targets
#[derive(Debug, Clone, Copy, Default)]
pub struct PollScheduler {
    engine: AlarmEngine,
}

impl PollScheduler {
    /// Create a scheduler
    pub fn new() -> Self {
        Self {
            engine: AlarmEngine::new(),
        }
    }

    /// Poll every target in order.
    ///
    /// A target without a connection gets a connection attempt and is
    /// skipped for this cycle. There is no retry within a cycle.
    pub fn poll_all<T: FieldbusTransport>(
        &self,
        transport: &mut T,
        model: &mut SignalModel,
    ) -> PollSummary {
        let mut summary = PollSummary::default();

        for target in model.targets_mut() {
            let address = target.address;

            if !transport.is_connected(address) {
                if let Err(e) = transport.connect(address) {
                    debug!("Connect to {} failed: {}", address, e);
                }
                target.record_failure();
                summary.skipped += 1;
                continue;
            }

            let (unit, start, count) = (target.unit_id, target.start_reg, target.num_regs);
            let outcome = match target.function {
                FunctionCode::ReadHoldingRegisters => transport
                    .read_holding_registers(address, unit, start, count)
                    .map(|values| target.record_registers(&values)),
                FunctionCode::ReadInputRegisters => transport
                    .read_input_registers(address, unit, start, count)
                    .map(|values| target.record_registers(&values)),
                FunctionCode::ReadCoils => transport
                    .read_coils(address, unit, start, count)
                    .map(|bits| target.record_bits(&bits)),
                FunctionCode::ReadDiscreteInputs => transport
                    .read_discrete_inputs(address, unit, start, count)
                    .map(|bits| target.record_bits(&bits)),
            };

            match outcome {
                Ok(()) => {
                    summary.succeeded += 1;
                    summary.alarms_raised += self.engine.evaluate(target);
                }
                Err(e) => {
                    warn!("Poll of {} unit {} failed: {}", address, unit, e);
                    target.record_failure();
                    summary.failed += 1;
                }
            }
        }

        debug!(
            "Poll cycle: {} ok, {} failed, {} skipped",
            summary.succeeded, summary.failed, summary.skipped
        );
        summary
    }

    /// Sample every input channel and evaluate its alarm; returns the number of rises
    pub fn sample_inputs<P: InputPins>(&self, pins: &mut P, model: &mut SignalModel) -> usize {
        for channel in model.inputs_mut() {
            let level = pins.level(channel.pin);
            channel.sample(level);
        }
        self.engine.evaluate_inputs(model)
    }
}
