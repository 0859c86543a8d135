// Fieldlink - Poll/alarm/uplink core for telemetry gateways
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Signal model
//!
//! Shared data definitions for poll targets, alarm rules and local input
//! channels. The [`SignalModel`] owns all of them; the alarm engine and the
//! uplink encoder work on borrowed views.

use std::net::Ipv4Addr;

use crate::protocol::{
    CompareOp, FunctionCode, InputKind, MAX_INPUT_CHANNELS, MAX_REGISTERS_PER_READ,
    MAX_RULES_PER_TARGET, MAX_TARGETS,
};

/// Threshold comparison against one polled value, edge-triggered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmRule {
    /// Result buffer index watched by this rule
    pub index: u8,
    /// Comparison operator
    pub op: CompareOp,
    /// Threshold compared against
    pub threshold: u16,
    /// Condition currently true (edge detection)
    active: bool,
    /// Rise not yet transmitted
    pending: bool,
}

impl AlarmRule {
    /// Create an idle rule
    pub fn new(index: u8, op: CompareOp, threshold: u16) -> Self {
        Self {
            index,
            op,
            threshold,
            active: false,
            pending: false,
        }
    }

    /// Condition was true at the last evaluation
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// A rise is waiting to be transmitted
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Apply one evaluation result; returns true on a rising edge
    pub(crate) fn observe(&mut self, condition: bool) -> bool {
        match (self.active, condition) {
            (false, true) => {
                self.active = true;
                self.pending = true;
                true
            }
            (true, false) => {
                self.active = false;
                false
            }
            _ => false,
        }
    }

    /// Clear the pending flag, returning its previous value
    pub(crate) fn take_pending(&mut self) -> bool {
        std::mem::replace(&mut self.pending, false)
    }
}

/// One polled endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTarget {
    /// Network address of the device
    pub address: Ipv4Addr,
    /// Unit/station identifier
    pub unit_id: u8,
    /// First register/coil address
    pub start_reg: u16,
    /// Number of registers read (1..=125)
    pub num_regs: u8,
    /// Read function
    pub function: FunctionCode,
    /// Alarm rules owned by this target
    rules: Vec<AlarmRule>,
    /// Values of the most recent successful poll
    result: Vec<u16>,
    /// Most recent poll succeeded
    success: bool,
}

impl PollTarget {
    /// Create a target with a zeroed result buffer.
    ///
    /// `num_regs` is clamped to 1..=125; callers validate beforehand.
    pub fn new(
        address: Ipv4Addr,
        unit_id: u8,
        start_reg: u16,
        num_regs: u8,
        function: FunctionCode,
    ) -> Self {
        let num_regs = num_regs.clamp(1, MAX_REGISTERS_PER_READ);
        Self {
            address,
            unit_id,
            start_reg,
            num_regs,
            function,
            rules: Vec::with_capacity(MAX_RULES_PER_TARGET),
            result: vec![0; num_regs as usize],
            success: false,
        }
    }

    /// Attach an alarm rule; returns false once the rule capacity is reached
    pub fn add_rule(&mut self, rule: AlarmRule) -> bool {
        if self.rules.len() >= MAX_RULES_PER_TARGET {
            return false;
        }
        self.rules.push(rule);
        true
    }

    /// Builder form of [`add_rule`](Self::add_rule)
    pub fn with_rule(mut self, rule: AlarmRule) -> Self {
        self.add_rule(rule);
        self
    }

    /// Alarm rules
    pub fn rules(&self) -> &[AlarmRule] {
        &self.rules
    }

    pub(crate) fn rules_mut(&mut self) -> &mut [AlarmRule] {
        &mut self.rules
    }

    /// Result buffer (`num_regs` entries)
    pub fn result(&self) -> &[u16] {
        &self.result
    }

    /// Value at `index`, if inside the buffer
    pub fn value(&self, index: u8) -> Option<u16> {
        self.result.get(index as usize).copied()
    }

    /// Most recent poll succeeded
    pub fn success(&self) -> bool {
        self.success
    }

    /// Record a successful read of 16-bit registers.
    ///
    /// Missing trailing values are zero-filled, extra values ignored.
    pub fn record_registers(&mut self, values: &[u16]) {
        for (slot, v) in self
            .result
            .iter_mut()
            .zip(values.iter().copied().chain(std::iter::repeat(0)))
        {
            *slot = v;
        }
        self.success = true;
    }

    /// Record a successful read of bit values (stored as `1`/`0`)
    pub fn record_bits(&mut self, bits: &[bool]) {
        for (slot, b) in self
            .result
            .iter_mut()
            .zip(bits.iter().copied().chain(std::iter::repeat(false)))
        {
            *slot = u16::from(b);
        }
        self.success = true;
    }

    /// Record a failed or skipped poll; prior values are kept but marked stale
    pub fn record_failure(&mut self) {
        self.success = false;
    }

    /// Register address watched by `rule`
    pub fn rule_register(&self, rule: &AlarmRule) -> u16 {
        self.start_reg.wrapping_add(rule.index as u16)
    }
}

/// A local digital or counter signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputChannel {
    /// Pin/line identifier
    pub pin: u8,
    /// Level-sensed or edge-counted
    pub kind: InputKind,
    /// Alarm evaluation enabled
    pub alarm_enabled: bool,
    /// Normal state; the alarm condition is "actual differs from expected"
    pub expected: bool,
    level: bool,
    count: u32,
    active: bool,
    pending: bool,
}

impl InputChannel {
    /// Create a channel without alarm
    pub fn new(pin: u8, kind: InputKind) -> Self {
        Self {
            pin,
            kind,
            alarm_enabled: false,
            expected: false,
            level: false,
            count: 0,
            active: false,
            pending: false,
        }
    }

    /// Enable the alarm with the given normal state
    pub fn with_alarm(mut self, expected: bool) -> Self {
        self.alarm_enabled = true;
        self.expected = expected;
        self
    }

    /// Apply one level sample; counters count rising edges
    pub fn sample(&mut self, level: bool) {
        if self.kind == InputKind::Counter && level && !self.level {
            self.count = self.count.saturating_add(1);
        }
        self.level = level;
    }

    /// Last observed level
    pub fn level(&self) -> bool {
        self.level
    }

    /// Rising edges counted since the last reset
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Clear the counter (after each bulk uplink)
    pub fn reset_count(&mut self) {
        self.count = 0;
    }

    /// Actual state compared against `expected`
    pub fn actual(&self) -> bool {
        match self.kind {
            InputKind::Digital => self.level,
            InputKind::Counter => self.count > 0,
        }
    }

    /// Alarm condition currently active
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// A rise is waiting to be transmitted
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Two-byte value reported in the bulk input section
    pub fn reported_value(&self) -> u16 {
        match self.kind {
            InputKind::Counter => self.count.min(u16::MAX as u32) as u16,
            InputKind::Digital => u16::from(self.level),
        }
    }

    pub(crate) fn observe(&mut self, condition: bool) -> bool {
        match (self.active, condition) {
            (false, true) => {
                self.active = true;
                self.pending = true;
                true
            }
            (true, false) => {
                self.active = false;
                false
            }
            _ => false,
        }
    }

    pub(crate) fn take_pending(&mut self) -> bool {
        std::mem::replace(&mut self.pending, false)
    }
}

/// Owner of all poll targets and input channels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalModel {
    targets: Vec<PollTarget>,
    inputs: Vec<InputChannel>,
}

impl SignalModel {
    /// Create an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a poll target; returns false once [`MAX_TARGETS`] is reached
    pub fn add_target(&mut self, target: PollTarget) -> bool {
        if self.targets.len() >= MAX_TARGETS {
            return false;
        }
        self.targets.push(target);
        true
    }

    /// Add an input channel; returns false once [`MAX_INPUT_CHANNELS`] is reached
    pub fn add_input(&mut self, channel: InputChannel) -> bool {
        if self.inputs.len() >= MAX_INPUT_CHANNELS {
            return false;
        }
        self.inputs.push(channel);
        true
    }

    /// Poll targets in configuration order
    pub fn targets(&self) -> &[PollTarget] {
        &self.targets
    }

    /// Mutable poll targets
    pub fn targets_mut(&mut self) -> &mut [PollTarget] {
        &mut self.targets
    }

    /// Input channels in configuration order
    pub fn inputs(&self) -> &[InputChannel] {
        &self.inputs
    }

    /// Mutable input channels
    pub fn inputs_mut(&mut self) -> &mut [InputChannel] {
        &mut self.inputs
    }

    /// Reset every counter channel
    pub fn reset_counters(&mut self) {
        for input in &mut self.inputs {
            input.reset_count();
        }
    }

    /// Number of rules and channels with a pending rise
    pub fn pending_count(&self) -> usize {
        let rules = self
            .targets
            .iter()
            .flat_map(|t| t.rules.iter())
            .filter(|r| r.pending)
            .count();
        rules + self.inputs.iter().filter(|i| i.pending).count()
    }
}
