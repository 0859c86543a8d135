// Fieldlink - Poll/alarm/uplink core for telemetry gateways
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Alarm engine
//!
//! Evaluates alarm rules against polled values and input channels against
//! their normal state. Both kinds raise a `pending` flag on the rising edge
//! only; [`AlarmEngine::drain_one_pending`] hands them out one at a time in a
//! fixed order (targets by index, rules by index, then input channels).
//!
//! | prev active | condition | action |
//! |---|---|---|
//! | false | true | active, pending (notify) |
//! | true | true | none |
//! | true | false | inactive (silent) |
//! | false | false | none |

use std::net::Ipv4Addr;

use log::{debug, info, warn};

use crate::protocol::CompareOp;
use crate::signal::{InputChannel, PollTarget, SignalModel};

/// Snapshot of a fieldbus rule that crossed its threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldbusAlarm {
    /// Index of the owning target in the model
    pub target: usize,
    /// Index of the rule within the target
    pub rule: usize,
    /// Device address
    pub address: Ipv4Addr,
    /// Unit identifier
    pub unit_id: u8,
    /// Register address (`start_reg + index`)
    pub register: u16,
    /// Operator of the rule
    pub op: CompareOp,
    /// Threshold of the rule
    pub threshold: u16,
    /// Value in the result buffer when drained. After a failed poll this
    /// is the last value read successfully.
    pub value: u16,
}

/// Snapshot of an input channel that left its normal state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputAlarm {
    /// Channel index in the model
    pub channel: usize,
    /// Normal state
    pub expected: bool,
    /// Observed state
    pub actual: bool,
}

/// One alarm waiting for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAlarm {
    /// Threshold crossing on a polled value
    Fieldbus(FieldbusAlarm),
    /// Local input deviation
    Input(InputAlarm),
}

/// Stateless evaluator over the signal model
#[derive(Debug, Clone, Copy, Default)]
pub struct AlarmEngine;

impl AlarmEngine {
    /// Create a new engine
    pub fn new() -> Self {
        Self
    }

    /// Evaluate every rule of `target`; returns the number of rising edges.
    ///
    /// Targets whose last poll failed are left untouched: missing data is
    /// not a cleared condition.
    pub fn evaluate(&self, target: &mut PollTarget) -> usize {
        if !target.success() {
            return 0;
        }

        let mut rises = 0;
        let address = target.address;
        let start = target.start_reg;
        let values = target.result().to_vec();

        for rule in target.rules_mut() {
            let Some(&value) = values.get(rule.index as usize) else {
                debug!(
                    "Inert rule on {}: index {} outside {} registers",
                    address,
                    rule.index,
                    values.len()
                );
                continue;
            };

            if rule.observe(rule.op.holds(value, rule.threshold)) {
                rises += 1;
                info!(
                    "Alarm raised: {} reg {} = {} {} {}",
                    address,
                    start.wrapping_add(rule.index as u16),
                    value,
                    rule.op,
                    rule.threshold
                );
            }
        }

        rises
    }

    /// Evaluate an input channel against its normal state; true on a rising edge
    pub fn evaluate_input_channel(&self, channel: &mut InputChannel) -> bool {
        if !channel.alarm_enabled {
            return false;
        }

        let actual = channel.actual();
        let raised = channel.observe(actual != channel.expected);
        if raised {
            warn!(
                "Input alarm on pin {}: expected {}, got {}",
                channel.pin,
                u8::from(channel.expected),
                u8::from(actual)
            );
        }
        raised
    }

    /// Evaluate every input channel of the model; returns the number of rises
    pub fn evaluate_inputs(&self, model: &mut SignalModel) -> usize {
        model
            .inputs_mut()
            .iter_mut()
            .filter_map(|ch| self.evaluate_input_channel(ch).then_some(()))
            .count()
    }

    /// Take the first pending alarm, clearing its flag.
    ///
    /// Returns `None` when nothing is pending. A drained alarm is never
    /// returned again until its condition falls and rises anew.
    pub fn drain_one_pending(&self, model: &mut SignalModel) -> Option<PendingAlarm> {
        for (t, target) in model.targets_mut().iter_mut().enumerate() {
            let pending = target.rules().iter().position(|r| r.is_pending());
            if let Some(r) = pending {
                target.rules_mut()[r].take_pending();
                let rule = &target.rules()[r];
                return Some(PendingAlarm::Fieldbus(FieldbusAlarm {
                    target: t,
                    rule: r,
                    address: target.address,
                    unit_id: target.unit_id,
                    register: target.rule_register(rule),
                    op: rule.op,
                    threshold: rule.threshold,
                    value: target.value(rule.index).unwrap_or(0),
                }));
            }
        }

        for (i, channel) in model.inputs_mut().iter_mut().enumerate() {
            if channel.take_pending() {
                return Some(PendingAlarm::Input(InputAlarm {
                    channel: i,
                    expected: channel.expected,
                    actual: channel.actual(),
                }));
            }
        }

        None
    }
}
