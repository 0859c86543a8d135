// Fieldlink Gateway - Poll/uplink orchestration for telemetry gateways
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for Fieldlink Gateway
//!
//! A [`GatewayConfig`] is an immutable value. It is either built in code or
//! parsed from the three persisted JSON documents (poll, radio, inputs).
//! Parsing is per entry: a malformed entry is logged, listed in the
//! [`ConfigReport`] and skipped while the rest of the document applies.

use std::fmt;
use std::net::Ipv4Addr;

use fieldlink::protocol::RECORD_HEADER_SIZE;
use fieldlink::{
    AbpSession, AlarmRule, CompareOp, FunctionCode, InputChannel, InputKind, JoinMode,
    OtaaCredentials, PollTarget, RadioConfig, SignalModel, SpreadingFactor, MAX_INPUT_CHANNELS,
    MAX_REGISTERS_PER_READ, MAX_RULES_PER_TARGET, MAX_TARGETS,
};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ConfigError;

/// Default poll interval
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Default uplink interval
pub const DEFAULT_UPLINK_INTERVAL_MS: u64 = 10_000;

/// Inputs document used when none is persisted yet
pub const DEFAULT_INPUTS_DOCUMENT: &str = r#"{
  "inputs": [
    { "pin": 14, "type": "digital", "alarm": { "active": true, "expected": 1 } },
    { "pin": 15, "type": "counter", "alarm": { "active": false } }
  ]
}"#;

const POLL: &str = "poll";
const RADIO: &str = "radio";
const INPUTS: &str = "inputs";

/// One alarm rule of a poll target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmConfig {
    /// Register offset within the read
    pub index: u8,
    /// Comparison operator
    pub op: CompareOp,
    /// Threshold
    pub threshold: u16,
}

/// One poll target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// Device address
    pub address: Ipv4Addr,
    /// Unit identifier
    pub unit_id: u8,
    /// First register
    pub start_reg: u16,
    /// Register count (1..=125)
    pub num_regs: u8,
    /// Read function
    pub function: FunctionCode,
    /// Alarm rules (at most 4)
    pub alarms: Vec<AlarmConfig>,
}

impl TargetConfig {
    /// Create a target without alarms
    pub fn new(
        address: Ipv4Addr,
        unit_id: u8,
        start_reg: u16,
        num_regs: u8,
        function: FunctionCode,
    ) -> Self {
        Self {
            address,
            unit_id,
            start_reg,
            num_regs,
            function,
            alarms: Vec::new(),
        }
    }

    /// Add an alarm rule
    pub fn with_alarm(mut self, index: u8, op: CompareOp, threshold: u16) -> Self {
        self.alarms.push(AlarmConfig {
            index,
            op,
            threshold,
        });
        self
    }

    /// Encoded size of this target's record in a bulk frame
    pub fn record_size(&self) -> usize {
        RECORD_HEADER_SIZE + self.function.payload_len(self.num_regs)
    }

    /// Check ranges, capacities, the reserved address byte and that the
    /// record fits the largest uplink frame
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.octets()[0] == fieldlink::protocol::INPUT_SECTION_MARKER {
            return Err(ConfigError::ReservedAddress(self.address));
        }
        if self.num_regs == 0 || self.num_regs > MAX_REGISTERS_PER_READ {
            return Err(ConfigError::OutOfRange {
                field: "count",
                value: i64::from(self.num_regs),
            });
        }
        let max_mtu = SpreadingFactor::Sf7.max_payload();
        if self.record_size() > max_mtu {
            return Err(ConfigError::RecordTooLarge {
                size: self.record_size(),
                mtu: max_mtu,
            });
        }
        if self.alarms.len() > MAX_RULES_PER_TARGET {
            return Err(ConfigError::CapacityExceeded {
                what: "alarm rules",
                max: MAX_RULES_PER_TARGET,
            });
        }
        for alarm in &self.alarms {
            check_alarm_index(alarm.index, self.num_regs)?;
        }
        Ok(())
    }

    fn build(&self) -> PollTarget {
        let mut target = PollTarget::new(
            self.address,
            self.unit_id,
            self.start_reg,
            self.num_regs,
            self.function,
        );
        for alarm in &self.alarms {
            target.add_rule(AlarmRule::new(alarm.index, alarm.op, alarm.threshold));
        }
        target
    }
}

/// One local input channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputConfig {
    /// Pin/line identifier
    pub pin: u8,
    /// Digital or counter
    pub kind: InputKind,
    /// Alarm evaluation enabled
    pub alarm_enabled: bool,
    /// Normal state
    pub expected: bool,
}

impl InputConfig {
    fn build(&self) -> InputChannel {
        let channel = InputChannel::new(self.pin, self.kind);
        if self.alarm_enabled {
            channel.with_alarm(self.expected)
        } else {
            channel
        }
    }
}

/// Gateway-level configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Bulk uplink interval in milliseconds
    pub uplink_interval_ms: u64,
    /// Poll targets in polling order
    pub targets: Vec<TargetConfig>,
    /// Local input channels
    pub inputs: Vec<InputConfig>,
    /// Radio configuration
    pub radio: RadioConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            uplink_interval_ms: DEFAULT_UPLINK_INTERVAL_MS,
            targets: Vec::new(),
            inputs: Vec::new(),
            radio: RadioConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Validate capacities and every target
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.len() > MAX_TARGETS {
            return Err(ConfigError::CapacityExceeded {
                what: "poll targets",
                max: MAX_TARGETS,
            });
        }
        if self.inputs.len() > MAX_INPUT_CHANNELS {
            return Err(ConfigError::CapacityExceeded {
                what: "input channels",
                max: MAX_INPUT_CHANNELS,
            });
        }
        for target in &self.targets {
            target.validate()?;
        }
        Ok(())
    }

    /// Build a fresh signal model from this configuration
    pub fn build_model(&self) -> Result<SignalModel, ConfigError> {
        self.validate()?;
        let mut model = SignalModel::new();
        let fixed_mtu = self.radio.spreading_factor.max_payload();
        for target in &self.targets {
            if !self.radio.adr && target.record_size() > fixed_mtu {
                warn!(
                    "Target {} record of {} bytes exceeds the {}-byte frame at {}; it will be skipped",
                    target.address,
                    target.record_size(),
                    fixed_mtu,
                    self.radio.spreading_factor
                );
            }
            model.add_target(target.build());
        }
        for input in &self.inputs {
            model.add_input(input.build());
        }
        Ok(model)
    }

    /// Parse the persisted documents.
    ///
    /// A missing poll or radio document keeps the defaults; a missing inputs
    /// document applies [`DEFAULT_INPUTS_DOCUMENT`].
    pub fn from_documents(
        poll: Option<&str>,
        radio: Option<&str>,
        inputs: Option<&str>,
    ) -> (Self, ConfigReport) {
        let mut config = Self::default();
        let mut report = ConfigReport::default();

        if let Some(doc) = poll {
            parse_poll_document(doc, &mut config, &mut report);
        }
        if let Some(doc) = radio {
            parse_radio_document(doc, &mut config, &mut report);
        }
        parse_inputs_document(
            inputs.unwrap_or(DEFAULT_INPUTS_DOCUMENT),
            &mut config,
            &mut report,
        );

        info!(
            "Loaded {} poll target(s), {} input(s), {} rejection(s)",
            config.targets.len(),
            config.inputs.len(),
            report.rejected.len()
        );
        (config, report)
    }

    /// Poll document in its persisted shape
    pub fn poll_document(&self) -> Value {
        let requests: Vec<Value> = self
            .targets
            .iter()
            .map(|t| {
                let alarms: Vec<Value> = t
                    .alarms
                    .iter()
                    .map(|a| {
                        json!({
                            "index": a.index,
                            "op": a.op.to_string(),
                            "threshold": a.threshold,
                        })
                    })
                    .collect();
                json!({
                    "ip": t.address.octets(),
                    "unitID": t.unit_id,
                    "start": t.start_reg,
                    "count": t.num_regs,
                    "function": t.function.code(),
                    "alarms": alarms,
                })
            })
            .collect();
        json!({ "interval": self.poll_interval_ms, "requests": requests })
    }

    /// Radio document in its persisted shape
    pub fn radio_document(&self) -> Value {
        let mut lora = json!({
            "interval": self.uplink_interval_ms,
            "subband": self.radio.sub_band,
            "adr": self.radio.adr,
            "sf": self.radio.spreading_factor.value(),
        });
        match &self.radio.join {
            JoinMode::Otaa(c) => {
                lora["join"] = json!("otaa");
                lora["deveui"] = json!(hex_encode(&c.dev_eui));
                lora["appeui"] = json!(hex_encode(&c.app_eui));
                lora["appkey"] = json!(hex_encode(&c.app_key));
            }
            JoinMode::Abp(s) => {
                lora["join"] = json!("abp");
                lora["nwkskey"] = json!(hex_encode(&s.nwk_s_key));
                lora["appskey"] = json!(hex_encode(&s.app_s_key));
                lora["devaddr"] = json!(format!("{:08X}", s.dev_addr));
            }
        }
        json!({ "lora": lora })
    }

    /// Inputs document in its persisted shape
    pub fn inputs_document(&self) -> Value {
        let inputs: Vec<Value> = self
            .inputs
            .iter()
            .map(|i| {
                let kind = match i.kind {
                    InputKind::Digital => "digital",
                    InputKind::Counter => "counter",
                };
                json!({
                    "pin": i.pin,
                    "type": kind,
                    "alarm": { "active": i.alarm_enabled, "expected": u8::from(i.expected) },
                })
            })
            .collect();
        json!({ "inputs": inputs })
    }
}

/// One rejected configuration entry
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Document section (`poll`, `radio`, `inputs`)
    pub section: &'static str,
    /// Entry index within the section, if the rejection concerns one entry
    pub entry: Option<usize>,
    /// Reason
    pub error: ConfigError,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entry {
            Some(i) => write!(f, "{}[{}]: {}", self.section, i, self.error),
            None => write!(f, "{}: {}", self.section, self.error),
        }
    }
}

/// Outcome of parsing the configuration documents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigReport {
    /// Entries that were rejected
    pub rejected: Vec<Rejection>,
}

impl ConfigReport {
    /// Nothing was rejected
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    fn reject(&mut self, section: &'static str, entry: Option<usize>, error: ConfigError) {
        let rejection = Rejection {
            section,
            entry,
            error,
        };
        warn!("Config entry rejected: {}", rejection);
        self.rejected.push(rejection);
    }
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    ip: Option<Vec<i64>>,
    #[serde(rename = "unitID")]
    unit_id: Option<i64>,
    start: Option<i64>,
    count: Option<i64>,
    function: Option<i64>,
    #[serde(default)]
    alarms: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawAlarm {
    index: Option<i64>,
    op: Option<String>,
    threshold: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRadioDocument {
    lora: Option<RawLora>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLora {
    join: Option<String>,
    interval: Option<i64>,
    subband: Option<i64>,
    adr: Option<bool>,
    sf: Option<i64>,
    deveui: Option<String>,
    appeui: Option<String>,
    appkey: Option<String>,
    nwkskey: Option<String>,
    appskey: Option<String>,
    devaddr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInput {
    pin: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
    alarm: Option<RawInputAlarm>,
}

#[derive(Debug, Default, Deserialize)]
struct RawInputAlarm {
    #[serde(default)]
    active: bool,
    expected: Option<i64>,
}

fn parse_document(section: &'static str, doc: &str, report: &mut ConfigReport) -> Option<Value> {
    match serde_json::from_str(doc) {
        Ok(value) => Some(value),
        Err(e) => {
            report.reject(
                section,
                None,
                ConfigError::InvalidDocument {
                    section,
                    reason: e.to_string(),
                },
            );
            None
        }
    }
}

fn parse_poll_document(doc: &str, config: &mut GatewayConfig, report: &mut ConfigReport) {
    let Some(value) = parse_document(POLL, doc, report) else {
        return;
    };

    if let Some(interval) = value.get("interval") {
        match parse_interval(interval) {
            Ok(ms) => config.poll_interval_ms = ms,
            Err(e) => report.reject(POLL, None, e),
        }
    }

    let requests = match value.get("requests") {
        None => return,
        Some(Value::Array(requests)) => requests,
        Some(_) => {
            report.reject(POLL, None, ConfigError::Malformed("requests is not an array".into()));
            return;
        }
    };

    for (i, entry) in requests.iter().enumerate() {
        match parse_request(entry, i, report) {
            Ok(_) if config.targets.len() >= MAX_TARGETS => report.reject(
                POLL,
                Some(i),
                ConfigError::CapacityExceeded {
                    what: "poll targets",
                    max: MAX_TARGETS,
                },
            ),
            Ok(target) => config.targets.push(target),
            Err(e) => report.reject(POLL, Some(i), e),
        }
    }
}

fn parse_request(
    entry: &Value,
    i: usize,
    report: &mut ConfigReport,
) -> Result<TargetConfig, ConfigError> {
    let raw: RawRequest =
        serde_json::from_value(entry.clone()).map_err(|e| ConfigError::Malformed(e.to_string()))?;

    let ip = raw.ip.ok_or(ConfigError::MissingField("ip"))?;
    if ip.len() != 4 {
        return Err(ConfigError::Malformed(format!(
            "ip has {} octets",
            ip.len()
        )));
    }
    let mut octets = [0u8; 4];
    for (slot, v) in octets.iter_mut().zip(&ip) {
        *slot = ranged("ip", Some(*v))?;
    }
    let address = Ipv4Addr::from(octets);
    let unit_id: u8 = ranged("unitID", raw.unit_id)?;
    let start_reg: u16 = ranged("start", raw.start)?;
    let count = raw.count.ok_or(ConfigError::MissingField("count"))?;
    let function = raw.function.ok_or(ConfigError::MissingField("function"))?;

    if !(1..=i64::from(MAX_REGISTERS_PER_READ)).contains(&count) {
        return Err(ConfigError::OutOfRange {
            field: "count",
            value: count,
        });
    }
    let num_regs = count as u8;
    let function = u8::try_from(function)
        .ok()
        .and_then(FunctionCode::from_u8)
        .ok_or(ConfigError::UnknownFunction(function))?;

    let mut target = TargetConfig::new(address, unit_id, start_reg, num_regs, function);
    target.validate()?;

    for raw_alarm in &raw.alarms {
        if target.alarms.len() >= MAX_RULES_PER_TARGET {
            report.reject(
                POLL,
                Some(i),
                ConfigError::CapacityExceeded {
                    what: "alarm rules",
                    max: MAX_RULES_PER_TARGET,
                },
            );
            break;
        }
        match parse_alarm(raw_alarm, num_regs) {
            Ok(alarm) => target.alarms.push(alarm),
            Err(e) => report.reject(POLL, Some(i), e),
        }
    }

    Ok(target)
}

fn parse_alarm(entry: &Value, num_regs: u8) -> Result<AlarmConfig, ConfigError> {
    let raw: RawAlarm =
        serde_json::from_value(entry.clone()).map_err(|e| ConfigError::Malformed(e.to_string()))?;

    let index: u8 = ranged("index", raw.index)?;
    let op = raw.op.ok_or(ConfigError::MissingField("op"))?;
    let op = CompareOp::parse(&op).ok_or(ConfigError::UnknownOperator(op))?;
    let threshold: u16 = ranged("threshold", raw.threshold)?;
    check_alarm_index(index, num_regs)?;

    Ok(AlarmConfig {
        index,
        op,
        threshold,
    })
}

fn parse_radio_document(doc: &str, config: &mut GatewayConfig, report: &mut ConfigReport) {
    let Some(value) = parse_document(RADIO, doc, report) else {
        return;
    };
    let raw: RawRadioDocument = match serde_json::from_value(value) {
        Ok(raw) => raw,
        Err(e) => {
            report.reject(RADIO, None, ConfigError::Malformed(e.to_string()));
            return;
        }
    };
    let Some(lora) = raw.lora else {
        return;
    };

    if let Some(ms) = lora.interval {
        match u64::try_from(ms) {
            Ok(ms) if ms > 0 => config.uplink_interval_ms = ms,
            _ => report.reject(
                RADIO,
                None,
                ConfigError::OutOfRange {
                    field: "interval",
                    value: ms,
                },
            ),
        }
    }
    if lora.subband.is_some() {
        match ranged::<u8>("subband", lora.subband) {
            Ok(sub_band) => config.radio.sub_band = sub_band,
            Err(e) => report.reject(RADIO, None, e),
        }
    }
    if let Some(adr) = lora.adr {
        config.radio.adr = adr;
    }
    if let Some(sf) = lora.sf {
        match u8::try_from(sf).ok().and_then(SpreadingFactor::from_u8) {
            Some(sf) => config.radio.spreading_factor = sf,
            None => {
                config.radio.spreading_factor = SpreadingFactor::Sf7;
                report.reject(
                    RADIO,
                    None,
                    ConfigError::OutOfRange {
                        field: "sf",
                        value: sf,
                    },
                );
            }
        }
    }

    let mut credential = |field: &'static str, value: &Option<String>, out: &mut [u8]| {
        if let Some(text) = value {
            match hex_decode(field, text, out.len()) {
                Ok(bytes) => out.copy_from_slice(&bytes),
                Err(e) => report.reject(RADIO, None, e),
            }
        }
    };

    let mut otaa = OtaaCredentials::default();
    credential("deveui", &lora.deveui, &mut otaa.dev_eui[..]);
    credential("appeui", &lora.appeui, &mut otaa.app_eui[..]);
    credential("appkey", &lora.appkey, &mut otaa.app_key[..]);

    let mut abp = AbpSession::default();
    credential("nwkskey", &lora.nwkskey, &mut abp.nwk_s_key[..]);
    credential("appskey", &lora.appskey, &mut abp.app_s_key[..]);
    let mut dev_addr = [0u8; 4];
    credential("devaddr", &lora.devaddr, &mut dev_addr[..]);
    abp.dev_addr = u32::from_be_bytes(dev_addr);

    config.radio.join = match lora.join.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("otaa") => JoinMode::Otaa(otaa),
        Some("abp") => JoinMode::Abp(abp),
        Some(other) => {
            report.reject(RADIO, None, ConfigError::UnknownJoinMode(other.to_string()));
            JoinMode::Otaa(otaa)
        }
    };
}

fn parse_inputs_document(doc: &str, config: &mut GatewayConfig, report: &mut ConfigReport) {
    let Some(value) = parse_document(INPUTS, doc, report) else {
        return;
    };
    let inputs = match value.get("inputs") {
        None => return,
        Some(Value::Array(inputs)) => inputs,
        Some(_) => {
            report.reject(INPUTS, None, ConfigError::Malformed("inputs is not an array".into()));
            return;
        }
    };

    for (i, entry) in inputs.iter().enumerate() {
        match parse_input(entry) {
            Ok(_) if config.inputs.len() >= MAX_INPUT_CHANNELS => report.reject(
                INPUTS,
                Some(i),
                ConfigError::CapacityExceeded {
                    what: "input channels",
                    max: MAX_INPUT_CHANNELS,
                },
            ),
            Ok(input) => config.inputs.push(input),
            Err(e) => report.reject(INPUTS, Some(i), e),
        }
    }
}

fn parse_input(entry: &Value) -> Result<InputConfig, ConfigError> {
    let raw: RawInput =
        serde_json::from_value(entry.clone()).map_err(|e| ConfigError::Malformed(e.to_string()))?;

    let pin: u8 = ranged("pin", raw.pin)?;
    let kind = match raw.kind.as_deref() {
        None | Some("digital") => InputKind::Digital,
        Some("counter") => InputKind::Counter,
        Some(other) => return Err(ConfigError::UnknownInputKind(other.to_string())),
    };
    let alarm = raw.alarm.unwrap_or_default();
    let expected = match alarm.expected.unwrap_or(0) {
        0 => false,
        1 => true,
        other => {
            return Err(ConfigError::OutOfRange {
                field: "expected",
                value: other,
            })
        }
    };

    Ok(InputConfig {
        pin,
        kind,
        alarm_enabled: alarm.active,
        expected,
    })
}

fn parse_interval(value: &Value) -> Result<u64, ConfigError> {
    match value.as_u64() {
        Some(ms) if ms > 0 => Ok(ms),
        _ => Err(ConfigError::OutOfRange {
            field: "interval",
            value: value.as_i64().unwrap_or(-1),
        }),
    }
}

fn check_alarm_index(index: u8, count: u8) -> Result<(), ConfigError> {
    if index >= count {
        return Err(ConfigError::AlarmIndexOutOfRange { index, count });
    }
    Ok(())
}

fn ranged<T: TryFrom<i64>>(field: &'static str, value: Option<i64>) -> Result<T, ConfigError> {
    let value = value.ok_or(ConfigError::MissingField(field))?;
    T::try_from(value).map_err(|_| ConfigError::OutOfRange { field, value })
}

/// decode a hex credential of exactly `len` bytes
fn hex_decode(field: &'static str, hex: &str, len: usize) -> Result<Vec<u8>, ConfigError> {
    let hex = hex.trim();
    if !hex.is_ascii() || hex.len() != len * 2 {
        return Err(ConfigError::BadCredential {
            field,
            reason: format!("expected {} hex digits", len * 2),
        });
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ConfigError::BadCredential {
                field,
                reason: format!("invalid hex at position {}", i),
            })
        })
        .collect()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL_DOC: &str = r#"{
        "interval": 2000,
        "requests": [
            { "ip": [192,168,0,187], "unitID": 1, "start": 4100, "count": 3, "function": 3,
              "alarms": [ { "index": 1, "op": ">", "threshold": 1000 } ] },
            { "ip": [192,168,0,188], "unitID": 2, "start": 0, "count": 10, "function": 1 }
        ]
    }"#;

    #[test]
    fn test_gateway_config_default() {
        let config = GatewayConfig::default();
        assert_eq!(config.poll_interval_ms, 5000);
        assert_eq!(config.uplink_interval_ms, 10000);
        assert_eq!(config.radio.sub_band, 4);
        assert!(config.radio.adr);
        assert_eq!(config.radio.spreading_factor, SpreadingFactor::Sf7);
        assert!(matches!(config.radio.join, JoinMode::Otaa(_)));
    }

    #[test]
    fn test_parse_poll_document() {
        let (config, report) = GatewayConfig::from_documents(Some(POLL_DOC), None, Some("{}"));
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(config.poll_interval_ms, 2000);
        assert_eq!(config.targets.len(), 2);

        let first = &config.targets[0];
        assert_eq!(first.address, Ipv4Addr::new(192, 168, 0, 187));
        assert_eq!(first.start_reg, 4100);
        assert_eq!(first.function, FunctionCode::ReadHoldingRegisters);
        assert_eq!(
            first.alarms,
            vec![AlarmConfig {
                index: 1,
                op: CompareOp::GreaterThan,
                threshold: 1000
            }]
        );
        assert_eq!(config.targets[1].function, FunctionCode::ReadCoils);
    }

    #[test]
    fn test_malformed_entries_rejected_individually() {
        let doc = r#"{ "requests": [
            { "ip": [10,0,0,1], "unitID": 1, "start": 0, "count": 0, "function": 3 },
            { "ip": [10,0,0,2], "unitID": 1, "start": 0, "count": 4, "function": 7 },
            { "ip": [10,0,0,3], "start": 0, "count": 4, "function": 3 },
            { "ip": [255,0,0,4], "unitID": 1, "start": 0, "count": 4, "function": 3 },
            "not an object",
            { "ip": [10,0,0,5], "unitID": 1, "start": 0, "count": 126, "function": 4 },
            { "ip": [10,0,0,6], "unitID": 1, "start": 0, "count": 125, "function": 4 },
            { "ip": [10,0,0,7], "unitID": 1, "start": 0, "count": 116, "function": 3 }
        ] }"#;
        let (config, report) = GatewayConfig::from_documents(Some(doc), None, Some("{}"));

        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.targets[0].address, Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(config.targets[0].record_size(), 242);
        assert_eq!(report.rejected.len(), 7);
        assert!(matches!(
            report.rejected[0].error,
            ConfigError::OutOfRange { field: "count", value: 0 }
        ));
        assert!(matches!(report.rejected[1].error, ConfigError::UnknownFunction(7)));
        assert!(matches!(report.rejected[2].error, ConfigError::MissingField("unitID")));
        assert!(matches!(report.rejected[3].error, ConfigError::ReservedAddress(_)));
        assert!(matches!(report.rejected[4].error, ConfigError::Malformed(_)));
        assert_eq!(report.rejected[5].entry, Some(5));
        assert!(matches!(
            report.rejected[6].error,
            ConfigError::RecordTooLarge { size: 260, mtu: 242 }
        ));
    }

    #[test]
    fn test_register_target_must_fit_largest_frame() {
        let coils = TargetConfig::new(Ipv4Addr::new(10, 0, 0, 1), 1, 0, 125, FunctionCode::ReadCoils);
        assert!(coils.validate().is_ok());

        let fits = TargetConfig::new(
            Ipv4Addr::new(10, 0, 0, 1),
            1,
            0,
            116,
            FunctionCode::ReadHoldingRegisters,
        );
        assert!(fits.validate().is_ok());

        let too_large = TargetConfig { num_regs: 117, ..fits };
        assert_eq!(
            too_large.validate(),
            Err(ConfigError::RecordTooLarge { size: 244, mtu: 242 })
        );

        let config = GatewayConfig {
            targets: vec![too_large],
            ..GatewayConfig::default()
        };
        assert!(config.build_model().is_err());
    }

    #[test]
    fn test_bad_alarms_dropped_target_kept() {
        let doc = r#"{ "requests": [
            { "ip": [10,0,0,1], "unitID": 1, "start": 0, "count": 2, "function": 3,
              "alarms": [
                { "index": 2, "op": ">", "threshold": 1 },
                { "index": 0, "op": "!", "threshold": 1 },
                { "index": 0, "op": "<", "threshold": 1 },
                { "index": 1, "op": "=", "threshold": 2 },
                { "index": 1, "op": ">", "threshold": 3 },
                { "index": 0, "op": ">", "threshold": 4 },
                { "index": 0, "op": ">", "threshold": 5 }
              ] }
        ] }"#;
        let (config, report) = GatewayConfig::from_documents(Some(doc), None, Some("{}"));

        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.targets[0].alarms.len(), 4);
        assert_eq!(report.rejected.len(), 3);
        assert!(matches!(
            report.rejected[0].error,
            ConfigError::AlarmIndexOutOfRange { index: 2, count: 2 }
        ));
        assert!(matches!(report.rejected[1].error, ConfigError::UnknownOperator(_)));
        assert!(matches!(
            report.rejected[2].error,
            ConfigError::CapacityExceeded { what: "alarm rules", .. }
        ));
    }

    #[test]
    fn test_target_capacity() {
        let entry = r#"{ "ip": [10,0,0,1], "unitID": 1, "start": 0, "count": 1, "function": 3 }"#;
        let entries = vec![entry; MAX_TARGETS + 2].join(",");
        let doc = format!(r#"{{ "requests": [{}] }}"#, entries);
        let (config, report) = GatewayConfig::from_documents(Some(&doc), None, Some("{}"));

        assert_eq!(config.targets.len(), MAX_TARGETS);
        assert_eq!(report.rejected.len(), 2);
    }

    #[test]
    fn test_invalid_json_keeps_defaults() {
        let (config, report) = GatewayConfig::from_documents(Some("{ nope"), Some("[1,"), Some("{}"));
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.radio, RadioConfig::default());
        assert_eq!(report.rejected.len(), 2);
        assert!(matches!(
            report.rejected[0].error,
            ConfigError::InvalidDocument { section: "poll", .. }
        ));
    }

    #[test]
    fn test_parse_radio_document_abp() {
        let doc = r#"{ "lora": {
            "join": "ABP", "interval": 60000, "subband": 2, "adr": false, "sf": 10,
            "nwkskey": "000102030405060708090A0B0C0D0E0F",
            "appskey": "0f0e0d0c0b0a09080706050403020100",
            "devaddr": "26011BA0"
        } }"#;
        let (config, report) = GatewayConfig::from_documents(None, Some(doc), Some("{}"));
        assert!(report.is_clean(), "{:?}", report);

        assert_eq!(config.uplink_interval_ms, 60000);
        assert_eq!(config.radio.sub_band, 2);
        assert!(!config.radio.adr);
        assert_eq!(config.radio.spreading_factor, SpreadingFactor::Sf10);
        match &config.radio.join {
            JoinMode::Abp(s) => {
                assert_eq!(s.dev_addr, 0x2601_1BA0);
                assert_eq!(s.nwk_s_key[15], 0x0F);
                assert_eq!(s.app_s_key[0], 0x0F);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_radio_bad_values_reported() {
        let doc = r#"{ "lora": { "sf": 13, "deveui": "12345", "join": "carrier-pigeon" } }"#;
        let (config, report) = GatewayConfig::from_documents(None, Some(doc), Some("{}"));

        assert_eq!(config.radio.spreading_factor, SpreadingFactor::Sf7);
        assert_eq!(config.radio.join, JoinMode::Otaa(OtaaCredentials::default()));
        assert_eq!(report.rejected.len(), 3);
        assert!(report
            .rejected
            .iter()
            .any(|r| matches!(r.error, ConfigError::BadCredential { field: "deveui", .. })));
    }

    #[test]
    fn test_default_inputs_document() {
        let (config, report) = GatewayConfig::from_documents(None, None, None);
        assert!(report.is_clean());
        assert_eq!(
            config.inputs,
            vec![
                InputConfig {
                    pin: 14,
                    kind: InputKind::Digital,
                    alarm_enabled: true,
                    expected: true,
                },
                InputConfig {
                    pin: 15,
                    kind: InputKind::Counter,
                    alarm_enabled: false,
                    expected: false,
                },
            ]
        );
    }

    #[test]
    fn test_inputs_rejections() {
        let doc = r#"{ "inputs": [
            { "pin": 300 },
            { "pin": 3, "type": "analog" },
            { "pin": 4, "alarm": { "active": true, "expected": 2 } },
            { "pin": 5 }
        ] }"#;
        let (config, report) = GatewayConfig::from_documents(None, None, Some(doc));
        assert_eq!(config.inputs.len(), 1);
        assert_eq!(config.inputs[0].pin, 5);
        assert_eq!(report.rejected.len(), 3);
    }

    #[test]
    fn test_documents_roundtrip() {
        let (config, _) = GatewayConfig::from_documents(Some(POLL_DOC), None, None);
        let poll = config.poll_document().to_string();
        let radio = config.radio_document().to_string();
        let inputs = config.inputs_document().to_string();

        let (reparsed, report) =
            GatewayConfig::from_documents(Some(&poll), Some(&radio), Some(&inputs));
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_build_model() {
        let config = GatewayConfig {
            targets: vec![TargetConfig::new(
                Ipv4Addr::new(10, 0, 0, 1),
                1,
                0,
                4,
                FunctionCode::ReadHoldingRegisters,
            )
            .with_alarm(3, CompareOp::Equal, 7)],
            inputs: vec![InputConfig {
                pin: 2,
                kind: InputKind::Digital,
                alarm_enabled: true,
                expected: false,
            }],
            ..GatewayConfig::default()
        };
        let model = config.build_model().unwrap();
        assert_eq!(model.targets()[0].rules().len(), 1);
        assert!(model.inputs()[0].alarm_enabled);

        let bad = GatewayConfig {
            targets: vec![TargetConfig::new(
                Ipv4Addr::new(10, 0, 0, 1),
                1,
                0,
                2,
                FunctionCode::ReadHoldingRegisters,
            )
            .with_alarm(2, CompareOp::Equal, 7)],
            ..GatewayConfig::default()
        };
        assert!(matches!(
            bad.build_model(),
            Err(ConfigError::AlarmIndexOutOfRange { .. })
        ));
    }
}
