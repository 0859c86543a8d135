//! # Fieldlink - Poll/alarm/uplink core for telemetry gateways
//!
//! Building blocks for a gateway that polls industrial devices over a
//! fieldbus, raises edge-triggered threshold alarms, and relays a compact
//! binary encoding of its state over a long-range, low-bandwidth radio.
//!
//! ## Key Features
//!
//! - **Edge-triggered alarms**: each threshold crossing is notified exactly once
//! - **MTU-aware encoding**: dense records chunked to the current radio payload budget
//! - **Durable frame counter**: never reused across restarts
//! - **Non-blocking radio session**: at most one transmission in flight
//!
//! ## Quick Start
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use fieldlink::{
//!     AlarmEngine, AlarmRule, CompareOp, FunctionCode, PollTarget, SignalModel,
//!     UplinkDecoder, UplinkEncoder,
//! };
//!
//! let mut model = SignalModel::new();
//! let target = PollTarget::new(
//!     Ipv4Addr::new(192, 168, 0, 187),
//!     1,
//!     0x1004,
//!     3,
//!     FunctionCode::ReadHoldingRegisters,
//! )
//! .with_rule(AlarmRule::new(2, CompareOp::GreaterThan, 25));
//! model.add_target(target);
//!
//! // A poll result arrives
//! model.targets_mut()[0].record_registers(&[10, 20, 30]);
//!
//! let engine = AlarmEngine::new();
//! assert_eq!(engine.evaluate(&mut model.targets_mut()[0]), 1);
//! let alarm = engine.drain_one_pending(&mut model).unwrap();
//!
//! let encoder = UplinkEncoder::new();
//! let frames = encoder.encode(model.targets(), model.inputs(), 51);
//! let alarm_frame = encoder.encode_alarm(&alarm);
//!
//! let decoder = UplinkDecoder::new();
//! assert_eq!(decoder.decode_frame(&frames[0].payload).unwrap().len(), 2);
//! assert!(decoder.decode_alarm(&alarm_frame.payload).is_ok());
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Function codes, operators, data rates and wire constants
//! - [`signal`]: Poll targets, alarm rules and input channels
//! - [`alarm`]: Edge-triggered alarm evaluation and draining
//! - [`encoder`]: Bulk and alarm frame encoding
//! - [`decoder`]: Network-server side frame parsing
//! - [`frame`]: MTU-bounded chunking
//! - [`session`]: Join state, radio configuration and frame counter
//! - [`link`]: Radio link abstraction
//! - [`store`]: Frame counter persistence
//! - [`metrics`]: Pipeline statistics

// Modules
pub mod alarm;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod link;
pub mod metrics;
pub mod protocol;
pub mod session;
pub mod signal;
pub mod store;

// Re-exports for convenient access
pub use alarm::{AlarmEngine, FieldbusAlarm, InputAlarm, PendingAlarm};
pub use decoder::{AlarmNotification, InputReport, Section, TargetRecord, UplinkDecoder};
pub use encoder::UplinkEncoder;
pub use error::{DecodeError, EncodeError, FieldlinkError, RadioError, Result, StoreError};
pub use frame::{Chunker, FrameBuilder};
pub use link::{AbpSession, Completion, LinkEvent, MemoryRadio, OtaaCredentials, RadioLink, SentFrame};
pub use metrics::PipelineMetrics;
pub use protocol::{
    CompareOp, DataRate, FrameKind, FunctionCode, InputKind, SpreadingFactor, UplinkFrame,
    ALARM_PORT, BULK_PORT, MAX_INPUT_CHANNELS, MAX_REGISTERS_PER_READ, MAX_RULES_PER_TARGET,
    MAX_TARGETS,
};
pub use session::{
    JoinMode, JoinState, RadioConfig, RadioSession, SessionUpdate, TxOutcome, TX_TIMEOUT_MS,
};
pub use signal::{AlarmRule, InputChannel, PollTarget, SignalModel};
pub use store::{CounterStore, MemoryCounterStore, FRAME_COUNTER_KEY};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
