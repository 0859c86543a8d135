// Fieldlink Gateway - Poll/uplink orchestration for telemetry gateways
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Fieldlink Gateway - Poll/uplink orchestration for telemetry gateways
//!
//! This crate wires the [`fieldlink`] core into a running gateway: it polls
//! fieldbus devices, samples local inputs, raises alarms and schedules the
//! resulting uplinks over a low-power radio link.
//!
//! ## Features
//!
//! - **Configuration documents**: poll, radio and inputs documents with
//!   per-entry validation
//! - **Poll scheduling**: one read per target per cycle, reconnects on the
//!   next cycle
//! - **Alarm-first uplink**: pending alarms always go before bulk frames
//! - **Durable frame counter**: file-backed, survives restarts
//!
//! ## Quick Start
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use fieldlink::{AbpSession, FunctionCode, JoinMode, MemoryCounterStore, MemoryRadio};
//! use fieldlink_gateway::{Gateway, GatewayConfig, MemoryFieldbus, MemoryPins, TargetConfig};
//!
//! let device = Ipv4Addr::new(192, 168, 0, 187);
//! let mut config = GatewayConfig::default();
//! config.targets.push(TargetConfig::new(device, 1, 0x1004, 2, FunctionCode::ReadHoldingRegisters));
//! config.radio.join = JoinMode::Abp(AbpSession::default());
//!
//! let mut bus = MemoryFieldbus::new();
//! bus.add_device(device);
//! bus.set_registers(device, 0x1004, &[215, 480]);
//!
//! let mut gateway = Gateway::new(
//!     config,
//!     bus,
//!     MemoryPins::new(),
//!     MemoryRadio::new(),
//!     MemoryCounterStore::new(),
//! )
//! .unwrap();
//! gateway.start().unwrap();
//!
//! // First tick connects, second tick reads and sends
//! gateway.tick(0);
//! gateway.tick(5_000);
//! assert_eq!(gateway.metrics().poll_successes, 1);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Telemetry Gateway                                          │
//! │  ┌────────────────────────────────────────────────────────┐│
//! │  │  Fieldlink Gateway                                     ││
//! │  │  ┌──────────┐ ┌──────────┐ ┌──────────┐               ││
//! │  │  │ Target   │ │ Target   │ │ Inputs   │  ...          ││
//! │  │  │ 10.0.0.7 │ │ 10.0.0.9 │ │ pin 14.. │               ││
//! │  │  │ [Rules]  │ │ [Rules]  │ │ [Alarm]  │               ││
//! │  │  └────┬─────┘ └────┬─────┘ └────┬─────┘               ││
//! │  │       │            │            │                      ││
//! │  │       └────────────┼────────────┘                      ││
//! │  │                    ▼                                   ││
//! │  │   ┌─────────────────┐   ┌───────────┐                  ││
//! │  │   │ Alarm queue     │   │ Encoder   │                  ││
//! │  │   └────────┬────────┘   └─────┬─────┘                  ││
//! │  │            └────────┬─────────┘                        ││
//! │  │                     ▼                                  ││
//! │  │              ┌──────────────┐                          ││
//! │  │              │ RadioSession │  → port 2 alarm, 1 bulk  ││
//! │  │              └──────────────┘                          ││
//! │  └────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod error;
mod file_store;
mod gateway;
mod poll;
mod sim;

// Public API
pub use config::{
    AlarmConfig, ConfigReport, GatewayConfig, InputConfig, Rejection, TargetConfig,
    DEFAULT_INPUTS_DOCUMENT, DEFAULT_POLL_INTERVAL_MS, DEFAULT_UPLINK_INTERVAL_MS,
};
pub use error::{ConfigError, GatewayError, Result, TransportError};
pub use file_store::FileCounterStore;
pub use gateway::{Gateway, TickReport};
pub use poll::{FieldbusTransport, InputPins, PollScheduler, PollSummary};
pub use sim::{MemoryFieldbus, MemoryPins};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
