// Fieldlink - Poll/alarm/uplink core for telemetry gateways
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Radio link abstraction module
//!
//! This module provides the [`RadioLink`] trait implemented by the radio
//! MAC driver, and [`MemoryRadio`], an in-memory link for tests and
//! bench setups without hardware.

use std::collections::VecDeque;

use crate::error::{RadioError, Result};
use crate::protocol::DataRate;

/// Pre-shared session parameters (activation by personalization)
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AbpSession {
    /// Device address
    pub dev_addr: u32,
    /// Network session key
    pub nwk_s_key: [u8; 16],
    /// Application session key
    pub app_s_key: [u8; 16],
}

impl std::fmt::Debug for AbpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbpSession")
            .field("dev_addr", &format_args!("{:08X}", self.dev_addr))
            .finish_non_exhaustive()
    }
}

/// Credentials for a negotiated join (over-the-air activation)
#[derive(Clone, Default, PartialEq, Eq)]
pub struct OtaaCredentials {
    /// Device EUI
    pub dev_eui: [u8; 8],
    /// Application (join) EUI
    pub app_eui: [u8; 8],
    /// Application root key
    pub app_key: [u8; 16],
}

impl std::fmt::Debug for OtaaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtaaCredentials")
            .field("dev_eui", &self.dev_eui)
            .field("app_eui", &self.app_eui)
            .finish_non_exhaustive()
    }
}

/// Events reported by the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The network accepted the join request
    Joined,
    /// The in-flight transmission finished
    TxComplete {
        /// The network server acknowledged the frame
        acked: bool,
    },
}

/// Trait for radio MAC drivers
pub trait RadioLink {
    /// Apply adaptive data rate, sub-band and (when ADR is off) a fixed data rate
    fn set_config(&mut self, adr: bool, sub_band: u8, data_rate: Option<DataRate>);

    /// Install a pre-shared session
    fn install_session(&mut self, session: &AbpSession);

    /// Start a negotiated join
    fn start_join(&mut self, credentials: &OtaaCredentials);

    /// Start sending one frame; completion is reported through [`poll_event`](Self::poll_event)
    fn send(&mut self, port: u8, payload: &[u8], confirmed: bool, frame_counter: u32) -> Result<()>;

    /// Abandon the in-flight transmission
    fn cancel(&mut self);

    /// Next pending event, if any
    fn poll_event(&mut self) -> Option<LinkEvent>;

    /// Data rate currently in use
    fn data_rate(&self) -> DataRate;
}

/// A frame handed to [`MemoryRadio`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    /// Port
    pub port: u8,
    /// Frame bytes
    pub payload: Vec<u8>,
    /// Confirmed uplink
    pub confirmed: bool,
    /// Frame counter used
    pub frame_counter: u32,
}

/// How [`MemoryRadio`] finishes a transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    /// Report an acknowledged completion on the next poll
    #[default]
    Acked,
    /// Report an unacknowledged completion on the next poll
    Unacked,
    /// Never report completion (lets the session time out)
    Silent,
}

/// Statistics about link usage
#[derive(Debug, Clone, Default)]
pub struct LinkMetrics {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total frames sent
    pub frames_sent: u64,
    /// Transmissions cancelled
    pub cancelled: u64,
}

/// A simple in-memory radio link for testing
#[derive(Debug)]
pub struct MemoryRadio {
    sent: Vec<SentFrame>,
    events: VecDeque<LinkEvent>,
    completion: Completion,
    in_flight: bool,
    data_rate: DataRate,
    adr: bool,
    sub_band: u8,
    session: Option<AbpSession>,
    join_started: bool,
    reject_sends: bool,
    metrics: LinkMetrics,
}

impl MemoryRadio {
    /// Create a link that acknowledges every frame
    pub fn new() -> Self {
        Self {
            sent: Vec::new(),
            events: VecDeque::new(),
            completion: Completion::Acked,
            in_flight: false,
            data_rate: DataRate::FASTEST,
            adr: false,
            sub_band: 0,
            session: None,
            join_started: false,
            reject_sends: false,
            metrics: LinkMetrics::default(),
        }
    }

    /// Create a link with a given completion behaviour
    pub fn with_completion(completion: Completion) -> Self {
        Self {
            completion,
            ..Self::new()
        }
    }

    /// Change completion behaviour for later sends
    pub fn set_completion(&mut self, completion: Completion) {
        self.completion = completion;
    }

    /// Make the link refuse sends
    pub fn set_reject_sends(&mut self, reject: bool) {
        self.reject_sends = reject;
    }

    /// Simulate the network accepting the join
    pub fn accept_join(&mut self) {
        self.events.push_back(LinkEvent::Joined);
    }

    /// Simulate an ADR change of data rate
    pub fn set_data_rate(&mut self, data_rate: DataRate) {
        self.data_rate = data_rate;
    }

    /// Frames handed to the link, in order
    pub fn sent(&self) -> &[SentFrame] {
        &self.sent
    }

    /// A transmission is in flight
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Last applied ADR flag
    pub fn adr(&self) -> bool {
        self.adr
    }

    /// Last applied sub-band
    pub fn sub_band(&self) -> u8 {
        self.sub_band
    }

    /// Installed pre-shared session
    pub fn session(&self) -> Option<&AbpSession> {
        self.session.as_ref()
    }

    /// A negotiated join was started
    pub fn join_started(&self) -> bool {
        self.join_started
    }

    /// Get link metrics
    pub fn metrics(&self) -> LinkMetrics {
        self.metrics.clone()
    }
}

impl Default for MemoryRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioLink for MemoryRadio {
    fn set_config(&mut self, adr: bool, sub_band: u8, data_rate: Option<DataRate>) {
        self.adr = adr;
        self.sub_band = sub_band;
        if let Some(dr) = data_rate {
            self.data_rate = dr;
        }
    }

    fn install_session(&mut self, session: &AbpSession) {
        self.session = Some(session.clone());
    }

    fn start_join(&mut self, _credentials: &OtaaCredentials) {
        self.join_started = true;
    }

    fn send(&mut self, port: u8, payload: &[u8], confirmed: bool, frame_counter: u32) -> Result<()> {
        if self.reject_sends {
            return Err(RadioError::Rejected {
                reason: "link refused frame".to_string(),
            }
            .into());
        }
        if self.in_flight {
            return Err(RadioError::Busy.into());
        }

        self.sent.push(SentFrame {
            port,
            payload: payload.to_vec(),
            confirmed,
            frame_counter,
        });
        self.metrics.bytes_sent += payload.len() as u64;
        self.metrics.frames_sent += 1;

        match self.completion {
            Completion::Acked => self.events.push_back(LinkEvent::TxComplete { acked: true }),
            Completion::Unacked => self.events.push_back(LinkEvent::TxComplete { acked: false }),
            Completion::Silent => {}
        }
        self.in_flight = true;
        Ok(())
    }

    fn cancel(&mut self) {
        if self.in_flight {
            self.metrics.cancelled += 1;
        }
        self.in_flight = false;
    }

    fn poll_event(&mut self) -> Option<LinkEvent> {
        let event = self.events.pop_front();
        if let Some(LinkEvent::TxComplete { .. }) = event {
            self.in_flight = false;
        }
        event
    }

    fn data_rate(&self) -> DataRate {
        self.data_rate
    }
}
