// Fieldlink Gateway - Poll/uplink orchestration for telemetry gateways
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! High-level Gateway API
//!
//! The [`Gateway`] owns the signal model, the radio session and the
//! transports, and runs the whole pipeline once per [`Gateway::tick`]:
//!
//! 1. advance the radio session (join events, completions, timeouts)
//! 2. sample local inputs and evaluate their alarms
//! 3. poll all targets when the poll interval has elapsed
//! 4. stop here while the session is not joined
//! 5. encode a bulk uplink when the uplink interval has elapsed
//! 6. if the radio is idle, send one pending alarm, else the next bulk frame
//!
//! # Example
//!
//! ```rust
//! use fieldlink::{MemoryCounterStore, MemoryRadio};
//! use fieldlink_gateway::{Gateway, GatewayConfig, MemoryFieldbus, MemoryPins};
//!
//! let (config, report) = GatewayConfig::from_documents(None, None, None);
//! assert!(report.is_clean());
//!
//! let mut gateway = Gateway::new(
//!     config,
//!     MemoryFieldbus::new(),
//!     MemoryPins::new(),
//!     MemoryRadio::new(),
//!     MemoryCounterStore::new(),
//! )
//! .unwrap();
//! gateway.start().unwrap();
//!
//! // Negotiated join still in progress: nothing is transmitted
//! let report = gateway.tick(0);
//! assert!(!report.joined);
//! ```

use std::collections::VecDeque;

use fieldlink::{
    AlarmEngine, CounterStore, FrameKind, PipelineMetrics, RadioLink, RadioSession, SignalModel,
    TxOutcome, UplinkEncoder, UplinkFrame,
};
use log::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::poll::{FieldbusTransport, InputPins, PollScheduler, PollSummary};

/// What happened during one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The session was joined when uplink work was considered
    pub joined: bool,
    /// Poll cycle run this tick
    pub polled: Option<PollSummary>,
    /// Bulk frames encoded this tick
    pub frames_encoded: usize,
    /// Frame handed to the radio this tick
    pub transmitted: Option<FrameKind>,
    /// Transmission finished this tick
    pub completed: Option<TxOutcome>,
}

/// Pipeline orchestrator
pub struct Gateway<T, P, L, S> {
    config: GatewayConfig,
    model: SignalModel,
    scheduler: PollScheduler,
    engine: AlarmEngine,
    encoder: UplinkEncoder,
    session: RadioSession<L, S>,
    transport: T,
    pins: P,
    outbound: VecDeque<UplinkFrame>,
    last_poll: Option<u64>,
    last_uplink: Option<u64>,
    metrics: PipelineMetrics,
}

impl<T, P, L, S> Gateway<T, P, L, S>
where
    T: FieldbusTransport,
    P: InputPins,
    L: RadioLink,
    S: CounterStore,
{
    /// Create a gateway from a validated configuration
    pub fn new(config: GatewayConfig, transport: T, pins: P, link: L, store: S) -> Result<Self> {
        let model = config.build_model()?;
        let session = RadioSession::new(link, store, config.radio.clone());
        Ok(Self {
            config,
            model,
            scheduler: PollScheduler::new(),
            engine: AlarmEngine::new(),
            encoder: UplinkEncoder::new(),
            session,
            transport,
            pins,
            outbound: VecDeque::new(),
            last_poll: None,
            last_uplink: None,
            metrics: PipelineMetrics::new(),
        })
    }

    /// Restore the frame counter and start joining
    pub fn start(&mut self) -> Result<()> {
        self.session.start()?;
        Ok(())
    }

    /// Run one scheduling step at monotonic time `now_ms`
    pub fn tick(&mut self, now_ms: u64) -> TickReport {
        let mut report = TickReport::default();

        let update = self.session.poll(now_ms);
        if let Some(outcome) = update.outcome {
            self.metrics.record_outcome(outcome);
            report.completed = Some(outcome);
        }

        let raised = self.scheduler.sample_inputs(&mut self.pins, &mut self.model);
        self.metrics.alarms_raised += raised as u64;

        if is_due(self.last_poll, now_ms, self.config.poll_interval_ms) {
            let summary = self.scheduler.poll_all(&mut self.transport, &mut self.model);
            self.metrics
                .record_poll_cycle(summary.succeeded, summary.failed, summary.skipped);
            self.metrics.alarms_raised += summary.alarms_raised as u64;
            self.last_poll = Some(now_ms);
            report.polled = Some(summary);
        }

        if !self.session.is_joined() {
            self.metrics.unjoined_ticks += 1;
            return report;
        }
        report.joined = true;

        if is_due(self.last_uplink, now_ms, self.config.uplink_interval_ms) {
            report.frames_encoded = self.queue_bulk_uplink();
            self.last_uplink = Some(now_ms);
        }

        if self.session.is_idle() {
            let next = match self.engine.drain_one_pending(&mut self.model) {
                Some(alarm) => Some(self.encoder.encode_alarm(&alarm)),
                None => self.outbound.pop_front(),
            };
            if let Some(frame) = next {
                if self.send(&frame, now_ms) {
                    report.transmitted = Some(frame.kind);
                }
            }
        }

        report
    }

    fn queue_bulk_uplink(&mut self) -> usize {
        let stale = self.outbound.len();
        if stale > 0 {
            warn!("Dropping {} undelivered bulk frame(s)", stale);
            self.metrics.stale_frames_dropped += stale as u64;
            self.outbound.clear();
        }

        let mtu = self.session.current_mtu();
        let frames = self
            .encoder
            .encode(self.model.targets(), self.model.inputs(), mtu);
        let count = frames.len();
        self.outbound.extend(frames);
        self.model.reset_counters();

        self.metrics.bulk_uplinks += 1;
        self.metrics.frames_queued += count as u64;
        debug!("Queued {} bulk frame(s) at MTU {}", count, mtu);
        count
    }

    fn send(&mut self, frame: &UplinkFrame, now_ms: u64) -> bool {
        match self.session.transmit(frame, true, now_ms) {
            Ok(()) => {
                self.metrics
                    .record_sent(frame.len(), frame.kind == FrameKind::Alarm);
                true
            }
            Err(e) => {
                warn!("{:?} frame abandoned: {}", frame.kind, e);
                self.metrics.tx_rejected += 1;
                false
            }
        }
    }

    /// Replace the configuration between ticks.
    ///
    /// The new model is built completely before it replaces the old one;
    /// on error nothing changes. An in-flight transmission keeps running,
    /// queued bulk frames from the old model are dropped and the next tick
    /// polls the new targets.
    pub fn reload(&mut self, config: GatewayConfig) -> Result<()> {
        let model = config.build_model()?;

        let dropped = self.outbound.len();
        self.outbound.clear();
        self.metrics.stale_frames_dropped += dropped as u64;

        self.model = model;
        self.session.reconfigure(config.radio.clone());
        self.config = config;
        self.last_poll = None;

        info!(
            "Configuration reloaded: {} target(s), {} input(s)",
            self.model.targets().len(),
            self.model.inputs().len()
        );
        Ok(())
    }

    /// Active configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Signal model
    pub fn model(&self) -> &SignalModel {
        &self.model
    }

    /// Pipeline metrics
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Radio session
    pub fn session(&self) -> &RadioSession<L, S> {
        &self.session
    }

    /// Mutable radio session
    pub fn session_mut(&mut self) -> &mut RadioSession<L, S> {
        &mut self.session
    }

    /// Mutable fieldbus transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Mutable input pins
    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }

    /// Bulk frames waiting for the radio
    pub fn queued_frames(&self) -> usize {
        self.outbound.len()
    }
}

fn is_due(last: Option<u64>, now_ms: u64, interval_ms: u64) -> bool {
    match last {
        None => true,
        Some(last) => now_ms.saturating_sub(last) >= interval_ms,
    }
}
