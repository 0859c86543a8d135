// Fieldlink - Poll/alarm/uplink core for telemetry gateways
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Radio session management
//!
//! [`RadioSession`] owns the join state, the radio configuration and the
//! persisted frame counter. Transmission is non-blocking: [`transmit`]
//! hands one frame to the link and [`poll`] advances the state machine
//! until the link reports completion or the timeout expires.
//!
//! ```text
//! Unjoined --start(ABP)--> Joined
//! Unjoined --start(OTAA)--> Joining --Joined event--> Joined
//!
//! Idle --transmit--> Sending { since } --TxComplete | timeout--> Idle
//! ```
//!
//! [`transmit`]: RadioSession::transmit
//! [`poll`]: RadioSession::poll

use log::{debug, error, info, warn};

use crate::error::{RadioError, Result};
use crate::link::{AbpSession, LinkEvent, OtaaCredentials, RadioLink};
use crate::protocol::{SpreadingFactor, UplinkFrame};
use crate::store::{CounterStore, FRAME_COUNTER_KEY};

/// Time after which an unfinished transmission is abandoned
pub const TX_TIMEOUT_MS: u64 = 3000;

/// How the device obtains its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinMode {
    /// Negotiated join (OTAA)
    Otaa(OtaaCredentials),
    /// Pre-shared session (ABP)
    Abp(AbpSession),
}

impl Default for JoinMode {
    fn default() -> Self {
        JoinMode::Otaa(OtaaCredentials::default())
    }
}

/// Radio configuration applied by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioConfig {
    /// Join mode and credentials
    pub join: JoinMode,
    /// Adaptive data rate
    pub adr: bool,
    /// Regional sub-band
    pub sub_band: u8,
    /// Fixed spreading factor used when ADR is off
    pub spreading_factor: SpreadingFactor,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            join: JoinMode::default(),
            adr: true,
            sub_band: 4,
            spreading_factor: SpreadingFactor::Sf7,
        }
    }
}

/// Join state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    /// Not started or start failed
    Unjoined,
    /// Join request issued, waiting for the network
    Joining,
    /// Session established (terminal until restart)
    Joined,
}

/// Result of one finished transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// Completed and acknowledged
    Acked,
    /// Completed without acknowledgment
    Unacked,
    /// Abandoned after [`TX_TIMEOUT_MS`]
    TimedOut,
}

/// What happened during one [`RadioSession::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionUpdate {
    /// The session became joined
    pub joined: bool,
    /// The in-flight transmission finished
    pub outcome: Option<TxOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Idle,
    Sending { since: u64, port: u8 },
}

/// Radio session manager
#[derive(Debug)]
pub struct RadioSession<L, S> {
    link: L,
    store: S,
    config: RadioConfig,
    state: JoinState,
    tx: TxState,
    frame_counter: u32,
    counter_loaded: bool,
    counter_dirty: bool,
    timeout_ms: u64,
}

impl<L: RadioLink, S: CounterStore> RadioSession<L, S> {
    /// Create an unjoined session
    pub fn new(link: L, store: S, config: RadioConfig) -> Self {
        Self {
            link,
            store,
            config,
            state: JoinState::Unjoined,
            tx: TxState::Idle,
            frame_counter: 0,
            counter_loaded: false,
            counter_dirty: false,
            timeout_ms: TX_TIMEOUT_MS,
        }
    }

    /// Override the transmission timeout
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Load the frame counter, apply the radio configuration and join.
    ///
    /// Fails without touching the link if the counter cannot be loaded;
    /// the session then stays unjoined.
    pub fn start(&mut self) -> Result<()> {
        let stored = self.store.load(FRAME_COUNTER_KEY).map_err(|e| {
            error!("Frame counter load failed: {}", e);
            e
        })?;
        self.frame_counter = stored.unwrap_or(0);
        self.counter_loaded = true;
        self.counter_dirty = false;
        info!("Frame counter restored at {}", self.frame_counter);

        self.apply_radio_config();

        match &self.config.join {
            JoinMode::Abp(session) => {
                self.link.install_session(session);
                self.state = JoinState::Joined;
                info!("Pre-shared session installed for {:08X}", session.dev_addr);
            }
            JoinMode::Otaa(credentials) => {
                self.link.start_join(credentials);
                self.state = JoinState::Joining;
                info!("Join request issued");
            }
        }
        Ok(())
    }

    /// Push ADR, sub-band and (ADR off) the fixed data rate to the link
    pub fn apply_radio_config(&mut self) {
        let data_rate = if self.config.adr {
            None
        } else {
            Some(self.config.spreading_factor.data_rate())
        };
        self.link
            .set_config(self.config.adr, self.config.sub_band, data_rate);
        debug!(
            "Radio config applied: adr={} sub_band={} sf={}",
            self.config.adr, self.config.sub_band, self.config.spreading_factor
        );
    }

    /// Replace the radio configuration and apply it.
    ///
    /// A changed join mode only takes effect on the next start.
    pub fn reconfigure(&mut self, config: RadioConfig) {
        if config.join != self.config.join && self.state != JoinState::Unjoined {
            warn!("Join mode change takes effect after restart");
        }
        self.config = config;
        self.apply_radio_config();
    }

    /// Current configuration
    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    /// MTU at the data rate currently used by the link
    pub fn current_mtu(&self) -> usize {
        self.link.data_rate().mtu()
    }

    /// Join state
    pub fn join_state(&self) -> JoinState {
        self.state
    }

    /// Session established
    pub fn is_joined(&self) -> bool {
        self.state == JoinState::Joined
    }

    /// No transmission in flight
    pub fn is_idle(&self) -> bool {
        self.tx == TxState::Idle
    }

    /// Next frame counter value to be used
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    /// The last save of the counter failed
    pub fn counter_dirty(&self) -> bool {
        self.counter_dirty
    }

    /// Start transmitting one frame on its port.
    ///
    /// The counter after this frame is saved before the frame is handed to
    /// the link, so a restart while the frame is on air never reuses it.
    /// Refused while unjoined, while another transmission is in flight, or
    /// when that save fails.
    pub fn transmit(&mut self, frame: &UplinkFrame, confirmed: bool, now_ms: u64) -> Result<()> {
        if self.state != JoinState::Joined {
            return Err(RadioError::NotJoined.into());
        }
        if self.tx != TxState::Idle {
            return Err(RadioError::Busy.into());
        }
        if !self.counter_loaded {
            return Err(RadioError::CounterNotPersisted.into());
        }

        let next = self.frame_counter.wrapping_add(1);
        if let Err(e) = self.store.save(FRAME_COUNTER_KEY, next) {
            error!("Frame counter {} not persisted: {}", next, e);
            self.counter_dirty = true;
            return Err(RadioError::CounterNotPersisted.into());
        }

        let port = frame.port();
        self.link
            .send(port, &frame.payload, confirmed, self.frame_counter)?;

        debug!(
            "Sending {} bytes on port {} with fcnt {}",
            frame.len(),
            port,
            self.frame_counter
        );
        self.frame_counter = next;
        self.counter_dirty = false;
        self.tx = TxState::Sending {
            since: now_ms,
            port,
        };
        Ok(())
    }

    /// Process link events and the transmission timeout
    pub fn poll(&mut self, now_ms: u64) -> SessionUpdate {
        let mut update = SessionUpdate::default();

        while let Some(event) = self.link.poll_event() {
            match event {
                LinkEvent::Joined => {
                    if self.state == JoinState::Joining {
                        self.state = JoinState::Joined;
                        update.joined = true;
                        info!("Joined network");
                    }
                }
                LinkEvent::TxComplete { acked } => {
                    if let TxState::Sending { port, .. } = self.tx {
                        self.tx = TxState::Idle;
                        let outcome = if acked {
                            TxOutcome::Acked
                        } else {
                            warn!("Frame on port {} not acknowledged", port);
                            TxOutcome::Unacked
                        };
                        update.outcome = Some(outcome);
                        let _ = self.persist_counter();
                    }
                }
            }
        }

        if let TxState::Sending { since, port } = self.tx {
            if now_ms.saturating_sub(since) >= self.timeout_ms {
                self.link.cancel();
                self.tx = TxState::Idle;
                let err = RadioError::Timeout {
                    timeout_ms: self.timeout_ms,
                };
                warn!("Frame on port {} abandoned: {}", port, err);
                update.outcome = Some(TxOutcome::TimedOut);
                let _ = self.persist_counter();
            }
        }

        update
    }

    fn persist_counter(&mut self) -> Result<()> {
        match self.store.save(FRAME_COUNTER_KEY, self.frame_counter) {
            Ok(()) => {
                self.counter_dirty = false;
                Ok(())
            }
            Err(e) => {
                error!("Frame counter {} not persisted: {}", self.frame_counter, e);
                self.counter_dirty = true;
                Err(e)
            }
        }
    }

    /// Radio link
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Mutable radio link
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Counter store
    pub fn store(&self) -> &S {
        &self.store
    }
}
