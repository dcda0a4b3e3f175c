//! Relay board controller.
//!
//! Owns the telnet session to the board and translates abstract phase
//! assignments into channel bitmaps. The controller is handed to the
//! parent scheduler at construction; interior state (session handle,
//! current phase pointer) lives behind a mutex so the handle can be
//! shared without external locking.
//!
//! Failure policy: the board is an output device, never a dependency.
//! Every public operation returns a `RelayError` the caller is expected
//! to log and ignore; the phase clock keeps running with or without a
//! reachable board. Sessions are opened lazily and dropped on any I/O
//! fault so the next command triggers a reconnect.

pub mod bitmap;
mod session;

use std::thread;
use std::time::{Duration, Instant};

use junction_common::config::JunctionConfig;
use junction_common::consts::{STANDBY_FLASH_INTERVAL_MS, STANDBY_SETTLE_MS};
use junction_common::phase::{LaneKind, PhaseAssignment};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use bitmap::{writeall_command, ChannelLayout, ChannelMask};
use session::{TelnetSession, CONNECT_RETRIES};

/// Relay driver errors.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("cannot resolve relay host '{host}': {source}")]
    Resolve {
        host: String,
        source: std::io::Error,
    },

    #[error("relay host '{host}' resolves to no address")]
    NoAddress { host: String },

    #[error("relay authentication rejected")]
    AuthFailed,

    #[error("relay prompt '{prompt}' never arrived")]
    PromptTimeout { prompt: String },

    #[error("no response from relay within retry budget")]
    ReceiveTimeout,

    #[error("relay closed the connection")]
    ConnectionClosed,

    #[error("relay connect failed after {attempts} attempts")]
    ConnectExhausted { attempts: u32 },

    #[error("relay I/O error: {0}")]
    Io(#[from] std::io::Error),
}

struct RelayInner {
    session: Option<TelnetSession>,
    current_phase: usize,
}

/// Stateful driver for the junction's relay board.
pub struct RelayController {
    host: String,
    username: String,
    password: String,
    phases: Vec<Vec<PhaseAssignment>>,
    kinds: Vec<LaneKind>,
    layout: ChannelLayout,
    inner: Mutex<RelayInner>,
}

impl RelayController {
    /// Build a controller from the junction configuration. No I/O
    /// happens here; the session opens on first use.
    pub fn from_config(config: &JunctionConfig) -> Self {
        Self {
            host: config.relay_url.clone(),
            username: config.relay_username.clone(),
            password: config.relay_password.clone(),
            phases: config.phases.clone(),
            kinds: config.lane_kinds(),
            layout: ChannelLayout::new(config.num_children()),
            inner: Mutex::new(RelayInner {
                session: None,
                current_phase: 0,
            }),
        }
    }

    /// Point the driver at phase `index`. No transmission.
    pub fn set_phase_cycle(&self, index: usize) {
        debug_assert!(index < self.phases.len());
        self.inner.lock().current_phase = index;
    }

    /// Energize the green channels of the current phase.
    pub fn execute_phase(&self) -> Result<(), RelayError> {
        let mut inner = self.inner.lock();
        let mask = self.layout.phase_mask(&self.phases[inner.current_phase]);
        self.transmit(&mut inner, mask)
    }

    /// Energize the yellow-transition bitmap derived from the current
    /// phase and its cyclic successor. Called 5 s before phase end.
    pub fn execute_transition_phase(&self) -> Result<(), RelayError> {
        let mut inner = self.inner.lock();
        let current = inner.current_phase;
        let next = (current + 1) % self.phases.len();
        let mask = self
            .layout
            .transition_mask(&self.phases[current], &self.phases[next]);
        self.transmit(&mut inner, mask)
    }

    /// De-energize every channel.
    pub fn turn_off_all(&self) -> Result<(), RelayError> {
        let mut inner = self.inner.lock();
        self.transmit(&mut inner, ChannelMask::empty())
    }

    /// Flash the vehicle-lane yellow channels for `duration`, then
    /// leave the board dark. Transmission faults are logged and do not
    /// shorten the hold: the safe state is timed, not best-effort.
    pub fn standby_mode(&self, duration: Duration) {
        let mask = self.layout.standby_mask(&self.kinds);
        let half = Duration::from_millis(STANDBY_FLASH_INTERVAL_MS);
        let started = Instant::now();
        let mut lit = false;

        debug!(?duration, "entering standby (flashing yellow)");
        while started.elapsed() < duration {
            lit = !lit;
            let step = if lit { mask } else { ChannelMask::empty() };
            let mut inner = self.inner.lock();
            if let Err(e) = self.transmit(&mut inner, step) {
                warn!("standby flash transmission failed: {e}");
            }
            drop(inner);
            thread::sleep(half.min(duration.saturating_sub(started.elapsed())));
        }

        thread::sleep(Duration::from_millis(STANDBY_SETTLE_MS));
        if let Err(e) = self.turn_off_all() {
            warn!("failed to de-energize relay after standby: {e}");
        }
    }

    /// Send `mask` over the session, opening it if needed. Any fault
    /// drops the session so the next command reconnects.
    fn transmit(&self, inner: &mut RelayInner, mask: ChannelMask) -> Result<(), RelayError> {
        if inner.session.is_none() {
            inner.session = Some(self.connect()?);
        }
        let command = writeall_command(mask);
        let session = inner.session.as_mut().ok_or(RelayError::ConnectionClosed)?;
        if let Err(e) = session.send_line(&command) {
            inner.session = None;
            return Err(e);
        }
        debug!(%command, "relay command sent");
        Ok(())
    }

    fn connect(&self) -> Result<TelnetSession, RelayError> {
        let mut last = None;
        for attempt in 1..=CONNECT_RETRIES {
            match TelnetSession::open(&self.host, &self.username, &self.password) {
                Ok(session) => return Ok(session),
                Err(e) => {
                    warn!(attempt, "relay connect attempt failed: {e}");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or(RelayError::ConnectExhausted {
            attempts: CONNECT_RETRIES,
        }))
    }
}
