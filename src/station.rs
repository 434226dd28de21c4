//! WiFi station supervisor.
//!
//! [`StationSupervisor::run`] brings the station up and blocks the startup
//! task until the link reaches a terminal outcome:
//!
//! ```text
//!   init ─▶ register handler ─▶ start ─▶ wait ──▶ Connected ─▶ indicator on, server start
//!                                          └────▶ Fail      ─▶ nothing
//! ```
//!
//! The wait has no timeout.  Startup does not continue until the station
//! either gets an address or spends its retry budget.
//!
//! Retries happen in [`StationEventHandler`], which the network stack calls
//! from its own task.  It reissues connect on every disconnect while the
//! bounded [`RecoveryPolicy`] allows and raises the terminal signal once.

use core::net::Ipv4Addr;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::{debug, error, info, warn};

use crate::app::ports::{
    IndicatorPort, RequestServer, StationError, StationEventSink, StationPort,
};
use crate::events::StationEvent;
use crate::link::recovery::{RecoveryDecision, RecoveryPolicy};

/// Terminal result of station bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationOutcome {
    /// An address was assigned.
    Connected,
    /// The retry budget ran out.
    Fail,
}

impl StationOutcome {
    const fn code(self) -> u8 {
        match self {
            Self::Connected => 1,
            Self::Fail => 2,
        }
    }
}

const NO_OUTCOME: u8 = 0;

// ---------------------------------------------------------------------------
// Event handler (network-stack context)
// ---------------------------------------------------------------------------

pub struct StationEventHandler<S: StationPort> {
    port: Arc<S>,
    policy: Mutex<RecoveryPolicy>,
    connected: AtomicBool,
    ip: AtomicU32,
    /// First terminal outcome.  Only the latching event raises `outcome`,
    /// so a `Fail` after `Connected` cannot overwrite it before the waiter
    /// wakes.
    first: AtomicU8,
    outcome: Signal<CriticalSectionRawMutex, StationOutcome>,
    connected_signals: AtomicU32,
    fail_signals: AtomicU32,
}

impl<S: StationPort> StationEventHandler<S> {
    pub fn new(port: Arc<S>, max_retry: u32) -> Self {
        Self {
            port,
            policy: Mutex::new(RecoveryPolicy::bounded(max_retry)),
            connected: AtomicBool::new(false),
            ip: AtomicU32::new(0),
            first: AtomicU8::new(NO_OUTCOME),
            outcome: Signal::new(),
            connected_signals: AtomicU32::new(0),
            fail_signals: AtomicU32::new(0),
        }
    }

    /// Wait for the first terminal signal.
    pub async fn wait_outcome(&self) -> StationOutcome {
        self.outcome.wait().await
    }

    /// Clear the retry budget and try again after a `Fail`.
    pub fn restart(&self) -> Result<(), StationError> {
        self.lock_policy().reset();
        info!("WiFi: restarting association");
        self.port.connect()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Last assigned address while connected.
    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.is_connected()
            .then(|| Ipv4Addr::from(self.ip.load(Ordering::Acquire)))
    }

    pub fn retry_count(&self) -> u32 {
        self.lock_policy().count()
    }

    pub fn is_exhausted(&self) -> bool {
        self.lock_policy().is_exhausted()
    }

    /// How many times each terminal signal fired.
    pub fn signal_counts(&self) -> (u32, u32) {
        (
            self.connected_signals.load(Ordering::Relaxed),
            self.fail_signals.load(Ordering::Relaxed),
        )
    }

    fn lock_policy(&self) -> std::sync::MutexGuard<'_, RecoveryPolicy> {
        self.policy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn latch(&self, outcome: StationOutcome) {
        if self
            .first
            .compare_exchange(NO_OUTCOME, outcome.code(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.outcome.signal(outcome);
        } else {
            debug!("WiFi: {outcome:?} after the first terminal outcome, not signalled");
        }
    }

    fn reconnect(&self) {
        if let Err(e) = self.port.connect() {
            warn!("WiFi: connect request failed: {e}");
        }
    }

    fn on_disconnected(&self, reason: u16) {
        self.connected.store(false, Ordering::Release);
        // The lock is released before connect: the driver may call back in.
        let (decision, count, max) = {
            let mut policy = self.lock_policy();
            let decision = policy.on_failure();
            (decision, policy.count(), policy.max().unwrap_or(0))
        };
        match decision {
            RecoveryDecision::Retry => {
                info!("WiFi: retry to connect to the AP ({count}/{max}), reason={reason}");
                self.reconnect();
            }
            RecoveryDecision::GiveUp => {
                warn!("WiFi: connect to the AP failed after {max} retries");
                self.fail_signals.fetch_add(1, Ordering::Relaxed);
                self.latch(StationOutcome::Fail);
            }
            RecoveryDecision::Exhausted => {
                debug!("WiFi: disconnect reason={reason} after giving up, ignored");
            }
        }
    }

    fn on_address(&self, ip: Ipv4Addr) {
        info!("WiFi: got ip: {ip}");
        self.lock_policy().on_success();
        self.ip.store(u32::from(ip), Ordering::Release);
        if !self.connected.swap(true, Ordering::AcqRel) {
            self.connected_signals.fetch_add(1, Ordering::Relaxed);
            self.latch(StationOutcome::Connected);
        }
    }
}

impl<S: StationPort> StationEventSink for StationEventHandler<S> {
    fn on_station_event(&self, event: StationEvent) {
        match event {
            StationEvent::LinkStart => {
                debug!("WiFi: station started");
                self.reconnect();
            }
            StationEvent::LinkDisconnected { reason } => self.on_disconnected(reason),
            StationEvent::AddressAssigned { ip } => self.on_address(ip),
        }
    }
}

// ---------------------------------------------------------------------------
// Supervisor (startup task)
// ---------------------------------------------------------------------------

pub struct StationSupervisor<S, I, R>
where
    S: StationPort + 'static,
    I: IndicatorPort,
    R: RequestServer,
{
    port: Arc<S>,
    handler: Arc<StationEventHandler<S>>,
    indicator: Arc<I>,
    server: R,
    server_running: bool,
    started: bool,
}

impl<S, I, R> StationSupervisor<S, I, R>
where
    S: StationPort + 'static,
    I: IndicatorPort,
    R: RequestServer,
{
    pub fn new(port: Arc<S>, max_retry: u32, indicator: Arc<I>, server: R) -> Self {
        let handler = Arc::new(StationEventHandler::new(Arc::clone(&port), max_retry));
        Self {
            port,
            handler,
            indicator,
            server,
            server_running: false,
            started: false,
        }
    }

    /// Bring the station up and block until it connects or gives up.
    ///
    /// Runs once.  Interface init, handler registration and driver start
    /// failures are returned as is and are fatal to the caller.
    pub fn run(&mut self) -> Result<StationOutcome, StationError> {
        if self.started {
            return Err(StationError::AlreadyStarted);
        }
        self.started = true;

        self.port.init()?;
        let sink: Arc<dyn StationEventSink> = self.handler.clone();
        self.port.register(sink)?;
        self.port.start()?;
        info!("WiFi: station init finished, waiting for link");

        let outcome = futures_lite::future::block_on(self.handler.wait_outcome());
        match outcome {
            StationOutcome::Connected => {
                info!("WiFi: connected to AP");
                self.indicator.set(true);
                self.start_server();
            }
            StationOutcome::Fail => warn!("WiFi: failed to connect to AP"),
        }
        Ok(outcome)
    }

    fn start_server(&mut self) {
        if self.server_running {
            info!("WiFi: request server already running");
            return;
        }
        match self.server.start() {
            Ok(()) => self.server_running = true,
            Err(e) => error!("WiFi: request server failed to start: {e}"),
        }
    }

    pub fn handler(&self) -> Arc<StationEventHandler<S>> {
        Arc::clone(&self.handler)
    }

    pub fn server(&self) -> &R {
        &self.server
    }

    pub fn into_server(self) -> R {
        self.server
    }
}
