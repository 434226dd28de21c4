//! Role-parameterised BLE link controller.
//!
//! One [`LinkController`] per enabled role.  It owns the role's
//! [`ConnectionState`], its [`LinkHandle`] and (for the central) the
//! per-window [`PeerCatalog`].  Events come in through
//! [`LinkController::handle_event`], always from the single link task
//! that drains the role's queue, so the controller itself needs no
//! locking.  Other tasks observe it through the shared [`LinkStatus`].
//!
//! The two roles differ only in the discovery action (advertise vs. scan)
//! and in how a connection starts (accepted vs. initiated).  Every
//! failure or disconnect goes back to discovery; the device has nobody
//! to ask for help.

use std::sync::Arc;

use log::{debug, error, info, warn};

use super::catalog::{DiscoveredPeer, PeerCatalog};
use super::recovery::{RecoveryDecision, RecoveryPolicy};
use super::{
    ConnectionDescriptor, DiscoveryParameters, LinkError, LinkHandle, LinkStatus,
    REASON_REMOTE_USER_TERMINATED, Role,
};
use crate::address::{AddressType, BleAddress};
use crate::app::ports::{GapPort, RadioError};
use crate::config::NodeConfig;
use crate::events::{GapEvent, LinkEventQueue};
use crate::fsm::{self, ConnectionState, Trigger};

pub struct LinkController<G: GapPort> {
    role: Role,
    gap: G,
    state: ConnectionState,
    handle: Option<LinkHandle>,
    catalog: PeerCatalog,
    policy: RecoveryPolicy,
    params: DiscoveryParameters,
    device_name: heapless::String<24>,
    connect_timeout_ms: u32,
    own_address: Option<BleAddress>,
    status: Arc<LinkStatus>,
}

impl<G: GapPort> LinkController<G> {
    pub fn new(role: Role, gap: G, config: &NodeConfig) -> Self {
        let params = match role {
            Role::Peripheral => config.advertise_params(),
            Role::Central => config.scan_params(),
        };
        Self {
            role,
            gap,
            state: ConnectionState::Idle,
            handle: None,
            catalog: PeerCatalog::new(),
            policy: RecoveryPolicy::unbounded(),
            params,
            device_name: config.device_name.clone(),
            connect_timeout_ms: config.connect_timeout_ms,
            own_address: None,
            status: Arc::new(LinkStatus::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some_and(|h| h.is_connected)
    }

    pub fn handle(&self) -> Option<&LinkHandle> {
        self.handle.as_ref()
    }

    /// Shared view for tasks other than the link task.
    pub fn status(&self) -> Arc<LinkStatus> {
        Arc::clone(&self.status)
    }

    pub fn own_address(&self) -> Option<BleAddress> {
        self.own_address
    }

    pub fn catalog(&self) -> &PeerCatalog {
        &self.catalog
    }

    pub fn gap(&self) -> &G {
        &self.gap
    }

    // -----------------------------------------------------------------------
    // Role-level operations
    // -----------------------------------------------------------------------

    /// Begin discovery.  Rejected while discovery or a connection is active.
    pub fn start(&mut self) -> Result<(), LinkError> {
        if self.state != ConnectionState::Idle {
            warn!(
                "BLE[{}]: start rejected, already {}",
                self.role,
                self.state.name()
            );
            return Err(LinkError::AlreadyActive);
        }
        self.begin_discovery()?;
        self.apply(Trigger::Start);
        Ok(())
    }

    /// Cancel advertising or scanning.  Nothing to cancel is not an error.
    pub fn stop_discovery(&mut self) -> Result<(), LinkError> {
        if self.state != ConnectionState::Discovering {
            info!("BLE[{}]: no discovery to stop ({})", self.role, self.state.name());
            return Ok(());
        }
        let rc = match self.role {
            Role::Peripheral => self.gap.stop_advertising(),
            Role::Central => self.gap.cancel_scan(),
        };
        match rc {
            Ok(()) => info!("BLE[{}]: discovery stopped", self.role),
            Err(RadioError::NotActive) => info!("BLE[{}]: discovery already stopped", self.role),
            Err(e) => return Err(e.into()),
        }
        self.apply(Trigger::Stop);
        Ok(())
    }

    /// Terminate the current connection.  The link returns to discovery
    /// when the host reports the disconnect.
    pub fn disconnect(&mut self) -> Result<(), LinkError> {
        if self.state != ConnectionState::Connected {
            return Err(LinkError::NotConnected);
        }
        let Some(conn_id) = self.handle.and_then(|h| h.conn_id) else {
            return Err(LinkError::NotConnected);
        };
        self.gap.terminate(conn_id, REASON_REMOTE_USER_TERMINATED)?;
        info!("BLE[{}]: terminating conn_id={conn_id}", self.role);
        self.apply(Trigger::DisconnectRequested);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Event handling
    // -----------------------------------------------------------------------

    /// Process one event to completion, including any radio action it
    /// triggers.
    pub fn handle_event(&mut self, event: GapEvent) {
        match event {
            GapEvent::HostSynced => self.on_host_synced(),
            GapEvent::HostReset { reason } => self.on_host_reset(reason),
            GapEvent::ConnectOutcome { status, conn_id } => self.on_connect_outcome(status, conn_id),
            GapEvent::Disconnect {
                conn_id,
                peer,
                reason,
            } => self.on_disconnect(conn_id, peer, reason),
            GapEvent::DiscoveryHit(peer) => self.on_discovery_hit(peer),
            GapEvent::DiscoveryComplete { reason } => self.on_discovery_complete(reason),
            GapEvent::AdvertiseComplete { reason } => self.on_advertise_complete(reason),
            GapEvent::ParameterUpdate { conn_id, status } => {
                self.on_parameter_update(conn_id, status);
            }
        }
    }

    /// Handle every queued event without blocking.  Returns how many ran.
    pub fn drain(&mut self, queue: &LinkEventQueue) -> usize {
        let mut handled = 0;
        while let Some(event) = queue.try_next() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Link task body: wait for events forever.
    pub fn run(mut self, queue: &LinkEventQueue) -> ! {
        info!("BLE[{}]: link task started", self.role);
        loop {
            let event = futures_lite::future::block_on(queue.next());
            self.handle_event(event);
        }
    }

    fn on_host_synced(&mut self) {
        match self.gap.ensure_address() {
            Ok(addr) => {
                self.own_address = Some(addr);
                info!("BLE[{}]: device address {addr}", self.role);
            }
            Err(e) => {
                error!("BLE[{}]: no usable identity address: {e}", self.role);
                return;
            }
        }
        if self.state != ConnectionState::Idle {
            debug!("BLE[{}]: sync while {}, nothing to start", self.role, self.state.name());
            return;
        }
        if let Err(e) = self.start() {
            error!("BLE[{}]: failed to start discovery: {e}", self.role);
        }
    }

    fn on_host_reset(&mut self, reason: i32) {
        warn!("BLE[{}]: host reset; reason={reason}", self.role);
        self.handle = None;
        self.own_address = None;
        self.catalog.begin_window();
        self.policy.reset();
        self.apply(Trigger::HostReset);
    }

    fn on_connect_outcome(&mut self, status: i32, conn_id: Option<u16>) {
        if self.role == Role::Peripheral && self.state == ConnectionState::Discovering {
            // The host stops advertising itself once a central connects.
            self.apply(Trigger::IncomingConnect);
        }
        if self.state != ConnectionState::Connecting {
            debug!(
                "BLE[{}]: connect outcome status={status} ignored while {}",
                self.role,
                self.state.name()
            );
            return;
        }
        match conn_id {
            Some(id) if status == 0 => self.on_connected(id),
            _ => self.on_connect_failed(status),
        }
    }

    fn on_connected(&mut self, conn_id: u16) {
        let desc = self.gap.connection_info(conn_id);
        let (peer, peer_type) = match (desc, self.handle) {
            (Some(d), _) => (d.peer, d.peer_type),
            (None, Some(h)) => (h.peer, h.peer_type),
            (None, None) => (BleAddress::default(), AddressType::Unknown(0xFF)),
        };
        self.handle = Some(LinkHandle {
            role: self.role,
            conn_id: Some(conn_id),
            peer,
            peer_type,
            is_connected: true,
        });
        self.policy.on_success();
        self.apply(Trigger::ConnectSucceeded);

        match desc {
            Some(d) => log_connection(self.role, "connection established", &d),
            None => info!(
                "BLE[{}]: connection established; conn_id={conn_id} peer={peer} ({peer_type})",
                self.role
            ),
        }
    }

    fn on_connect_failed(&mut self, status: i32) {
        match self.handle {
            Some(h) => warn!(
                "BLE[{}]: connection to {} failed; status={status}",
                self.role, h.peer
            ),
            None => warn!("BLE[{}]: connection failed; status={status}", self.role),
        }
        self.handle = None;
        self.recover(Trigger::ConnectFailed);
    }

    fn on_disconnect(&mut self, conn_id: u16, peer: BleAddress, reason: i32) {
        if !matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Disconnecting
        ) {
            debug!(
                "BLE[{}]: disconnect of conn_id={conn_id} ignored while {}",
                self.role,
                self.state.name()
            );
            return;
        }
        if self.handle.and_then(|h| h.conn_id).is_some_and(|id| id != conn_id) {
            debug!("BLE[{}]: disconnect for foreign conn_id={conn_id}", self.role);
            return;
        }
        info!("BLE[{}]: disconnect; reason={reason} peer={peer}", self.role);
        self.handle = None;
        self.recover(Trigger::Disconnected);
    }

    fn on_discovery_hit(&mut self, peer: DiscoveredPeer) {
        if self.role != Role::Central {
            return;
        }
        if self.state != ConnectionState::Discovering {
            debug!(
                "BLE[central]: report from {} ignored while {}",
                peer.address,
                self.state.name()
            );
            return;
        }
        let partial = if peer.name.is_some() && !peer.name_complete {
            " (partial)"
        } else {
            ""
        };
        info!(
            "BLE[central]: found {} ({}) rssi={} {} name={}{}",
            peer.address,
            peer.addr_type,
            peer.rssi,
            peer.kind.label(),
            peer.name.as_deref().unwrap_or("-"),
            partial
        );
        if let Some(target) = self.catalog.observe(peer) {
            self.initiate_connect(&target);
        }
    }

    fn initiate_connect(&mut self, target: &DiscoveredPeer) {
        match self.gap.cancel_scan() {
            Ok(()) | Err(RadioError::NotActive) => {}
            Err(e) => warn!("BLE[central]: failed to cancel discovery: {e}"),
        }
        self.handle = Some(LinkHandle::pending(
            Role::Central,
            target.address,
            target.addr_type,
        ));
        self.apply(Trigger::PeerSelected);
        match self
            .gap
            .connect(&target.address, target.addr_type, self.connect_timeout_ms)
        {
            Ok(()) => info!("BLE[central]: connecting to {}", target.address),
            Err(e) => {
                warn!("BLE[central]: connect request rejected: {e}");
                let rc = match e {
                    RadioError::Host(rc) => rc,
                    _ => -1,
                };
                self.on_connect_failed(rc);
            }
        }
    }

    fn on_discovery_complete(&mut self, reason: i32) {
        if self.role != Role::Central || self.state != ConnectionState::Discovering {
            debug!("BLE[{}]: discovery complete ignored while {}", self.role, self.state.name());
            return;
        }
        info!(
            "BLE[central]: discovery complete; reason={reason} peers={}",
            self.catalog.len()
        );
        self.restart(Trigger::WindowComplete);
    }

    fn on_advertise_complete(&mut self, reason: i32) {
        if self.role != Role::Peripheral
            || self.state != ConnectionState::Discovering
            || self.is_connected()
        {
            debug!("BLE[{}]: advertise complete ignored while {}", self.role, self.state.name());
            return;
        }
        info!("BLE[peripheral]: advertise complete; reason={reason}");
        self.restart(Trigger::AdvertiseComplete);
    }

    fn on_parameter_update(&self, conn_id: u16, status: i32) {
        if status != 0 {
            info!("BLE[{}]: connection update failed; status={status}", self.role);
            return;
        }
        match self.gap.connection_info(conn_id) {
            Some(d) => log_connection(self.role, "connection updated", &d),
            None => info!("BLE[{}]: connection updated; conn_id={conn_id}", self.role),
        }
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn begin_discovery(&mut self) -> Result<(), RadioError> {
        match self.role {
            Role::Peripheral => {
                self.gap.start_advertising(&self.params, &self.device_name)?;
                info!("BLE[peripheral]: advertising as \"{}\"", self.device_name);
            }
            Role::Central => {
                self.catalog.begin_window();
                self.gap.start_scan(&self.params)?;
                info!("BLE[central]: scanning");
            }
        }
        Ok(())
    }

    /// Failure path: ask the policy, then restart discovery.
    fn recover(&mut self, trigger: Trigger) {
        match self.policy.on_failure() {
            RecoveryDecision::Retry => self.restart(trigger),
            RecoveryDecision::GiveUp | RecoveryDecision::Exhausted => {
                warn!("BLE[{}]: retry budget spent, parking until host reset", self.role);
                self.handle = None;
                self.set_state(ConnectionState::Idle);
            }
        }
    }

    /// Issue exactly one discovery action for `trigger`.
    fn restart(&mut self, trigger: Trigger) {
        let Some(next) = fsm::next(self.role, self.state, trigger) else {
            debug!("BLE[{}]: {trigger:?} invalid while {}", self.role, self.state.name());
            return;
        };
        self.handle = None;
        match self.begin_discovery() {
            Ok(()) => self.set_state(next),
            Err(e) => {
                error!("BLE[{}]: failed to restart discovery: {e}", self.role);
                self.set_state(ConnectionState::Idle);
            }
        }
    }

    fn apply(&mut self, trigger: Trigger) -> bool {
        match fsm::next(self.role, self.state, trigger) {
            Some(next) => {
                self.set_state(next);
                true
            }
            None => false,
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if next != self.state {
            debug!("BLE[{}]: {} -> {}", self.role, self.state.name(), next.name());
        }
        self.state = next;
        if !next.holds_link() {
            self.handle = None;
        }
        self.status.publish(next, self.handle.as_ref());
    }
}

fn log_connection(role: Role, what: &str, d: &ConnectionDescriptor) {
    info!(
        "BLE[{role}]: {what}; conn_id={} peer={} ({}) local_role={} interval={:.2} ms latency={} supervision_timeout={} ms",
        d.conn_id,
        d.peer,
        d.peer_type,
        d.local_role,
        d.interval_ms(),
        d.latency,
        d.supervision_timeout_ms()
    );
}
