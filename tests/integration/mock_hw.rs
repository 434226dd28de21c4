//! Mock radio and peripheral adapters for integration tests.
//!
//! Records every port call so tests can assert on the full command
//! history without a BLE host or a WiFi driver.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use skynet_node::address::{AddressType, BleAddress};
use skynet_node::app::ports::{
    GapPort, IndicatorPort, RadioError, RequestServer, ServerError, StationError,
    StationEventSink, StationPort,
};
use skynet_node::events::StationEvent;
use skynet_node::link::{ConnectionDescriptor, DiscoveryParameters, Role};

// ── GAP call record ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum GapCall {
    EnsureAddress,
    StartAdvertising { name: String },
    StopAdvertising,
    StartScan,
    CancelScan,
    Connect { peer: BleAddress },
    Terminate { conn_id: u16, reason: u8 },
}

// ── MockGap ───────────────────────────────────────────────────

pub struct MockGap {
    pub calls: Vec<GapCall>,
    pub address: BleAddress,
    /// Returned by `connection_info` for any live handle.
    pub peer: BleAddress,
    /// When set, `connect` is rejected synchronously with this error.
    pub reject_connect: Option<RadioError>,
    discovering: bool,
}

#[allow(dead_code)]
impl MockGap {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            address: BleAddress::new([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
            peer: BleAddress::new([0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xC6]),
            reject_connect: None,
            discovering: false,
        }
    }

    /// Number of discovery (re)starts issued so far.
    pub fn discovery_starts(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, GapCall::StartAdvertising { .. } | GapCall::StartScan))
            .count()
    }

    pub fn connects(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, GapCall::Connect { .. }))
            .count()
    }

    pub fn last_call(&self) -> Option<&GapCall> {
        self.calls.last()
    }
}

impl GapPort for MockGap {
    fn ensure_address(&mut self) -> Result<BleAddress, RadioError> {
        self.calls.push(GapCall::EnsureAddress);
        Ok(self.address)
    }

    fn start_advertising(
        &mut self,
        _params: &DiscoveryParameters,
        name: &str,
    ) -> Result<(), RadioError> {
        self.calls.push(GapCall::StartAdvertising {
            name: name.to_owned(),
        });
        self.discovering = true;
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), RadioError> {
        self.calls.push(GapCall::StopAdvertising);
        if !core::mem::take(&mut self.discovering) {
            return Err(RadioError::NotActive);
        }
        Ok(())
    }

    fn start_scan(&mut self, _params: &DiscoveryParameters) -> Result<(), RadioError> {
        self.calls.push(GapCall::StartScan);
        self.discovering = true;
        Ok(())
    }

    fn cancel_scan(&mut self) -> Result<(), RadioError> {
        self.calls.push(GapCall::CancelScan);
        if !core::mem::take(&mut self.discovering) {
            return Err(RadioError::NotActive);
        }
        Ok(())
    }

    fn connect(
        &mut self,
        peer: &BleAddress,
        _peer_type: AddressType,
        _timeout_ms: u32,
    ) -> Result<(), RadioError> {
        self.calls.push(GapCall::Connect { peer: *peer });
        match self.reject_connect {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn terminate(&mut self, conn_id: u16, reason: u8) -> Result<(), RadioError> {
        self.calls.push(GapCall::Terminate { conn_id, reason });
        Ok(())
    }

    fn connection_info(&self, conn_id: u16) -> Option<ConnectionDescriptor> {
        Some(ConnectionDescriptor {
            conn_id,
            peer: self.peer,
            peer_type: AddressType::Random,
            interval_raw: 0x18,
            latency: 0,
            supervision_timeout_raw: 0x100,
            local_role: Role::Peripheral,
        })
    }
}

// ── MockStation ───────────────────────────────────────────────

/// What the driver reports after one association attempt.
#[derive(Debug, Clone, Copy)]
pub enum Attempt {
    Refused,
    Address([u8; 4]),
    /// Associates, then the AP drops the link before the caller wakes.
    AddressThenLost([u8; 4]),
}

/// Scripted station driver.  Each `connect` consumes one [`Attempt`] and
/// delivers the matching event synchronously, the way the network stack
/// calls back from its own context.  An empty script delivers nothing.
pub struct MockStation {
    script: Mutex<VecDeque<Attempt>>,
    sink: Mutex<Option<Arc<dyn StationEventSink>>>,
    pub inits: AtomicU32,
    pub connects: AtomicU32,
}

#[allow(dead_code)]
impl MockStation {
    pub fn new(script: impl IntoIterator<Item = Attempt>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            sink: Mutex::new(None),
            inits: AtomicU32::new(0),
            connects: AtomicU32::new(0),
        }
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Append attempts for a later restart.
    pub fn push(&self, attempt: Attempt) {
        self.script.lock().unwrap().push_back(attempt);
    }

    fn deliver(&self, event: StationEvent) {
        // Clone out of the lock: the sink calls `connect` re-entrantly.
        let sink = self.sink.lock().unwrap().clone();
        if let Some(sink) = sink {
            sink.on_station_event(event);
        }
    }
}

impl StationPort for MockStation {
    fn init(&self) -> Result<(), StationError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn register(&self, sink: Arc<dyn StationEventSink>) -> Result<(), StationError> {
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn start(&self) -> Result<(), StationError> {
        self.deliver(StationEvent::LinkStart);
        Ok(())
    }

    fn connect(&self) -> Result<(), StationError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Attempt::Refused) => self.deliver(StationEvent::LinkDisconnected { reason: 201 }),
            Some(Attempt::Address(ip)) => self.deliver(StationEvent::AddressAssigned {
                ip: ip.into(),
            }),
            Some(Attempt::AddressThenLost(ip)) => {
                self.deliver(StationEvent::AddressAssigned { ip: ip.into() });
                self.deliver(StationEvent::LinkDisconnected { reason: 8 });
            }
            None => {}
        }
        Ok(())
    }
}

// ── MockIndicator ─────────────────────────────────────────────

#[derive(Default)]
pub struct MockIndicator {
    pub history: Mutex<Vec<bool>>,
}

#[allow(dead_code)]
impl MockIndicator {
    pub fn on_calls(&self) -> usize {
        self.history.lock().unwrap().iter().filter(|on| **on).count()
    }
}

impl IndicatorPort for MockIndicator {
    fn set(&self, on: bool) {
        self.history.lock().unwrap().push(on);
    }

    fn is_on(&self) -> bool {
        self.history.lock().unwrap().last().copied().unwrap_or(false)
    }
}

// ── MockServer ────────────────────────────────────────────────

#[derive(Default)]
pub struct MockServer {
    pub starts: u32,
    running: bool,
}

impl RequestServer for MockServer {
    fn start(&mut self) -> Result<(), ServerError> {
        self.starts += 1;
        self.running = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
