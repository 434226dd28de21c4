//! Radio event taxonomy and per-role dispatch.
//!
//! The BLE host delivers GAP events from its own task through a C
//! callback.  The callback translates each raw event into a [`GapEvent`]
//! and pushes it into the queue of the role that issued the procedure.
//! Each link task drains its own queue, so events for one role are
//! processed strictly in arrival order.
//!
//! ```text
//! ┌──────────────┐  GapEvent  ┌─────────────────┐      ┌──────────────────┐
//! │ NimBLE host  │──────────▶│ peripheral queue │────▶│ LinkController    │
//! │ (C callback) │──────────▶│ central queue    │────▶│ LinkController    │
//! └──────────────┘            └─────────────────┘      └──────────────────┘
//! ```
//!
//! WiFi events take a different path: the network stack invokes the
//! station handler directly (see [`crate::station`]), so they are modelled
//! here only as the [`StationEvent`] taxonomy.

use core::net::Ipv4Addr;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use log::{debug, warn};

use crate::address::BleAddress;
use crate::link::Role;
use crate::link::catalog::DiscoveredPeer;

/// Pending events per role before the producer starts dropping.
pub const LINK_QUEUE_DEPTH: usize = 16;

// ---------------------------------------------------------------------------
// GAP events
// ---------------------------------------------------------------------------

/// Every GAP event a link controller can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GapEvent {
    /// Result of a connection attempt.  `conn_id` is present only on success.
    ConnectOutcome { status: i32, conn_id: Option<u16> },
    /// An established connection went away.
    Disconnect {
        conn_id: u16,
        peer: BleAddress,
        reason: i32,
    },
    /// One advertisement report received while scanning.
    DiscoveryHit(DiscoveredPeer),
    /// The scan window ended (timeout or cancel).
    DiscoveryComplete { reason: i32 },
    /// Advertising stopped without a connection.
    AdvertiseComplete { reason: i32 },
    /// Connection parameters were renegotiated.  Informational.
    ParameterUpdate { conn_id: u16, status: i32 },
    /// Host and controller are synchronised; GAP procedures may start.
    HostSynced,
    /// The host reset the controller link.  All procedures are gone.
    HostReset { reason: i32 },
}

/// GAP event codes the firmware reacts to.
///
/// Values follow `BLE_GAP_EVENT_*` in the NimBLE host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GapEventKind {
    Connect = 0,
    Disconnect = 1,
    ConnUpdate = 3,
    Discovery = 7,
    DiscoveryComplete = 8,
    AdvertiseComplete = 9,
}

impl GapEventKind {
    /// `None` for codes outside the handled set.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Connect),
            1 => Some(Self::Disconnect),
            3 => Some(Self::ConnUpdate),
            7 => Some(Self::Discovery),
            8 => Some(Self::DiscoveryComplete),
            9 => Some(Self::AdvertiseComplete),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Station events
// ---------------------------------------------------------------------------

/// Events delivered by the WiFi driver and the IP stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationEvent {
    /// Driver started; association may begin.
    LinkStart,
    /// Association lost or refused.  `reason` is the 802.11 reason code.
    LinkDisconnected { reason: u16 },
    /// DHCP assigned an address.
    AddressAssigned { ip: Ipv4Addr },
}

// ---------------------------------------------------------------------------
// Per-role queue
// ---------------------------------------------------------------------------

/// Bounded event queue between the host callback and one link task.
pub struct LinkEventQueue {
    channel: Channel<CriticalSectionRawMutex, GapEvent, LINK_QUEUE_DEPTH>,
    dropped: AtomicU32,
}

impl LinkEventQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Enqueue without blocking.  Returns `false` if the queue was full
    /// and the event was dropped.
    pub fn push(&self, event: GapEvent) -> bool {
        match self.channel.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("GAP queue full, dropping {event:?}");
                false
            }
        }
    }

    /// Next pending event, if any.
    pub fn try_next(&self) -> Option<GapEvent> {
        self.channel.try_receive().ok()
    }

    /// Wait for the next event.
    pub async fn next(&self) -> GapEvent {
        self.channel.receive().await
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    /// Events lost to a full queue since start.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for LinkEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Routes GAP events to the queue of the role they belong to.
pub struct Dispatcher {
    peripheral: LinkEventQueue,
    central: LinkEventQueue,
}

/// The dispatcher the host callbacks feed on device.
pub static DISPATCHER: Dispatcher = Dispatcher::new();

impl Dispatcher {
    pub const fn new() -> Self {
        Self {
            peripheral: LinkEventQueue::new(),
            central: LinkEventQueue::new(),
        }
    }

    pub fn queue(&self, role: Role) -> &LinkEventQueue {
        match role {
            Role::Peripheral => &self.peripheral,
            Role::Central => &self.central,
        }
    }

    /// Forward one event unmodified to `role`.
    pub fn dispatch(&self, role: Role, event: GapEvent) -> bool {
        self.queue(role).push(event)
    }

    /// Host-level events concern every role.
    pub fn broadcast(&self, event: &GapEvent) {
        self.peripheral.push(event.clone());
        self.central.push(event.clone());
    }

    /// Translate a raw GAP event code and dispatch the result.
    ///
    /// Unknown codes are logged and dropped.  `translate` may also return
    /// `None` for a known code whose payload is not worth forwarding.
    pub fn dispatch_code<F>(&self, role: Role, code: u8, translate: F) -> bool
    where
        F: FnOnce(GapEventKind) -> Option<GapEvent>,
    {
        let Some(kind) = GapEventKind::from_code(code) else {
            debug!("BLE[{}]: unhandled GAP event {code}", role.label());
            return false;
        };
        match translate(kind) {
            Some(event) => self.dispatch(role, event),
            None => false,
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
