//! BLE link lifecycle: shared types for both roles.
//!
//! - [`controller`]: role-parameterised state machine driving the GAP port
//! - [`catalog`]: per-window set of peers seen by the central
//! - [`recovery`]: retry policies for BLE and WiFi

pub mod catalog;
pub mod controller;
pub mod recovery;

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::address::{AddressType, BleAddress};
use crate::app::ports::RadioError;
use crate::fsm::ConnectionState;

pub use controller::LinkController;

/// HCI reason "remote user terminated connection".
pub const REASON_REMOTE_USER_TERMINATED: u8 = 0x13;

/// The two BLE roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Advertises and accepts connections.
    Peripheral,
    /// Scans and initiates connections.
    Central,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Peripheral => "peripheral",
            Self::Central => "central",
        }
    }

    /// Role tag used as the GAP callback argument.
    pub const fn as_raw(self) -> u8 {
        match self {
            Self::Peripheral => 0,
            Self::Central => 1,
        }
    }

    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Peripheral),
            1 => Some(Self::Central),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Link handle
// ---------------------------------------------------------------------------

/// The one connection (pending or live) a role holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkHandle {
    pub role: Role,
    /// Assigned by the host once the connection is established.
    pub conn_id: Option<u16>,
    pub peer: BleAddress,
    pub peer_type: AddressType,
    pub is_connected: bool,
}

impl LinkHandle {
    /// Handle for an attempt that has not completed yet.
    pub const fn pending(role: Role, peer: BleAddress, peer_type: AddressType) -> Self {
        Self {
            role,
            conn_id: None,
            peer,
            peer_type,
            is_connected: false,
        }
    }
}

/// Negotiated parameters of a live connection, in host units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub conn_id: u16,
    pub peer: BleAddress,
    pub peer_type: AddressType,
    /// Connection interval, 1.25 ms units.
    pub interval_raw: u16,
    /// Peripheral latency, in connection events.
    pub latency: u16,
    /// Supervision timeout, 10 ms units.
    pub supervision_timeout_raw: u16,
    /// Our side of the link.
    pub local_role: Role,
}

impl ConnectionDescriptor {
    pub fn interval_ms(&self) -> f32 {
        f32::from(self.interval_raw) * 1.25
    }

    pub fn supervision_timeout_ms(&self) -> u32 {
        u32::from(self.supervision_timeout_raw) * 10
    }
}

// ---------------------------------------------------------------------------
// Discovery parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    Advertise,
    Scan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryDuration {
    Forever,
    Millis(u32),
}

/// Fixed when a discovery action starts.
///
/// For advertising the bounds are the advertising interval; for scanning
/// `interval_min` is the scan window and `interval_max` the scan interval.
/// All values are 0.625 ms units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryParameters {
    pub mode: DiscoveryMode,
    pub interval_min: u16,
    pub interval_max: u16,
    pub duration: DiscoveryDuration,
}

// ---------------------------------------------------------------------------
// Shared status cell
// ---------------------------------------------------------------------------

const NO_CONN: u32 = 0xFFFF;

/// Lock-free view of one role's lifecycle for other tasks.
///
/// State, connected flag and connection id are packed into one word so a
/// reader always sees a consistent triple.  Only the owning controller
/// writes.
pub struct LinkStatus {
    word: AtomicU32,
}

/// One consistent read of a [`LinkStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub state: ConnectionState,
    pub connected: bool,
    pub conn_id: Option<u16>,
}

impl LinkStatus {
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(NO_CONN << 16),
        }
    }

    pub(crate) fn publish(&self, state: ConnectionState, handle: Option<&LinkHandle>) {
        let connected = handle.is_some_and(|h| h.is_connected);
        let conn = handle.and_then(|h| h.conn_id).map_or(NO_CONN, u32::from);
        let word = (state as u32) | (u32::from(connected) << 8) | (conn << 16);
        self.word.store(word, Ordering::Release);
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        let word = self.word.load(Ordering::Acquire);
        let conn = word >> 16;
        LinkSnapshot {
            state: ConnectionState::from_index((word & 0xFF) as u8),
            connected: word & 0x100 != 0,
            conn_id: (conn != NO_CONN).then_some(conn as u16),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot().connected
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot().state
    }
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from role-level operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Discovery or a connection is already active for this role.
    AlreadyActive,
    /// No established connection to act on.
    NotConnected,
    Radio(RadioError),
}

impl From<RadioError> for LinkError {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyActive => write!(f, "discovery or connection already active"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Radio(e) => write!(f, "radio: {e}"),
        }
    }
}
