//! Port traits: the hexagonal boundary between lifecycle logic and the radios.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ LinkController / StationSupervisor
//! ```
//!
//! Driven adapters (NimBLE GAP, WiFi STA driver, GPIO, NVS, HTTP server)
//! implement these traits.  The lifecycle core consumes them via generics,
//! so nothing in `link` or `station` touches hardware directly.

use core::fmt;
use std::sync::Arc;

use crate::address::{AddressType, BleAddress};
use crate::config::NodeConfig;
use crate::events::StationEvent;
use crate::link::{ConnectionDescriptor, DiscoveryParameters};

// ───────────────────────────────────────────────────────────────
// GAP port (short-range radio: domain → host stack)
// ───────────────────────────────────────────────────────────────

/// Generic access procedures for one BLE role.
///
/// Each link controller owns its own instance, so an adapter can tag the
/// events it produces with the role that issued the procedure.
pub trait GapPort {
    /// Make sure the controller has a usable identity address and return it.
    fn ensure_address(&mut self) -> Result<BleAddress, RadioError>;

    /// Begin undirected, general-discoverable advertising.
    fn start_advertising(&mut self, params: &DiscoveryParameters, name: &str)
    -> Result<(), RadioError>;

    /// Stop advertising.  `Err(RadioError::NotActive)` when none is running.
    fn stop_advertising(&mut self) -> Result<(), RadioError>;

    /// Begin an active general-discovery scan.
    fn start_scan(&mut self, params: &DiscoveryParameters) -> Result<(), RadioError>;

    /// Cancel the running scan.  `Err(RadioError::NotActive)` when none is running.
    fn cancel_scan(&mut self) -> Result<(), RadioError>;

    /// Initiate a connection to `peer`.  The outcome arrives as an event.
    fn connect(
        &mut self,
        peer: &BleAddress,
        peer_type: AddressType,
        timeout_ms: u32,
    ) -> Result<(), RadioError>;

    /// Terminate an established connection.
    fn terminate(&mut self, conn_id: u16, reason: u8) -> Result<(), RadioError>;

    /// Look up the negotiated parameters of a live connection.
    fn connection_info(&self, conn_id: u16) -> Option<ConnectionDescriptor>;
}

// ───────────────────────────────────────────────────────────────
// Station port (network interface: domain ↔ WiFi driver)
// ───────────────────────────────────────────────────────────────

/// Receives station events from the driver's callback context.
pub trait StationEventSink: Send + Sync {
    fn on_station_event(&self, event: StationEvent);
}

/// WiFi station driver.
///
/// Methods take `&self`: `connect` is reissued from the network-stack
/// callback context while the startup task holds its own handle.
pub trait StationPort: Send + Sync {
    /// Bring up the network interface and driver.  Called exactly once.
    fn init(&self) -> Result<(), StationError>;

    /// Register for link-layer and address-assignment events.
    fn register(&self, sink: Arc<dyn StationEventSink>) -> Result<(), StationError>;

    /// Start the driver.  Produces a `LinkStart` event when ready.
    fn start(&self) -> Result<(), StationError>;

    /// Issue one association attempt.
    fn connect(&self) -> Result<(), StationError>;
}

// ───────────────────────────────────────────────────────────────
// Collaborators (thin wrappers outside the lifecycle core)
// ───────────────────────────────────────────────────────────────

/// Binary indicator output, shared between the supervisor and HTTP handlers.
pub trait IndicatorPort: Send + Sync {
    fn set(&self, on: bool);
    fn is_on(&self) -> bool;
}

/// Single short string kept in persistent storage.
pub trait KeyValueStore: Send + Sync {
    /// Current value; empty when nothing is stored.
    fn get(&self) -> heapless::String<64>;

    fn set(&self, value: &str) -> Result<(), StorageError>;

    /// Remove the value.  `Ok(())` even if nothing was stored.
    fn delete(&self) -> Result<(), StorageError>;
}

/// Request-serving component started once the station has an address.
pub trait RequestServer {
    /// Start serving.  A second call while running is a logged no-op.
    fn start(&mut self) -> Result<(), ServerError>;

    fn is_running(&self) -> bool;
}

/// Loads and persists [`NodeConfig`].
///
/// Implementations MUST validate before persisting and reject invalid
/// ranges with [`ConfigError::ValidationFailed`], never clamp.
pub trait ConfigPort {
    /// Returns [`NodeConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<NodeConfig, ConfigError>;

    fn save(&self, config: &NodeConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`GapPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// The host has not synced with the controller yet.
    NotReady,
    /// A GAP procedure is already running.
    Busy,
    /// Cancel/stop requested but nothing is active.
    NotActive,
    /// No connection with the given handle.
    UnknownConnection,
    /// Any other non-zero host return code.
    Host(i32),
}

/// Errors from [`StationPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationError {
    /// Interface or driver bring-up failed.  Fatal.
    InitFailed(i32),
    /// Event handler registration failed.  Fatal.
    RegisterFailed(i32),
    /// Driver start failed.  Fatal.
    StartFailed(i32),
    /// Association request was rejected by the driver.
    ConnectFailed(i32),
    /// SSID invalid (must be 1-32 printable ASCII bytes).
    InvalidSsid,
    /// Password invalid (empty for open, or 8-64 bytes).
    InvalidPassword,
    /// The blocking bring-up sequence was already run once.
    AlreadyStarted,
}

/// Errors from [`KeyValueStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    /// Value does not fit the fixed-size slot.
    TooLong,
    Full,
    IoError,
}

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    NotFound,
    Corrupted,
    /// The `&'static str` names the field and the accepted range.
    ValidationFailed(&'static str),
    IoError,
}

/// Errors from [`RequestServer`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerError {
    StartFailed(i32),
    RegisterFailed(i32),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "host not synced"),
            Self::Busy => write!(f, "GAP procedure already in progress"),
            Self::NotActive => write!(f, "no GAP procedure active"),
            Self::UnknownConnection => write!(f, "unknown connection handle"),
            Self::Host(rc) => write!(f, "host error rc={rc}"),
        }
    }
}

impl fmt::Display for StationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitFailed(rc) => write!(f, "interface init failed (rc={rc})"),
            Self::RegisterFailed(rc) => write!(f, "event registration failed (rc={rc})"),
            Self::StartFailed(rc) => write!(f, "driver start failed (rc={rc})"),
            Self::ConnectFailed(rc) => write!(f, "connect request failed (rc={rc})"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::AlreadyStarted => write!(f, "station bring-up already ran"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::TooLong => write!(f, "value too long"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartFailed(rc) => write!(f, "server start failed (rc={rc})"),
            Self::RegisterFailed(rc) => write!(f, "handler registration failed (rc={rc})"),
        }
    }
}
