//! Connection lifecycle transition table.
//!
//! One table shared by both BLE roles.  Rows that only make sense for one
//! role are guarded by a role check; everything else is identical.
//!
//! ```text
//!            start                 peer selected (central)
//!   Idle ─────────────▶ Discovering ──────────────────────▶ Connecting
//!    ▲                  │  ▲   ▲  window/adv complete          │   │
//!    │                  └──┘   │                               │   │
//!    │                         │ connect failed                │   │ connect ok
//!    │                         ├───────────────────────────────┘   ▼
//!    │                         │        disconnected           Connected
//!    │                         ├─────────────────────────────────┘ │
//!    │                         │                                   │ disconnect()
//!    │                         └───────────── Disconnecting ◀──────┘
//!    │
//!    └── host reset (from any state)
//! ```
//!
//! The table is pure: it answers "where does this trigger lead" and the
//! link controller performs the radio action that goes with it.

use crate::link::Role;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Lifecycle state of one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ConnectionState {
    #[default]
    Idle = 0,
    Discovering = 1,
    Connecting = 2,
    Connected = 3,
    Disconnecting = 4,
}

impl ConnectionState {
    pub const COUNT: usize = 5;

    /// Convert a `u8` back to a state.  Out-of-range values map to `Idle`.
    pub fn from_index(idx: u8) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::Discovering,
            2 => Self::Connecting,
            3 => Self::Connected,
            4 => Self::Disconnecting,
            _ => {
                debug_assert!(false, "invalid connection state index: {idx}");
                Self::Idle
            }
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Discovering => "Discovering",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnecting => "Disconnecting",
        }
    }

    /// A [`crate::link::LinkHandle`] may exist only in these states.
    pub const fn holds_link(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Disconnecting)
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// Inputs to the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Explicit `start()`.
    Start,
    /// Explicit `stop_discovery()`.
    Stop,
    /// Central picked a connectable peer and issued connect.
    PeerSelected,
    /// A central connected to us while advertising.
    IncomingConnect,
    /// Scan window ended without a connection.
    WindowComplete,
    /// Advertising ended without a connection.
    AdvertiseComplete,
    ConnectSucceeded,
    ConnectFailed,
    /// Local `disconnect()` issued.
    DisconnectRequested,
    /// Link lost, whoever initiated it.
    Disconnected,
    HostReset,
}

/// Look up the next state.  `None` means the trigger is not valid in
/// `state` and must be ignored.
pub fn next(role: Role, state: ConnectionState, trigger: Trigger) -> Option<ConnectionState> {
    use ConnectionState as S;
    use Trigger as T;

    match (state, trigger) {
        (_, T::HostReset) => Some(S::Idle),

        (S::Idle, T::Start) => Some(S::Discovering),
        (S::Discovering, T::Stop) => Some(S::Idle),

        (S::Discovering, T::PeerSelected) if role == Role::Central => Some(S::Connecting),
        (S::Discovering, T::IncomingConnect) if role == Role::Peripheral => Some(S::Connecting),
        (S::Discovering, T::WindowComplete) if role == Role::Central => Some(S::Discovering),
        (S::Discovering, T::AdvertiseComplete) if role == Role::Peripheral => {
            Some(S::Discovering)
        }

        (S::Connecting, T::ConnectSucceeded) => Some(S::Connected),
        (S::Connecting, T::ConnectFailed) => Some(S::Discovering),

        (S::Connected, T::DisconnectRequested) => Some(S::Disconnecting),
        (S::Connected | S::Disconnecting, T::Disconnected) => Some(S::Discovering),

        _ => None,
    }
}
