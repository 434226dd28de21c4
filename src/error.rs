//! Unified error types for the node firmware.
//!
//! Every subsystem error converts into [`Error`] so `main` can treat
//! bring-up failures uniformly.  Recoverable link failures never reach
//! this type: the link controllers and the retry policy absorb them.
//! All variants are `Copy` so they travel through callbacks without
//! allocation.

use core::fmt;

use crate::app::ports::{ConfigError, RadioError, StationError, StorageError};

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible bring-up operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A subsystem could not be brought up.  Startup must abort.
    Init(&'static str),
    /// The BLE host rejected a GAP request.
    Radio(RadioError),
    /// The WiFi station driver failed.
    Station(StationError),
    /// Persistent storage failed.
    Storage(StorageError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl Error {
    /// Fatal errors leave no recovery path without the subsystem.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Init(_)
                | Self::Station(
                    StationError::InitFailed(_)
                        | StationError::RegisterFailed(_)
                        | StationError::StartFailed(_)
                )
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Radio(e) => write!(f, "radio: {e}"),
            Self::Station(e) => write!(f, "station: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<RadioError> for Error {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

impl From<StationError> for Error {
    fn from(e: StationError) -> Self {
        Self::Station(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
