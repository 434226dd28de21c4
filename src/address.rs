//! BLE device address codec.
//!
//! The host stack stores addresses little-endian (`val[0]` is the least
//! significant byte).  Humans read them most-significant byte first, so
//! the display form reverses the bytes: `[0x11, .., 0x66]` renders as
//! `66:55:44:33:22:11`.

use core::fmt;
use core::str::FromStr;

/// Display form buffer: 6 × "XX" + 5 × ':' = 17 chars.
pub type AddressString = heapless::String<17>;

/// A 6-byte BLE device address in host (little-endian) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BleAddress(pub [u8; 6]);

impl BleAddress {
    pub const fn new(raw: [u8; 6]) -> Self {
        Self(raw)
    }

    /// Raw bytes, least significant first.
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Canonical display form, colon separated, uppercase, MSB first.
    pub fn to_display(&self) -> AddressString {
        let mut s = AddressString::new();
        use core::fmt::Write;
        let _ = write!(s, "{self}");
        s
    }

    /// Parse a display-form string back into host order.
    pub fn parse(s: &str) -> Result<Self, AddressParseError> {
        let mut raw = [0u8; 6];
        let mut parts = s.split(':');
        // Display order is MSB first; host order stores it last.
        for slot in raw.iter_mut().rev() {
            let part = parts.next().ok_or(AddressParseError::TooShort)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(AddressParseError::BadOctet);
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| AddressParseError::BadOctet)?;
        }
        if parts.next().is_some() {
            return Err(AddressParseError::TooLong);
        }
        Ok(Self(raw))
    }
}

impl fmt::Display for BleAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a[5], a[4], a[3], a[2], a[1], a[0]
        )
    }
}

impl FromStr for BleAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressParseError {
    TooShort,
    TooLong,
    BadOctet,
}

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "address has fewer than 6 octets"),
            Self::TooLong => write!(f, "address has more than 6 octets"),
            Self::BadOctet => write!(f, "address octet is not two hex digits"),
        }
    }
}

// ---------------------------------------------------------------------------
// Address type
// ---------------------------------------------------------------------------

/// BLE address-type tag as carried in `ble_addr_t.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    Public,
    Random,
    PublicId,
    RandomId,
    Unknown(u8),
}

impl AddressType {
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Public,
            1 => Self::Random,
            2 => Self::PublicId,
            3 => Self::RandomId,
            other => Self::Unknown(other),
        }
    }

    pub const fn as_raw(self) -> u8 {
        match self {
            Self::Public => 0,
            Self::Random => 1,
            Self::PublicId => 2,
            Self::RandomId => 3,
            Self::Unknown(raw) => raw,
        }
    }

    /// Human label used in connection logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::Random => "Random",
            Self::PublicId => "Public ID",
            Self::RandomId => "Random ID",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
