//! Shared validation helpers for credentials and names.

/// Returns `true` if every byte of `s` is in the printable ASCII range
/// `0x20..=0x7E` (space through tilde, inclusive).
pub(crate) fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// SSID: 1-32 bytes, printable ASCII.
pub(crate) fn is_valid_ssid(ssid: &str) -> bool {
    !ssid.is_empty() && ssid.len() <= 32 && is_printable_ascii(ssid)
}

/// Password: empty (open network) or 8-64 bytes (WPA2).
pub(crate) fn is_valid_password(password: &str) -> bool {
    password.is_empty() || (8..=64).contains(&password.len())
}
