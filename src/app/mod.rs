//! Application boundary: port traits only.
//!
//! The lifecycle logic in [`crate::link`] and [`crate::station`] talks to
//! the radios, storage, and output pin exclusively through the traits in
//! [`ports`], keeping it fully testable without real peripherals.

pub mod ports;
