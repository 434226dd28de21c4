//! Fuzz target: `BleAddress::parse`
//!
//! Invariants checked:
//! - No panics under any input string
//! - Anything that parses renders back to the same text, case-folded
//!
//! cargo fuzz run fuzz_address_parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use skynet_node::address::BleAddress;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(addr) = BleAddress::parse(text) {
        assert_eq!(addr.to_display().as_str(), text.to_ascii_uppercase());
    }
});
