//! Fuzz target: advertisement report parsing and peer selection
//!
//! Treats the input as a stream of advertisement reports (1 byte kind,
//! 1 byte rssi, 1 byte address tail, rest = AD payload chunk) and feeds
//! them through `DiscoveredPeer::from_report` and `PeerCatalog::observe`.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - At most one peer is selected per window, and it is connectable
//! - The catalog never exceeds `CATALOG_CAPACITY`
//!
//! cargo fuzz run fuzz_adv_report

#![no_main]

use libfuzzer_sys::fuzz_target;
use skynet_node::address::{AddressType, BleAddress};
use skynet_node::link::catalog::{AdvKind, CATALOG_CAPACITY, DiscoveredPeer, PeerCatalog};

fuzz_target!(|data: &[u8]| {
    let mut catalog = PeerCatalog::new();
    let mut picks = 0;

    for chunk in data.chunks(16) {
        if chunk.len() < 3 {
            break;
        }
        let kind = AdvKind::from_raw(chunk[0] % 6).unwrap_or(AdvKind::NonconnInd);
        let rssi = chunk[1] as i8;
        let address = BleAddress::new([chunk[2], 0, 0, 0, 0, 0xC0]);
        let peer = DiscoveredPeer::from_report(address, AddressType::Random, rssi, kind, &chunk[3..]);

        if let Some(name) = &peer.name {
            assert!(name.bytes().all(|b| (0x20..=0x7E).contains(&b)));
        }
        if let Some(picked) = catalog.observe(peer) {
            assert!(picked.connectable());
            picks += 1;
        }
        assert!(catalog.len() <= CATALOG_CAPACITY);
    }

    assert!(picks <= 1, "more than one peer selected in one window");
});
