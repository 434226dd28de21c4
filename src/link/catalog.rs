//! Peers observed during one scan window.

use crate::address::{AddressType, BleAddress};

/// Distinct peers remembered per window.
pub const CATALOG_CAPACITY: usize = 8;

/// Longest name an advertisement can carry (31-byte payload minus header).
pub type PeerName = heapless::String<29>;

const AD_TYPE_NAME_SHORT: u8 = 0x08;
const AD_TYPE_NAME_COMPLETE: u8 = 0x09;

/// Advertising report type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvKind {
    /// Connectable undirected.
    AdvInd,
    /// Connectable directed.
    DirectInd,
    /// Scannable undirected.
    ScanInd,
    /// Non-connectable undirected.
    NonconnInd,
    /// Scan response.
    ScanRsp,
}

impl AdvKind {
    /// HCI advertising report event type.
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::AdvInd),
            1 => Some(Self::DirectInd),
            2 => Some(Self::ScanInd),
            3 => Some(Self::NonconnInd),
            4 => Some(Self::ScanRsp),
            _ => None,
        }
    }

    pub const fn is_connectable(self) -> bool {
        matches!(self, Self::AdvInd | Self::DirectInd)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::AdvInd => "ADV_IND",
            Self::DirectInd => "ADV_DIRECT_IND",
            Self::ScanInd => "ADV_SCAN_IND",
            Self::NonconnInd => "ADV_NONCONN_IND",
            Self::ScanRsp => "SCAN_RSP",
        }
    }
}

/// One advertisement report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    pub address: BleAddress,
    pub addr_type: AddressType,
    pub rssi: i8,
    pub name: Option<PeerName>,
    /// `false` when `name` came from a shortened-name field.
    pub name_complete: bool,
    pub kind: AdvKind,
}

impl DiscoveredPeer {
    /// Build from a raw report, extracting the name from `adv_data`.
    pub fn from_report(
        address: BleAddress,
        addr_type: AddressType,
        rssi: i8,
        kind: AdvKind,
        adv_data: &[u8],
    ) -> Self {
        let (name, name_complete) = match parse_adv_name(adv_data) {
            Some((name, complete)) => (Some(name), complete),
            None => (None, false),
        };
        Self {
            address,
            addr_type,
            rssi,
            name,
            name_complete,
            kind,
        }
    }

    pub fn connectable(&self) -> bool {
        self.kind.is_connectable()
    }
}

/// Extract the local name from raw advertisement data.
///
/// A complete name wins over a shortened one.  Returns the name and
/// whether it was complete.  Non-printable bytes are replaced with `?`.
pub fn parse_adv_name(data: &[u8]) -> Option<(PeerName, bool)> {
    let mut short = None;
    let mut rest = data;
    while let [len, tail @ ..] = rest {
        let len = usize::from(*len);
        if len == 0 || len > tail.len() {
            break;
        }
        let (field, next) = tail.split_at(len);
        rest = next;
        let (ad_type, value) = (field[0], &field[1..]);
        match ad_type {
            AD_TYPE_NAME_COMPLETE => return Some((to_name(value), true)),
            AD_TYPE_NAME_SHORT if short.is_none() => short = Some(to_name(value)),
            _ => {}
        }
    }
    short.map(|name| (name, false))
}

fn to_name(bytes: &[u8]) -> PeerName {
    let mut name = PeerName::new();
    for &b in bytes {
        let c = if (0x20..=0x7E).contains(&b) { b as char } else { '?' };
        if name.push(c).is_err() {
            break;
        }
    }
    name
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Ephemeral per-window peer set owned by the central controller.
#[derive(Debug, Default)]
pub struct PeerCatalog {
    peers: heapless::Vec<DiscoveredPeer, CATALOG_CAPACITY>,
    selected: Option<BleAddress>,
}

impl PeerCatalog {
    pub const fn new() -> Self {
        Self {
            peers: heapless::Vec::new(),
            selected: None,
        }
    }

    /// Forget everything; a new window begins.
    pub fn begin_window(&mut self) {
        self.peers.clear();
        self.selected = None;
    }

    /// Record a report.  Returns the peer to connect to if this is the
    /// first connectable report of the window.
    pub fn observe(&mut self, peer: DiscoveredPeer) -> Option<DiscoveredPeer> {
        let pick = self.selected.is_none() && peer.connectable();
        if pick {
            self.selected = Some(peer.address);
        }

        if let Some(known) = self.peers.iter_mut().find(|p| p.address == peer.address) {
            known.rssi = peer.rssi;
            if peer.name.is_some() && (known.name.is_none() || peer.name_complete) {
                known.name.clone_from(&peer.name);
                known.name_complete = peer.name_complete;
            }
        } else if self.peers.push(peer.clone()).is_err() {
            log::debug!("BLE[central]: catalog full, not recording {}", peer.address);
        }

        pick.then_some(peer)
    }

    pub fn selected(&self) -> Option<BleAddress> {
        self.selected
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn peers(&self) -> &[DiscoveredPeer] {
        &self.peers
    }
}
