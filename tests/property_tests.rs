//! Property tests for the retry policy, the address codec and central
//! peer selection.
//!
//! Runs on host (x86_64) only; proptest is not available for ESP32 targets.
//! On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use proptest::prelude::*;
use skynet_node::address::{AddressType, BleAddress};
use skynet_node::app::ports::{StationError, StationEventSink, StationPort};
use skynet_node::events::StationEvent;
use skynet_node::link::catalog::{AdvKind, DiscoveredPeer, PeerCatalog};
use skynet_node::link::recovery::{RecoveryDecision, RecoveryPolicy};
use skynet_node::station::StationEventHandler;

#[derive(Default)]
struct CountingPort(AtomicU32);

impl StationPort for CountingPort {
    fn init(&self) -> Result<(), StationError> {
        Ok(())
    }
    fn register(&self, _sink: Arc<dyn StationEventSink>) -> Result<(), StationError> {
        Ok(())
    }
    fn start(&self) -> Result<(), StationError> {
        Ok(())
    }
    fn connect(&self) -> Result<(), StationError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn refused() -> StationEvent {
    StationEvent::LinkDisconnected { reason: 201 }
}

fn adv_kind() -> impl Strategy<Value = AdvKind> {
    (0u8..5).prop_map(|raw| AdvKind::from_raw(raw).unwrap())
}

// ── Bounded retry ─────────────────────────────────────────────

proptest! {
    /// N ≤ max consecutive failures leave the counter at N with no
    /// terminal signal; failure max+1 fires exactly one Fail and nothing
    /// retries afterwards.
    #[test]
    fn bounded_retry_counts_then_fails_once(max in 0u32..20, extra in 0usize..10) {
        let port = Arc::new(CountingPort::default());
        let handler = StationEventHandler::new(Arc::clone(&port), max);

        for n in 1..=max {
            handler.on_station_event(refused());
            prop_assert_eq!(handler.retry_count(), n);
            prop_assert_eq!(handler.signal_counts(), (0, 0));
        }
        prop_assert_eq!(port.0.load(Ordering::SeqCst), max);

        handler.on_station_event(refused());
        prop_assert_eq!(handler.signal_counts(), (0, 1));

        for _ in 0..extra {
            handler.on_station_event(refused());
        }
        prop_assert_eq!(handler.signal_counts(), (0, 1));
        prop_assert_eq!(port.0.load(Ordering::SeqCst), max);
        prop_assert_eq!(handler.retry_count(), max + 1);
    }

    /// A success at any counter value resets it to 0.
    #[test]
    fn success_resets_counter(max in 1u32..20, failures in 0u32..20) {
        let failures = failures.min(max);
        let mut policy = RecoveryPolicy::bounded(max);
        for _ in 0..failures {
            prop_assert_eq!(policy.on_failure(), RecoveryDecision::Retry);
        }
        policy.on_success();
        prop_assert_eq!(policy.count(), 0);
        prop_assert!(!policy.is_exhausted());
    }

    /// The station handler resets on an assigned address wherever the
    /// counter stands.
    #[test]
    fn address_resets_handler_counter(max in 1u32..10, failures in 0u32..10) {
        let failures = failures.min(max);
        let handler = StationEventHandler::new(Arc::new(CountingPort::default()), max);
        for _ in 0..failures {
            handler.on_station_event(refused());
        }
        handler.on_station_event(StationEvent::AddressAssigned {
            ip: [192, 168, 0, 9].into(),
        });
        prop_assert_eq!(handler.retry_count(), 0);
        prop_assert_eq!(handler.signal_counts(), (1, 0));
    }

    /// The unbounded policy never stops retrying.
    #[test]
    fn unbounded_never_gives_up(n in 0usize..500) {
        let mut policy = RecoveryPolicy::unbounded();
        for _ in 0..n {
            prop_assert_eq!(policy.on_failure(), RecoveryDecision::Retry);
        }
    }
}

// ── Address codec ─────────────────────────────────────────────

proptest! {
    #[test]
    fn address_display_round_trip(raw in any::<[u8; 6]>()) {
        let addr = BleAddress::new(raw);
        let text = addr.to_display();
        prop_assert_eq!(text.len(), 17);
        prop_assert_eq!(BleAddress::parse(&text), Ok(addr));
    }

    #[test]
    fn address_display_is_msb_first(raw in any::<[u8; 6]>()) {
        let text = BleAddress::new(raw).to_display();
        let first = u8::from_str_radix(&text[..2], 16).unwrap();
        let last = u8::from_str_radix(&text[15..], 16).unwrap();
        prop_assert_eq!(first, raw[5]);
        prop_assert_eq!(last, raw[0]);
    }
}

#[test]
fn address_known_vector() {
    let addr = BleAddress::new([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    assert_eq!(addr.to_display().as_str(), "06:05:04:03:02:01");
}

// ── Central selection ─────────────────────────────────────────

proptest! {
    /// The catalog picks the first connectable report of a window and
    /// nothing after it.
    #[test]
    fn first_connectable_report_wins(
        reports in proptest::collection::vec((any::<u8>(), adv_kind(), any::<i8>()), 0..40),
    ) {
        let mut catalog = PeerCatalog::new();
        let mut picks = Vec::new();
        for (last, kind, rssi) in &reports {
            let peer = DiscoveredPeer::from_report(
                BleAddress::new([*last, 1, 2, 3, 4, 5]),
                AddressType::Public,
                *rssi,
                *kind,
                &[],
            );
            if let Some(p) = catalog.observe(peer) {
                picks.push(p.address);
            }
        }

        let expected = reports
            .iter()
            .find(|(_, kind, _)| kind.is_connectable())
            .map(|(last, _, _)| BleAddress::new([*last, 1, 2, 3, 4, 5]));
        prop_assert!(picks.len() <= 1);
        prop_assert_eq!(picks.first().copied(), expected);
        prop_assert_eq!(catalog.selected(), expected);
    }

    /// Advertisement names never carry non-printable bytes.
    #[test]
    fn adv_names_are_printable(data in proptest::collection::vec(any::<u8>(), 0..31)) {
        if let Some((name, _)) = skynet_node::link::catalog::parse_adv_name(&data) {
            prop_assert!(name.bytes().all(|b| (0x20..=0x7E).contains(&b)));
        }
    }
}
