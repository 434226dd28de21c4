//! Link controller scenarios driven through the per-role event queues.

use skynet_node::address::{AddressType, BleAddress};
use skynet_node::app::ports::RadioError;
use skynet_node::config::NodeConfig;
use skynet_node::events::{Dispatcher, GapEvent, LinkEventQueue};
use skynet_node::fsm::ConnectionState;
use skynet_node::link::catalog::{AdvKind, DiscoveredPeer};
use skynet_node::link::{LinkController, LinkError, Role};

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use skynet_node::link::LinkStatus;

use crate::mock_hw::{GapCall, MockGap};

fn controller(role: Role) -> LinkController<MockGap> {
    LinkController::new(role, MockGap::new(), &NodeConfig::default())
}

fn synced(role: Role) -> LinkController<MockGap> {
    let mut c = controller(role);
    c.handle_event(GapEvent::HostSynced);
    assert_eq!(c.state(), ConnectionState::Discovering);
    c
}

fn hit(last: u8, kind: AdvKind) -> GapEvent {
    // Complete local name "node".
    let adv = [0x05, 0x09, b'n', b'o', b'd', b'e'];
    GapEvent::DiscoveryHit(DiscoveredPeer::from_report(
        BleAddress::new([last, 0x02, 0x03, 0x04, 0x05, 0xC6]),
        AddressType::Random,
        -60,
        kind,
        &adv,
    ))
}

fn connected(conn_id: u16) -> GapEvent {
    GapEvent::ConnectOutcome {
        status: 0,
        conn_id: Some(conn_id),
    }
}

fn disconnected(conn_id: u16) -> GapEvent {
    GapEvent::Disconnect {
        conn_id,
        peer: BleAddress::new([0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xC6]),
        reason: 0x213,
    }
}

// ── Peripheral ────────────────────────────────────────────────

#[test]
fn peripheral_advertises_device_name_on_sync() {
    let c = synced(Role::Peripheral);
    assert_eq!(c.gap().calls[0], GapCall::EnsureAddress);
    assert_eq!(
        c.gap().calls[1],
        GapCall::StartAdvertising {
            name: NodeConfig::default().device_name.to_string()
        }
    );
    assert_eq!(
        c.own_address().map(|a| a.to_display().to_string()),
        Some("66:55:44:33:22:11".to_owned())
    );
}

#[test]
fn peripheral_restarts_exactly_once_per_disconnect() {
    let mut c = synced(Role::Peripheral);
    for round in 1..=5 {
        c.handle_event(connected(round));
        assert_eq!(c.state(), ConnectionState::Connected);
        assert!(c.status().is_connected());
        let before = c.gap().discovery_starts();
        c.handle_event(disconnected(round));
        assert_eq!(c.gap().discovery_starts(), before + 1);
        assert_eq!(c.state(), ConnectionState::Discovering);
        assert!(c.handle().is_none());
        assert!(!c.status().is_connected());
    }
}

#[test]
fn peripheral_restarts_exactly_once_per_advertise_complete() {
    let mut c = synced(Role::Peripheral);
    for _ in 0..3 {
        let before = c.gap().discovery_starts();
        c.handle_event(GapEvent::AdvertiseComplete { reason: 13 });
        assert_eq!(c.gap().discovery_starts(), before + 1);
    }
}

#[test]
fn advertise_complete_while_connected_does_nothing() {
    let mut c = synced(Role::Peripheral);
    c.handle_event(connected(1));
    let before = c.gap().discovery_starts();
    c.handle_event(GapEvent::AdvertiseComplete { reason: 0 });
    assert_eq!(c.gap().discovery_starts(), before);
    assert_eq!(c.state(), ConnectionState::Connected);
}

#[test]
fn peripheral_failed_incoming_connect_restarts_without_handle() {
    let mut c = synced(Role::Peripheral);
    let before = c.gap().discovery_starts();
    c.handle_event(GapEvent::ConnectOutcome {
        status: 0x3E,
        conn_id: None,
    });
    assert_eq!(c.gap().discovery_starts(), before + 1);
    assert!(c.handle().is_none());
    assert_eq!(c.state(), ConnectionState::Discovering);
}

#[test]
fn connected_handle_carries_peer_from_host() {
    let mut c = synced(Role::Peripheral);
    c.handle_event(connected(7));
    let h = c.handle().copied().unwrap();
    assert_eq!(h.conn_id, Some(7));
    assert!(h.is_connected);
    assert_eq!(h.peer.to_display().as_str(), "C6:A5:A4:A3:A2:A1");
    assert_eq!(c.status().snapshot().conn_id, Some(7));
}

#[test]
fn foreign_disconnect_is_ignored() {
    let mut c = synced(Role::Peripheral);
    c.handle_event(connected(3));
    c.handle_event(disconnected(9));
    assert_eq!(c.state(), ConnectionState::Connected);
}

// ── Central ───────────────────────────────────────────────────

#[test]
fn central_connects_to_first_connectable_peer() {
    let mut c = synced(Role::Central);
    c.handle_event(hit(1, AdvKind::NonconnInd));
    c.handle_event(hit(2, AdvKind::ScanRsp));
    assert_eq!(c.state(), ConnectionState::Discovering);
    c.handle_event(hit(3, AdvKind::AdvInd));
    assert_eq!(c.state(), ConnectionState::Connecting);

    let calls = &c.gap().calls;
    let n = calls.len();
    // Discovery is cancelled before the connect attempt starts.
    assert_eq!(calls[n - 2], GapCall::CancelScan);
    assert!(matches!(calls[n - 1], GapCall::Connect { peer } if peer.0[0] == 3));
}

#[test]
fn central_ignores_hits_while_connecting() {
    let mut c = synced(Role::Central);
    c.handle_event(hit(1, AdvKind::AdvInd));
    for last in 2..10 {
        c.handle_event(hit(last, AdvKind::AdvInd));
        c.handle_event(hit(last, AdvKind::DirectInd));
    }
    assert_eq!(c.state(), ConnectionState::Connecting);
    assert_eq!(c.gap().connects(), 1);
}

#[test]
fn central_connect_failure_tears_down_then_rescans() {
    let mut c = synced(Role::Central);
    c.handle_event(hit(1, AdvKind::AdvInd));
    assert!(c.handle().is_some());
    c.handle_event(GapEvent::ConnectOutcome {
        status: 13,
        conn_id: None,
    });
    assert!(c.handle().is_none());
    assert_eq!(c.state(), ConnectionState::Discovering);
    assert_eq!(c.gap().last_call(), Some(&GapCall::StartScan));

    // A new window may select again.
    c.handle_event(hit(1, AdvKind::AdvInd));
    assert_eq!(c.gap().connects(), 2);
}

#[test]
fn central_rejected_connect_request_rescans() {
    let mut gap = MockGap::new();
    gap.reject_connect = Some(RadioError::Busy);
    let mut c = LinkController::new(Role::Central, gap, &NodeConfig::default());
    c.handle_event(GapEvent::HostSynced);
    c.handle_event(hit(4, AdvKind::AdvInd));
    assert_eq!(c.state(), ConnectionState::Discovering);
    assert!(c.handle().is_none());
    assert_eq!(c.gap().last_call(), Some(&GapCall::StartScan));
}

#[test]
fn empty_window_restarts_scan() {
    let mut c = synced(Role::Central);
    c.handle_event(hit(1, AdvKind::NonconnInd));
    let before = c.gap().discovery_starts();
    c.handle_event(GapEvent::DiscoveryComplete { reason: 0 });
    assert_eq!(c.gap().discovery_starts(), before + 1);
    assert!(c.catalog().is_empty());
}

// ── Role operations ───────────────────────────────────────────

#[test]
fn second_start_is_rejected() {
    let mut c = synced(Role::Peripheral);
    assert_eq!(c.start(), Err(LinkError::AlreadyActive));
    assert_eq!(c.gap().discovery_starts(), 1);
}

#[test]
fn stop_discovery_is_idempotent() {
    let mut c = synced(Role::Central);
    assert_eq!(c.stop_discovery(), Ok(()));
    assert_eq!(c.state(), ConnectionState::Idle);
    assert_eq!(c.stop_discovery(), Ok(()));
}

#[test]
fn disconnect_terminates_with_remote_user_reason() {
    let mut c = synced(Role::Peripheral);
    assert_eq!(c.disconnect(), Err(LinkError::NotConnected));
    c.handle_event(connected(5));
    c.disconnect().unwrap();
    assert_eq!(
        c.gap().last_call(),
        Some(&GapCall::Terminate {
            conn_id: 5,
            reason: 0x13
        })
    );
    assert_eq!(c.state(), ConnectionState::Disconnecting);
    c.handle_event(disconnected(5));
    assert_eq!(c.state(), ConnectionState::Discovering);
}

#[test]
fn host_reset_parks_until_next_sync() {
    let mut c = synced(Role::Peripheral);
    c.handle_event(connected(1));
    c.handle_event(GapEvent::HostReset { reason: 5 });
    assert_eq!(c.state(), ConnectionState::Idle);
    assert!(c.handle().is_none());
    assert!(c.own_address().is_none());
    c.handle_event(GapEvent::HostSynced);
    assert_eq!(c.state(), ConnectionState::Discovering);
}

// ── Dispatcher + queue ────────────────────────────────────────

#[test]
fn queued_events_are_handled_in_order_per_role() {
    let dispatcher = Dispatcher::new();
    dispatcher.broadcast(&GapEvent::HostSynced);
    dispatcher.dispatch(Role::Central, hit(1, AdvKind::AdvInd));
    dispatcher.dispatch(Role::Peripheral, connected(2));

    let mut central = controller(Role::Central);
    let mut peripheral = controller(Role::Peripheral);
    assert_eq!(central.drain(dispatcher.queue(Role::Central)), 2);
    assert_eq!(peripheral.drain(dispatcher.queue(Role::Peripheral)), 2);

    assert_eq!(central.state(), ConnectionState::Connecting);
    assert_eq!(peripheral.state(), ConnectionState::Connected);
}

#[test]
fn unknown_gap_code_is_dropped() {
    let dispatcher = Dispatcher::new();
    let sent = dispatcher.dispatch_code(Role::Peripheral, 27, |_| Some(GapEvent::HostSynced));
    assert!(!sent);
    assert!(dispatcher.queue(Role::Peripheral).is_empty());
}

fn wait_for(status: &LinkStatus, state: ConnectionState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while status.state() != state {
        assert!(Instant::now() < deadline, "link task never reached {state:?}");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn link_task_follows_events_fed_from_another_thread() {
    static QUEUE: LinkEventQueue = LinkEventQueue::new();

    let task = controller(Role::Peripheral);
    let status: Arc<LinkStatus> = task.status();
    thread::spawn(move || {
        task.run(&QUEUE);
    });

    assert!(QUEUE.push(GapEvent::HostSynced));
    wait_for(&status, ConnectionState::Discovering);

    assert!(QUEUE.push(connected(9)));
    wait_for(&status, ConnectionState::Connected);
    assert!(status.is_connected());
    assert_eq!(status.snapshot().conn_id, Some(9));

    assert!(QUEUE.push(disconnected(9)));
    wait_for(&status, ConnectionState::Discovering);
    assert!(!status.is_connected());
    assert_eq!(QUEUE.dropped(), 0);
}
