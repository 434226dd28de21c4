//! Station bring-up scenarios against a scripted driver.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use skynet_node::app::ports::{IndicatorPort, RequestServer, StationEventSink};
use skynet_node::events::StationEvent;
use skynet_node::station::{StationOutcome, StationSupervisor};

use crate::mock_hw::{Attempt, MockIndicator, MockServer, MockStation};

fn supervisor(
    script: Vec<Attempt>,
    max: u32,
) -> (
    StationSupervisor<MockStation, MockIndicator, MockServer>,
    Arc<MockStation>,
    Arc<MockIndicator>,
) {
    let station = Arc::new(MockStation::new(script));
    let indicator = Arc::new(MockIndicator::default());
    let sup = StationSupervisor::new(
        Arc::clone(&station),
        max,
        Arc::clone(&indicator),
        MockServer::default(),
    );
    (sup, station, indicator)
}

#[test]
fn four_refusals_with_budget_three_fail_once() {
    let (mut sup, station, indicator) = supervisor(vec![Attempt::Refused; 4], 3);

    assert_eq!(sup.run(), Ok(StationOutcome::Fail));

    let handler = sup.handler();
    assert_eq!(handler.signal_counts(), (0, 1));
    assert_eq!(handler.retry_count(), 4);
    assert!(handler.is_exhausted());
    // Initial attempt plus three retries.
    assert_eq!(station.connects(), 4);
    assert_eq!(indicator.on_calls(), 0);
    assert_eq!(sup.server().starts, 0);
    assert!(!sup.server().is_running());
}

#[test]
fn late_disconnects_after_fail_do_not_retry() {
    let (mut sup, station, _) = supervisor(vec![Attempt::Refused; 2], 1);
    assert_eq!(sup.run(), Ok(StationOutcome::Fail));

    let handler = sup.handler();
    handler.on_station_event(StationEvent::LinkDisconnected { reason: 8 });
    assert_eq!(station.connects(), 2);
    assert_eq!(handler.signal_counts(), (0, 1));
    assert_eq!(handler.retry_count(), 2);
}

#[test]
fn address_after_two_refusals_connects_once() {
    let script = vec![
        Attempt::Refused,
        Attempt::Refused,
        Attempt::Address([192, 168, 4, 2]),
    ];
    let (mut sup, station, indicator) = supervisor(script, 3);

    assert_eq!(sup.run(), Ok(StationOutcome::Connected));

    let handler = sup.handler();
    assert_eq!(handler.retry_count(), 0);
    assert_eq!(handler.signal_counts(), (1, 0));
    assert_eq!(handler.ip().map(|ip| ip.octets()), Some([192, 168, 4, 2]));
    assert_eq!(station.connects(), 3);
    assert_eq!(indicator.on_calls(), 1);
    assert!(indicator.is_on());
    assert_eq!(sup.server().starts, 1);
    assert!(sup.server().is_running());
}

#[test]
fn restart_after_fail_can_still_connect() {
    let (mut sup, station, _) = supervisor(vec![Attempt::Refused], 0);
    assert_eq!(sup.run(), Ok(StationOutcome::Fail));

    station.push(Attempt::Address([10, 0, 0, 7]));
    let handler = sup.handler();
    handler.restart().unwrap();
    assert!(handler.is_connected());
    assert_eq!(handler.signal_counts(), (1, 1));
}

#[test]
fn run_is_one_shot() {
    let (mut sup, station, _) = supervisor(vec![Attempt::Address([10, 0, 0, 2])], 5);
    assert_eq!(sup.run(), Ok(StationOutcome::Connected));
    assert!(sup.run().is_err());
    assert_eq!(station.inits.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(sup.into_server().starts, 1);
}

#[test]
fn connected_is_kept_when_budget_runs_out_before_wakeup() {
    // Address, link lost, one retry refused: Fail fires while run() has
    // not yet observed Connected.
    let script = vec![Attempt::AddressThenLost([10, 0, 0, 9]), Attempt::Refused];
    let (mut sup, station, indicator) = supervisor(script, 1);

    assert_eq!(sup.run(), Ok(StationOutcome::Connected));

    let handler = sup.handler();
    assert_eq!(handler.signal_counts(), (1, 1));
    assert!(handler.is_exhausted());
    assert_eq!(station.connects(), 2);
    assert_eq!(indicator.on_calls(), 1);
    assert_eq!(sup.server().starts, 1);
}

/// Blocks until `connects` reaches `n`, i.e. `run` is past `start`.
fn wait_for_connects(station: &MockStation, n: u32) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while station.connects() < n {
        assert!(Instant::now() < deadline, "station never issued connect");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn run_blocks_until_fail_from_network_thread() {
    // Empty script: the driver stays silent and events come from another
    // thread, the way the network stack calls back.
    let (mut sup, station, indicator) = supervisor(Vec::new(), 3);
    let handler = sup.handler();
    let feeder_station = Arc::clone(&station);
    let feeder = thread::spawn(move || {
        wait_for_connects(&feeder_station, 1);
        thread::sleep(Duration::from_millis(20));
        for _ in 0..4 {
            handler.on_station_event(StationEvent::LinkDisconnected { reason: 201 });
        }
    });

    assert_eq!(sup.run(), Ok(StationOutcome::Fail));
    feeder.join().unwrap();

    let handler = sup.handler();
    assert_eq!(handler.retry_count(), 4);
    assert_eq!(handler.signal_counts(), (0, 1));
    assert_eq!(station.connects(), 4);
    assert_eq!(indicator.on_calls(), 0);
    assert_eq!(sup.server().starts, 0);
}

#[test]
fn run_blocks_until_address_from_network_thread() {
    let (mut sup, station, indicator) = supervisor(Vec::new(), 3);
    let handler = sup.handler();
    let feeder_station = Arc::clone(&station);
    let feeder = thread::spawn(move || {
        wait_for_connects(&feeder_station, 1);
        thread::sleep(Duration::from_millis(20));
        handler.on_station_event(StationEvent::LinkDisconnected { reason: 201 });
        handler.on_station_event(StationEvent::AddressAssigned {
            ip: [192, 168, 4, 7].into(),
        });
    });

    assert_eq!(sup.run(), Ok(StationOutcome::Connected));
    feeder.join().unwrap();

    let handler = sup.handler();
    assert_eq!(handler.retry_count(), 0);
    assert_eq!(handler.signal_counts(), (1, 0));
    assert_eq!(station.connects(), 2);
    assert_eq!(indicator.on_calls(), 1);
    assert_eq!(sup.server().starts, 1);
}
