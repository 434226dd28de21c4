//! Host-side bring-up through the simulation adapters, the way `main`
//! wires them on the device.

use std::convert::Infallible;
use std::sync::Arc;

use embedded_hal::digital::{ErrorType, OutputPin};
use skynet_node::adapters::http::{HttpMethod, HttpServer};
use skynet_node::adapters::nvs::NvsStringStore;
use skynet_node::adapters::wifi::WifiStation;
use skynet_node::app::ports::{IndicatorPort, RequestServer};
use skynet_node::drivers::indicator::Indicator;
use skynet_node::station::{StationOutcome, StationSupervisor};

struct NullPin;

impl ErrorType for NullPin {
    type Error = Infallible;
}

impl OutputPin for NullPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[test]
fn simulated_station_comes_up_and_serves() {
    let indicator = Arc::new(Indicator::new(NullPin));
    let store = Arc::new(NvsStringStore::open());
    let station = WifiStation::new("HomeWiFi", "mysecret8", 2).unwrap();

    let mut sup = StationSupervisor::new(
        Arc::new(station),
        5,
        Arc::clone(&indicator),
        HttpServer::new(Arc::clone(&indicator), Arc::clone(&store)),
    );
    assert_eq!(sup.run(), Ok(StationOutcome::Connected));
    assert!(indicator.is_on());
    assert_eq!(sup.handler().ip().map(|ip| ip.octets()), Some([10, 0, 0, 2]));

    let mut server = sup.into_server();
    assert!(server.is_running());
    server.start().unwrap();
    assert!(server.is_running());

    let reply = server.handle(HttpMethod::Get, "/pin?state=off", b"");
    assert_eq!(reply.status, 200);
    assert!(!indicator.is_on());
    server.handle(HttpMethod::Post, "/value", b"value=abc");
    assert_eq!(server.handle(HttpMethod::Get, "/value", b"").body, "abc");
}
