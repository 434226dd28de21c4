//! Skynet Node firmware entry point.
//!
//! Hexagonal architecture: lifecycle logic behind port traits, radios and
//! peripherals in adapters.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  NimbleGap ×2      WifiStation     NvsConfigStore  HttpServer  │
//! │  (GapPort)         (StationPort)   NvsStringStore  Indicator   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌──────────────────────────┐  ┌──────────────────────────┐    │
//! │  │ LinkController per role  │  │ StationSupervisor        │    │
//! │  │ FSM · catalog · recovery │  │ bounded retry · signal   │    │
//! │  └──────────────────────────┘  └──────────────────────────┘    │
//! │                                                                │
//! │  NimBLE host task ──▶ Dispatcher ──▶ per-role event queues     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::{Context, Result};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::{AnyOutputPin, PinDriver};
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{error, info, warn};

use skynet_node::adapters::http::HttpServer;
use skynet_node::adapters::nimble::{self, NimbleGap};
use skynet_node::adapters::nvs::{self, NvsConfigStore, NvsStringStore};
use skynet_node::adapters::wifi::WifiStation;
use skynet_node::app::ports::ConfigPort;
use skynet_node::config::NodeConfig;
use skynet_node::drivers::indicator::Indicator;
use skynet_node::events::DISPATCHER;
use skynet_node::link::{LinkController, Role};
use skynet_node::station::{StationOutcome, StationSupervisor};

const LINK_TASK_STACK: usize = 6 * 1024;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Skynet Node v{}                  ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Persistent storage ─────────────────────────────────
    nvs::init_flash()?;
    let config = match NvsConfigStore::new().load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Config load failed ({}), using defaults", e);
            NodeConfig::default()
        }
    };
    info!(
        "Config: name='{}' roles={:?} ssid='{}'",
        config.device_name, config.ble_roles, config.wifi_ssid
    );

    // ── 3. Collaborators ──────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // SAFETY: the indicator GPIO is validated and used by nothing else.
    let pin = unsafe { AnyOutputPin::new(i32::from(config.indicator_gpio)) };
    let indicator = Arc::new(Indicator::new(
        PinDriver::output(pin).context("indicator pin")?,
    ));
    let store = Arc::new(NvsStringStore::open());

    // ── 4. WiFi station (blocks until Connected or Fail) ──────
    let station = WifiStation::new(
        peripherals.modem,
        sysloop,
        nvs_partition,
        &config.wifi_ssid,
        &config.wifi_password,
    )
    .map_err(skynet_node::error::Error::from)?;
    let mut supervisor = StationSupervisor::new(
        Arc::new(station),
        u32::from(config.wifi_max_retry),
        Arc::clone(&indicator),
        HttpServer::new(Arc::clone(&indicator), Arc::clone(&store)),
    );
    match supervisor.run() {
        Ok(StationOutcome::Connected) => info!("Station: online"),
        Ok(StationOutcome::Fail) => warn!("Station: offline, continuing with BLE only"),
        Err(e) => {
            let e = skynet_node::error::Error::from(e);
            if e.is_fatal() {
                return Err(e.into());
            }
            error!("Station: {}", e);
        }
    }

    // ── 5. BLE host + link tasks ──────────────────────────────
    nimble::init_host(&config.device_name)?;

    let mut roles = Vec::with_capacity(2);
    if config.peripheral_enabled() {
        roles.push(Role::Peripheral);
    }
    if config.central_enabled() {
        roles.push(Role::Central);
    }
    for role in roles {
        nimble::enable_role(role);
        let cfg = config.clone();
        std::thread::Builder::new()
            .name(format!("link-{}", role.label()))
            .stack_size(LINK_TASK_STACK)
            .spawn(move || {
                LinkController::new(role, NimbleGap::new(role), &cfg).run(DISPATCHER.queue(role))
            })
            .context("spawn link task")?;
    }

    nimble::start_host();
    info!("Startup complete");

    // ── 6. Park ───────────────────────────────────────────────
    loop {
        std::thread::park();
    }
}
