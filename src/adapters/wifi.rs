//! WiFi station adapter.
//!
//! Implements [`StationPort`], the boundary between the station
//! supervisor and the WiFi driver.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspWifi` for interface bring-up, raw
//!   `esp_event_handler_instance_register` for the station events and raw
//!   `esp_wifi_connect` so connect can be issued from the event task.
//! - **all other targets**: simulation stubs for host-side builds.
//!
//! ## Event forwarding
//!
//! ESP-IDF event handlers are C function pointers that cannot capture
//! Rust closures.  The registered sink lives in a static and the handler
//! forwards translated [`StationEvent`](crate::events::StationEvent)s to it.

use std::sync::{Arc, Mutex, PoisonError};

use log::info;

use super::utils::{is_valid_password, is_valid_ssid};
use crate::app::ports::{StationError, StationEventSink, StationPort};
#[cfg(not(target_os = "espidf"))]
use crate::events::StationEvent;

#[cfg(target_os = "espidf")]
use core::ffi::c_void;
#[cfg(target_os = "espidf")]
use esp_idf_svc::eventloop::EspSystemEventLoop;
#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::modem::Modem;
#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::EspDefaultNvsPartition;
#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi};

/// Sink the C handlers forward to.  Set once by `register`.
static SINK: Mutex<Option<Arc<dyn StationEventSink>>> = Mutex::new(None);

fn forward(event: crate::events::StationEvent) {
    let sink = SINK
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .map(Arc::clone);
    // Called without the lock held: the sink may reissue connect.
    if let Some(sink) = sink {
        sink.on_station_event(event);
    }
}

fn validate(ssid: &str, password: &str) -> Result<(), StationError> {
    if !is_valid_ssid(ssid) {
        return Err(StationError::InvalidSsid);
    }
    if !is_valid_password(password) {
        return Err(StationError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Station adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiStation {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    #[cfg(target_os = "espidf")]
    parts: Mutex<Option<(Modem, EspSystemEventLoop, EspDefaultNvsPartition)>>,
    #[cfg(target_os = "espidf")]
    wifi: Mutex<Option<EspWifi<'static>>>,
    /// Simulation: connect attempts, and how many of them fail first.
    #[cfg(not(target_os = "espidf"))]
    sim_attempts: core::sync::atomic::AtomicU32,
    #[cfg(not(target_os = "espidf"))]
    sim_failures: u32,
}

impl WifiStation {
    #[cfg(target_os = "espidf")]
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        ssid: &str,
        password: &str,
    ) -> Result<Self, StationError> {
        validate(ssid, password)?;
        Ok(Self {
            ssid: bounded(ssid, StationError::InvalidSsid)?,
            password: bounded(password, StationError::InvalidPassword)?,
            parts: Mutex::new(Some((modem, sysloop, nvs))),
            wifi: Mutex::new(None),
        })
    }

    /// Simulated station that fails `failures` attempts before getting
    /// an address.
    #[cfg(not(target_os = "espidf"))]
    pub fn new(ssid: &str, password: &str, failures: u32) -> Result<Self, StationError> {
        validate(ssid, password)?;
        Ok(Self {
            ssid: bounded(ssid, StationError::InvalidSsid)?,
            password: bounded(password, StationError::InvalidPassword)?,
            sim_attempts: core::sync::atomic::AtomicU32::new(0),
            sim_failures: failures,
        })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }
}

fn bounded<const N: usize>(s: &str, err: StationError) -> Result<heapless::String<N>, StationError> {
    let mut out = heapless::String::new();
    out.push_str(s).map_err(|()| err)?;
    Ok(out)
}

// ── Platform-specific ─────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn wifi_event_handler(
    _arg: *mut c_void,
    base: esp_event_base_t,
    id: i32,
    data: *mut c_void,
) {
    use crate::events::StationEvent;
    use core::net::Ipv4Addr;

    // SAFETY: event bases are link-time constants; `data` layout is fixed
    // by the (base, id) pair.
    unsafe {
        if base == WIFI_EVENT && id == wifi_event_t_WIFI_EVENT_STA_START as i32 {
            forward(StationEvent::LinkStart);
        } else if base == WIFI_EVENT && id == wifi_event_t_WIFI_EVENT_STA_DISCONNECTED as i32 {
            let ev = &*(data as *const wifi_event_sta_disconnected_t);
            forward(StationEvent::LinkDisconnected {
                reason: u16::from(ev.reason),
            });
        } else if base == IP_EVENT && id == ip_event_t_IP_EVENT_STA_GOT_IP as i32 {
            let ev = &*(data as *const ip_event_got_ip_t);
            let ip = Ipv4Addr::from(ev.ip_info.ip.addr.to_le_bytes());
            forward(StationEvent::AddressAssigned { ip });
        }
    }
}

#[cfg(target_os = "espidf")]
impl StationPort for WifiStation {
    fn init(&self) -> Result<(), StationError> {
        let (modem, sysloop, nvs) = self
            .parts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(StationError::InitFailed(ESP_ERR_INVALID_STATE as i32))?;

        let mut wifi = EspWifi::new(modem, sysloop, Some(nvs))
            .map_err(|e| StationError::InitFailed(e.code()))?;

        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let client = ClientConfiguration {
            ssid: self
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| StationError::InvalidSsid)?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|_| StationError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        };
        wifi.set_configuration(&Configuration::Client(client))
            .map_err(|e| StationError::InitFailed(e.code()))?;

        *self.wifi.lock().unwrap_or_else(PoisonError::into_inner) = Some(wifi);
        info!("WiFi: station interface initialised for '{}'", self.ssid);
        Ok(())
    }

    fn register(&self, sink: Arc<dyn StationEventSink>) -> Result<(), StationError> {
        *SINK.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);

        // SAFETY: the handler is a plain function with no captured state.
        unsafe {
            let mut wifi_instance: esp_event_handler_instance_t = core::ptr::null_mut();
            let rc = esp_event_handler_instance_register(
                WIFI_EVENT,
                ESP_EVENT_ANY_ID,
                Some(wifi_event_handler),
                core::ptr::null_mut(),
                &mut wifi_instance,
            );
            if rc != ESP_OK as i32 {
                return Err(StationError::RegisterFailed(rc));
            }
            let mut ip_instance: esp_event_handler_instance_t = core::ptr::null_mut();
            let rc = esp_event_handler_instance_register(
                IP_EVENT,
                ip_event_t_IP_EVENT_STA_GOT_IP as i32,
                Some(wifi_event_handler),
                core::ptr::null_mut(),
                &mut ip_instance,
            );
            if rc != ESP_OK as i32 {
                return Err(StationError::RegisterFailed(rc));
            }
        }
        Ok(())
    }

    fn start(&self) -> Result<(), StationError> {
        let mut guard = self.wifi.lock().unwrap_or_else(PoisonError::into_inner);
        let wifi = guard
            .as_mut()
            .ok_or(StationError::StartFailed(ESP_ERR_INVALID_STATE as i32))?;
        wifi.start().map_err(|e| StationError::StartFailed(e.code()))
    }

    fn connect(&self) -> Result<(), StationError> {
        let rc = unsafe { esp_wifi_connect() };
        if rc != ESP_OK as i32 {
            return Err(StationError::ConnectFailed(rc));
        }
        Ok(())
    }
}

#[cfg(not(target_os = "espidf"))]
impl StationPort for WifiStation {
    fn init(&self) -> Result<(), StationError> {
        info!("WiFi(sim): interface up for '{}'", self.ssid);
        Ok(())
    }

    fn register(&self, sink: Arc<dyn StationEventSink>) -> Result<(), StationError> {
        *SINK.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
        Ok(())
    }

    fn start(&self) -> Result<(), StationError> {
        forward(StationEvent::LinkStart);
        Ok(())
    }

    fn connect(&self) -> Result<(), StationError> {
        use core::sync::atomic::Ordering;

        let attempt = self.sim_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        if attempt <= self.sim_failures {
            info!("WiFi(sim): association {attempt} refused");
            // 201 = NO_AP_FOUND
            forward(StationEvent::LinkDisconnected { reason: 201 });
        } else {
            info!("WiFi(sim): associated on attempt {attempt}");
            forward(StationEvent::AddressAssigned {
                ip: core::net::Ipv4Addr::new(10, 0, 0, 2),
            });
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
