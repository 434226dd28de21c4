//! NimBLE GAP adapter.
//!
//! Implements [`GapPort`] for one BLE role on top of the NimBLE host.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: raw NimBLE host calls via `esp_idf_svc::sys`.
//! - **all other targets**: simulation stubs for host-side builds.
//!
//! ## Event path
//!
//! NimBLE delivers GAP events through a C callback on the host task.  Each
//! procedure is started with the role tag as the callback argument, so the
//! callback knows which controller an event belongs to.  It translates the
//! raw event and pushes it into [`DISPATCHER`]; it never touches controller
//! state.  Host sync and reset go to every enabled role.

use core::sync::atomic::{AtomicU8, Ordering};

use log::info;

use crate::address::{AddressType, BleAddress};
use crate::app::ports::{GapPort, RadioError};
use crate::events::{DISPATCHER, GapEvent};
use crate::link::{ConnectionDescriptor, DiscoveryParameters, Role};

#[cfg(target_os = "espidf")]
use crate::events::GapEventKind;
#[cfg(target_os = "espidf")]
use crate::link::DiscoveryDuration;
#[cfg(target_os = "espidf")]
use crate::link::catalog::{AdvKind, DiscoveredPeer};
#[cfg(target_os = "espidf")]
use core::ffi::{c_int, c_void};
#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

// ───────────────────────────────────────────────────────────────
// Host return codes (BLE_HS_E*)
// ───────────────────────────────────────────────────────────────

const HS_EALREADY: i32 = 2;
const HS_ENOTCONN: i32 = 7;
const HS_EBUSY: i32 = 15;
const HS_ENOTSYNCED: i32 = 22;

/// Map a host return code.  `EALREADY` means "already running" for start
/// calls; cancel/stop calls remap it to [`RadioError::NotActive`].
pub(crate) fn host_result(rc: i32) -> Result<(), RadioError> {
    match rc {
        0 => Ok(()),
        HS_EALREADY | HS_EBUSY => Err(RadioError::Busy),
        HS_ENOTCONN => Err(RadioError::UnknownConnection),
        HS_ENOTSYNCED => Err(RadioError::NotReady),
        other => Err(RadioError::Host(other)),
    }
}

fn cancel_result(rc: i32) -> Result<(), RadioError> {
    if rc == HS_EALREADY {
        return Err(RadioError::NotActive);
    }
    host_result(rc)
}

// ───────────────────────────────────────────────────────────────
// Host-level fan-out
// ───────────────────────────────────────────────────────────────

/// Bit per [`Role::as_raw`] that has a running link task.
static ENABLED_ROLES: AtomicU8 = AtomicU8::new(0);

/// Host events are only queued for roles someone drains.
pub fn enable_role(role: Role) {
    ENABLED_ROLES.fetch_or(1 << role.as_raw(), Ordering::AcqRel);
}

fn broadcast_host(event: &GapEvent) {
    let mask = ENABLED_ROLES.load(Ordering::Acquire);
    for role in [Role::Peripheral, Role::Central] {
        if mask & (1 << role.as_raw()) != 0 {
            DISPATCHER.dispatch(role, event.clone());
        }
    }
}

// ───────────────────────────────────────────────────────────────
// GAP adapter
// ───────────────────────────────────────────────────────────────

/// Peripheral connection interval bounds requested by the central
/// (1.25 ms units: 30 ms .. 50 ms).
const CONN_ITVL_MIN: u16 = 0x18;
const CONN_ITVL_MAX: u16 = 0x28;
/// 2.56 s in 10 ms units.
const CONN_SUPERVISION_TIMEOUT: u16 = 0x0100;

pub struct NimbleGap {
    role: Role,
    own_addr_type: u8,
}

impl NimbleGap {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            own_addr_type: 0,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Own address type chosen at sync (`BLE_OWN_ADDR_*`).
    pub fn own_addr_type(&self) -> u8 {
        self.own_addr_type
    }

    #[cfg(target_os = "espidf")]
    fn cb_arg(&self) -> *mut c_void {
        self.role.as_raw() as usize as *mut c_void
    }
}

#[cfg(target_os = "espidf")]
const fn duration_ms(d: DiscoveryDuration) -> i32 {
    match d {
        DiscoveryDuration::Forever => i32::MAX, // BLE_HS_FOREVER
        DiscoveryDuration::Millis(ms) => ms as i32,
    }
}

#[cfg(target_os = "espidf")]
impl GapPort for NimbleGap {
    fn ensure_address(&mut self) -> Result<BleAddress, RadioError> {
        // SAFETY: called from a link task after host sync; NimBLE
        // serialises these calls internally.
        unsafe {
            host_result(ble_hs_util_ensure_addr(0))?;
            let mut addr_type = 0u8;
            host_result(ble_hs_id_infer_auto(0, &mut addr_type))?;
            self.own_addr_type = addr_type;
            let mut raw = [0u8; 6];
            host_result(ble_hs_id_copy_addr(
                addr_type,
                raw.as_mut_ptr(),
                core::ptr::null_mut(),
            ))?;
            Ok(BleAddress::new(raw))
        }
    }

    fn start_advertising(
        &mut self,
        params: &DiscoveryParameters,
        name: &str,
    ) -> Result<(), RadioError> {
        // SAFETY: zeroed is the documented initial state for both structs;
        // `ble_gap_adv_set_fields` copies the name before returning.
        unsafe {
            let mut fields: ble_hs_adv_fields = core::mem::zeroed();
            fields.flags = (BLE_HS_ADV_F_DISC_GEN | BLE_HS_ADV_F_BREDR_UNSUP) as u8;
            fields.tx_pwr_lvl = -128; // BLE_HS_ADV_TX_PWR_LVL_AUTO
            fields.set_tx_pwr_lvl_is_present(1);
            fields.name = name.as_ptr();
            fields.name_len = name.len() as u8;
            fields.set_name_is_complete(1);
            host_result(ble_gap_adv_set_fields(&fields))?;

            let mut adv: ble_gap_adv_params = core::mem::zeroed();
            adv.conn_mode = BLE_GAP_CONN_MODE_UND as u8;
            adv.disc_mode = BLE_GAP_DISC_MODE_GEN as u8;
            adv.itvl_min = params.interval_min;
            adv.itvl_max = params.interval_max;

            host_result(ble_gap_adv_start(
                self.own_addr_type,
                core::ptr::null(),
                duration_ms(params.duration),
                &adv,
                Some(gap_event),
                self.cb_arg(),
            ))
        }
    }

    fn stop_advertising(&mut self) -> Result<(), RadioError> {
        cancel_result(unsafe { ble_gap_adv_stop() })
    }

    fn start_scan(&mut self, params: &DiscoveryParameters) -> Result<(), RadioError> {
        // SAFETY: see `start_advertising`.
        unsafe {
            let mut disc: ble_gap_disc_params = core::mem::zeroed();
            disc.window = params.interval_min;
            disc.itvl = params.interval_max;
            disc.filter_policy = 0;
            disc.set_passive(0);
            disc.set_filter_duplicates(1);
            host_result(ble_gap_disc(
                self.own_addr_type,
                duration_ms(params.duration),
                &disc,
                Some(gap_event),
                self.cb_arg(),
            ))
        }
    }

    fn cancel_scan(&mut self) -> Result<(), RadioError> {
        cancel_result(unsafe { ble_gap_disc_cancel() })
    }

    fn connect(
        &mut self,
        peer: &BleAddress,
        peer_type: AddressType,
        timeout_ms: u32,
    ) -> Result<(), RadioError> {
        let addr = ble_addr_t {
            type_: peer_type.as_raw(),
            val: *peer.as_bytes(),
        };
        // SAFETY: both structs live until `ble_gap_connect` returns.
        unsafe {
            let mut conn: ble_gap_conn_params = core::mem::zeroed();
            conn.scan_itvl = 0x0010;
            conn.scan_window = 0x0010;
            conn.itvl_min = CONN_ITVL_MIN;
            conn.itvl_max = CONN_ITVL_MAX;
            conn.latency = 0;
            conn.supervision_timeout = CONN_SUPERVISION_TIMEOUT;
            host_result(ble_gap_connect(
                self.own_addr_type,
                &addr,
                timeout_ms as i32,
                &conn,
                Some(gap_event),
                self.cb_arg(),
            ))
        }
    }

    fn terminate(&mut self, conn_id: u16, reason: u8) -> Result<(), RadioError> {
        host_result(unsafe { ble_gap_terminate(conn_id, reason) })
    }

    fn connection_info(&self, conn_id: u16) -> Option<ConnectionDescriptor> {
        // SAFETY: `desc` is fully written on rc == 0.
        let desc = unsafe {
            let mut desc: ble_gap_conn_desc = core::mem::zeroed();
            if ble_gap_conn_find(conn_id, &mut desc) != 0 {
                return None;
            }
            desc
        };
        Some(ConnectionDescriptor {
            conn_id: desc.conn_handle,
            peer: BleAddress::new(desc.peer_id_addr.val),
            peer_type: AddressType::from_raw(desc.peer_id_addr.type_),
            interval_raw: desc.conn_itvl,
            latency: desc.conn_latency,
            supervision_timeout_raw: desc.supervision_timeout,
            local_role: if desc.role == BLE_GAP_ROLE_MASTER as u8 {
                Role::Central
            } else {
                Role::Peripheral
            },
        })
    }
}

// ── C callbacks ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn gap_event(event: *mut ble_gap_event, arg: *mut c_void) -> c_int {
    let Some(role) = Role::from_raw(arg as usize as u8) else {
        return 0;
    };
    // SAFETY: NimBLE passes a valid event for the duration of the call.
    let ev = unsafe { &*event };
    DISPATCHER.dispatch_code(role, ev.type_, |kind| unsafe { translate(kind, ev) });
    0
}

/// SAFETY: `kind` must match `ev.type_` so the right union member is read.
#[cfg(target_os = "espidf")]
unsafe fn translate(kind: GapEventKind, ev: &ble_gap_event) -> Option<GapEvent> {
    let u = &ev.__bindgen_anon_1;
    unsafe {
        Some(match kind {
            GapEventKind::Connect => {
                let c = &u.connect;
                GapEvent::ConnectOutcome {
                    status: c.status,
                    conn_id: (c.status == 0).then_some(c.conn_handle),
                }
            }
            GapEventKind::Disconnect => {
                let d = &u.disconnect;
                GapEvent::Disconnect {
                    conn_id: d.conn.conn_handle,
                    peer: BleAddress::new(d.conn.peer_id_addr.val),
                    reason: d.reason,
                }
            }
            GapEventKind::ConnUpdate => GapEvent::ParameterUpdate {
                conn_id: u.conn_update.conn_handle,
                status: u.conn_update.status,
            },
            GapEventKind::Discovery => {
                let d = &u.disc;
                let kind = AdvKind::from_raw(d.event_type)?;
                let data = if d.data.is_null() {
                    &[][..]
                } else {
                    core::slice::from_raw_parts(d.data, usize::from(d.length_data))
                };
                GapEvent::DiscoveryHit(DiscoveredPeer::from_report(
                    BleAddress::new(d.addr.val),
                    AddressType::from_raw(d.addr.type_),
                    d.rssi,
                    kind,
                    data,
                ))
            }
            GapEventKind::DiscoveryComplete => GapEvent::DiscoveryComplete {
                reason: u.disc_complete.reason,
            },
            GapEventKind::AdvertiseComplete => GapEvent::AdvertiseComplete {
                reason: u.adv_complete.reason,
            },
        })
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn on_sync() {
    broadcast_host(&GapEvent::HostSynced);
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn on_reset(reason: c_int) {
    broadcast_host(&GapEvent::HostReset { reason });
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn host_task(_param: *mut c_void) {
    info!("BLE: host task started");
    // Returns only after nimble_port_stop().
    unsafe {
        nimble_port_run();
        nimble_port_freertos_deinit();
    }
}

// ── Host bring-up ─────────────────────────────────────────────

/// Initialise the NimBLE port, hook sync/reset and set the GAP name.
/// Failure is fatal: there is no BLE without the host.
#[cfg(target_os = "espidf")]
pub fn init_host(device_name: &str) -> Result<(), crate::error::Error> {
    let mut name = heapless::Vec::<u8, 32>::new();
    name.extend_from_slice(device_name.as_bytes())
        .and_then(|()| name.push(0).map_err(|_| ()))
        .map_err(|()| crate::error::Error::Init("BLE device name too long"))?;

    // SAFETY: runs once on the main task before the host task exists.
    unsafe {
        if nimble_port_init() != ESP_OK as i32 {
            return Err(crate::error::Error::Init("nimble_port_init failed"));
        }
        ble_hs_cfg.sync_cb = Some(on_sync);
        ble_hs_cfg.reset_cb = Some(on_reset);
        ble_svc_gap_init();
        if ble_svc_gap_device_name_set(name.as_ptr().cast()) != 0 {
            return Err(crate::error::Error::Init("ble_svc_gap_device_name_set failed"));
        }
    }
    info!("BLE: host initialised as \"{device_name}\"");
    Ok(())
}

/// Spawn the NimBLE host task.  Sync arrives as [`GapEvent::HostSynced`].
#[cfg(target_os = "espidf")]
pub fn start_host() {
    unsafe { nimble_port_freertos_init(Some(host_task)) };
}

// ── Simulation ────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl GapPort for NimbleGap {
    fn ensure_address(&mut self) -> Result<BleAddress, RadioError> {
        self.own_addr_type = AddressType::Public.as_raw();
        Ok(BleAddress::new([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]))
    }

    fn start_advertising(
        &mut self,
        params: &DiscoveryParameters,
        name: &str,
    ) -> Result<(), RadioError> {
        info!(
            "BLE(sim): advertising \"{name}\" itvl {}..{}",
            params.interval_min, params.interval_max
        );
        host_result(0)
    }

    fn stop_advertising(&mut self) -> Result<(), RadioError> {
        cancel_result(HS_EALREADY)
    }

    fn start_scan(&mut self, params: &DiscoveryParameters) -> Result<(), RadioError> {
        info!("BLE(sim): scanning {:?}", params.duration);
        host_result(0)
    }

    fn cancel_scan(&mut self) -> Result<(), RadioError> {
        cancel_result(HS_EALREADY)
    }

    fn connect(
        &mut self,
        peer: &BleAddress,
        _peer_type: AddressType,
        timeout_ms: u32,
    ) -> Result<(), RadioError> {
        info!("BLE(sim): connect {peer} timeout {timeout_ms} ms");
        host_result(0)
    }

    fn terminate(&mut self, _conn_id: u16, _reason: u8) -> Result<(), RadioError> {
        host_result(HS_ENOTCONN)
    }

    fn connection_info(&self, _conn_id: u16) -> Option<ConnectionDescriptor> {
        None
    }
}

/// Simulated sync: queue `HostSynced` for every enabled role.
#[cfg(not(target_os = "espidf"))]
pub fn start_host() {
    info!("BLE(sim): host synced");
    broadcast_host(&GapEvent::HostSynced);
}
