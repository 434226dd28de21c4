//! Node configuration parameters
//!
//! All tunable parameters for the node's two radios.
//! Defaults are compiled in; a stored copy in NVS overrides them.

use serde::{Deserialize, Serialize};

use crate::adapters::utils::{is_printable_ascii, is_valid_password, is_valid_ssid};
use crate::app::ports::ConfigError;
use crate::link::{DiscoveryDuration, DiscoveryMode, DiscoveryParameters};

/// Which BLE roles the node runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BleRoles {
    Peripheral,
    Central,
    Both,
}

/// Core node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    // --- BLE ---
    /// GAP device name, used as the advertised complete local name
    pub device_name: heapless::String<24>,
    /// Roles brought up after host sync
    pub ble_roles: BleRoles,
    /// Advertising interval lower bound (milliseconds)
    pub adv_interval_min_ms: u16,
    /// Advertising interval upper bound (milliseconds)
    pub adv_interval_max_ms: u16,
    /// Scan interval (0.625 ms units)
    pub scan_interval: u16,
    /// Scan window (0.625 ms units)
    pub scan_window: u16,
    /// Discovery window length (milliseconds, 0 = forever)
    pub scan_duration_ms: u32,
    /// Central connect attempt timeout (milliseconds)
    pub connect_timeout_ms: u32,

    // --- WiFi station ---
    pub wifi_ssid: heapless::String<32>,
    pub wifi_password: heapless::String<64>,
    /// Consecutive reconnect attempts before the station gives up
    pub wifi_max_retry: u8,

    // --- Indicator ---
    /// GPIO driving the indicator LED
    pub indicator_gpio: u8,
}

fn bounded<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    let _ = out.push_str(s);
    out
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            // BLE
            device_name: bounded("ESP-SKYNET"),
            ble_roles: BleRoles::Peripheral,
            adv_interval_min_ms: 100,
            adv_interval_max_ms: 150,
            scan_interval: 0x0010, // 10 ms
            scan_window: 0x0010,   // 10 ms
            scan_duration_ms: 30_000,
            connect_timeout_ms: 10_000,

            // WiFi
            wifi_ssid: bounded(option_env!("SKYNET_WIFI_SSID").unwrap_or("myssid")),
            wifi_password: bounded(option_env!("SKYNET_WIFI_PASS").unwrap_or("mypassword")),
            wifi_max_retry: 5,

            // Indicator
            indicator_gpio: 32,
        }
    }
}

/// Advertising interval units are 0.625 ms.
const fn adv_ms_to_units(ms: u16) -> u16 {
    ((ms as u32 * 1000) / 625) as u16
}

impl NodeConfig {
    pub fn peripheral_enabled(&self) -> bool {
        matches!(self.ble_roles, BleRoles::Peripheral | BleRoles::Both)
    }

    pub fn central_enabled(&self) -> bool {
        matches!(self.ble_roles, BleRoles::Central | BleRoles::Both)
    }

    /// Undirected, general-discoverable advertising that runs until a
    /// central connects.
    pub fn advertise_params(&self) -> DiscoveryParameters {
        DiscoveryParameters {
            mode: DiscoveryMode::Advertise,
            interval_min: adv_ms_to_units(self.adv_interval_min_ms),
            interval_max: adv_ms_to_units(self.adv_interval_max_ms),
            duration: DiscoveryDuration::Forever,
        }
    }

    /// Active scan with the configured window.
    pub fn scan_params(&self) -> DiscoveryParameters {
        DiscoveryParameters {
            mode: DiscoveryMode::Scan,
            interval_min: self.scan_window,
            interval_max: self.scan_interval,
            duration: if self.scan_duration_ms == 0 {
                DiscoveryDuration::Forever
            } else {
                DiscoveryDuration::Millis(self.scan_duration_ms)
            },
        }
    }

    /// Range-check every field.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_name.is_empty() || !is_printable_ascii(&self.device_name) {
            return Err(ConfigError::ValidationFailed(
                "device_name must be 1-24 printable ASCII bytes",
            ));
        }
        if !(20..=10_240).contains(&self.adv_interval_min_ms)
            || !(20..=10_240).contains(&self.adv_interval_max_ms)
        {
            return Err(ConfigError::ValidationFailed(
                "adv_interval_*_ms must be 20-10240",
            ));
        }
        if self.adv_interval_min_ms > self.adv_interval_max_ms {
            return Err(ConfigError::ValidationFailed(
                "adv_interval_min_ms must be <= adv_interval_max_ms",
            ));
        }
        if !(0x0004..=0x4000).contains(&self.scan_interval) {
            return Err(ConfigError::ValidationFailed(
                "scan_interval must be 0x0004-0x4000",
            ));
        }
        if self.scan_window < 0x0004 || self.scan_window > self.scan_interval {
            return Err(ConfigError::ValidationFailed(
                "scan_window must be 0x0004-scan_interval",
            ));
        }
        if self.scan_duration_ms != 0 && !(100..=600_000).contains(&self.scan_duration_ms) {
            return Err(ConfigError::ValidationFailed(
                "scan_duration_ms must be 0 (forever) or 100-600000",
            ));
        }
        if !(1_000..=60_000).contains(&self.connect_timeout_ms) {
            return Err(ConfigError::ValidationFailed(
                "connect_timeout_ms must be 1000-60000",
            ));
        }
        if !is_valid_ssid(&self.wifi_ssid) {
            return Err(ConfigError::ValidationFailed(
                "wifi_ssid must be 1-32 printable ASCII bytes",
            ));
        }
        if !is_valid_password(&self.wifi_password) {
            return Err(ConfigError::ValidationFailed(
                "wifi_password must be empty or 8-64 bytes",
            ));
        }
        if self.wifi_max_retry > 50 {
            return Err(ConfigError::ValidationFailed("wifi_max_retry must be 0-50"));
        }
        if self.indicator_gpio > 39 {
            return Err(ConfigError::ValidationFailed("indicator_gpio must be 0-39"));
        }
        Ok(())
    }
}
