//! NVS (Non-Volatile Storage) adapter.
//!
//! Two stores over one namespace helper:
//!
//! - [`NvsConfigStore`] implements [`ConfigPort`]: [`NodeConfig`] as a
//!   postcard blob under `skynet/nodecfg`.
//! - [`NvsStringStore`] implements [`KeyValueStore`]: one short string under
//!   `storage/my_string`, mirrored in RAM so reads never touch flash.
//!
//! NVS commits are atomic per `nvs_commit()`.  The simulation backend is a
//! process-local map keyed by `namespace::key`.

use std::sync::{Mutex, PoisonError};

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort, KeyValueStore, StorageError};
use crate::config::NodeConfig;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "skynet";
const CONFIG_KEY: &str = "nodecfg";
const STRING_NAMESPACE: &str = "storage";
const STRING_KEY: &str = "my_string";

/// Stored string capacity, terminator included.
pub const STRING_CAPACITY: usize = 64;

const MAX_BLOB_SIZE: usize = 512;

/// Bring up the default NVS partition.
///
/// On first boot or after a layout-version change the partition is erased
/// and initialised again.  Any other failure is fatal.
pub fn init_flash() -> Result<(), crate::error::Error> {
    #[cfg(target_os = "espidf")]
    {
        // SAFETY: called once from the main task before any NVS access.
        let ret = unsafe { nvs_flash_init() };
        let ret = if ret == ESP_ERR_NVS_NO_FREE_PAGES as i32
            || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as i32
        {
            warn!("NVS: erasing and re-initialising flash partition");
            if unsafe { nvs_flash_erase() } != ESP_OK as i32 {
                return Err(crate::error::Error::Init("nvs erase failed"));
            }
            unsafe { nvs_flash_init() }
        } else {
            ret
        };
        if ret != ESP_OK as i32 {
            return Err(crate::error::Error::Init("nvs init failed"));
        }
        info!("NVS: flash initialised");
    }

    #[cfg(not(target_os = "espidf"))]
    info!("NVS: simulation backend");

    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Namespace helper
// ───────────────────────────────────────────────────────────────

/// One NVS namespace.  Raw ESP-IDF error codes come back as `Err(i32)`.
struct Namespace {
    name: &'static str,
    #[cfg(not(target_os = "espidf"))]
    store: Mutex<HashMap<String, Vec<u8>>>,
}

/// Simulated "not found", matching ESP_ERR_NVS_NOT_FOUND.
#[cfg(not(target_os = "espidf"))]
const NOT_FOUND: i32 = 0x1102;

#[cfg(target_os = "espidf")]
const NOT_FOUND: i32 = ESP_ERR_NVS_NOT_FOUND as i32;

#[cfg(target_os = "espidf")]
fn c_name(s: &str) -> [u8; 16] {
    // NVS names are at most 15 bytes plus NUL.
    let mut buf = [0u8; 16];
    let len = s.len().min(15);
    buf[..len].copy_from_slice(&s.as_bytes()[..len]);
    buf
}

impl Namespace {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            #[cfg(not(target_os = "espidf"))]
            store: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(&self, key: &str) -> String {
        format!("{}::{}", self.name, key)
    }

    /// Open the namespace, run `f` with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_handle<F, T>(&self, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = c_name(self.name);
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };
        let mut handle: nvs_handle_t = 0;
        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK as i32 {
            return Err(ret);
        }
        let result = f(handle);
        unsafe { nvs_close(handle) };
        result
    }

    #[cfg(target_os = "espidf")]
    fn read(&self, key: &str) -> Result<Vec<u8>, i32> {
        let key = c_name(key);
        self.with_handle(false, |handle| {
            let mut size: usize = 0;
            // First call sizes the blob.
            let ret = unsafe {
                nvs_get_blob(handle, key.as_ptr() as *const _, core::ptr::null_mut(), &mut size)
            };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            if size > MAX_BLOB_SIZE {
                return Err(ESP_ERR_NVS_INVALID_LENGTH as i32);
            }
            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key.as_ptr() as *const _,
                    buf.as_mut_ptr() as *mut _,
                    &mut size,
                )
            };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            buf.truncate(size);
            Ok(buf)
        })
    }

    #[cfg(target_os = "espidf")]
    fn write(&self, key: &str, data: &[u8]) -> Result<(), i32> {
        let key = c_name(key);
        self.with_handle(true, |handle| {
            let ret = unsafe {
                nvs_set_blob(handle, key.as_ptr() as *const _, data.as_ptr() as *const _, data.len())
            };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            match unsafe { nvs_commit(handle) } {
                r if r == ESP_OK as i32 => Ok(()),
                r => Err(r),
            }
        })
    }

    #[cfg(target_os = "espidf")]
    fn erase(&self, key: &str) -> Result<(), i32> {
        let key = c_name(key);
        self.with_handle(true, |handle| {
            let ret = unsafe { nvs_erase_key(handle, key.as_ptr() as *const _) };
            if ret != ESP_OK as i32 && ret != NOT_FOUND {
                return Err(ret);
            }
            match unsafe { nvs_commit(handle) } {
                r if r == ESP_OK as i32 => Ok(()),
                r => Err(r),
            }
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn read(&self, key: &str) -> Result<Vec<u8>, i32> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        match store.get(&self.composite_key(key)) {
            Some(bytes) if bytes.len() > MAX_BLOB_SIZE => Err(-1),
            Some(bytes) => Ok(bytes.clone()),
            None => Err(NOT_FOUND),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn write(&self, key: &str, data: &[u8]) -> Result<(), i32> {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.composite_key(key), data.to_vec());
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn erase(&self, key: &str) -> Result<(), i32> {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.composite_key(key));
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Node configuration
// ───────────────────────────────────────────────────────────────

pub struct NvsConfigStore {
    ns: Namespace,
}

impl NvsConfigStore {
    pub fn new() -> Self {
        Self {
            ns: Namespace::new(CONFIG_NAMESPACE),
        }
    }
}

impl Default for NvsConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigPort for NvsConfigStore {
    fn load(&self) -> Result<NodeConfig, ConfigError> {
        match self.ns.read(CONFIG_KEY) {
            Ok(bytes) => {
                let cfg: NodeConfig =
                    postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                cfg.validate()?;
                info!("NVS: loaded config ({} bytes)", bytes.len());
                Ok(cfg)
            }
            Err(rc) if rc == NOT_FOUND => {
                info!("NVS: no stored config, using defaults");
                Ok(NodeConfig::default())
            }
            Err(rc) => {
                warn!("NVS: config read error {rc}");
                Err(ConfigError::IoError)
            }
        }
    }

    fn save(&self, config: &NodeConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.ns.write(CONFIG_KEY, &bytes).map_err(|rc| {
            warn!("NVS: config write error {rc}");
            ConfigError::IoError
        })?;
        info!("NVS: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Stored string
// ───────────────────────────────────────────────────────────────

pub struct NvsStringStore {
    ns: Namespace,
    mirror: Mutex<heapless::String<STRING_CAPACITY>>,
}

impl NvsStringStore {
    /// Open the store and load the current value into RAM.
    ///
    /// Read errors leave the mirror empty.
    pub fn open() -> Self {
        let store = Self {
            ns: Namespace::new(STRING_NAMESPACE),
            mirror: Mutex::new(heapless::String::new()),
        };
        match store.ns.read(STRING_KEY) {
            Ok(bytes) => match core::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| heapless::String::try_from(s).ok())
            {
                Some(value) => {
                    info!("NVS: loaded string '{value}'");
                    *store.lock_mirror() = value;
                }
                None => warn!("NVS: stored string unreadable, using empty"),
            },
            Err(rc) if rc == NOT_FOUND => info!("NVS: no stored string yet, using empty"),
            Err(rc) => warn!("NVS: error reading string ({rc}), using empty"),
        }
        store
    }

    fn lock_mirror(&self) -> std::sync::MutexGuard<'_, heapless::String<STRING_CAPACITY>> {
        self.mirror.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for NvsStringStore {
    fn get(&self) -> heapless::String<64> {
        self.lock_mirror().clone()
    }

    fn set(&self, value: &str) -> Result<(), StorageError> {
        // One byte stays reserved for the C-side terminator.
        if value.len() >= STRING_CAPACITY {
            return Err(StorageError::TooLong);
        }
        let mirrored =
            heapless::String::try_from(value).map_err(|_| StorageError::TooLong)?;
        self.ns.write(STRING_KEY, value.as_bytes()).map_err(|rc| {
            warn!("NVS: failed to save string ({rc})");
            StorageError::IoError
        })?;
        info!("NVS: string saved '{value}'");
        *self.lock_mirror() = mirrored;
        Ok(())
    }

    fn delete(&self) -> Result<(), StorageError> {
        self.ns.erase(STRING_KEY).map_err(|rc| {
            warn!("NVS: failed to erase string ({rc})");
            StorageError::IoError
        })?;
        info!("NVS: string deleted");
        self.lock_mirror().clear();
        Ok(())
    }
}
